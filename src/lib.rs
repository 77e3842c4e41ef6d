//! # neovi-mic2
//!
//! A Rust crate for driving the Intrepid Control Systems neoVI MIC2 USB
//! accessory: its digital I/O bank (push button, buzzer, GPS status LED), its
//! optional GPS receiver, and its audio capture path.
//!
//! The accessory enumerates as one or two USB HID interfaces sharing a serial
//! number. This crate discovers them through `hidapi`, groups them per
//! physical unit, and exposes each unit as a [`Device`] whose subsystems are
//! opened and closed independently. A [`Session`] takes exclusive ownership of
//! a device and closes whatever is still open when it ends.
//!
//! ## Features
//!
//! *   Device discovery (`device_find_all`, `Enumerator::find_by_serial`),
//!     ordered by serial number.
//! *   IO subsystem: open/close, button state, buzzer and GPS LED control.
//! *   GPS subsystem: open/close, lock state, full fix snapshot ([`GpsFix`])
//!     with DMS coordinates, navigation status, accuracy metrics and up to 16
//!     satellites.
//! *   Audio sequencing (start/stop/save) over a pluggable
//!     [`CapturePipeline`].
//! *   Scoped [`Session`] teardown that closes every open subsystem.
//! *   A C ABI (`mic2_find`, `mic2_io_open`, `mic2_gps_info`, ...) in [`ffi`],
//!     with the header in `include/mic2.h`. Build as `cdylib` to use it.
//! *   An in-memory [`mock`] backend for testing without hardware.
//!
//! ## Installation
//!
//! ```toml
//! [dependencies]
//! neovi-mic2 = "0.1.0"
//!
//! [dev-dependencies]   # For demos/tests
//! env_logger = "0.11"
//! ```
//!
//! You also need the `hidapi` library installed on your system. See the
//! [`hidapi` crate documentation](https://docs.rs/hidapi/) for details.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use neovi_mic2::{device_find_all, HidTransport, Result, Session};
//! use std::rc::Rc;
//!
//! fn main() -> Result<()> {
//!     // Optional: Initialize logging
//!     // env_logger::init();
//!
//!     let transport = Rc::new(HidTransport::new()?);
//!     for device in device_find_all(transport)? {
//!         println!("{} (GPS: {})", device.serial_number(), device.has_gps());
//!
//!         let session = Session::new(device)?;
//!         session.io_open()?;
//!         session.io_buzzer_enable(true)?;
//!         std::thread::sleep(std::time::Duration::from_millis(100));
//!         session.io_buzzer_enable(false)?;
//!
//!         if session.has_gps() {
//!             session.gps_open()?;
//!             let fix = session.gps_info()?;
//!             println!("  {} {} {}", fix.nav_status, fix.latitude, fix.longitude);
//!         }
//!         // IO and GPS are closed when `session` goes out of scope
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Threading
//!
//! [`Device`], [`Session`] and [`HidTransport`] are `!Send` and `!Sync`.
//! Calls on one device are serialized by construction; other threads
//! enumerate with their own transport.
//!
//! ## Hardware Setup Notes
//!
//! *   **Linux udev Rules:** Grant user permission to the HID devices. Create `/etc/udev/rules.d/99-neovi-mic2.rules`:
//!     ```udev
//!     # neoVI MIC2 IO and GPS interfaces
//!     SUBSYSTEM=="hidraw", ATTRS{idVendor}=="093c", ATTRS{idProduct}=="1400", MODE="0666", GROUP="plugdev"
//!     SUBSYSTEM=="hidraw", ATTRS{idVendor}=="093c", ATTRS{idProduct}=="1401", MODE="0666", GROUP="plugdev"
//!     ```
//!     Reload: `sudo udevadm control --reload-rules && sudo udevadm trigger`
//!
//! ## License
//!
//! This project is licensed under the WTFPL.

pub mod audio;
mod consts;
mod device;
mod error;
pub mod ffi;
pub mod gps;
pub mod hid;
pub mod io;
pub mod mock;
mod session;
pub mod transport;

pub use audio::AudioState;
pub use device::{device_find_all, AbiFingerprint, Device, Enumerator, SubsystemState};
pub use error::{Error, ErrorCode, ErrorKind, Result};
pub use gps::{Coordinate, Dms, GpsFix, Hemisphere, NavigationStatus, Satellite};
pub use hid::{HidTransport, HidTransportConfig};
pub use io::IoLine;
pub use session::Session;
pub use transport::{CapturePipeline, DeviceDescriptor, Subsystem, Transport};
// Re-export only essential public constants
pub use consts::{
    DEFAULT_SAMPLE_RATE, MAX_SATELLITES, MIC2_API_VERSION, MIC2_GPS_PID, MIC2_IO_PID,
    MIC2_SERIAL_PREFIX, MIC2_VID,
};
