//! Scoped management of one device's subsystems.

use crate::audio::AudioState;
use crate::device::Device;
use crate::error::Result;
use crate::gps::GpsFix;
use crate::transport::Subsystem;
use log::{debug, warn};
use std::path::Path;

/// Exclusive owner of one device's subsystems.
///
/// When the session ends, through [`Session::close`] or by going out of
/// scope, an active recording is stopped and every open subsystem is closed.
/// Failures during teardown are logged, never returned. Only one session can
/// manage a device at a time; a second [`Session::new`] fails with
/// [`Error::DeviceBusy`](crate::Error::DeviceBusy) until the first ends.
///
/// ```
/// use neovi_mic2::mock::MockTransport;
/// use neovi_mic2::{device_find_all, Session};
/// use std::rc::Rc;
///
/// let transport = Rc::new(MockTransport::new());
/// transport.add_device("MC0001", true);
/// let device = device_find_all(transport.clone()).unwrap().remove(0);
///
/// {
///     let session = Session::new(device.clone()).unwrap();
///     session.gps_open().unwrap();
/// }
/// assert!(!device.gps_is_open().unwrap());
/// ```
#[derive(Debug)]
pub struct Session {
    device: Device,
}

impl Session {
    /// Takes over management of `device`.
    pub fn new(device: Device) -> Result<Self> {
        device.claim()?;
        debug!("Session started for {}", device.serial_number());
        Ok(Session { device })
    }

    /// The managed device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Serial number of the managed device.
    pub fn serial_number(&self) -> &str {
        self.device.serial_number()
    }

    /// Whether the managed device carries a GPS receiver.
    pub fn has_gps(&self) -> bool {
        self.device.has_gps()
    }

    /// Ends the session now. Equivalent to dropping it.
    pub fn close(self) {}

    // --- IO ---

    /// Opens the IO subsystem. See [`Device::io_open`].
    pub fn io_open(&self) -> Result<()> {
        self.device.io_open()
    }

    /// Closes the IO subsystem. Closing a closed subsystem succeeds.
    pub fn io_close(&self) -> Result<()> {
        self.device.io_close()
    }

    /// Whether the IO subsystem is open.
    pub fn io_is_open(&self) -> Result<bool> {
        self.device.io_is_open()
    }

    /// Reads the push button. IO must be open.
    pub fn io_button_is_pressed(&self) -> Result<bool> {
        self.device.io_button_is_pressed()
    }

    /// Switches the buzzer on or off. IO must be open.
    pub fn io_buzzer_enable(&self, enable: bool) -> Result<()> {
        self.device.io_buzzer_enable(enable)
    }

    /// Reads back the buzzer output. IO must be open.
    pub fn io_buzzer_is_enabled(&self) -> Result<bool> {
        self.device.io_buzzer_is_enabled()
    }

    /// Switches the GPS LED on or off. IO must be open.
    pub fn io_gps_led_enable(&self, enable: bool) -> Result<()> {
        self.device.io_gps_led_enable(enable)
    }

    /// Reads back the GPS LED output. IO must be open.
    pub fn io_gps_led_is_enabled(&self) -> Result<bool> {
        self.device.io_gps_led_is_enabled()
    }

    // --- GPS ---

    /// Opens the GPS subsystem. See [`Device::gps_open`].
    pub fn gps_open(&self) -> Result<()> {
        self.device.gps_open()
    }

    /// Closes the GPS subsystem. Closing a closed subsystem succeeds.
    pub fn gps_close(&self) -> Result<()> {
        self.device.gps_close()
    }

    /// Whether the GPS subsystem is open.
    pub fn gps_is_open(&self) -> Result<bool> {
        self.device.gps_is_open()
    }

    /// Whether the receiver reports a position fix. GPS must be open.
    pub fn gps_has_lock(&self) -> Result<bool> {
        self.device.gps_has_lock()
    }

    /// Reads a full fix snapshot. GPS must be open.
    pub fn gps_info(&self) -> Result<GpsFix> {
        self.device.gps_info()
    }

    // --- Audio ---

    /// Starts recording at `sample_rate` Hz. See [`Device::audio_start`].
    pub fn audio_start(&self, sample_rate: u32) -> Result<()> {
        self.device.audio_start(sample_rate)
    }

    /// Stops the active recording.
    pub fn audio_stop(&self) -> Result<()> {
        self.device.audio_stop()
    }

    /// Saves the stopped recording to `path`.
    pub fn audio_save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.device.audio_save(path)
    }

    /// Current recording state.
    pub fn audio_state(&self) -> Result<AudioState> {
        self.device.audio_state()
    }

    fn teardown(&self) {
        let serial = self.device.serial_number();
        if self.device.is_released() {
            debug!("Session for {} ended on a released handle", serial);
            return;
        }
        if self.device.audio_state().ok() == Some(AudioState::Recording) {
            if let Err(e) = self.device.audio_stop() {
                warn!("Session teardown: failed to stop audio on {}: {}", serial, e);
            }
        }
        if self.device.io_is_open().unwrap_or(false) {
            if let Err(e) = self.device.io_close() {
                warn!("Session teardown: failed to close {} on {}: {}", Subsystem::Io, serial, e);
            }
        }
        if self.device.has_gps() && self.device.gps_is_open().unwrap_or(false) {
            if let Err(e) = self.device.gps_close() {
                warn!("Session teardown: failed to close {} on {}: {}", Subsystem::Gps, serial, e);
            }
        }
        debug!("Session ended for {}", serial);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
        self.device.unclaim();
    }
}
