//! Device discovery and the Device Handle.

use crate::audio::AudioState;
use crate::consts;
use crate::error::{Error, Result};
use crate::ffi::Mic2Device;
use crate::transport::{CapturePipeline, DeviceDescriptor, Subsystem, Transport};
use log::{debug, trace, warn};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Open/closed state of the IO or GPS subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubsystemState {
    #[default]
    Closed,
    Open,
}

/// Layout fingerprint exchanged at enumeration time.
///
/// A caller built against a different API version or Device Handle layout
/// is rejected before any device memory is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbiFingerprint {
    /// API version the caller was built against.
    pub version: u32,
    /// `size_of` the C Device Handle struct in the caller's build.
    pub size: u32,
}

impl AbiFingerprint {
    /// Fingerprint of this build of the library.
    pub fn current() -> Self {
        AbiFingerprint {
            version: consts::MIC2_API_VERSION,
            size: std::mem::size_of::<Mic2Device>() as u32,
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        let own = Self::current();
        if *self != own {
            warn!(
                "Rejecting enumeration: caller ABI {:?} does not match library ABI {:?}",
                self, own
            );
            return Err(Error::AbiMismatch {
                expected_version: own.version,
                expected_size: own.size,
                actual_version: self.version,
                actual_size: self.size,
            });
        }
        Ok(())
    }
}

/// Discovers attached accessories and produces Device Handles.
pub struct Enumerator {
    transport: Rc<dyn Transport>,
    capture: Option<Rc<dyn CapturePipeline>>,
}

impl Enumerator {
    /// Creates an enumerator over `transport`. Devices it produces have no
    /// audio pipeline unless one is attached with [`Enumerator::with_capture`].
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Enumerator {
            transport,
            capture: None,
        }
    }

    /// Attaches the audio capture pipeline handed to every discovered device.
    pub fn with_capture(mut self, capture: Rc<dyn CapturePipeline>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Enumerates at most `capacity` devices.
    ///
    /// Fails with [`Error::AbiMismatch`] when `abi` differs from
    /// [`AbiFingerprint::current`]. Finding no device is not an error. When
    /// more devices are attached than `capacity`, the list is truncated.
    /// Results are ordered by serial number and every subsystem starts closed.
    pub fn enumerate(&self, capacity: usize, abi: AbiFingerprint) -> Result<Vec<Device>> {
        abi.check()?;
        let mut descriptors = self.discover()?;
        if descriptors.len() > capacity {
            debug!(
                "Found {} MIC2 devices, truncating to capacity {}",
                descriptors.len(),
                capacity
            );
            descriptors.truncate(capacity);
        }
        Ok(descriptors
            .into_iter()
            .map(|descriptor| self.make_device(descriptor))
            .collect())
    }

    /// Enumerates every attached device using this build's fingerprint.
    pub fn find_all(&self) -> Result<Vec<Device>> {
        self.enumerate(usize::MAX, AbiFingerprint::current())
    }

    /// Returns the device with the given serial number.
    pub fn find_by_serial(&self, serial: &str) -> Result<Device> {
        self.find_all()?
            .into_iter()
            .find(|d| d.serial_number() == serial)
            .ok_or_else(|| Error::DeviceNotFound {
                serial: serial.to_string(),
                message: "No MIC2 device found with this serial number".to_string(),
            })
    }

    // Merges descriptors reported more than once and sorts them by serial number.
    fn discover(&self) -> Result<Vec<DeviceDescriptor>> {
        let mut by_serial: HashMap<String, DeviceDescriptor> = HashMap::new();
        for descriptor in self.transport.discover()? {
            if descriptor.serial_number.is_empty() {
                warn!("Skipping MIC2 device without serial number");
                continue;
            }
            debug!(
                "Found MIC2 device: SN={}, GPS={}",
                descriptor.serial_number, descriptor.has_gps
            );
            by_serial
                .entry(descriptor.serial_number.clone())
                .and_modify(|d| d.has_gps |= descriptor.has_gps)
                .or_insert(descriptor);
        }
        let mut descriptors: Vec<DeviceDescriptor> = by_serial.into_values().collect();
        descriptors.sort_by(|a, b| a.serial_number.cmp(&b.serial_number));
        Ok(descriptors)
    }

    // A unit that is still alive on this transport is handed out again, so
    // every handle to it shares one claim and one set of subsystem states.
    fn make_device(&self, descriptor: DeviceDescriptor) -> Device {
        let key = (transport_key(&self.transport), descriptor.serial_number.clone());
        LIVE_DEVICES.with(|live| {
            let mut live = live.borrow_mut();
            if let Some(inner) = live.get(&key).and_then(Weak::upgrade) {
                if !inner.released.get() {
                    trace!("Reusing live handle for {}", key.1);
                    return Device { inner };
                }
            }
            live.retain(|_, weak| weak.strong_count() > 0);
            let inner = Rc::new(DeviceInner {
                descriptor,
                transport: Rc::clone(&self.transport),
                capture: self.capture.clone(),
                io: Cell::new(SubsystemState::Closed),
                gps: Cell::new(SubsystemState::Closed),
                audio: Cell::new(AudioState::Idle),
                released: Cell::new(false),
                claimed: Cell::new(false),
            });
            live.insert(key, Rc::downgrade(&inner));
            Device { inner }
        })
    }
}

// Live devices, keyed by transport identity and serial number.
thread_local! {
    static LIVE_DEVICES: RefCell<HashMap<(usize, String), Weak<DeviceInner>>> =
        RefCell::new(HashMap::new());
}

// A live device keeps its transport alive, so the address cannot be reused
// while an entry for it can still be upgraded.
fn transport_key(transport: &Rc<dyn Transport>) -> usize {
    Rc::as_ptr(transport) as *const () as usize
}

/// Finds all MIC2 devices on `transport`.
pub fn device_find_all(transport: Rc<dyn Transport>) -> Result<Vec<Device>> {
    Enumerator::new(transport).find_all()
}

pub(crate) struct DeviceInner {
    pub(crate) descriptor: DeviceDescriptor,
    pub(crate) transport: Rc<dyn Transport>,
    pub(crate) capture: Option<Rc<dyn CapturePipeline>>,
    pub(crate) io: Cell<SubsystemState>,
    pub(crate) gps: Cell<SubsystemState>,
    pub(crate) audio: Cell<AudioState>,
    released: Cell<bool>,
    claimed: Cell<bool>,
}

impl DeviceInner {
    // Audio follows its own recording state machine
    fn state_cell(&self, subsystem: Subsystem) -> Option<&Cell<SubsystemState>> {
        match subsystem {
            Subsystem::Io => Some(&self.io),
            Subsystem::Gps => Some(&self.gps),
            Subsystem::Audio => None,
        }
    }

    // Closes whatever is still open. Failures are logged, never propagated.
    fn shutdown(&self) {
        let serial = &self.descriptor.serial_number;
        if self.audio.get() == AudioState::Recording {
            if let Some(capture) = &self.capture {
                if let Err(e) = capture.stop(serial) {
                    warn!("Failed to stop audio capture on {}: {}", serial, e);
                }
            }
            self.audio.set(AudioState::Captured);
        }
        for (subsystem, state) in [(Subsystem::Io, &self.io), (Subsystem::Gps, &self.gps)] {
            if state.get() == SubsystemState::Open {
                match self.transport.close(serial, subsystem) {
                    Ok(()) => {
                        debug!("Closed {} on {} during teardown", subsystem, serial);
                        state.set(SubsystemState::Closed);
                    }
                    Err(e) => warn!("Failed to close {} on {}: {}", subsystem, serial, e),
                }
            }
        }
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        if !self.released.get() {
            self.shutdown();
        }
    }
}

/// A handle to one discovered neoVI MIC2 accessory.
///
/// Clones share the same identity and subsystem state, and so do handles
/// returned by a later enumeration on the same transport while this one is
/// still alive. The handle stays
/// valid until [`Device::release`]; every operation afterwards fails with
/// [`Error::Released`]. Subsystems still open when the last clone is dropped
/// are closed.
///
/// **Note:** This handle is not thread-safe (`!Send`, `!Sync`). Calls on one
/// device must be serialized by the caller.
#[derive(Clone)]
pub struct Device {
    pub(crate) inner: Rc<DeviceInner>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("serial_number", &self.inner.descriptor.serial_number)
            .field("has_gps", &self.inner.descriptor.has_gps)
            .field("io", &self.inner.io.get())
            .field("gps", &self.inner.gps.get())
            .field("audio", &self.inner.audio.get())
            .field("released", &self.inner.released.get())
            .finish()
    }
}

impl Device {
    /// Serial number of the accessory ("MCxxxx").
    pub fn serial_number(&self) -> &str {
        &self.inner.descriptor.serial_number
    }

    /// Whether the accessory carries a GPS receiver.
    pub fn has_gps(&self) -> bool {
        self.inner.descriptor.has_gps
    }

    /// Identity record this handle was created from.
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.inner.descriptor
    }

    /// Whether [`Device::release`] has been called on this handle or a clone.
    pub fn is_released(&self) -> bool {
        self.inner.released.get()
    }

    /// Returns `true` when both handles refer to the same enumerated device.
    pub fn same_device(&self, other: &Device) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Closes any open subsystem and invalidates the handle and its clones.
    /// Releasing twice is a no-op.
    pub fn release(&self) {
        if self.inner.released.get() {
            return;
        }
        debug!("Releasing MIC2 device {}", self.serial_number());
        self.inner.shutdown();
        self.inner.released.set(true);
    }

    // --- State helpers shared by the subsystem modules ---

    pub(crate) fn ensure_valid(&self) -> Result<()> {
        if self.inner.released.get() {
            return Err(Error::Released(self.serial_number().to_string()));
        }
        Ok(())
    }

    fn state_cell(&self, subsystem: Subsystem) -> Result<&Cell<SubsystemState>> {
        self.ensure_valid()?;
        self.inner.state_cell(subsystem).ok_or_else(|| {
            Error::UnsupportedFeature(format!("{} has no open/close state", subsystem))
        })
    }

    pub(crate) fn subsystem_state(&self, subsystem: Subsystem) -> Result<SubsystemState> {
        Ok(self.state_cell(subsystem)?.get())
    }

    pub(crate) fn require_open(&self, subsystem: Subsystem) -> Result<()> {
        match self.subsystem_state(subsystem)? {
            SubsystemState::Open => Ok(()),
            SubsystemState::Closed => Err(Error::SubsystemClosed(subsystem)),
        }
    }

    pub(crate) fn open_subsystem(&self, subsystem: Subsystem) -> Result<()> {
        let state = self.state_cell(subsystem)?;
        if state.get() == SubsystemState::Open {
            return Err(Error::AlreadyOpen(subsystem));
        }
        self.inner.transport.open(self.serial_number(), subsystem)?;
        state.set(SubsystemState::Open);
        debug!("Opened {} on {}", subsystem, self.serial_number());
        Ok(())
    }

    pub(crate) fn close_subsystem(&self, subsystem: Subsystem) -> Result<()> {
        let state = self.state_cell(subsystem)?;
        if state.get() == SubsystemState::Closed {
            trace!("{} on {} already closed", subsystem, self.serial_number());
            return Ok(());
        }
        self.inner.transport.close(self.serial_number(), subsystem)?;
        state.set(SubsystemState::Closed);
        debug!("Closed {} on {}", subsystem, self.serial_number());
        Ok(())
    }

    // --- Report Access ---
    // Reads a fixed size report and validates its ID and length.
    pub(crate) fn read_report(
        &self,
        subsystem: Subsystem,
        report_id: u8,
        buf: &mut [u8],
    ) -> Result<()> {
        buf.fill(0);
        buf[0] = report_id;
        trace!("Reading report 0x{:02X} from {}", report_id, subsystem);
        let len = self
            .inner
            .transport
            .read_report(self.serial_number(), subsystem, report_id, buf)?;
        if len != buf.len() {
            warn!(
                "read_report returned unexpected length: {} (expected {})",
                len,
                buf.len()
            );
            return Err(Error::InvalidReport { report_id, len });
        }
        if buf[0] != report_id {
            warn!("read_report returned unexpected report ID: {:02X}", buf[0]);
            return Err(Error::InvalidReport { report_id, len });
        }
        trace!("Report 0x{:02X}: {:02X?}", report_id, buf);
        Ok(())
    }

    pub(crate) fn write_report(&self, subsystem: Subsystem, data: &[u8]) -> Result<()> {
        trace!("Writing report to {}: {:02X?}", subsystem, data);
        self.inner
            .transport
            .write_report(self.serial_number(), subsystem, data)
    }

    // --- Session claim ---

    pub(crate) fn claim(&self) -> Result<()> {
        self.ensure_valid()?;
        if self.inner.claimed.get() {
            return Err(Error::DeviceBusy(self.serial_number().to_string()));
        }
        self.inner.claimed.set(true);
        Ok(())
    }

    pub(crate) fn unclaim(&self) {
        self.inner.claimed.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn transport_with(serials: &[(&str, bool)]) -> Rc<MockTransport> {
        let transport = Rc::new(MockTransport::new());
        for (serial, gps) in serials {
            transport.add_device(serial, *gps);
        }
        transport
    }

    #[test]
    fn test_enumerate_orders_by_serial() {
        let transport = transport_with(&[("MC0003", true), ("MC0001", false), ("MC0002", true)]);
        let devices = device_find_all(transport).unwrap();
        let serials: Vec<&str> = devices.iter().map(|d| d.serial_number()).collect();
        assert_eq!(serials, vec!["MC0001", "MC0002", "MC0003"]);
        assert!(!devices[0].has_gps());
        assert!(devices[1].has_gps());
    }

    #[test]
    fn test_enumerate_truncates_to_capacity() {
        let transport = transport_with(&[("MC0001", true), ("MC0002", true), ("MC0003", true)]);
        let devices = Enumerator::new(transport)
            .enumerate(2, AbiFingerprint::current())
            .unwrap();
        assert_eq!(devices.len(), 2);
    }

    #[test]
    fn test_enumerate_zero_capacity() {
        let transport = transport_with(&[("MC0001", true)]);
        let devices = Enumerator::new(transport)
            .enumerate(0, AbiFingerprint::current())
            .unwrap();
        assert!(devices.is_empty());
    }

    #[test]
    fn test_abi_mismatch_skips_discovery() {
        let transport = transport_with(&[("MC0001", true)]);
        let bad = AbiFingerprint {
            size: AbiFingerprint::current().size + 8,
            ..AbiFingerprint::current()
        };
        let result = Enumerator::new(transport.clone()).enumerate(10, bad);
        assert!(matches!(result, Err(Error::AbiMismatch { .. })));
        assert_eq!(transport.discover_calls(), 0);
    }

    #[test]
    fn test_duplicate_descriptors_are_merged() {
        let transport = transport_with(&[("MC0001", false), ("MC0001", true), ("", true)]);
        let devices = device_find_all(transport).unwrap();
        assert_eq!(devices.len(), 1);
        assert!(devices[0].has_gps());
    }

    #[test]
    fn test_release_invalidates_clones() {
        let transport = transport_with(&[("MC0001", true)]);
        let device = device_find_all(transport).unwrap().remove(0);
        let copy = device.clone();
        device.release();
        assert!(copy.is_released());
        assert!(matches!(copy.ensure_valid(), Err(Error::Released(_))));
        device.release();
    }

    #[test]
    fn test_reenumeration_shares_live_state() {
        let transport = transport_with(&[("MC0001", true)]);
        let first = device_find_all(transport.clone()).unwrap().remove(0);
        first.open_subsystem(Subsystem::Io).unwrap();

        let second = device_find_all(transport.clone()).unwrap().remove(0);
        assert!(first.same_device(&second));
        assert_eq!(
            second.subsystem_state(Subsystem::Io).unwrap(),
            SubsystemState::Open
        );
        first.claim().unwrap();
        assert!(matches!(second.claim(), Err(Error::DeviceBusy(_))));
    }

    #[test]
    fn test_reenumeration_after_release_is_fresh() {
        let transport = transport_with(&[("MC0001", true)]);
        let first = device_find_all(transport.clone()).unwrap().remove(0);
        first.release();
        let second = device_find_all(transport.clone()).unwrap().remove(0);
        assert!(!second.same_device(&first));
        assert!(second.ensure_valid().is_ok());
    }

    #[test]
    fn test_separate_transports_do_not_share_devices() {
        let a = device_find_all(transport_with(&[("MC0001", true)])).unwrap().remove(0);
        let b = device_find_all(transport_with(&[("MC0001", true)])).unwrap().remove(0);
        assert!(!a.same_device(&b));
    }

    #[test]
    fn test_drop_closes_open_subsystems() {
        let transport = transport_with(&[("MC0001", true)]);
        let device = device_find_all(transport.clone()).unwrap().remove(0);
        device.open_subsystem(Subsystem::Io).unwrap();
        assert!(transport.is_open("MC0001", Subsystem::Io));
        drop(device);
        assert!(!transport.is_open("MC0001", Subsystem::Io));
    }
}
