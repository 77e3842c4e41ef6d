//! USB HID backend built on `hidapi`.
//!
//! Each MIC2 unit enumerates as up to two HID interfaces sharing one serial
//! number: the IO interface (button, buzzer, LED) and, on GPS-equipped units,
//! the GPS interface. Both are driven with feature reports.

use crate::consts;
use crate::error::{Error, Result};
use crate::transport::{DeviceDescriptor, Subsystem, Transport};
use hidapi::{HidApi, HidDevice};
use log::{debug, trace, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CString;

/// USB identifiers used to recognize MIC2 interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidTransportConfig {
    pub vid: u16,
    pub io_pid: u16,
    pub gps_pid: u16,
    /// Interfaces whose serial number lacks this prefix are ignored.
    pub serial_prefix: String,
}

impl Default for HidTransportConfig {
    fn default() -> Self {
        HidTransportConfig {
            vid: consts::MIC2_VID,
            io_pid: consts::MIC2_IO_PID,
            gps_pid: consts::MIC2_GPS_PID,
            serial_prefix: consts::MIC2_SERIAL_PREFIX.to_string(),
        }
    }
}

// Platform paths of the interfaces of one physical unit.
#[derive(Debug, Default, Clone)]
struct InterfacePaths {
    io: Option<CString>,
    gps: Option<CString>,
}

impl InterfacePaths {
    fn get(&self, subsystem: Subsystem) -> Option<&CString> {
        match subsystem {
            Subsystem::Io => self.io.as_ref(),
            Subsystem::Gps => self.gps.as_ref(),
            Subsystem::Audio => None,
        }
    }
}

/// [`Transport`] over the system HID stack.
///
/// **Note:** Like the handles it serves, this type is not thread-safe.
pub struct HidTransport {
    api: RefCell<HidApi>,
    config: HidTransportConfig,
    paths: RefCell<HashMap<String, InterfacePaths>>,
    open: RefCell<HashMap<(String, Subsystem), HidDevice>>,
}

impl HidTransport {
    /// Creates a transport with the default MIC2 identifiers.
    pub fn new() -> Result<Self> {
        Self::with_config(HidTransportConfig::default())
    }

    pub fn with_config(config: HidTransportConfig) -> Result<Self> {
        let api = HidApi::new()?;
        Ok(Self::from_api(api, config))
    }

    /// Wraps an existing `HidApi` context.
    pub fn from_api(api: HidApi, config: HidTransportConfig) -> Self {
        HidTransport {
            api: RefCell::new(api),
            config,
            paths: RefCell::new(HashMap::new()),
            open: RefCell::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &HidTransportConfig {
        &self.config
    }

    fn path_for(&self, serial: &str, subsystem: Subsystem) -> Result<CString> {
        if self.paths.borrow().get(serial).is_none() {
            // Handles may outlive the enumeration that produced them
            self.discover()?;
        }
        self.paths
            .borrow()
            .get(serial)
            .and_then(|p| p.get(subsystem))
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound {
                serial: serial.to_string(),
                message: format!("no {} interface present", subsystem),
            })
    }

    fn with_open<T>(
        &self,
        serial: &str,
        subsystem: Subsystem,
        report_id: u8,
        f: impl FnOnce(&HidDevice) -> hidapi::HidResult<T>,
    ) -> Result<T> {
        let open = self.open.borrow();
        let device = open
            .get(&(serial.to_string(), subsystem))
            .ok_or(Error::FeatureReportError {
                report_id,
                subsystem,
            })?;
        f(device).map_err(|e| {
            trace!("Feature report 0x{:02X} error: {}", report_id, e);
            Error::FeatureReportError {
                report_id,
                subsystem,
            }
        })
    }
}

impl Transport for HidTransport {
    fn discover(&self) -> Result<Vec<DeviceDescriptor>> {
        let mut api = self.api.borrow_mut();
        api.refresh_devices()?;

        let mut found: HashMap<String, InterfacePaths> = HashMap::new();
        for info in api.device_list() {
            if info.vendor_id() != self.config.vid {
                continue;
            }
            let pid = info.product_id();
            if pid != self.config.io_pid && pid != self.config.gps_pid {
                continue;
            }
            let serial = match info.serial_number() {
                Some(s) if s.starts_with(&self.config.serial_prefix) => s.to_string(),
                other => {
                    trace!("Ignoring interface with serial {:?}", other);
                    continue;
                }
            };
            debug!(
                "Found MIC2 interface: VID={:04X}, PID={:04X}, SN={}, Path={:?}",
                info.vendor_id(),
                pid,
                serial,
                info.path()
            );
            let entry = found.entry(serial).or_default();
            if pid == self.config.io_pid {
                entry.io = Some(info.path().to_owned());
            } else {
                entry.gps = Some(info.path().to_owned());
            }
        }

        let mut descriptors = Vec::with_capacity(found.len());
        for (serial, paths) in &found {
            if paths.io.is_none() {
                warn!("MIC2 {} has no IO interface, skipping", serial);
                continue;
            }
            descriptors.push(DeviceDescriptor {
                serial_number: serial.clone(),
                has_gps: paths.gps.is_some(),
            });
        }
        descriptors.sort_by(|a, b| a.serial_number.cmp(&b.serial_number));
        *self.paths.borrow_mut() = found;
        Ok(descriptors)
    }

    fn open(&self, serial: &str, subsystem: Subsystem) -> Result<()> {
        if subsystem == Subsystem::Audio {
            return Err(Error::UnsupportedFeature(
                "audio is captured outside the HID transport".into(),
            ));
        }
        let key = (serial.to_string(), subsystem);
        if self.open.borrow().contains_key(&key) {
            return Err(Error::AlreadyOpen(subsystem));
        }
        let path = self.path_for(serial, subsystem)?;
        let device = self
            .api
            .borrow()
            .open_path(&path)
            .map_err(|e| Error::DeviceNotFound {
                serial: serial.to_string(),
                message: format!("Failed to open {} interface: {}", subsystem, e),
            })?;
        debug!("Opened {} interface of {} ({:?})", subsystem, serial, path);
        self.open.borrow_mut().insert(key, device);
        Ok(())
    }

    fn close(&self, serial: &str, subsystem: Subsystem) -> Result<()> {
        // Dropping the HidDevice closes the OS handle
        if self
            .open
            .borrow_mut()
            .remove(&(serial.to_string(), subsystem))
            .is_some()
        {
            debug!("Closed {} interface of {}", subsystem, serial);
        }
        Ok(())
    }

    fn read_report(
        &self,
        serial: &str,
        subsystem: Subsystem,
        report_id: u8,
        buf: &mut [u8],
    ) -> Result<usize> {
        buf[0] = report_id;
        self.with_open(serial, subsystem, report_id, |device| {
            device.get_feature_report(buf)
        })
    }

    fn write_report(&self, serial: &str, subsystem: Subsystem, data: &[u8]) -> Result<()> {
        let report_id = data.first().copied().unwrap_or(0);
        self.with_open(serial, subsystem, report_id, |device| {
            device.send_feature_report(data)
        })
    }
}
