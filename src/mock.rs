//! In-memory transport and capture pipeline for exercising the session layer
//! without hardware.
//!
//! ```
//! use neovi_mic2::mock::MockTransport;
//! use neovi_mic2::{device_find_all, Session};
//! use std::rc::Rc;
//!
//! let transport = Rc::new(MockTransport::new());
//! transport.add_device("MC0001", true);
//!
//! let device = device_find_all(transport.clone()).unwrap().remove(0);
//! let session = Session::new(device).unwrap();
//! session.io_open().unwrap();
//! session.io_buzzer_enable(true).unwrap();
//! assert!(session.io_buzzer_is_enabled().unwrap());
//! ```

use crate::consts;
use crate::error::{Error, Result};
use crate::gps::{wire, GpsFix};
use crate::transport::{CapturePipeline, DeviceDescriptor, Subsystem, Transport};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
struct MockUnit {
    has_gps: bool,
    open: HashSet<Subsystem>,
    pins: u8,
    fix: GpsFix,
    report_reads: usize,
    fail_close: bool,
    fail_reports: bool,
}

/// A [`Transport`] backed by in-memory accessories.
///
/// Opening a subsystem twice at the transport level fails, like a real
/// exclusive USB interface.
#[derive(Debug, Default)]
pub struct MockTransport {
    order: RefCell<Vec<String>>,
    units: RefCell<HashMap<String, MockUnit>>,
    discover_calls: Cell<usize>,
}

fn broken_pipe(serial: &str) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("mock device {} disconnected", serial),
    ))
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an accessory. Adding an existing serial number reports it twice.
    pub fn add_device(&self, serial: &str, has_gps: bool) {
        self.order.borrow_mut().push(serial.to_string());
        self.units
            .borrow_mut()
            .entry(serial.to_string())
            .or_default()
            .has_gps |= has_gps;
    }

    /// Detaches an accessory. Later calls for it fail with [`Error::DeviceNotFound`].
    pub fn remove_device(&self, serial: &str) {
        self.order.borrow_mut().retain(|s| s != serial);
        self.units.borrow_mut().remove(serial);
    }

    /// Whether `subsystem` is currently held open at the transport level.
    pub fn is_open(&self, serial: &str, subsystem: Subsystem) -> bool {
        self.units
            .borrow()
            .get(serial)
            .is_some_and(|u| u.open.contains(&subsystem))
    }

    /// Simulates the push button.
    pub fn set_button(&self, serial: &str, pressed: bool) {
        self.with_unit(serial, |u| {
            if pressed {
                u.pins |= consts::io::BUTTON;
            } else {
                u.pins &= !consts::io::BUTTON;
            }
        });
    }

    /// Raw IO line state.
    pub fn pins(&self, serial: &str) -> u8 {
        self.units.borrow().get(serial).map_or(0, |u| u.pins)
    }

    /// Sets the fix reported by the GPS interface.
    pub fn set_fix(&self, serial: &str, fix: GpsFix) {
        self.with_unit(serial, |u| u.fix = fix);
    }

    /// Makes `close` fail for this accessory.
    pub fn fail_close(&self, serial: &str, fail: bool) {
        self.with_unit(serial, |u| u.fail_close = fail);
    }

    /// Makes report reads and writes fail for this accessory.
    pub fn fail_reports(&self, serial: &str, fail: bool) {
        self.with_unit(serial, |u| u.fail_reports = fail);
    }

    /// Number of `discover` calls so far.
    pub fn discover_calls(&self) -> usize {
        self.discover_calls.get()
    }

    /// Number of report reads and writes that reached this accessory.
    pub fn report_reads(&self, serial: &str) -> usize {
        self.units.borrow().get(serial).map_or(0, |u| u.report_reads)
    }

    fn with_unit<T>(&self, serial: &str, f: impl FnOnce(&mut MockUnit) -> T) -> Option<T> {
        self.units.borrow_mut().get_mut(serial).map(f)
    }

    fn with_open_unit<T>(
        &self,
        serial: &str,
        subsystem: Subsystem,
        report_id: u8,
        f: impl FnOnce(&mut MockUnit) -> Result<T>,
    ) -> Result<T> {
        let mut units = self.units.borrow_mut();
        let unit = units.get_mut(serial).ok_or_else(|| not_found(serial))?;
        unit.report_reads += 1;
        if unit.fail_reports {
            return Err(broken_pipe(serial));
        }
        if !unit.open.contains(&subsystem) {
            return Err(Error::FeatureReportError {
                report_id,
                subsystem,
            });
        }
        f(unit)
    }
}

fn not_found(serial: &str) -> Error {
    Error::DeviceNotFound {
        serial: serial.to_string(),
        message: "mock device not attached".to_string(),
    }
}

fn copy_report(report: &[u8], buf: &mut [u8]) -> usize {
    let len = report.len().min(buf.len());
    buf[..len].copy_from_slice(&report[..len]);
    len
}

impl Transport for MockTransport {
    fn discover(&self) -> Result<Vec<DeviceDescriptor>> {
        self.discover_calls.set(self.discover_calls.get() + 1);
        let units = self.units.borrow();
        Ok(self
            .order
            .borrow()
            .iter()
            .filter_map(|serial| {
                units.get(serial).map(|u| DeviceDescriptor {
                    serial_number: serial.clone(),
                    has_gps: u.has_gps,
                })
            })
            .collect())
    }

    fn open(&self, serial: &str, subsystem: Subsystem) -> Result<()> {
        let mut units = self.units.borrow_mut();
        let unit = units.get_mut(serial).ok_or_else(|| not_found(serial))?;
        if subsystem == Subsystem::Gps && !unit.has_gps {
            return Err(Error::UnsupportedFeature("mock device has no GPS".into()));
        }
        if !unit.open.insert(subsystem) {
            return Err(broken_pipe(serial));
        }
        Ok(())
    }

    fn close(&self, serial: &str, subsystem: Subsystem) -> Result<()> {
        let mut units = self.units.borrow_mut();
        let unit = units.get_mut(serial).ok_or_else(|| not_found(serial))?;
        if unit.fail_close {
            return Err(broken_pipe(serial));
        }
        unit.open.remove(&subsystem);
        Ok(())
    }

    fn read_report(
        &self,
        serial: &str,
        subsystem: Subsystem,
        report_id: u8,
        buf: &mut [u8],
    ) -> Result<usize> {
        self.with_open_unit(serial, subsystem, report_id, |unit| {
            let report = match (subsystem, report_id) {
                (Subsystem::Io, consts::io::REPORT_ID_PINS) => {
                    vec![consts::io::REPORT_ID_PINS, unit.pins]
                }
                (Subsystem::Gps, consts::gps::REPORT_ID_STATUS) => wire::encode_status(&unit.fix),
                (Subsystem::Gps, consts::gps::REPORT_ID_POSITION) => {
                    wire::encode_position(&unit.fix)
                }
                (Subsystem::Gps, consts::gps::REPORT_ID_METRICS) => wire::encode_metrics(&unit.fix),
                (Subsystem::Gps, consts::gps::REPORT_ID_SATELLITES_0) => {
                    wire::encode_satellites(&unit.fix, 0)
                }
                (Subsystem::Gps, consts::gps::REPORT_ID_SATELLITES_1) => {
                    wire::encode_satellites(&unit.fix, 1)
                }
                _ => {
                    return Err(Error::FeatureReportError {
                        report_id,
                        subsystem,
                    })
                }
            };
            Ok(copy_report(&report, buf))
        })
    }

    fn write_report(&self, serial: &str, subsystem: Subsystem, data: &[u8]) -> Result<()> {
        let report_id = data.first().copied().unwrap_or(0);
        self.with_open_unit(serial, subsystem, report_id, |unit| match data {
            [consts::io::REPORT_ID_PINS, mask, value] if subsystem == Subsystem::Io => {
                // The button is an input line
                let mask = mask & !consts::io::BUTTON;
                unit.pins = (unit.pins & !mask) | (value & mask);
                Ok(())
            }
            _ => Err(Error::FeatureReportError {
                report_id,
                subsystem,
            }),
        })
    }
}

#[derive(Debug, Default)]
struct MockRecorder {
    recording: bool,
    sample_rate: u32,
    saved: Vec<PathBuf>,
}

/// A [`CapturePipeline`] that records the calls made to it.
#[derive(Debug, Default)]
pub struct MockCapture {
    recorders: RefCell<HashMap<String, MockRecorder>>,
    fail_start: Cell<bool>,
}

impl MockCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `start` fail.
    pub fn fail_start(&self, fail: bool) {
        self.fail_start.set(fail);
    }

    /// Whether the pipeline is capturing for this accessory.
    pub fn is_recording(&self, serial: &str) -> bool {
        self.recorders
            .borrow()
            .get(serial)
            .is_some_and(|r| r.recording)
    }

    /// Sample rate of the last `start`.
    pub fn sample_rate(&self, serial: &str) -> Option<u32> {
        self.recorders.borrow().get(serial).map(|r| r.sample_rate)
    }

    /// Paths passed to `save`, oldest first.
    pub fn saved_paths(&self, serial: &str) -> Vec<PathBuf> {
        self.recorders
            .borrow()
            .get(serial)
            .map(|r| r.saved.clone())
            .unwrap_or_default()
    }
}

impl CapturePipeline for MockCapture {
    fn start(&self, serial: &str, sample_rate: u32) -> Result<()> {
        if self.fail_start.get() {
            return Err(Error::Capture("capture device unavailable".into()));
        }
        let mut recorders = self.recorders.borrow_mut();
        let recorder = recorders.entry(serial.to_string()).or_default();
        recorder.recording = true;
        recorder.sample_rate = sample_rate;
        Ok(())
    }

    fn stop(&self, serial: &str) -> Result<()> {
        let mut recorders = self.recorders.borrow_mut();
        let recorder = recorders
            .get_mut(serial)
            .ok_or_else(|| Error::Capture(format!("no capture for {}", serial)))?;
        recorder.recording = false;
        Ok(())
    }

    fn save(&self, serial: &str, path: &Path) -> Result<()> {
        let mut recorders = self.recorders.borrow_mut();
        let recorder = recorders
            .get_mut(serial)
            .ok_or_else(|| Error::Capture(format!("no capture for {}", serial)))?;
        recorder.saved.push(path.to_path_buf());
        Ok(())
    }
}
