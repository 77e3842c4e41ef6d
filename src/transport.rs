//! Interfaces to the external collaborators the session layer drives: the
//! USB transport (discovery and report exchange) and the audio capture pipeline.

use crate::error::Result;
use std::fmt;
use std::path::Path;

/// One independently open/closable function of the accessory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// Button, buzzer and GPS status LED.
    Io,
    /// GPS receiver.
    Gps,
    /// Audio capture path.
    Audio,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subsystem::Io => write!(f, "IO"),
            Subsystem::Gps => write!(f, "GPS"),
            Subsystem::Audio => write!(f, "Audio"),
        }
    }
}

/// Raw accessory description produced by a transport's discovery primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Serial number, unique per physical unit ("MCxxxx").
    pub serial_number: String,
    /// Whether the unit carries a GPS receiver.
    pub has_gps: bool,
}

/// Request/response access to the accessory, keyed by serial number and subsystem.
///
/// Implementations are driven synchronously from the caller's thread. The
/// session layer tracks open/closed state itself and only calls `read_report`
/// and `write_report` for subsystems it has opened.
pub trait Transport {
    /// Lists the accessories currently attached.
    fn discover(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Acquires the transport resource backing `subsystem` on the given unit.
    fn open(&self, serial: &str, subsystem: Subsystem) -> Result<()>;

    /// Releases the transport resource backing `subsystem` on the given unit.
    fn close(&self, serial: &str, subsystem: Subsystem) -> Result<()>;

    /// Reads report `report_id` into `buf`. `buf[0]` receives the report ID.
    /// Returns the number of bytes read.
    fn read_report(
        &self,
        serial: &str,
        subsystem: Subsystem,
        report_id: u8,
        buf: &mut [u8],
    ) -> Result<usize>;

    /// Writes a report. `data[0]` is the report ID.
    fn write_report(&self, serial: &str, subsystem: Subsystem, data: &[u8]) -> Result<()>;
}

/// External audio capture pipeline attached to the accessory's audio interface.
pub trait CapturePipeline {
    /// Starts capturing at `sample_rate` Hz.
    fn start(&self, serial: &str, sample_rate: u32) -> Result<()>;

    /// Stops the capture, keeping the recorded buffer.
    fn stop(&self, serial: &str) -> Result<()>;

    /// Writes the recorded buffer to `path`. The extension selects the format.
    fn save(&self, serial: &str, path: &Path) -> Result<()>;
}
