use crate::transport::Subsystem;
use thiserror::Error;

/// Errors that can occur when using neoVI MIC2 devices.
///
/// Every variant folds into one of the two failure kinds that cross the C
/// boundary, see [`Error::kind`].
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the underlying HID API layer.
    #[error("HID API error: {0}")]
    Hid(#[from] hidapi::HidError),
    /// General I/O error during device communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// No accessory with the given serial number is known to the transport.
    #[error("Device not found with serial number '{serial}': {message}")]
    DeviceNotFound {
        /// The serial number that was searched for.
        serial: String,
        /// Additional error details.
        message: String,
    },
    /// Caller and library were built against different Device Handle layouts.
    #[error(
        "ABI mismatch: caller built against version {actual_version} (size {actual_size}), library is version {expected_version} (size {expected_size})"
    )]
    AbiMismatch {
        /// API version of this library.
        expected_version: u32,
        /// Device Handle struct size of this library.
        expected_size: u32,
        /// API version supplied by the caller.
        actual_version: u32,
        /// Device Handle struct size supplied by the caller.
        actual_size: u32,
    },
    /// The device handle was released and may no longer be used.
    #[error("Device handle for '{0}' has been released")]
    Released(String),
    /// Another session already manages this device.
    #[error("Device '{0}' is already managed by an active session")]
    DeviceBusy(String),
    /// Operation requires the subsystem to be open.
    #[error("{0} subsystem is not open")]
    SubsystemClosed(Subsystem),
    /// Open was requested for a subsystem that is already open.
    #[error("{0} subsystem is already open")]
    AlreadyOpen(Subsystem),
    /// Audio capture was started while a recording is in progress.
    #[error("Audio recording already in progress")]
    AlreadyRecording,
    /// Audio stop was requested while nothing is being recorded.
    #[error("Audio is not recording")]
    NotRecording,
    /// Audio save was requested before the recording was stopped.
    #[error("Audio recording still in progress, stop it before saving")]
    StillRecording,
    /// Audio save was requested but no capture exists.
    #[error("No audio capture available to save")]
    NothingCaptured,
    /// Failure reported by the external audio capture pipeline.
    #[error("Audio capture error: {0}")]
    Capture(String),
    /// Invalid or malformed report received from the device.
    #[error("Invalid report 0x{report_id:02X} received or unexpected size ({len} bytes)")]
    InvalidReport {
        /// Report ID that was requested.
        report_id: u8,
        /// Number of bytes actually received.
        len: usize,
    },
    /// Feature report exchange with the device failed.
    #[error("Feature report error while accessing report 0x{report_id:02X} on the {subsystem} interface")]
    FeatureReportError {
        /// The report ID that was being accessed.
        report_id: u8,
        /// The subsystem interface used.
        subsystem: Subsystem,
    },
    /// Function argument is outside the valid range.
    #[error("Argument out of range: {0}")]
    ArgumentOutOfRange(String),
    /// Provided buffer is smaller than required for the operation.
    #[error("Provided buffer is too small (expected at least {expected}, got {actual})")]
    BufferTooSmall {
        /// Minimum required buffer size.
        expected: usize,
        /// Actual buffer size provided.
        actual: usize,
    },
    /// Feature is not supported by this device.
    #[error("Feature not supported by this device: {0}")]
    UnsupportedFeature(String),
}

/// Result type alias for neoVI MIC2 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The failure classes visible at the library boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Low-level, transport, decode or state failure.
    Failure,
    /// Contract violation by the caller: absent argument, out of range
    /// value, ABI mismatch or use of a released handle.
    InvalidParameter,
}

impl Error {
    /// Folds this error into the boundary taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AbiMismatch { .. }
            | Error::Released(_)
            | Error::ArgumentOutOfRange(_)
            | Error::BufferTooSmall { .. } => ErrorKind::InvalidParameter,
            _ => ErrorKind::Failure,
        }
    }

    /// Boundary code for this error.
    pub fn code(&self) -> ErrorCode {
        self.kind().into()
    }
}

/// Result discriminant crossing the C boundary.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Function was successful.
    Success = 0,
    /// Function failed.
    Failure = 1,
    /// Function failed due to an invalid parameter.
    InvalidParameter = 2,
}

impl ErrorCode {
    /// Human readable name used by `mic2_error_string`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::Failure => "Failure",
            ErrorCode::InvalidParameter => "Invalid Parameter",
        }
    }

    /// Decodes a raw code, `None` for values outside the closed set.
    pub fn from_raw(code: u32) -> Option<Self> {
        match code {
            0 => Some(ErrorCode::Success),
            1 => Some(ErrorCode::Failure),
            2 => Some(ErrorCode::InvalidParameter),
            _ => None,
        }
    }
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Failure => ErrorCode::Failure,
            ErrorKind::InvalidParameter => ErrorCode::InvalidParameter,
        }
    }
}

impl<T> From<&Result<T>> for ErrorCode {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => ErrorCode::Success,
            Err(e) => e.code(),
        }
    }
}

// Helpers for creating specific errors
pub(crate) fn unsupported_gps(serial: &str) -> Error {
    Error::UnsupportedFeature(format!("device '{}' has no GPS receiver", serial))
}
pub(crate) fn no_capture_pipeline(serial: &str) -> Error {
    Error::UnsupportedFeature(format!(
        "no audio capture pipeline attached to device '{}'",
        serial
    ))
}
