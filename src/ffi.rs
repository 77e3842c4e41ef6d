//! C ABI.
//!
//! Every function returns an [`ErrorCode`]. Null pointers and stale handles
//! yield `InvalidParameter`. Results are written through out-parameters,
//! which are reset to a neutral value before the operation runs.
//!
//! Device handles live in a per-thread registry: a handle is valid on the
//! thread that called [`mic2_find`] until it is passed to [`mic2_free`].
//! Copies of a [`Mic2Device`] share the handle; after `mic2_free` every copy
//! is rejected with `InvalidParameter`.

use crate::consts::{MAX_SATELLITES, MIC2_API_VERSION, SERIAL_NUMBER_LEN};
use crate::device::{AbiFingerprint, Device, Enumerator};
use crate::error::{ErrorCode, Result};
use crate::gps::{GpsFix, NavigationStatus};
use crate::hid::HidTransport;
use crate::transport::{CapturePipeline, Transport};
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::rc::Rc;

/// C view of one enumerated accessory.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Mic2Device {
    /// API version, set to `MIC2_API_VERSION` by `mic2_find`.
    pub version: u32,
    /// `sizeof(Mic2Device)` of the library.
    pub size: u32,
    /// NUL terminated serial number ("MCxxxx").
    pub serial_number: [c_char; SERIAL_NUMBER_LEN],
    pub has_gps: bool,
    /// Opaque handle. Null after `mic2_free`.
    pub handle: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Mic2GpsDms {
    pub degrees: u16,
    pub minutes: u8,
    pub seconds: u8,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Mic2GpsSatInfo {
    pub prn: u16,
    /// Used in the navigation solution.
    pub used: bool,
    /// 0..=359 degrees, only meaningful when `azimuth_valid`.
    pub azimuth: u16,
    pub azimuth_valid: bool,
    /// 0..=90 degrees, only meaningful when `elevation_valid`.
    pub elevation: u16,
    pub elevation_valid: bool,
    /// Signal strength, only meaningful when `snr_valid`.
    pub snr: u8,
    pub snr_valid: bool,
    /// Carrier lock time (s), 64 means 64 s or more.
    pub lock_time: u8,
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mic2NavStatus {
    NoFix = 0,
    DeadReckoningOnly,
    StandAlone2D,
    StandAlone3D,
    Differential2D,
    Differential3D,
    CombinedGpsDeadReckoning,
    TimeOnly,
}

impl From<NavigationStatus> for Mic2NavStatus {
    fn from(status: NavigationStatus) -> Self {
        match status {
            NavigationStatus::NoFix => Mic2NavStatus::NoFix,
            NavigationStatus::DeadReckoningOnly => Mic2NavStatus::DeadReckoningOnly,
            NavigationStatus::StandAlone2D => Mic2NavStatus::StandAlone2D,
            NavigationStatus::StandAlone3D => Mic2NavStatus::StandAlone3D,
            NavigationStatus::Differential2D => Mic2NavStatus::Differential2D,
            NavigationStatus::Differential3D => Mic2NavStatus::Differential3D,
            NavigationStatus::CombinedGpsDeadReckoning => Mic2NavStatus::CombinedGpsDeadReckoning,
            NavigationStatus::TimeOnly => Mic2NavStatus::TimeOnly,
        }
    }
}

/// C view of a GPS fix. Unavailable metrics are `-1.0`, an unknown time is
/// 0 and the direction of an invalid coordinate is `'\0'`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Mic2GpsInfo {
    /// Unix timestamp (UTC).
    pub current_time: i64,
    pub latitude: Mic2GpsDms,
    pub latitude_valid: bool,
    /// 'N' or 'S'.
    pub latitude_direction: c_char,
    pub longitude: Mic2GpsDms,
    pub longitude_valid: bool,
    /// 'E' or 'W'.
    pub longitude_direction: c_char,
    /// Altitude (m).
    pub altitude: f64,
    pub nav_stat: Mic2NavStatus,
    pub h_acc: f64,
    pub v_acc: f64,
    /// Speed over ground (km/h).
    pub sog_kmh: f64,
    /// Course over ground (degrees).
    pub cog: f64,
    /// Vertical velocity, positive downward (m/s).
    pub vvel: f64,
    /// Age of differential corrections (s).
    pub age_c: f64,
    pub hdop: f64,
    pub vdop: f64,
    pub tdop: f64,
    /// Only the first `satellites_count` entries are populated.
    pub satellites: [Mic2GpsSatInfo; MAX_SATELLITES],
    pub satellites_count: u8,
    /// Receiver clock bias (ns).
    pub clock_bias: f64,
    /// Receiver clock drift (ns/s).
    pub clock_drift: f64,
    /// Timepulse quantization error (ns).
    pub timepulse_granularity: f64,
}

const INVALID_METRIC: f64 = -1.0;

impl From<&GpsFix> for Mic2GpsInfo {
    fn from(fix: &GpsFix) -> Self {
        let metric = |m: Option<f64>| m.unwrap_or(INVALID_METRIC);
        let dms = |c: &crate::gps::Coordinate| {
            if c.valid {
                Mic2GpsDms {
                    degrees: c.dms.degrees,
                    minutes: c.dms.minutes,
                    seconds: c.dms.seconds,
                }
            } else {
                Mic2GpsDms::default()
            }
        };
        let direction = |c: &crate::gps::Coordinate| {
            if c.valid {
                c.hemisphere.as_char() as c_char
            } else {
                0
            }
        };
        let mut satellites = [Mic2GpsSatInfo::default(); MAX_SATELLITES];
        for (slot, sat) in satellites.iter_mut().zip(&fix.satellites) {
            *slot = Mic2GpsSatInfo {
                prn: sat.prn,
                used: sat.used,
                azimuth: sat.azimuth.unwrap_or(0),
                azimuth_valid: sat.azimuth.is_some(),
                elevation: sat.elevation.map_or(0, u16::from),
                elevation_valid: sat.elevation.is_some(),
                snr: sat.snr.unwrap_or(0),
                snr_valid: sat.snr.is_some(),
                lock_time: sat.lock_time,
            };
        }
        Mic2GpsInfo {
            current_time: fix.timestamp.map_or(0, |t| t.timestamp()),
            latitude: dms(&fix.latitude),
            latitude_valid: fix.latitude.valid,
            latitude_direction: direction(&fix.latitude),
            longitude: dms(&fix.longitude),
            longitude_valid: fix.longitude.valid,
            longitude_direction: direction(&fix.longitude),
            altitude: metric(fix.altitude),
            nav_stat: fix.nav_status.into(),
            h_acc: metric(fix.horizontal_accuracy),
            v_acc: metric(fix.vertical_accuracy),
            sog_kmh: metric(fix.speed_over_ground_kmh),
            cog: metric(fix.course_over_ground),
            vvel: metric(fix.vertical_velocity),
            age_c: metric(fix.correction_age),
            hdop: metric(fix.hdop),
            vdop: metric(fix.vdop),
            tdop: metric(fix.tdop),
            satellites,
            satellites_count: fix.satellites.len() as u8,
            clock_bias: metric(fix.clock_bias),
            clock_drift: metric(fix.clock_drift),
            timepulse_granularity: metric(fix.timepulse_granularity),
        }
    }
}

// --- Handle registry ---

#[derive(Default)]
struct Registry {
    devices: HashMap<usize, Device>,
    next_id: usize,
    transport: Option<Rc<dyn Transport>>,
    capture: Option<Rc<dyn CapturePipeline>>,
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

/// Sets the backends used by [`mic2_find`] on the calling thread.
///
/// Without this call the first `mic2_find` opens the system HID stack and
/// audio functions fail with `Failure`.
pub fn install_backend(transport: Rc<dyn Transport>, capture: Option<Rc<dyn CapturePipeline>>) {
    REGISTRY.with(|r| {
        let mut r = r.borrow_mut();
        r.transport = Some(transport);
        r.capture = capture;
    });
}

fn enumerator() -> Result<Enumerator> {
    REGISTRY.with(|r| {
        let mut r = r.borrow_mut();
        let transport = match r.transport.clone() {
            Some(t) => t,
            None => {
                let t: Rc<dyn Transport> = Rc::new(HidTransport::new()?);
                r.transport = Some(Rc::clone(&t));
                t
            }
        };
        let enumerator = Enumerator::new(transport);
        Ok(match &r.capture {
            Some(c) => enumerator.with_capture(Rc::clone(c)),
            None => enumerator,
        })
    })
}

fn register(device: Device) -> *mut c_void {
    REGISTRY.with(|r| {
        let mut r = r.borrow_mut();
        // A unit found again keeps its handle
        if let Some((&id, _)) = r.devices.iter().find(|(_, d)| d.same_device(&device)) {
            return id as *mut c_void;
        }
        // Ids are never reused, so a freed handle stays invalid
        r.next_id += 1;
        let id = r.next_id;
        r.devices.insert(id, device);
        id as *mut c_void
    })
}

unsafe fn lookup(device: *const Mic2Device) -> std::result::Result<Device, ErrorCode> {
    if device.is_null() {
        return Err(ErrorCode::InvalidParameter);
    }
    let id = (*device).handle as usize;
    REGISTRY
        .with(|r| r.borrow().devices.get(&id).cloned())
        .ok_or(ErrorCode::InvalidParameter)
}

fn report(name: &str, result: Result<()>) -> ErrorCode {
    if let Err(e) = &result {
        debug!("{} failed: {}", name, e);
    }
    ErrorCode::from(&result)
}

unsafe fn command(
    name: &str,
    device: *const Mic2Device,
    op: impl FnOnce(&Device) -> Result<()>,
) -> ErrorCode {
    match lookup(device) {
        Ok(device) => report(name, op(&device)),
        Err(code) => code,
    }
}

unsafe fn query(
    name: &str,
    device: *const Mic2Device,
    out: *mut bool,
    op: impl FnOnce(&Device) -> Result<bool>,
) -> ErrorCode {
    if out.is_null() {
        return ErrorCode::InvalidParameter;
    }
    *out = false;
    let device = match lookup(device) {
        Ok(d) => d,
        Err(code) => return code,
    };
    report(name, op(&device).map(|value| *out = value))
}

fn serial_field(serial: &str) -> [c_char; SERIAL_NUMBER_LEN] {
    let mut field = [0 as c_char; SERIAL_NUMBER_LEN];
    for (dst, src) in field
        .iter_mut()
        .zip(serial.bytes().take(SERIAL_NUMBER_LEN - 1))
    {
        *dst = src as c_char;
    }
    field
}

// --- Exported functions ---

/// Copies the text for `error_code` into `buffer`.
///
/// `*length` holds the buffer capacity on entry and the size needed for the
/// full string, including the terminator, on return. A short buffer receives
/// a truncated, NUL terminated string and the call returns `InvalidParameter`.
///
/// # Safety
/// `buffer` must be valid for `*length` bytes and `length` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn mic2_error_string(
    error_code: u32,
    buffer: *mut c_char,
    length: *mut u32,
) -> ErrorCode {
    if buffer.is_null() || length.is_null() {
        return ErrorCode::InvalidParameter;
    }
    let Some(code) = ErrorCode::from_raw(error_code) else {
        return ErrorCode::InvalidParameter;
    };
    let text = code.as_str().as_bytes();
    let capacity = *length as usize;
    let needed = text.len() + 1;
    *length = needed as u32;
    if capacity == 0 {
        return ErrorCode::InvalidParameter;
    }
    let copied = text.len().min(capacity - 1);
    let out = std::slice::from_raw_parts_mut(buffer, capacity);
    for (dst, src) in out.iter_mut().zip(&text[..copied]) {
        *dst = *src as c_char;
    }
    out[copied] = 0;
    if copied < text.len() {
        ErrorCode::InvalidParameter
    } else {
        ErrorCode::Success
    }
}

/// Enumerates attached accessories.
///
/// `*length` holds the capacity of `devices` on entry and the number of
/// devices written on return. `api_version` and `device_size` must be
/// `MIC2_API_VERSION` and `sizeof(Mic2Device)` of the caller's build;
/// otherwise nothing is written and `InvalidParameter` is returned. Every
/// returned device must be passed to [`mic2_free`]. A unit that is already
/// live on this thread is returned with its existing handle.
///
/// # Safety
/// `devices` must be valid for writes of `*length` elements.
#[no_mangle]
pub unsafe extern "C" fn mic2_find(
    devices: *mut Mic2Device,
    length: *mut u32,
    api_version: u32,
    device_size: u32,
) -> ErrorCode {
    if devices.is_null() || length.is_null() {
        return ErrorCode::InvalidParameter;
    }
    let capacity = *length as usize;
    *length = 0;
    let abi = AbiFingerprint {
        version: api_version,
        size: device_size,
    };
    // Checked before any backend is created
    if let Err(e) = abi.check() {
        return e.code();
    }
    let found = match enumerator().and_then(|e| e.enumerate(capacity, abi)) {
        Ok(found) => found,
        Err(e) => {
            debug!("mic2_find failed: {}", e);
            return e.code();
        }
    };
    for (i, device) in found.into_iter().enumerate() {
        let record = Mic2Device {
            version: MIC2_API_VERSION,
            size: AbiFingerprint::current().size,
            serial_number: serial_field(device.serial_number()),
            has_gps: device.has_gps(),
            handle: register(device),
        };
        devices.add(i).write(record);
        *length = i as u32 + 1;
    }
    ErrorCode::Success
}

/// Releases a device: closes whatever is open and invalidates the handle.
/// Null pointers and already freed devices are ignored.
///
/// # Safety
/// `device` must be null or point to a `Mic2Device` written by `mic2_find`.
#[no_mangle]
pub unsafe extern "C" fn mic2_free(device: *mut Mic2Device) {
    if device.is_null() {
        return;
    }
    let id = (*device).handle as usize;
    (*device).handle = std::ptr::null_mut();
    let removed = REGISTRY.with(|r| r.borrow_mut().devices.remove(&id));
    if let Some(device) = removed {
        device.release();
    }
}

/// # Safety
/// Pointers must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_has_gps(device: *const Mic2Device, has_gps: *mut bool) -> ErrorCode {
    query("mic2_has_gps", device, has_gps, |d| {
        d.ensure_valid()?;
        Ok(d.has_gps())
    })
}

/// # Safety
/// `device` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_io_open(device: *const Mic2Device) -> ErrorCode {
    command("mic2_io_open", device, Device::io_open)
}

/// # Safety
/// `device` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_io_close(device: *const Mic2Device) -> ErrorCode {
    command("mic2_io_close", device, Device::io_close)
}

/// # Safety
/// Pointers must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_io_is_open(device: *const Mic2Device, is_open: *mut bool) -> ErrorCode {
    query("mic2_io_is_open", device, is_open, Device::io_is_open)
}

/// # Safety
/// `device` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_io_buzzer_enable(device: *const Mic2Device, enable: bool) -> ErrorCode {
    command("mic2_io_buzzer_enable", device, |d| d.io_buzzer_enable(enable))
}

/// # Safety
/// Pointers must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_io_buzzer_is_enabled(
    device: *const Mic2Device,
    is_enabled: *mut bool,
) -> ErrorCode {
    query(
        "mic2_io_buzzer_is_enabled",
        device,
        is_enabled,
        Device::io_buzzer_is_enabled,
    )
}

/// # Safety
/// `device` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_io_gpsled_enable(device: *const Mic2Device, enable: bool) -> ErrorCode {
    command("mic2_io_gpsled_enable", device, |d| d.io_gps_led_enable(enable))
}

/// # Safety
/// Pointers must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_io_gpsled_is_enabled(
    device: *const Mic2Device,
    is_enabled: *mut bool,
) -> ErrorCode {
    query(
        "mic2_io_gpsled_is_enabled",
        device,
        is_enabled,
        Device::io_gps_led_is_enabled,
    )
}

/// # Safety
/// Pointers must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_io_button_is_pressed(
    device: *const Mic2Device,
    is_pressed: *mut bool,
) -> ErrorCode {
    query(
        "mic2_io_button_is_pressed",
        device,
        is_pressed,
        Device::io_button_is_pressed,
    )
}

/// Starts recording. `sample_rate` is in Hz, typically 44100 or 48000.
///
/// # Safety
/// `device` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_audio_start(device: *const Mic2Device, sample_rate: u32) -> ErrorCode {
    command("mic2_audio_start", device, |d| d.audio_start(sample_rate))
}

/// # Safety
/// `device` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_audio_stop(device: *const Mic2Device) -> ErrorCode {
    command("mic2_audio_stop", device, Device::audio_stop)
}

/// Saves the stopped recording. The file extension selects the format.
///
/// # Safety
/// `device` must be null or valid, `path` must be null or a NUL terminated string.
#[no_mangle]
pub unsafe extern "C" fn mic2_audio_save(device: *const Mic2Device, path: *const c_char) -> ErrorCode {
    if path.is_null() {
        return ErrorCode::InvalidParameter;
    }
    let Ok(path) = CStr::from_ptr(path).to_str() else {
        return ErrorCode::InvalidParameter;
    };
    command("mic2_audio_save", device, |d| d.audio_save(path))
}

/// # Safety
/// `device` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_gps_open(device: *const Mic2Device) -> ErrorCode {
    command("mic2_gps_open", device, Device::gps_open)
}

/// # Safety
/// `device` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_gps_close(device: *const Mic2Device) -> ErrorCode {
    command("mic2_gps_close", device, Device::gps_close)
}

/// # Safety
/// Pointers must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_gps_is_open(device: *const Mic2Device, is_open: *mut bool) -> ErrorCode {
    query("mic2_gps_is_open", device, is_open, Device::gps_is_open)
}

/// # Safety
/// Pointers must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn mic2_gps_has_lock(device: *const Mic2Device, has_lock: *mut bool) -> ErrorCode {
    query("mic2_gps_has_lock", device, has_lock, Device::gps_has_lock)
}

/// Reads the latest fix into `info`. `info_size` must be at least
/// `sizeof(Mic2GpsInfo)`. On failure `info` holds an empty fix (no fix,
/// invalid coordinates, every metric `-1.0`).
///
/// # Safety
/// `device` must be null or valid, `info` must be null or valid for `info_size` bytes.
#[no_mangle]
pub unsafe extern "C" fn mic2_gps_info(
    device: *const Mic2Device,
    info: *mut Mic2GpsInfo,
    info_size: u32,
) -> ErrorCode {
    if info.is_null() || (info_size as usize) < std::mem::size_of::<Mic2GpsInfo>() {
        return ErrorCode::InvalidParameter;
    }
    info.write(Mic2GpsInfo::from(&GpsFix::default()));
    command("mic2_gps_info", device, |d| {
        let fix = d.gps_info()?;
        info.write(Mic2GpsInfo::from(&fix));
        Ok(())
    })
}
