//! GPS receiver: fix model, report decoding and the GPS subsystem operations.

use crate::consts::{self, MAX_SATELLITES};
use crate::device::{Device, SubsystemState};
use crate::error::{unsupported_gps, Error, Result};
use crate::transport::Subsystem;
use arrayvec::ArrayVec;
use chrono::{DateTime, Utc};
use log::{debug, trace};
use std::fmt;

/// Hemisphere indicator of a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    /// Returns the NMEA indicator character (`'N'`, `'S'`, `'E'`, `'W'`).
    pub fn as_char(&self) -> char {
        match self {
            Hemisphere::North => 'N',
            Hemisphere::South => 'S',
            Hemisphere::East => 'E',
            Hemisphere::West => 'W',
        }
    }

    /// Parses an NMEA indicator character.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'N' => Some(Hemisphere::North),
            'S' => Some(Hemisphere::South),
            'E' => Some(Hemisphere::East),
            'W' => Some(Hemisphere::West),
            _ => None,
        }
    }

    /// Whether this indicator belongs to a latitude.
    pub fn is_latitude(&self) -> bool {
        matches!(self, Hemisphere::North | Hemisphere::South)
    }

    /// Sign applied to a decimal coordinate: negative south and west.
    pub fn sign(&self) -> f64 {
        match self {
            Hemisphere::North | Hemisphere::East => 1.0,
            Hemisphere::South | Hemisphere::West => -1.0,
        }
    }
}

/// Degrees, minutes and seconds of one coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dms {
    pub degrees: u16,
    pub minutes: u8,
    pub seconds: u8,
}

impl Dms {
    pub fn new(degrees: u16, minutes: u8, seconds: u8) -> Self {
        Dms {
            degrees,
            minutes,
            seconds,
        }
    }

    /// Converts to unsigned decimal degrees.
    ///
    /// ```
    /// use neovi_mic2::gps::Dms;
    /// let dms = Dms::new(47, 17, 6);
    /// assert!((dms.to_decimal() - 47.285).abs() < 1e-9);
    /// ```
    pub fn to_decimal(&self) -> f64 {
        self.degrees as f64 + self.minutes as f64 / 60.0 + self.seconds as f64 / 3600.0
    }

    /// Converts from decimal degrees, rounded to the nearest second. The sign is dropped.
    ///
    /// Magnitudes beyond the range of `degrees` saturate at `65535° 59' 59"`
    /// and NaN converts to zero.
    pub fn from_decimal(decimal_degrees: f64) -> Self {
        const MAX_SECONDS: u64 = u16::MAX as u64 * 3600 + 3599;
        let total_seconds = ((decimal_degrees.abs() * 3600.0).round() as u64).min(MAX_SECONDS);
        Dms {
            degrees: (total_seconds / 3600) as u16,
            minutes: ((total_seconds % 3600) / 60) as u8,
            seconds: (total_seconds % 60) as u8,
        }
    }
}

impl fmt::Display for Dms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}° {}' {}\"", self.degrees, self.minutes, self.seconds)
    }
}

/// One coordinate axis of a fix. `dms` and `hemisphere` are meaningful only when `valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinate {
    pub dms: Dms,
    pub hemisphere: Hemisphere,
    pub valid: bool,
}

impl Coordinate {
    /// A coordinate with no data, reported before the receiver has a position.
    pub fn invalid(hemisphere: Hemisphere) -> Self {
        Coordinate {
            dms: Dms::default(),
            hemisphere,
            valid: false,
        }
    }

    /// Signed decimal degrees, negative south and west. `None` when not valid.
    pub fn to_signed_decimal(&self) -> Option<f64> {
        self.valid
            .then(|| self.hemisphere.sign() * self.dms.to_decimal())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            write!(f, "{} {}", self.dms, self.hemisphere.as_char())
        } else {
            write!(f, "--")
        }
    }
}

/// Navigation status reported by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NavigationStatus {
    #[default]
    NoFix,
    DeadReckoningOnly,
    StandAlone2D,
    StandAlone3D,
    Differential2D,
    Differential3D,
    CombinedGpsDeadReckoning,
    TimeOnly,
}

impl NavigationStatus {
    const ALL: [NavigationStatus; 8] = [
        NavigationStatus::NoFix,
        NavigationStatus::DeadReckoningOnly,
        NavigationStatus::StandAlone2D,
        NavigationStatus::StandAlone3D,
        NavigationStatus::Differential2D,
        NavigationStatus::Differential3D,
        NavigationStatus::CombinedGpsDeadReckoning,
        NavigationStatus::TimeOnly,
    ];

    /// Two-letter receiver code (`NF`, `DR`, `G2`, `G3`, `D2`, `D3`, `RK`, `TT`).
    pub fn as_code(&self) -> &'static str {
        match self {
            NavigationStatus::NoFix => "NF",
            NavigationStatus::DeadReckoningOnly => "DR",
            NavigationStatus::StandAlone2D => "G2",
            NavigationStatus::StandAlone3D => "G3",
            NavigationStatus::Differential2D => "D2",
            NavigationStatus::Differential3D => "D3",
            NavigationStatus::CombinedGpsDeadReckoning => "RK",
            NavigationStatus::TimeOnly => "TT",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_code() == code)
    }

    /// Status byte in the GPS status report.
    pub fn to_raw(self) -> u8 {
        self as u8
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Anything but [`NavigationStatus::NoFix`] counts as a lock.
    pub fn is_fix(&self) -> bool {
        *self != NavigationStatus::NoFix
    }
}

impl fmt::Display for NavigationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// One satellite in view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Satellite {
    /// Satellite PRN number.
    pub prn: u16,
    /// Signal to noise ratio (dBHz). `None` when the receiver is not tracking it.
    pub snr: Option<u8>,
    /// Used in the navigation solution.
    pub used: bool,
    /// Azimuth, 0..=359 degrees.
    pub azimuth: Option<u16>,
    /// Elevation above the horizon, 0..=90 degrees.
    pub elevation: Option<u8>,
    /// Carrier lock time in seconds, 0 (code lock only) to 64 (64 s or more).
    pub lock_time: u8,
}

/// Snapshot of the most recent fix decoded from the receiver.
///
/// Metrics the receiver did not report are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsFix {
    /// UTC time of the fix.
    pub timestamp: Option<DateTime<Utc>>,
    pub latitude: Coordinate,
    pub longitude: Coordinate,
    /// Altitude above the user datum ellipsoid (m).
    pub altitude: Option<f64>,
    pub nav_status: NavigationStatus,
    /// Horizontal accuracy estimate (m).
    pub horizontal_accuracy: Option<f64>,
    /// Vertical accuracy estimate (m).
    pub vertical_accuracy: Option<f64>,
    /// Speed over ground (km/h).
    pub speed_over_ground_kmh: Option<f64>,
    /// Course over ground (degrees).
    pub course_over_ground: Option<f64>,
    /// Vertical velocity, positive downward (m/s).
    pub vertical_velocity: Option<f64>,
    /// Age of the most recent differential corrections (s).
    pub correction_age: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
    pub tdop: Option<f64>,
    /// Receiver clock bias (ns).
    pub clock_bias: Option<f64>,
    /// Receiver clock drift (ns/s).
    pub clock_drift: Option<f64>,
    /// Quantization error of the timepulse pin (ns).
    pub timepulse_granularity: Option<f64>,
    pub satellites: ArrayVec<Satellite, MAX_SATELLITES>,
}

impl Default for GpsFix {
    fn default() -> Self {
        GpsFix {
            timestamp: None,
            latitude: Coordinate::invalid(Hemisphere::North),
            longitude: Coordinate::invalid(Hemisphere::East),
            altitude: None,
            nav_status: NavigationStatus::NoFix,
            horizontal_accuracy: None,
            vertical_accuracy: None,
            speed_over_ground_kmh: None,
            course_over_ground: None,
            vertical_velocity: None,
            correction_age: None,
            hdop: None,
            vdop: None,
            tdop: None,
            clock_bias: None,
            clock_drift: None,
            timepulse_granularity: None,
            satellites: ArrayVec::new(),
        }
    }
}

impl GpsFix {
    pub fn has_lock(&self) -> bool {
        self.nav_status.is_fix()
    }

    pub fn satellite_count(&self) -> usize {
        self.satellites.len()
    }

    /// Satellites counted in the navigation solution.
    pub fn satellites_used(&self) -> impl Iterator<Item = &Satellite> {
        self.satellites.iter().filter(|s| s.used)
    }

    // Metrics in report order.
    fn metrics(&self) -> [Option<f64>; consts::gps::METRICS_COUNT] {
        [
            self.horizontal_accuracy,
            self.vertical_accuracy,
            self.speed_over_ground_kmh,
            self.course_over_ground,
            self.vertical_velocity,
            self.correction_age,
            self.hdop,
            self.vdop,
            self.tdop,
            self.clock_bias,
            self.clock_drift,
            self.timepulse_granularity,
        ]
    }

    fn set_metrics(&mut self, m: [Option<f64>; consts::gps::METRICS_COUNT]) {
        let [h_acc, v_acc, sog, cog, vvel, age_c, hdop, vdop, tdop, bias, drift, granularity] = m;
        self.horizontal_accuracy = h_acc;
        self.vertical_accuracy = v_acc;
        self.speed_over_ground_kmh = sog;
        self.course_over_ground = cog;
        self.vertical_velocity = vvel;
        self.correction_age = age_c;
        self.hdop = hdop;
        self.vdop = vdop;
        self.tdop = tdop;
        self.clock_bias = bias;
        self.clock_drift = drift;
        self.timepulse_granularity = granularity;
    }
}

/// Encoding and decoding of the GPS feature reports.
pub(crate) mod wire {
    use super::*;
    use crate::consts::gps::*;

    fn invalid(report_id: u8, len: usize) -> Error {
        Error::InvalidReport { report_id, len }
    }

    fn check_len(buf: &[u8], expected: usize) -> Result<()> {
        if buf.len() != expected {
            return Err(invalid(buf.first().copied().unwrap_or(0), buf.len()));
        }
        Ok(())
    }

    fn read_f32(buf: &[u8], offset: usize) -> Option<f64> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&buf[offset..offset + 4]);
        let value = f32::from_le_bytes(bytes);
        (!value.is_nan()).then_some(value as f64)
    }

    fn write_f32(out: &mut Vec<u8>, value: Option<f64>) {
        let raw = value.map_or(f32::NAN, |v| v as f32);
        out.extend_from_slice(&raw.to_le_bytes());
    }

    /// Decodes `[nav_status, satellite_count]`.
    pub(crate) fn decode_status(buf: &[u8]) -> Result<(NavigationStatus, u8)> {
        check_len(buf, STATUS_LEN)?;
        let status = NavigationStatus::from_raw(buf[1]).ok_or_else(|| {
            log::warn!("Unknown navigation status byte 0x{:02X}", buf[1]);
            invalid(buf[0], buf.len())
        })?;
        Ok((status, buf[2]))
    }

    pub(crate) fn encode_status(fix: &GpsFix) -> Vec<u8> {
        vec![
            REPORT_ID_STATUS,
            fix.nav_status.to_raw(),
            fix.satellites.len() as u8,
        ]
    }

    fn decode_coordinate(
        report_id: u8,
        block: &[u8],
        default: Hemisphere,
    ) -> Result<Coordinate> {
        let valid = block[5] != 0;
        if !valid {
            return Ok(Coordinate::invalid(default));
        }
        let hemisphere = Hemisphere::from_char(block[4] as char)
            .filter(|h| h.is_latitude() == default.is_latitude())
            .ok_or_else(|| {
                log::warn!("Unexpected hemisphere indicator 0x{:02X}", block[4]);
                invalid(report_id, POSITION_LEN)
            })?;
        Ok(Coordinate {
            dms: Dms::new(u16::from_le_bytes([block[0], block[1]]), block[2], block[3]),
            hemisphere,
            valid,
        })
    }

    fn encode_coordinate(out: &mut Vec<u8>, c: &Coordinate) {
        out.extend_from_slice(&c.dms.degrees.to_le_bytes());
        out.push(c.dms.minutes);
        out.push(c.dms.seconds);
        out.push(if c.valid { c.hemisphere.as_char() as u8 } else { 0 });
        out.push(c.valid as u8);
    }

    /// Decodes time, both coordinates and altitude into `fix`.
    pub(crate) fn decode_position(buf: &[u8], fix: &mut GpsFix) -> Result<()> {
        check_len(buf, POSITION_LEN)?;
        let mut time = [0u8; 8];
        time.copy_from_slice(&buf[1..9]);
        let seconds = i64::from_le_bytes(time);
        fix.timestamp = if seconds == 0 {
            None
        } else {
            DateTime::from_timestamp(seconds, 0)
        };
        let lat_end = 9 + COORDINATE_LEN;
        let lon_end = lat_end + COORDINATE_LEN;
        fix.latitude = decode_coordinate(buf[0], &buf[9..lat_end], Hemisphere::North)?;
        fix.longitude = decode_coordinate(buf[0], &buf[lat_end..lon_end], Hemisphere::East)?;
        fix.altitude = read_f32(buf, lon_end);
        Ok(())
    }

    pub(crate) fn encode_position(fix: &GpsFix) -> Vec<u8> {
        let mut out = Vec::with_capacity(POSITION_LEN);
        out.push(REPORT_ID_POSITION);
        out.extend_from_slice(&fix.timestamp.map_or(0, |t| t.timestamp()).to_le_bytes());
        encode_coordinate(&mut out, &fix.latitude);
        encode_coordinate(&mut out, &fix.longitude);
        write_f32(&mut out, fix.altitude);
        out
    }

    /// Decodes the twelve accuracy and timing metrics into `fix`.
    pub(crate) fn decode_metrics(buf: &[u8], fix: &mut GpsFix) -> Result<()> {
        check_len(buf, METRICS_LEN)?;
        let mut metrics = [None; METRICS_COUNT];
        for (i, m) in metrics.iter_mut().enumerate() {
            *m = read_f32(buf, 1 + i * 4);
        }
        fix.set_metrics(metrics);
        Ok(())
    }

    pub(crate) fn encode_metrics(fix: &GpsFix) -> Vec<u8> {
        let mut out = Vec::with_capacity(METRICS_LEN);
        out.push(REPORT_ID_METRICS);
        for m in fix.metrics() {
            write_f32(&mut out, m);
        }
        out
    }

    /// Appends the entries of one satellite page to `fix`. Returns the total
    /// satellite count announced by the page.
    pub(crate) fn decode_satellites(buf: &[u8], page: usize, fix: &mut GpsFix) -> Result<usize> {
        check_len(buf, SATELLITES_LEN)?;
        let total = buf[1] as usize;
        if total > MAX_SATELLITES {
            log::warn!("Satellite count {} exceeds capacity {}", total, MAX_SATELLITES);
            return Err(invalid(buf[0], buf.len()));
        }
        let first = page * SATELLITES_PER_PAGE;
        let in_page = total.saturating_sub(first).min(SATELLITES_PER_PAGE);
        for entry in buf[2..].chunks_exact(SATELLITE_ENTRY_LEN).take(in_page) {
            let flags = entry[3];
            let satellite = Satellite {
                prn: u16::from_le_bytes([entry[0], entry[1]]),
                snr: (flags & sat_flags::SNR_VALID != 0).then_some(entry[2]),
                used: flags & sat_flags::USED != 0,
                azimuth: (flags & sat_flags::AZIMUTH_VALID != 0)
                    .then(|| u16::from_le_bytes([entry[4], entry[5]])),
                elevation: (flags & sat_flags::ELEVATION_VALID != 0).then_some(entry[6]),
                lock_time: entry[7],
            };
            fix.satellites
                .try_push(satellite)
                .map_err(|_| invalid(buf[0], buf.len()))?;
        }
        Ok(total)
    }

    pub(crate) fn encode_satellites(fix: &GpsFix, page: usize) -> Vec<u8> {
        let mut out = vec![0u8; SATELLITES_LEN];
        out[0] = if page == 0 {
            REPORT_ID_SATELLITES_0
        } else {
            REPORT_ID_SATELLITES_1
        };
        out[1] = fix.satellites.len() as u8;
        let entries = fix
            .satellites
            .iter()
            .skip(page * SATELLITES_PER_PAGE)
            .take(SATELLITES_PER_PAGE);
        for (slot, sat) in out[2..].chunks_exact_mut(SATELLITE_ENTRY_LEN).zip(entries) {
            slot[..2].copy_from_slice(&sat.prn.to_le_bytes());
            slot[2] = sat.snr.unwrap_or(0);
            let mut flags = 0;
            if sat.snr.is_some() {
                flags |= sat_flags::SNR_VALID;
            }
            if sat.used {
                flags |= sat_flags::USED;
            }
            if let Some(azimuth) = sat.azimuth {
                flags |= sat_flags::AZIMUTH_VALID;
                slot[4..6].copy_from_slice(&azimuth.to_le_bytes());
            }
            if let Some(elevation) = sat.elevation {
                flags |= sat_flags::ELEVATION_VALID;
                slot[6] = elevation;
            }
            slot[3] = flags;
            slot[7] = sat.lock_time;
        }
        out
    }
}

impl Device {
    // GPS operations on a unit without a receiver fail before any transport access.
    fn check_gps_support(&self) -> Result<()> {
        self.ensure_valid()?;
        if !self.has_gps() {
            return Err(unsupported_gps(self.serial_number()));
        }
        Ok(())
    }

    /// Opens the GPS interface.
    pub fn gps_open(&self) -> Result<()> {
        self.check_gps_support()?;
        self.open_subsystem(Subsystem::Gps)
    }

    /// Closes the GPS interface. Closing a closed interface is a no-op.
    pub fn gps_close(&self) -> Result<()> {
        self.check_gps_support()?;
        self.close_subsystem(Subsystem::Gps)
    }

    /// Returns the tracked open state of the GPS interface.
    pub fn gps_is_open(&self) -> Result<bool> {
        self.check_gps_support()?;
        Ok(self.subsystem_state(Subsystem::Gps)? == SubsystemState::Open)
    }

    /// Whether the receiver currently reports any kind of fix.
    pub fn gps_has_lock(&self) -> Result<bool> {
        self.check_gps_support()?;
        self.require_open(Subsystem::Gps)?;
        let (status, _) = self.gps_read_status()?;
        Ok(status.is_fix())
    }

    /// Reads the most recent fix.
    pub fn gps_info(&self) -> Result<GpsFix> {
        self.check_gps_support()?;
        self.require_open(Subsystem::Gps)?;

        let mut fix = GpsFix::default();
        let (status, satellite_count) = self.gps_read_status()?;
        fix.nav_status = status;

        let mut buf = [0u8; consts::gps::POSITION_LEN];
        self.read_report(Subsystem::Gps, consts::gps::REPORT_ID_POSITION, &mut buf)?;
        wire::decode_position(&buf, &mut fix)?;

        let mut buf = [0u8; consts::gps::METRICS_LEN];
        self.read_report(Subsystem::Gps, consts::gps::REPORT_ID_METRICS, &mut buf)?;
        wire::decode_metrics(&buf, &mut fix)?;

        let mut buf = [0u8; consts::gps::SATELLITES_LEN];
        self.read_report(Subsystem::Gps, consts::gps::REPORT_ID_SATELLITES_0, &mut buf)?;
        let total = wire::decode_satellites(&buf, 0, &mut fix)?;
        if total > consts::gps::SATELLITES_PER_PAGE {
            self.read_report(Subsystem::Gps, consts::gps::REPORT_ID_SATELLITES_1, &mut buf)?;
            wire::decode_satellites(&buf, 1, &mut fix)?;
        }
        if total != satellite_count as usize {
            trace!(
                "Satellite count changed between reports ({} -> {})",
                satellite_count,
                total
            );
        }

        debug!(
            "GPS fix on {}: {} lat={} lon={} sats={}",
            self.serial_number(),
            fix.nav_status,
            fix.latitude,
            fix.longitude,
            fix.satellite_count()
        );
        Ok(fix)
    }

    fn gps_read_status(&self) -> Result<(NavigationStatus, u8)> {
        let mut buf = [0u8; consts::gps::STATUS_LEN];
        self.read_report(Subsystem::Gps, consts::gps::REPORT_ID_STATUS, &mut buf)?;
        wire::decode_status(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::device_find_all;
    use crate::mock::MockTransport;
    use approx::assert_relative_eq;
    use std::rc::Rc;

    fn sample_fix() -> GpsFix {
        let mut fix = GpsFix {
            timestamp: DateTime::from_timestamp(1_700_000_000, 0),
            latitude: Coordinate {
                dms: Dms::new(47, 17, 6),
                hemisphere: Hemisphere::North,
                valid: true,
            },
            longitude: Coordinate {
                dms: Dms::new(122, 20, 30),
                hemisphere: Hemisphere::West,
                valid: true,
            },
            altitude: Some(56.5),
            nav_status: NavigationStatus::StandAlone3D,
            hdop: Some(0.9),
            speed_over_ground_kmh: Some(12.25),
            ..GpsFix::default()
        };
        for prn in 1..=10u16 {
            fix.satellites.push(Satellite {
                prn,
                snr: (prn % 3 != 0).then_some(30 + prn as u8),
                used: prn <= 6,
                azimuth: (prn != 4).then_some(prn * 35),
                elevation: (prn % 2 == 0).then_some(prn as u8 * 9),
                lock_time: (prn as u8 * 8).min(64),
            });
        }
        fix
    }

    fn gps_device(has_gps: bool) -> (Rc<MockTransport>, Device) {
        let transport = Rc::new(MockTransport::new());
        transport.add_device("MC0042", has_gps);
        let device = device_find_all(transport.clone()).unwrap().remove(0);
        (transport, device)
    }

    #[test]
    fn test_dms_decimal_conversion() {
        assert_relative_eq!(Dms::new(47, 17, 6).to_decimal(), 47.285, epsilon = 1e-9);
        assert_eq!(Dms::from_decimal(47.285), Dms::new(47, 17, 6));
        assert_eq!(Dms::from_decimal(-122.341_666_7), Dms::new(122, 20, 30));
        // 59.9999 seconds rounds into the next minute
        assert_eq!(Dms::from_decimal(10.0 + 59.9999 / 3600.0), Dms::new(10, 1, 0));
    }

    #[test]
    fn test_dms_from_decimal_saturates() {
        let max = Dms::new(u16::MAX, 59, 59);
        assert_eq!(Dms::from_decimal(70_000.0), max);
        assert_eq!(Dms::from_decimal(f64::INFINITY), max);
        assert_eq!(Dms::from_decimal(65_535.5), Dms::new(65_535, 30, 0));
        assert_eq!(Dms::from_decimal(f64::NAN), Dms::new(0, 0, 0));
    }

    #[test]
    fn test_dms_display() {
        assert_eq!(Dms::new(47, 17, 6).to_string(), "47° 17' 6\"");
    }

    #[test]
    fn test_signed_decimal() {
        let fix = sample_fix();
        assert_relative_eq!(fix.latitude.to_signed_decimal().unwrap(), 47.285, epsilon = 1e-9);
        assert!(fix.longitude.to_signed_decimal().unwrap() < 0.0);
        assert_eq!(Coordinate::invalid(Hemisphere::North).to_signed_decimal(), None);
    }

    #[test]
    fn test_navigation_status_codes() {
        for status in NavigationStatus::ALL {
            assert_eq!(NavigationStatus::from_code(status.as_code()), Some(status));
            assert_eq!(NavigationStatus::from_raw(status.to_raw()), Some(status));
        }
        assert_eq!(NavigationStatus::from_raw(8), None);
        assert!(!NavigationStatus::NoFix.is_fix());
        assert!(NavigationStatus::TimeOnly.is_fix());
    }

    #[test]
    fn test_decode_position_report() {
        let mut buf = [0u8; consts::gps::POSITION_LEN];
        buf[0] = consts::gps::REPORT_ID_POSITION;
        buf[1..9].copy_from_slice(&1_600_000_000i64.to_le_bytes());
        buf[9..15].copy_from_slice(&[47, 0, 17, 6, b'N', 1]);
        buf[15..21].copy_from_slice(&[0, 0, 0, 0, 0, 0]);
        buf[21..25].copy_from_slice(&100.0f32.to_le_bytes());

        let mut fix = GpsFix::default();
        wire::decode_position(&buf, &mut fix).unwrap();
        assert_eq!(fix.timestamp.unwrap().timestamp(), 1_600_000_000);
        assert!(fix.latitude.valid);
        assert_eq!(fix.latitude.dms, Dms::new(47, 17, 6));
        assert!(!fix.longitude.valid);
        assert_relative_eq!(fix.altitude.unwrap(), 100.0);
    }

    #[test]
    fn test_decode_position_rejects_wrong_hemisphere_axis() {
        let mut fix = GpsFix::default();
        let mut buf = wire::encode_position(&sample_fix());
        buf[13] = b'E';
        assert!(matches!(
            wire::decode_position(&buf, &mut fix),
            Err(Error::InvalidReport { .. })
        ));
    }

    #[test]
    fn test_nan_metrics_are_absent() {
        let mut buf = wire::encode_metrics(&GpsFix::default());
        buf[1..5].copy_from_slice(&2.5f32.to_le_bytes());
        let mut fix = GpsFix::default();
        wire::decode_metrics(&buf, &mut fix).unwrap();
        assert_relative_eq!(fix.horizontal_accuracy.unwrap(), 2.5);
        assert_eq!(fix.vertical_accuracy, None);
        assert_eq!(fix.timepulse_granularity, None);
    }

    #[test]
    fn test_satellite_count_over_capacity_is_rejected() {
        let mut buf = wire::encode_satellites(&GpsFix::default(), 0);
        buf[1] = (MAX_SATELLITES + 1) as u8;
        let mut fix = GpsFix::default();
        assert!(matches!(
            wire::decode_satellites(&buf, 0, &mut fix),
            Err(Error::InvalidReport { .. })
        ));
    }

    #[test]
    fn test_gps_info_reads_both_satellite_pages() {
        let (transport, device) = gps_device(true);
        transport.set_fix("MC0042", sample_fix());
        device.gps_open().unwrap();
        let fix = device.gps_info().unwrap();
        assert_eq!(fix.satellite_count(), 10);
        assert_eq!(fix.satellites_used().count(), 6);
        assert_eq!(fix.satellites[2].snr, None);
        // Entries on the second page keep their geometry
        assert_eq!(fix.satellites[9], sample_fix().satellites[9]);
        assert_eq!(fix.satellites[9].azimuth, Some(350));
        assert_eq!(fix.satellites[9].elevation, Some(90));
        assert_eq!(fix.satellites[9].lock_time, 64);
        assert_eq!(fix.satellites[3].azimuth, None);
        assert_eq!(fix.satellites[2].elevation, None);
        assert_eq!(fix.nav_status, NavigationStatus::StandAlone3D);
        assert_relative_eq!(fix.hdop.unwrap(), 0.9, epsilon = 1e-6);
        assert_eq!(fix.latitude, sample_fix().latitude);
        assert!(device.gps_has_lock().unwrap());
    }

    #[test]
    fn test_no_fix_yet() {
        let (_transport, device) = gps_device(true);
        device.gps_open().unwrap();
        assert!(!device.gps_has_lock().unwrap());
        let fix = device.gps_info().unwrap();
        assert_eq!(fix.timestamp, None);
        assert!(!fix.latitude.valid);
        assert_eq!(fix.satellite_count(), 0);
    }

    #[test]
    fn test_gps_closed_is_rejected() {
        let (transport, device) = gps_device(true);
        assert!(matches!(
            device.gps_info(),
            Err(Error::SubsystemClosed(Subsystem::Gps))
        ));
        assert_eq!(transport.report_reads("MC0042"), 0);
    }

    #[test]
    fn test_gps_unsupported_without_receiver() {
        let (transport, device) = gps_device(false);
        for result in [device.gps_open(), device.gps_close()] {
            assert!(matches!(result, Err(Error::UnsupportedFeature(_))));
        }
        assert!(device.gps_has_lock().is_err());
        assert!(device.gps_is_open().is_err());
        assert!(!transport.is_open("MC0042", Subsystem::Gps));
        assert_eq!(transport.report_reads("MC0042"), 0);
    }
}
