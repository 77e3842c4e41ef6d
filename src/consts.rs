//! Internal constants, report IDs, and bit definitions.

// Default Vendor/Product IDs
/// Intrepid Control Systems vendor ID used by the neoVI MIC2.
pub const MIC2_VID: u16 = 0x093C;

// Default Product IDs for the HID interfaces of one accessory.
// Both interfaces of a unit report the same serial number.
/// Product ID for the MIC2 IO (button/buzzer/LED) interface.
pub const MIC2_IO_PID: u16 = 0x1400;
/// Product ID for the MIC2 GPS interface. Absent on units without GPS.
pub const MIC2_GPS_PID: u16 = 0x1401;

/// Serial numbers of MIC2 units start with this prefix ("MCxxxx").
pub const MIC2_SERIAL_PREFIX: &str = "MC";

/// Version of the C API. Callers pass the version they were built against to `mic2_find`.
pub const MIC2_API_VERSION: u32 = 0x1;

/// Capacity of the satellite list in a GPS fix.
pub const MAX_SATELLITES: usize = 16;

/// Sample rate used when the caller has no preference.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Size of the serial number field in the C device struct, including the NUL terminator.
pub const SERIAL_NUMBER_LEN: usize = 16;

// --- IO Related Constants ---
pub mod io {
    /// Report ID for reading and writing the IO line state.
    pub const REPORT_ID_PINS: u8 = 0x10;
    // Read: ReportID(1) + Pins(1)
    pub const PINS_READ_LEN: usize = 2;

    // IO line bits
    /// CBUS0: buzzer output.
    pub const BUZZER: u8 = 1 << 0;
    /// CBUS1: push button input.
    pub const BUTTON: u8 = 1 << 1;
    /// CBUS2: GPS status LED output.
    pub const GPS_LED: u8 = 1 << 2;
    // CBUS3 N/C
}

// --- GPS Related Constants ---
pub mod gps {
    pub const REPORT_ID_STATUS: u8 = 0x20;
    pub const REPORT_ID_POSITION: u8 = 0x21;
    pub const REPORT_ID_METRICS: u8 = 0x22;
    pub const REPORT_ID_SATELLITES_0: u8 = 0x23;
    pub const REPORT_ID_SATELLITES_1: u8 = 0x24;

    // ReportID(1) + NavStatus(1) + SatCount(1)
    pub const STATUS_LEN: usize = 3;
    // ReportID(1) + Time(8) + Lat(6) + Lon(6) + Altitude(4)
    pub const POSITION_LEN: usize = 25;
    // ReportID(1) + 12 x f32
    pub const METRICS_LEN: usize = 49;
    pub const METRICS_COUNT: usize = 12;
    // ReportID(1) + TotalCount(1) + 8 x Sat(8)
    pub const SATELLITES_LEN: usize = 66;
    pub const SATELLITES_PER_PAGE: usize = 8;
    // Prn(2) + Snr(1) + Flags(1) + Azimuth(2) + Elevation(1) + LockTime(1)
    pub const SATELLITE_ENTRY_LEN: usize = 8;

    // Coordinate block: Deg(2) + Min(1) + Sec(1) + Hemisphere(1) + Valid(1)
    pub const COORDINATE_LEN: usize = 6;

    // Satellite flags
    pub mod sat_flags {
        pub const SNR_VALID: u8 = 1 << 0;
        pub const USED: u8 = 1 << 1;
        pub const AZIMUTH_VALID: u8 = 1 << 2;
        pub const ELEVATION_VALID: u8 = 1 << 3;
    }
}
