//! Button, buzzer and GPS status LED.

use crate::consts;
use crate::device::{Device, SubsystemState};
use crate::error::{Error, Result};
use crate::transport::Subsystem;
use log::{debug, trace};

/// One of the IO lines on the accessory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoLine {
    /// CBUS0, output.
    Buzzer,
    /// CBUS1, input.
    Button,
    /// CBUS2, output.
    GpsLed,
}

impl IoLine {
    /// Returns the bit mask of this line in the pin state report.
    #[inline]
    pub fn mask(&self) -> u8 {
        match self {
            IoLine::Buzzer => consts::io::BUZZER,
            IoLine::Button => consts::io::BUTTON,
            IoLine::GpsLed => consts::io::GPS_LED,
        }
    }

    /// Whether the line can be driven by the host.
    #[inline]
    pub fn is_output(&self) -> bool {
        !matches!(self, IoLine::Button)
    }
}

impl Device {
    /// Opens the IO interface. Fails with [`Error::AlreadyOpen`] if it is open.
    pub fn io_open(&self) -> Result<()> {
        self.open_subsystem(Subsystem::Io)
    }

    /// Closes the IO interface. Closing a closed interface is a no-op.
    pub fn io_close(&self) -> Result<()> {
        self.close_subsystem(Subsystem::Io)
    }

    /// Returns the tracked open state of the IO interface.
    pub fn io_is_open(&self) -> Result<bool> {
        Ok(self.subsystem_state(Subsystem::Io)? == SubsystemState::Open)
    }

    /// Reads the current level of `line`.
    pub fn io_read_line(&self, line: IoLine) -> Result<bool> {
        let pins = self.io_read_pins()?;
        Ok(pins & line.mask() != 0)
    }

    /// Drives an output line. Fails with [`Error::ArgumentOutOfRange`] for the button.
    pub fn io_write_line(&self, line: IoLine, enable: bool) -> Result<()> {
        self.ensure_valid()?;
        if !line.is_output() {
            return Err(Error::ArgumentOutOfRange(format!(
                "{:?} is an input line",
                line
            )));
        }
        self.require_open(Subsystem::Io)?;
        let mask = line.mask();
        let value = if enable { mask } else { 0 };
        debug!(
            "Setting {:?} on {}: {}",
            line,
            self.serial_number(),
            enable
        );
        self.write_report(Subsystem::Io, &[consts::io::REPORT_ID_PINS, mask, value])
    }

    /// Returns `true` while the push button is held down.
    pub fn io_button_is_pressed(&self) -> Result<bool> {
        self.io_read_line(IoLine::Button)
    }

    /// Turns the buzzer on or off.
    pub fn io_buzzer_enable(&self, enable: bool) -> Result<()> {
        self.io_write_line(IoLine::Buzzer, enable)
    }

    /// Reads back whether the buzzer is on.
    pub fn io_buzzer_is_enabled(&self) -> Result<bool> {
        self.io_read_line(IoLine::Buzzer)
    }

    /// Turns the GPS status LED on or off.
    pub fn io_gps_led_enable(&self, enable: bool) -> Result<()> {
        self.io_write_line(IoLine::GpsLed, enable)
    }

    /// Reads back whether the GPS status LED is on.
    pub fn io_gps_led_is_enabled(&self) -> Result<bool> {
        self.io_read_line(IoLine::GpsLed)
    }

    fn io_read_pins(&self) -> Result<u8> {
        self.require_open(Subsystem::Io)?;
        let mut buf = [0u8; consts::io::PINS_READ_LEN];
        self.read_report(Subsystem::Io, consts::io::REPORT_ID_PINS, &mut buf)?;
        trace!("IO pins on {}: 0b{:04b}", self.serial_number(), buf[1]);
        Ok(buf[1])
    }
}
