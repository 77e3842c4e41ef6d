//! Lists attached neoVI MIC2 units and blips the buzzer on each.
//!
//! Run with: cargo run --example find

use neovi_mic2::{device_find_all, HidTransport, Session};
use std::rc::Rc;
use std::{thread, time::Duration};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let transport = Rc::new(HidTransport::new()?);
    let devices = device_find_all(transport)?;
    if devices.is_empty() {
        println!("No neoVI MIC2 devices found.");
        return Ok(());
    }

    for (i, device) in devices.into_iter().enumerate() {
        println!("Device [{}]:", i);
        println!("  Serial Number: {}", device.serial_number());
        println!(
            "  GPS: {}",
            if device.has_gps() { "Available" } else { "Not available" }
        );

        let session = Session::new(device)?;
        session.io_open()?;
        println!("  Button pressed: {}", session.io_button_is_pressed()?);
        session.io_buzzer_enable(true)?;
        thread::sleep(Duration::from_millis(100));
        session.io_buzzer_enable(false)?;
    }
    Ok(())
}
