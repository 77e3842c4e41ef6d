//! Prints GPS fixes from the first GPS-equipped neoVI MIC2 once per second.
//!
//! Run with: RUST_LOG=debug cargo run --example gps

use neovi_mic2::{device_find_all, HidTransport, Session};
use std::rc::Rc;
use std::{thread, time::Duration};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let transport = Rc::new(HidTransport::new()?);
    let Some(device) = device_find_all(transport)?
        .into_iter()
        .find(|d| d.has_gps())
    else {
        println!("No neoVI MIC2 with GPS found.");
        return Ok(());
    };
    println!("Using {}", device.serial_number());

    let session = Session::new(device)?;
    session.io_open()?;
    session.gps_open()?;

    for _ in 0..30 {
        let fix = session.gps_info()?;
        // Mirror the lock state on the status LED
        session.io_gps_led_enable(fix.has_lock())?;

        let time = fix
            .timestamp
            .map_or_else(|| "--".to_string(), |t| t.to_rfc3339());
        println!(
            "{} [{}] lat: {} lon: {} alt: {:?} sats: {}/{}",
            time,
            fix.nav_status,
            fix.latitude,
            fix.longitude,
            fix.altitude,
            fix.satellites_used().count(),
            fix.satellite_count()
        );
        if let (Some(lat), Some(lon)) = (
            fix.latitude.to_signed_decimal(),
            fix.longitude.to_signed_decimal(),
        ) {
            println!("  decimal: {:.6}, {:.6}", lat, lon);
        }
        thread::sleep(Duration::from_secs(1));
    }
    Ok(())
}
