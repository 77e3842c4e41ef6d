// tests/hardware_tests.rs
use hidapi::HidApi;
use neovi_mic2::{
    device_find_all, Device, HidTransport, HidTransportConfig, Result, Session, MIC2_VID,
};
use std::rc::Rc;
use std::{thread, time::Duration};

// Helper to find the first attached unit, panics on failure for test simplicity
fn open_test_device() -> Device {
    let hid_api = HidApi::new().expect("Failed to create HID API");
    let transport = Rc::new(HidTransport::from_api(hid_api, HidTransportConfig::default()));
    device_find_all(transport)
        .expect("Enumeration failed")
        .into_iter()
        .next()
        .expect("No neoVI MIC2 found. Is it connected and permissions set?")
}

#[test]
fn test_enumerate_no_panic() {
    // Must succeed regardless of whether devices are present
    let Ok(hid_api) = HidApi::new() else {
        println!("Skipping: HID API unavailable");
        return;
    };
    let transport = Rc::new(HidTransport::from_api(hid_api, HidTransportConfig::default()));
    let devices = device_find_all(transport).unwrap();
    println!("Found {} neoVI MIC2 devices", devices.len());
    for device in &devices {
        assert!(device.serial_number().starts_with("MC"));
    }
    assert_eq!(MIC2_VID, 0x093C);
}

#[test]
#[ignore] // Ignore by default, requires hardware
fn test_buzzer_readback() -> Result<()> {
    let session = Session::new(open_test_device())?;
    session.io_open()?;

    session.io_buzzer_enable(true)?;
    thread::sleep(Duration::from_millis(50));
    assert!(session.io_buzzer_is_enabled()?);

    session.io_buzzer_enable(false)?;
    assert!(!session.io_buzzer_is_enabled()?);
    Ok(())
}

#[test]
#[ignore] // Ignore by default, requires hardware
fn test_gps_led_and_button() -> Result<()> {
    let session = Session::new(open_test_device())?;
    session.io_open()?;
    session.io_gps_led_enable(true)?;
    assert!(session.io_gps_led_is_enabled()?);
    session.io_gps_led_enable(false)?;
    println!("Button pressed: {}", session.io_button_is_pressed()?);
    Ok(())
}

#[test]
#[ignore] // Ignore by default, requires hardware with GPS
fn test_gps_snapshot() -> Result<()> {
    let device = open_test_device();
    if !device.has_gps() {
        println!("Skipping GPS test: {} has no GPS", device.serial_number());
        return Ok(());
    }
    let session = Session::new(device.clone())?;
    session.gps_open()?;
    let fix = session.gps_info()?;
    println!(
        "Status {} lat {} lon {} sats {}",
        fix.nav_status,
        fix.latitude,
        fix.longitude,
        fix.satellite_count()
    );
    assert!(fix.satellite_count() <= neovi_mic2::MAX_SATELLITES);
    println!("Lock: {}", session.gps_has_lock()?);
    drop(session);
    assert!(!device.gps_is_open()?);
    Ok(())
}
