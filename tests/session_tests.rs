//! Integration tests for enumeration, subsystem state and session teardown.
//!
//! These run against the in-memory mock transport and need no hardware.

use neovi_mic2::mock::{MockCapture, MockTransport};
use neovi_mic2::{
    device_find_all, AbiFingerprint, AudioState, Coordinate, Device, Dms, Enumerator, Error,
    ErrorCode, ErrorKind, GpsFix, Hemisphere, NavigationStatus, Satellite, Session, Subsystem,
};
use std::rc::Rc;

/// Helper function to build a transport with the given units attached
fn transport_with(units: &[(&str, bool)]) -> Rc<MockTransport> {
    let transport = Rc::new(MockTransport::new());
    for (serial, has_gps) in units {
        transport.add_device(serial, *has_gps);
    }
    transport
}

fn first_device(transport: &Rc<MockTransport>) -> Device {
    device_find_all(transport.clone())
        .expect("enumeration failed")
        .remove(0)
}

#[test]
fn test_enumerate_three_devices_with_capacity_ten() {
    let transport = transport_with(&[("MC1003", true), ("MC1001", false), ("MC1002", true)]);
    let devices = Enumerator::new(transport)
        .enumerate(10, AbiFingerprint::current())
        .unwrap();

    assert_eq!(devices.len(), 3);
    let mut serials: Vec<&str> = devices.iter().map(|d| d.serial_number()).collect();
    serials.dedup();
    assert_eq!(serials.len(), 3, "serial numbers must be distinct");
}

#[test]
fn test_enumerate_count_never_exceeds_capacity() {
    let transport = transport_with(&[
        ("MC0001", true),
        ("MC0002", false),
        ("MC0003", true),
        ("MC0004", false),
    ]);
    let enumerator = Enumerator::new(transport);
    for capacity in 0..6 {
        let devices = enumerator
            .enumerate(capacity, AbiFingerprint::current())
            .unwrap();
        assert!(devices.len() <= capacity);
        assert_eq!(devices.len(), capacity.min(4));
    }
}

#[test]
fn test_enumerate_nothing_attached() {
    let transport = transport_with(&[]);
    assert!(device_find_all(transport).unwrap().is_empty());
}

#[test]
fn test_abi_mismatch_is_invalid_parameter() {
    let transport = transport_with(&[("MC0001", true)]);
    let current = AbiFingerprint::current();
    for abi in [
        AbiFingerprint {
            version: current.version + 1,
            ..current
        },
        AbiFingerprint {
            size: current.size - 1,
            ..current
        },
    ] {
        let err = Enumerator::new(transport.clone())
            .enumerate(10, abi)
            .unwrap_err();
        assert!(matches!(err, Error::AbiMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }
    assert_eq!(transport.discover_calls(), 0);
}

#[test]
fn test_find_by_serial() {
    let transport = transport_with(&[("MC0001", false), ("MC0002", true)]);
    let enumerator = Enumerator::new(transport);
    assert!(enumerator.find_by_serial("MC0002").unwrap().has_gps());
    match enumerator.find_by_serial("MC9999").unwrap_err() {
        Error::DeviceNotFound { serial, .. } => assert_eq!(serial, "MC9999"),
        e => panic!("Expected DeviceNotFound error, got: {:?}", e),
    }
}

#[test]
fn test_close_after_close_is_success() {
    let transport = transport_with(&[("MC0001", true)]);
    let device = first_device(&transport);

    // Never opened
    device.io_close().unwrap();
    device.gps_close().unwrap();

    device.io_open().unwrap();
    device.gps_open().unwrap();
    device.io_close().unwrap();
    device.gps_close().unwrap();
    device.io_close().unwrap();
    device.gps_close().unwrap();
}

#[test]
fn test_closed_operations_fail() {
    let transport = transport_with(&[("MC0001", true)]);
    let device = first_device(&transport);

    let results = [
        device.io_button_is_pressed().map(|_| ()),
        device.io_buzzer_enable(true),
        device.io_buzzer_is_enabled().map(|_| ()),
        device.io_gps_led_enable(true),
        device.io_gps_led_is_enabled().map(|_| ()),
        device.gps_has_lock().map(|_| ()),
        device.gps_info().map(|_| ()),
    ];
    for result in results {
        let err = result.unwrap_err();
        assert!(matches!(err, Error::SubsystemClosed(_)), "got {:?}", err);
        assert_eq!(err.code(), ErrorCode::Failure);
    }
    assert_eq!(transport.report_reads("MC0001"), 0);
}

#[test]
fn test_buzzer_scenario() {
    let transport = transport_with(&[("MC0001", false)]);
    let device = first_device(&transport);

    device.io_open().unwrap();
    device.io_buzzer_enable(true).unwrap();
    assert!(device.io_buzzer_is_enabled().unwrap());
    device.io_buzzer_enable(false).unwrap();
    assert!(!device.io_buzzer_is_enabled().unwrap());
    device.io_close().unwrap();

    assert!(matches!(
        device.io_buzzer_is_enabled(),
        Err(Error::SubsystemClosed(Subsystem::Io))
    ));
}

#[test]
fn test_gps_info_without_receiver_never_reads() {
    let transport = transport_with(&[("MC0001", false)]);
    let device = first_device(&transport);

    let err = device.gps_info().unwrap_err();
    assert!(matches!(err, Error::UnsupportedFeature(_)));
    assert_eq!(err.code(), ErrorCode::Failure);
    assert!(device.gps_open().is_err());
    assert!(device.gps_info().is_err());
    assert_eq!(transport.report_reads("MC0001"), 0);
}

#[test]
fn test_session_teardown_closes_subsystems() {
    let transport = transport_with(&[("MC0001", true)]);
    let device = first_device(&transport);
    let retained = device.clone();

    {
        let session = Session::new(device).unwrap();
        session.gps_open().unwrap();
        session.io_open().unwrap();
        assert!(session.io_is_open().unwrap());
    }

    assert!(!retained.io_is_open().unwrap());
    assert!(!retained.gps_is_open().unwrap());
    assert!(!transport.is_open("MC0001", Subsystem::Io));
    assert!(!transport.is_open("MC0001", Subsystem::Gps));
}

#[test]
fn test_session_teardown_on_early_return() {
    fn fails_midway(device: Device) -> neovi_mic2::Result<()> {
        let session = Session::new(device)?;
        session.io_open()?;
        session.gps_open()?;
        Err(Error::NotRecording)
    }

    let transport = transport_with(&[("MC0001", true)]);
    let device = first_device(&transport);
    assert!(fails_midway(device.clone()).is_err());
    assert!(!device.io_is_open().unwrap());
    assert!(!device.gps_is_open().unwrap());
    // The claim is gone too
    Session::new(device).unwrap().close();
}

#[test]
fn test_session_stops_recording() {
    let transport = transport_with(&[("MC0001", true)]);
    let capture = Rc::new(MockCapture::new());
    let device = Enumerator::new(transport)
        .with_capture(capture.clone())
        .find_all()
        .unwrap()
        .remove(0);

    let session = Session::new(device.clone()).unwrap();
    session.audio_start(48_000).unwrap();
    assert!(capture.is_recording("MC0001"));
    session.close();

    assert!(!capture.is_recording("MC0001"));
    assert_eq!(device.audio_state().unwrap(), AudioState::Captured);
    device.audio_save("after-session.wav").unwrap();
}

#[test]
fn test_two_sessions_cannot_share_a_device() {
    let transport = transport_with(&[("MC0001", true)]);
    let device = first_device(&transport);
    let session = Session::new(device.clone()).unwrap();
    session.io_open().unwrap();

    let err = Session::new(device.clone()).unwrap_err();
    assert!(matches!(err, Error::DeviceBusy(_)));
    // The failed attempt left the first session's state alone
    assert!(session.io_is_open().unwrap());
}

#[test]
fn test_reenumerated_device_cannot_get_second_session() {
    let transport = transport_with(&[("MC0001", true)]);
    let first = first_device(&transport);
    let second = first_device(&transport);

    let session = Session::new(first).unwrap();
    session.io_open().unwrap();

    match Session::new(second.clone()) {
        Err(Error::DeviceBusy(serial)) => assert_eq!(serial, "MC0001"),
        other => panic!("Expected DeviceBusy error, got: {:?}", other),
    }
    // Both handles see the interface the session opened
    assert!(second.io_is_open().unwrap());
    assert!(transport.is_open("MC0001", Subsystem::Io));

    session.close();
    assert!(!second.io_is_open().unwrap());
    Session::new(second).unwrap();
}

#[test]
fn test_released_handle_is_invalid_parameter() {
    let transport = transport_with(&[("MC0001", true)]);
    let device = first_device(&transport);
    device.io_open().unwrap();
    device.release();

    assert!(!transport.is_open("MC0001", Subsystem::Io));
    let err = device.io_is_open().unwrap_err();
    assert!(matches!(err, Error::Released(_)));
    assert_eq!(err.code(), ErrorCode::InvalidParameter);
    assert_eq!(
        device.gps_open().unwrap_err().kind(),
        ErrorKind::InvalidParameter
    );
}

#[test]
fn test_transport_failure_is_reported_not_retried() {
    let transport = transport_with(&[("MC0001", false)]);
    let device = first_device(&transport);
    device.io_open().unwrap();
    transport.fail_reports("MC0001", true);

    let reads_before = transport.report_reads("MC0001");
    let err = device.io_button_is_pressed().unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(transport.report_reads("MC0001"), reads_before + 1);
    // State is unchanged by the failed read
    assert!(device.io_is_open().unwrap());
}

#[test]
fn test_gps_fix_with_two_satellites() {
    let transport = transport_with(&[("MC0001", true)]);
    let mut fix = GpsFix {
        latitude: Coordinate {
            dms: Dms::new(42, 30, 0),
            hemisphere: Hemisphere::North,
            valid: true,
        },
        longitude: Coordinate {
            dms: Dms::new(83, 15, 36),
            hemisphere: Hemisphere::West,
            valid: true,
        },
        nav_status: NavigationStatus::StandAlone2D,
        ..GpsFix::default()
    };
    fix.satellites.push(Satellite {
        prn: 5,
        snr: Some(38),
        used: true,
        azimuth: Some(120),
        elevation: Some(45),
        lock_time: 64,
    });
    fix.satellites.push(Satellite {
        prn: 17,
        snr: None,
        used: false,
        ..Satellite::default()
    });
    transport.set_fix("MC0001", fix);

    let session = Session::new(first_device(&transport)).unwrap();
    session.gps_open().unwrap();
    let info = session.gps_info().unwrap();

    assert_eq!(info.satellite_count(), 2);
    assert_eq!(info.satellites.len(), 2);
    assert!(info.satellites.get(5).is_none());
    assert_eq!(info.satellites.capacity(), 16);
    assert_eq!(info.satellites[1].prn, 17);
    assert_eq!(info.satellites[0].azimuth, Some(120));
    assert_eq!(info.satellites[0].elevation, Some(45));
    assert_eq!(info.satellites[1].azimuth, None);
    assert!(session.gps_has_lock().unwrap());
    let longitude = info.longitude.to_signed_decimal().unwrap();
    assert!((longitude + 83.26).abs() < 1e-9);
}
