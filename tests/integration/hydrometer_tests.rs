//! Hydrometer manager scenarios: the happy path, the timeout budget and
//! inventory scans.

use crate::mock_hw::{registered_address, BleCall, MockBle};

use brewbrick::app::commands::{HydroCommand, HydroEvent};
use brewbrick::app::events::{BdAddr, ControllerMessage, HydroReading};
use brewbrick::app::hydrometer::{HydroState, HydrometerManager, ScanMode};
use brewbrick::config::SystemConfig;

fn manager(ble: MockBle) -> HydrometerManager<MockBle> {
    HydrometerManager::new(&SystemConfig::default().hydrometer, ble)
}

fn sample() -> HydroReading {
    HydroReading {
        status: 0x01,
        angle_x100: 4567,
        temperature_x10: 215,
        battery_x1000: 3912,
        rssi: 0,
    }
}

#[test]
fn get_reading_walks_the_full_sequence() {
    let mut mgr = manager(MockBle::serving(&sample()));
    let mut out = Vec::new();

    mgr.step(Some(HydroCommand::GetReading.into()), 0, &mut out);
    assert_eq!(mgr.state(), HydroState::Scanning);
    assert!(mgr.is_timeout_armed());

    let addr = registered_address();
    mgr.step(Some(HydroEvent::Advertised { address: addr, rssi: -71 }.into()), 1_200, &mut out);
    assert_eq!(mgr.state(), HydroState::Discovered);

    mgr.step(Some(HydroEvent::Connected.into()), 2_000, &mut out);
    assert_eq!(mgr.state(), HydroState::Idle);

    assert_eq!(
        mgr.history(),
        &[
            HydroState::StartScan,
            HydroState::Scanning,
            HydroState::Discovered,
            HydroState::Connected,
            HydroState::Result,
            HydroState::Idle,
        ]
    );
    let expected = HydroReading { rssi: -71, ..sample() };
    assert_eq!(out, vec![ControllerMessage::HydroReading { reading: expected, valid: true }]);
    assert_eq!(
        mgr.ble().calls,
        vec![
            BleCall::StartScan,
            BleCall::StopScan,
            BleCall::Connect(addr),
            BleCall::Read,
            BleCall::Disconnect,
        ]
    );
}

#[test]
fn missing_device_times_out_within_the_budget() {
    let mut mgr = manager(MockBle::new());
    let mut out = Vec::new();

    mgr.step(Some(HydroCommand::GetReading.into()), 10_000, &mut out);
    mgr.step(Some(HydroEvent::ScanComplete.into()), 20_000, &mut out);
    assert_eq!(mgr.state(), HydroState::Scanning, "single mode waits for the deadline");

    mgr.step(None, 24_999, &mut out);
    assert!(out.is_empty());

    mgr.step(None, 25_000, &mut out);
    assert_eq!(mgr.state(), HydroState::Idle);
    assert!(!mgr.is_timeout_armed());
    assert!(matches!(
        out.as_slice(),
        [ControllerMessage::HydroReading { valid: false, .. }]
    ));
    assert!(mgr.history().contains(&HydroState::Timeout));
    assert_eq!(mgr.ble().calls.last(), Some(&BleCall::StopScan));
}

#[test]
fn deadline_is_disarmed_once_connected() {
    // An empty record makes the read fail after the connect.
    let mut mgr = manager(MockBle::new());
    let mut out = Vec::new();
    mgr.step(Some(HydroCommand::GetReading.into()), 0, &mut out);
    mgr.step(
        Some(HydroEvent::Advertised { address: registered_address(), rssi: -60 }.into()),
        14_000,
        &mut out,
    );
    mgr.step(Some(HydroEvent::Connected.into()), 14_900, &mut out);
    assert!(!mgr.is_timeout_armed());
    assert!(matches!(
        out.as_slice(),
        [ControllerMessage::HydroReading { valid: false, .. }]
    ));
    assert!(!mgr.history().contains(&HydroState::Timeout));
}

#[test]
fn scan_start_failure_reports_invalid_immediately() {
    let mut ble = MockBle::new();
    ble.refuse_scan = true;
    let mut mgr = manager(ble);
    let mut out = Vec::new();
    mgr.step(Some(HydroCommand::GetReading.into()), 0, &mut out);
    assert_eq!(mgr.state(), HydroState::Idle);
    assert_eq!(out.len(), 1);
    assert_eq!(
        mgr.history(),
        &[HydroState::StartScan, HydroState::Timeout, HydroState::Result, HydroState::Idle]
    );
}

#[test]
fn scan_bricks_collects_until_scan_complete() {
    let mut mgr = manager(MockBle::new());
    let mut out = Vec::new();
    mgr.step(Some(HydroCommand::ScanBricks.into()), 0, &mut out);
    assert_eq!(mgr.mode(), ScanMode::EnumerateAll);

    for i in 0..3u8 {
        let address = BdAddr([0x10, 0, 0, 0, 0, i]);
        mgr.step(Some(HydroEvent::Advertised { address, rssi: -80 }.into()), 100, &mut out);
        assert_eq!(mgr.state(), HydroState::Scanning, "enumeration never stops early");
    }
    mgr.step(Some(HydroEvent::ScanComplete.into()), 10_000, &mut out);

    match out.as_slice() {
        [ControllerMessage::HydroInventory(list)] => {
            assert_eq!(list.len(), 3);
            assert_eq!(list[2], BdAddr([0x10, 0, 0, 0, 0, 2]));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!mgr.ble().calls.contains(&BleCall::Read));
}

#[test]
fn a_new_request_is_accepted_after_a_result() {
    let mut mgr = manager(MockBle::serving(&sample()));
    let mut out = Vec::new();
    mgr.step(Some(HydroCommand::GetReading.into()), 0, &mut out);
    mgr.step(None, 15_000, &mut out);
    assert_eq!(mgr.state(), HydroState::Idle);

    mgr.step(Some(HydroCommand::GetReading.into()), 75_000, &mut out);
    assert_eq!(mgr.state(), HydroState::Scanning);
    assert_eq!(mgr.history(), &[HydroState::StartScan, HydroState::Scanning]);
}
