//! WiFi manager scenarios: connect, classification, reconnection and the
//! configuration portal.

use crate::mock_hw::{MockRadio, RadioCall};

use brewbrick::app::commands::{WifiCommand, WifiEvent};
use brewbrick::app::events::{Connectivity, ControllerMessage, RSSI_UNKNOWN};
use brewbrick::app::wifi::{WifiManager, WifiState};
use brewbrick::config::SystemConfig;

fn manager() -> WifiManager<MockRadio> {
    WifiManager::new(SystemConfig::default().wifi, MockRadio::new())
}

fn connected(now_ms: u64) -> WifiManager<MockRadio> {
    let mut mgr = manager();
    mgr.handle(WifiCommand::StartWifi.into(), now_ms);
    mgr.handle(WifiEvent::Connected.into(), now_ms);
    mgr.handle(WifiEvent::GotIp.into(), now_ms);
    mgr
}

#[test]
fn start_wifi_then_got_ip_reaches_connected() {
    let mut mgr = manager();
    mgr.handle(WifiCommand::StartWifi.into(), 0);
    assert_eq!(mgr.state(), WifiState::WifiRequested);
    assert!(!mgr.is_link_up());
    assert_eq!(mgr.status_report().class, Connectivity::Unconnected);

    mgr.handle(WifiEvent::GotIp.into(), 800);
    assert_eq!(mgr.state(), WifiState::WifiConnected);
    assert!(mgr.is_link_up());
    assert_eq!(mgr.radio().count(RadioCall::Connect), 1);
}

#[test]
fn internet_up_only_after_a_link_up_report() {
    let mut mgr = connected(0);

    let first = mgr.status_report();
    assert_eq!(first.class, Connectivity::LinkUp);
    assert_eq!(first.rssi, -55);
    assert_eq!(mgr.radio().count(RadioCall::Probe), 0);

    assert_eq!(mgr.status_report().class, Connectivity::InternetUp);
    assert_eq!(mgr.status_report().class, Connectivity::InternetUp);
    assert_eq!(mgr.radio().count(RadioCall::Probe), 1);
}

#[test]
fn failed_probe_downgrades_and_retries_quickly() {
    let mut mgr = connected(0);
    mgr.status_report();
    assert_eq!(mgr.status_report().class, Connectivity::InternetUp);

    mgr.radio_mut().internet = false;
    // The next probe is due 30 reports after the last one.
    for _ in 0..29 {
        assert_eq!(mgr.status_report().class, Connectivity::InternetUp);
    }
    assert_eq!(mgr.status_report().class, Connectivity::LinkUp);
    assert_eq!(mgr.radio().count(RadioCall::Probe), 2);

    for _ in 0..2 {
        assert_eq!(mgr.status_report().class, Connectivity::LinkUp);
    }
    assert_eq!(mgr.radio().count(RadioCall::Probe), 2);
    mgr.radio_mut().internet = true;
    assert_eq!(mgr.status_report().class, Connectivity::InternetUp);
    assert_eq!(mgr.radio().count(RadioCall::Probe), 3);
}

#[test]
fn disconnect_resets_classification_and_reconnects_with_backoff() {
    let mut mgr = connected(0);
    mgr.status_report();
    assert_eq!(mgr.status_report().class, Connectivity::InternetUp);

    mgr.handle(WifiEvent::Disconnected.into(), 1_000);
    assert_eq!(mgr.state(), WifiState::Stopped);
    let report = mgr.status_report();
    assert_eq!(report.class, Connectivity::Unconnected);
    assert_eq!(report.rssi, RSSI_UNKNOWN);

    // First retry after 2 s.
    assert_eq!(mgr.retry_at_ms(), Some(3_000));
    mgr.poll(2_999);
    assert_eq!(mgr.radio().count(RadioCall::Connect), 1);
    mgr.poll(3_000);
    assert_eq!(mgr.radio().count(RadioCall::Connect), 2);
    assert_eq!(mgr.state(), WifiState::WifiRequested);

    // No IP within 20 s: give up and back off twice as long.
    mgr.poll(23_000);
    assert_eq!(mgr.state(), WifiState::Stopped);
    assert_eq!(mgr.radio().count(RadioCall::Stop), 1);
    assert_eq!(mgr.retry_at_ms(), Some(27_000));
    mgr.poll(27_000);
    assert_eq!(mgr.radio().count(RadioCall::Connect), 3);
}

#[test]
fn refused_connect_is_retried() {
    let mut radio = MockRadio::new();
    radio.refuse_connect = true;
    let mut mgr = WifiManager::new(SystemConfig::default().wifi, radio);
    mgr.handle(WifiCommand::StartWifi.into(), 0);
    assert_eq!(mgr.state(), WifiState::Stopped);
    assert_eq!(mgr.retry_at_ms(), Some(2_000));

    mgr.radio_mut().refuse_connect = false;
    mgr.poll(2_000);
    assert_eq!(mgr.state(), WifiState::WifiRequested);
}

#[test]
fn portal_branch_and_stop() {
    let mut mgr = manager();
    mgr.handle(WifiCommand::StartPortal.into(), 0);
    assert_eq!(mgr.state(), WifiState::PortalRequested);
    assert_eq!(mgr.status_report().class, Connectivity::Portal);

    mgr.handle(WifiEvent::Connected.into(), 100);
    assert_eq!(mgr.state(), WifiState::PortalConnected);

    // An IP event does not belong to the portal.
    mgr.handle(WifiEvent::GotIp.into(), 200);
    assert_eq!(mgr.state(), WifiState::PortalConnected);
    assert_eq!(mgr.status_report().class, Connectivity::Portal);

    mgr.handle(WifiCommand::Stop.into(), 300);
    assert_eq!(mgr.state(), WifiState::Stopped);
    assert_eq!(mgr.retry_at_ms(), None);
    mgr.poll(600_000);
    assert_eq!(mgr.radio().count(RadioCall::Connect), 0);
    assert_eq!(mgr.radio().count(RadioCall::StartPortal), 1);
}

#[test]
fn status_reports_are_delivered_every_interval() {
    let mut mgr = connected(0);
    let mut out = Vec::new();
    for _ in 0..3 {
        mgr.tick_second(&mut out);
    }
    let classes: Vec<Connectivity> = out
        .iter()
        .filter_map(|m| match m {
            ControllerMessage::Connectivity(r) => Some(r.class),
            _ => None,
        })
        .collect();
    assert_eq!(
        classes,
        vec![Connectivity::LinkUp, Connectivity::InternetUp, Connectivity::InternetUp]
    );
}
