//! End-to-end routing through the Controller: cloud answers reaching the
//! relays, hydrometer readings reaching the display, and offline gating.

use crate::mock_hw::{config_with_delays, registered_address, MockBle, RecordingRelays, ScriptedHttp};

use brewbrick::adapters::cloud::CloudClient;
use brewbrick::app::actuators::ActuatorController;
use brewbrick::app::commands::{CommsRequest, HydroCommand, HydroEvent, HydroInput};
use brewbrick::app::controller::{Controller, Recorded};
use brewbrick::app::events::{
    Connectivity, ConnectivityReport, ControllerMessage, DisplayMessage, HydroReading, TimerId,
};
use brewbrick::app::hydrometer::HydrometerManager;
use brewbrick::config::SystemConfig;
use brewbrick::error::CommsError;

const IOT_COOL_ON: &str = r#"{"epower_0_state":1,"epower_1_state":0,"next_request_ms":45000,"used_for_devices":["17"]}"#;
const DEVICE: &str = r#"{"name":"Keller","targetState":{"tempCelsius":12.5},"active":true}"#;

fn report(class: Connectivity) -> ControllerMessage {
    ControllerMessage::Connectivity(ConnectivityReport { rssi: -60, class })
}

/// Feed every queued comms request through `client`, returning its answers.
fn exchange(client: &mut CloudClient<ScriptedHttp>, out: &mut Recorded) -> Vec<ControllerMessage> {
    let mut upstream = Vec::new();
    for req in out.comms.drain(..) {
        client.handle(req, &mut upstream);
    }
    upstream
}

#[test]
fn cloud_answer_reaches_the_relays() {
    let cfg = config_with_delays((0, 0), (0, 0));
    let mut ctrl = Controller::new(&cfg);
    let mut out = Recorded::recording();
    ctrl.start(0, &mut out);
    ctrl.handle(report(Connectivity::InternetUp), 0, &mut out);
    ctrl.handle(ControllerMessage::SensorTemperature { value_x10: 185, valid: true }, 1_000, &mut out);
    ctrl.handle(ControllerMessage::TimerFired(TimerId::CloudSync), 10_000, &mut out);
    assert_eq!(
        out.comms,
        vec![
            CommsRequest::Temperature { value_x10: 185 },
            CommsRequest::CloudSync { temperature_x10: 185, actuators: 0 },
        ]
    );

    let mut client = CloudClient::new(cfg.cloud.clone(), 0x0012_3456_789a, ScriptedHttp::new(vec![Ok(IOT_COOL_ON)]));
    let upstream = exchange(&mut client, &mut out);
    assert_eq!(
        upstream[0],
        ControllerMessage::ActuatorsUpdate { bitmask: 0b01, valid: true, next_poll_ms: 45_000 }
    );
    let url = &client.http().urls[0];
    assert!(url.contains("s_number_temp_0=18.5"), "{url}");
    assert!(url.contains("a_bool_epower_0=0"), "{url}");
    assert_eq!(client.device_id(), Some("17"));

    out.display.clear();
    for msg in upstream {
        ctrl.handle(msg, 10_500, &mut out);
    }
    assert_eq!(ctrl.bitmask(), 0b01);
    assert_eq!(ctrl.timers().period_secs(TimerId::CloudSync), Some(45));
    assert!(out.display.contains(&DisplayMessage::Heartbeat { countdown: 45, max: 45, valid: true }));

    let mut actuators = ActuatorController::new(&cfg.relays, RecordingRelays::default());
    for cmd in out.actuators.drain(..) {
        actuators.handle(cmd);
    }
    let mut switched = Vec::new();
    actuators.tick(&mut switched);
    for msg in switched {
        ctrl.handle(msg, 11_000, &mut out);
    }
    assert!(out.display.contains(&DisplayMessage::Relay { id: 0, on: true }));
    assert_eq!(actuators.relays().level(0), Some(false));
}

#[test]
fn failed_cloud_call_keeps_the_relays_where_they_are() {
    let cfg = SystemConfig::default();
    let mut ctrl = Controller::new(&cfg);
    let mut out = Recorded::recording();
    ctrl.start(0, &mut out);
    ctrl.handle(report(Connectivity::LinkUp), 0, &mut out);
    ctrl.handle(
        ControllerMessage::ActuatorsUpdate { bitmask: 0b10, valid: true, next_poll_ms: 0 },
        0,
        &mut out,
    );
    ctrl.handle(ControllerMessage::SensorTemperature { value_x10: 201, valid: true }, 0, &mut out);
    out.actuators.clear();
    out.comms.retain(|r| matches!(r, CommsRequest::CloudSync { .. }));

    ctrl.handle(ControllerMessage::TimerFired(TimerId::CloudSync), 60_000, &mut out);
    let mut client =
        CloudClient::new(cfg.cloud.clone(), 1, ScriptedHttp::new(vec![Err(CommsError::RequestFailed)]));
    for msg in exchange(&mut client, &mut out) {
        ctrl.handle(msg, 60_100, &mut out);
    }
    assert_eq!(ctrl.bitmask(), 0b10);
    assert!(out.actuators.is_empty());
    assert!(out.display.contains(&DisplayMessage::Actuators { bitmask: 0, valid: false }));
}

#[test]
fn device_name_and_setpoint_reach_the_display() {
    let cfg = SystemConfig::default();
    let mut ctrl = Controller::new(&cfg);
    let mut out = Recorded::recording();
    ctrl.handle(report(Connectivity::InternetUp), 0, &mut out);
    ctrl.handle(ControllerMessage::SensorTemperature { value_x10: 180, valid: true }, 0, &mut out);
    out.comms.clear();

    let mut client = CloudClient::new(
        cfg.cloud.clone(),
        1,
        ScriptedHttp::new(vec![Ok(IOT_COOL_ON), Ok(DEVICE), Ok(DEVICE)]),
    );
    ctrl.handle(ControllerMessage::TimerFired(TimerId::CloudSync), 10_000, &mut out);
    ctrl.handle(ControllerMessage::TimerFired(TimerId::SetpointSync), 20_000, &mut out);
    for msg in exchange(&mut client, &mut out) {
        ctrl.handle(msg, 20_100, &mut out);
    }
    assert!(client.http().urls[1].contains("deviceid=17"));
    assert!(out.display.iter().any(
        |m| matches!(m, DisplayMessage::DeviceName(n) if n.as_str() == "Keller")
    ));
    assert!(out.display.contains(&DisplayMessage::Setpoint { value_x10: 125, valid: true }));

    // An unchanged name is not sent again.
    out.display.clear();
    ctrl.handle(ControllerMessage::TimerFired(TimerId::SetpointSync), 80_000, &mut out);
    for msg in exchange(&mut client, &mut out) {
        ctrl.handle(msg, 80_100, &mut out);
    }
    assert_eq!(out.display, vec![DisplayMessage::Setpoint { value_x10: 125, valid: true }]);
}

#[test]
fn hydrometer_reading_is_shown_uploaded_and_paced() {
    let cfg = SystemConfig::default();
    let mut ctrl = Controller::new(&cfg);
    let mut out = Recorded::recording();
    ctrl.start(0, &mut out);
    ctrl.handle(report(Connectivity::InternetUp), 0, &mut out);

    ctrl.poll_timers(30_000, &mut out);
    assert_eq!(out.hydro, vec![HydroInput::Command(HydroCommand::GetReading)]);

    let sample = HydroReading {
        status: 0,
        angle_x100: 2500,
        temperature_x10: 194,
        battery_x1000: 3870,
        rssi: 0,
    };
    let mut hydro = HydrometerManager::new(&cfg.hydrometer, MockBle::serving(&sample));
    let mut upstream = Vec::new();
    for input in out.hydro.drain(..) {
        hydro.step(Some(input), 30_000, &mut upstream);
    }
    let addr = registered_address();
    hydro.step(Some(HydroEvent::Advertised { address: addr, rssi: -68 }.into()), 31_000, &mut upstream);
    hydro.step(Some(HydroEvent::Connected.into()), 31_500, &mut upstream);

    out.comms.clear();
    out.display.clear();
    for msg in upstream {
        ctrl.handle(msg, 32_000, &mut out);
    }
    assert_eq!(
        out.display,
        vec![DisplayMessage::Hydrometer {
            gravity_x1000: 1000,
            temperature_x10: 194,
            battery_x1000: 3870,
            rssi: -68,
            valid: true,
        }]
    );
    assert_eq!(
        out.comms,
        vec![CommsRequest::Hydrometer { gravity_x1000: 1000, temperature_x10: 194, battery_x1000: 3870 }]
    );
    assert_eq!(ctrl.timers().period_secs(TimerId::HydroRead), Some(900));
    assert_eq!(ctrl.timers().remaining_ms(TimerId::HydroRead, 32_000), Some(900_000));

    // The next attempt finds nothing and the reading is retried sooner.
    ctrl.poll_timers(932_000, &mut out);
    let mut upstream = Vec::new();
    for input in out.hydro.drain(..) {
        hydro.step(Some(input), 932_000, &mut upstream);
    }
    hydro.step(None, 932_000 + 15_000, &mut upstream);
    for msg in upstream {
        ctrl.handle(msg, 947_000, &mut out);
    }
    assert_eq!(ctrl.timers().period_secs(TimerId::HydroRead), Some(60));
    assert!(matches!(out.display.last(), Some(DisplayMessage::Hydrometer { valid: false, .. })));
}

#[test]
fn offline_controller_sends_nothing_to_the_network() {
    let cfg = SystemConfig::default();
    let mut ctrl = Controller::new(&cfg);
    let mut out = Recorded::recording();
    ctrl.start(0, &mut out);
    ctrl.handle(ControllerMessage::SensorTemperature { value_x10: 190, valid: true }, 0, &mut out);

    for class in [Connectivity::Unconnected, Connectivity::Portal] {
        ctrl.handle(report(class), 0, &mut out);
        out.comms.clear();
        for second in 1..=180u64 {
            ctrl.poll_timers(second * 1_000, &mut out);
        }
        assert!(out.comms.is_empty(), "{class:?}: {:?}", out.comms);
        assert_eq!(ctrl.timers().period_secs(TimerId::CloudSync), Some(60));
    }
    // Hydrometer reads do not depend on the network.
    assert!(!out.hydro.is_empty());
}
