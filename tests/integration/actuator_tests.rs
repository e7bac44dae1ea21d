//! Actuator controller scenarios: dwell delays, polarity, and per-relay
//! delay seeding.

use crate::mock_hw::{config_with_delays, RecordingRelays};

use brewbrick::app::actuators::ActuatorController;
use brewbrick::app::commands::ActuatorCommand;
use brewbrick::app::events::ControllerMessage;

fn controller(relay0: (u16, u16), relay1: (u16, u16)) -> ActuatorController<RecordingRelays> {
    let cfg = config_with_delays(relay0, relay1);
    ActuatorController::new(&cfg.relays, RecordingRelays::default())
}

#[test]
fn on_delay_of_200_switches_at_tick_200() {
    let mut ctrl = controller((200, 30), (0, 0));
    let mut out = Vec::new();
    assert_eq!(ctrl.actuator(0).unwrap().on_remaining, 200);

    ctrl.handle(ActuatorCommand::SetBitmask(0b01));

    // Ticks 0..=199.
    for _ in 0..200 {
        ctrl.tick(&mut out);
    }
    assert!(!ctrl.actuator(0).unwrap().actual, "still held at tick 199");

    // Tick 200.
    ctrl.tick(&mut out);
    let a = ctrl.actuator(0).unwrap();
    assert!(a.actual, "switched on at tick 200");
    assert_eq!(a.off_remaining, 30, "off delay re-armed to its configured value");
    assert!(out.contains(&ControllerMessage::ActuatorSwitched { id: 0, on: true }));
    // Active-low relay: on is a low level.
    assert_eq!(ctrl.relays().level(0), Some(false));
}

#[test]
fn delay_countdown_is_reported_while_pending() {
    let mut ctrl = controller((3, 0), (0, 0));
    let mut out = Vec::new();
    ctrl.handle(ActuatorCommand::SetBitmask(0b01));
    for _ in 0..4 {
        ctrl.tick(&mut out);
    }
    let countdown: Vec<u16> = out
        .iter()
        .filter_map(|m| match m {
            ControllerMessage::ActuatorDelay { id: 0, requested: true, remaining } => {
                Some(*remaining)
            }
            _ => None,
        })
        .collect();
    assert_eq!(countdown, vec![3, 2, 1, 0]);
    assert!(ctrl.actuator(0).unwrap().actual);
}

#[test]
fn short_toggle_does_not_short_cycle_the_compressor() {
    let mut ctrl = controller((10, 0), (0, 0));
    let mut out = Vec::new();
    // Let the boot-time restart delay run out.
    for _ in 0..10 {
        ctrl.tick(&mut out);
    }
    ctrl.handle(ActuatorCommand::SetBitmask(0b01));
    ctrl.tick(&mut out);
    assert!(ctrl.actuator(0).unwrap().actual);
    ctrl.handle(ActuatorCommand::SetBitmask(0b00));
    ctrl.tick(&mut out);
    assert!(!ctrl.actuator(0).unwrap().actual);
    ctrl.handle(ActuatorCommand::SetBitmask(0b01));
    for _ in 0..10 {
        ctrl.tick(&mut out);
        assert!(!ctrl.actuator(0).unwrap().actual, "restart delay not honoured");
    }
    ctrl.tick(&mut out);
    assert!(ctrl.actuator(0).unwrap().actual);
}

/// Relay 1 must take its off delay from its own config entry, not from
/// relay 0's.
#[test]
fn off_delay_is_seeded_per_actuator() {
    let ctrl = controller((5, 7), (11, 13));
    assert_eq!(ctrl.actuator(0).unwrap().off_remaining, 7);
    assert_eq!(ctrl.actuator(1).unwrap().off_remaining, 13);
    assert_eq!(ctrl.actuator(1).unwrap().off_delay, 13);
}

#[test]
fn both_relays_follow_the_bitmask_independently() {
    let mut ctrl = controller((0, 0), (2, 0));
    let mut out = Vec::new();
    ctrl.handle(ActuatorCommand::SetBitmask(0b11));
    ctrl.tick(&mut out);
    assert_eq!(ctrl.actual_mask(), 0b01);
    ctrl.tick(&mut out);
    ctrl.tick(&mut out);
    assert_eq!(ctrl.actual_mask(), 0b11);
}
