//! Controller: the message hub.
//!
//! Every task reports into the Controller's inbox; the Controller keeps a
//! small cache of the latest facts, fans them out to the display and the
//! other tasks, and paces outbound network traffic with its soft timers.
//!
//! ```text
//!  sensor ──┐                       ┌──▶ display
//!  comms  ──┤     ┌────────────┐    ├──▶ actuators
//!  wifi   ──┼────▶│ Controller │────┼──▶ comms
//!  hydro  ──┤     │  + timers  │    ├──▶ wifi
//!  relays ──┘     └────────────┘    └──▶ hydro
//! ```
//!
//! The Controller never blocks on a downstream inbox: every hand-off goes
//! through an [`Outbox`], which drops the message when the target is full.

use log::{debug, info};

use crate::adapters::time::BootClock;
use crate::config::{GravityCalibration, SystemConfig, TimingConfig};
use crate::queue::Queue;
use crate::timer::SoftTimers;

use super::commands::{
    ActuatorCommand, CommsRequest, HydroCommand, HydroInput, WifiCommand, WifiInput,
};
use super::events::{
    Connectivity, ConnectivityReport, ControllerMessage, DisplayMessage, HydroReading,
    RSSI_UNKNOWN, TimerId,
};
use super::ports::Outbox;

/// Server-provided poll interval bounds, in seconds.
const MIN_POLL_SECS: u32 = 1;
const MAX_POLL_SECS: u32 = 255;

// ───────────────────────────────────────────────────────────────
// Downstream outboxes
// ───────────────────────────────────────────────────────────────

/// The five inboxes the Controller feeds.
pub struct Downstream<D, A, C, W, H> {
    pub display: D,
    pub actuators: A,
    pub comms: C,
    pub wifi: W,
    pub hydro: H,
}

/// Downstream made of recording vectors, for tests and host tooling.
pub type Recorded = Downstream<
    Vec<DisplayMessage>,
    Vec<ActuatorCommand>,
    Vec<CommsRequest>,
    Vec<WifiInput>,
    Vec<HydroInput>,
>;

impl Recorded {
    pub fn recording() -> Self {
        Self {
            display: Vec::new(),
            actuators: Vec::new(),
            comms: Vec::new(),
            wifi: Vec::new(),
            hydro: Vec::new(),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Controller
// ───────────────────────────────────────────────────────────────

pub struct Controller {
    timing: TimingConfig,
    calibration: GravityCalibration,
    hydro_enabled: bool,
    boot_into_portal: bool,
    timers: SoftTimers,

    temperature_x10: i16,
    temperature_valid: bool,
    bitmask: u8,
    // Last backend answer as displayed, valid or not.
    shown_bitmask: u8,
    actuators_valid: bool,
    connectivity: ConnectivityReport,
    heartbeat_max: u16,
    heartbeat_valid: bool,
}

impl Controller {
    pub fn new(cfg: &SystemConfig) -> Self {
        Self {
            timing: cfg.timing.clone(),
            calibration: cfg.hydrometer.calibration,
            hydro_enabled: cfg.hydrometer.enabled,
            boot_into_portal: cfg.wifi.boot_into_portal,
            timers: SoftTimers::new(),
            temperature_x10: 0,
            temperature_valid: false,
            bitmask: 0,
            shown_bitmask: 0,
            actuators_valid: false,
            connectivity: ConnectivityReport {
                rssi: RSSI_UNKNOWN,
                class: Connectivity::Unconnected,
            },
            heartbeat_max: 0,
            heartbeat_valid: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn timers(&self) -> &SoftTimers {
        &self.timers
    }

    pub fn bitmask(&self) -> u8 {
        self.bitmask
    }

    pub fn temperature(&self) -> (i16, bool) {
        (self.temperature_x10, self.temperature_valid)
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity.class
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Bring the network up, greet the user and arm the timers.
    pub fn start<D, A, C, W, H>(&mut self, now_ms: u64, out: &mut Downstream<D, A, C, W, H>)
    where
        D: Outbox<DisplayMessage>,
        W: Outbox<WifiInput>,
    {
        let cmd = if self.boot_into_portal {
            WifiCommand::StartPortal
        } else {
            WifiCommand::StartWifi
        };
        info!("Ctrl: starting, {:?}", cmd);
        out.wifi.deliver(cmd.into());
        out.display.deliver(DisplayMessage::Status("Welcome !"));

        let t = &self.timing;
        self.timers.arm(TimerId::CloudSync, t.cloud_first_secs, t.cloud_default_secs, now_ms);
        self.timers.arm(
            TimerId::SetpointSync,
            t.setpoint_first_secs,
            t.setpoint_interval_secs,
            now_ms,
        );
        self.timers.arm(TimerId::TimeSync, t.time_first_secs, t.time_interval_secs, now_ms);
        if self.hydro_enabled {
            self.timers.arm(TimerId::HydroRead, t.hydro_first_secs, t.hydro_healthy_secs, now_ms);
        }
        self.timers.arm(
            TimerId::DisplayRefresh,
            t.display_refresh_secs,
            t.display_refresh_secs,
            now_ms,
        );
    }

    /// Handle every timer that has come due.
    pub fn poll_timers<D, A, C, W, H>(&mut self, now_ms: u64, out: &mut Downstream<D, A, C, W, H>)
    where
        D: Outbox<DisplayMessage>,
        A: Outbox<ActuatorCommand>,
        C: Outbox<CommsRequest>,
        W: Outbox<WifiInput>,
        H: Outbox<HydroInput>,
    {
        for id in self.timers.expired(now_ms) {
            self.handle(ControllerMessage::TimerFired(id), now_ms, out);
        }
    }

    // ── Routing ──────────────────────────────────────────────

    pub fn handle<D, A, C, W, H>(
        &mut self,
        msg: ControllerMessage,
        now_ms: u64,
        out: &mut Downstream<D, A, C, W, H>,
    ) where
        D: Outbox<DisplayMessage>,
        A: Outbox<ActuatorCommand>,
        C: Outbox<CommsRequest>,
        W: Outbox<WifiInput>,
        H: Outbox<HydroInput>,
    {
        match msg {
            ControllerMessage::SensorTemperature { value_x10, valid } => {
                self.temperature_x10 = value_x10;
                self.temperature_valid = valid;
                if valid {
                    out.comms.deliver(CommsRequest::Temperature { value_x10 });
                }
                out.display.deliver(DisplayMessage::Temperature { value_x10, valid });
            }

            ControllerMessage::ActuatorsUpdate { bitmask, valid, next_poll_ms } => {
                self.shown_bitmask = bitmask;
                self.actuators_valid = valid;
                out.display.deliver(DisplayMessage::Actuators { bitmask, valid });
                if !valid {
                    return;
                }
                if bitmask != self.bitmask {
                    info!("Ctrl: actuators {:#04b} -> {:#04b}", self.bitmask, bitmask);
                    self.bitmask = bitmask;
                    out.actuators.deliver(ActuatorCommand::SetBitmask(bitmask));
                }
                let period = self.poll_period_secs(next_poll_ms);
                self.timers.reschedule(TimerId::CloudSync, period, now_ms);
            }

            ControllerMessage::SetpointUpdate { value_x10, valid } => {
                out.display.deliver(DisplayMessage::Setpoint { value_x10, valid });
            }

            ControllerMessage::DeviceName(name) => {
                info!("Ctrl: device name \"{}\"", name);
                out.display.deliver(DisplayMessage::DeviceName(name));
            }

            ControllerMessage::TimeUpdate { hour, minute, valid } => {
                out.display.deliver(DisplayMessage::Time { hour, minute, valid });
            }

            ControllerMessage::Heartbeat { countdown, max, valid } => {
                self.heartbeat_max = max;
                self.heartbeat_valid = valid;
                out.display.deliver(DisplayMessage::Heartbeat { countdown, max, valid });
            }

            ControllerMessage::ActuatorDelay { id, requested, remaining } => {
                out.display.deliver(DisplayMessage::Delay { id, requested, remaining });
            }

            ControllerMessage::ActuatorSwitched { id, on } => {
                out.display.deliver(DisplayMessage::Relay { id, on });
            }

            ControllerMessage::Connectivity(report) => {
                if report.class != self.connectivity.class {
                    info!("Ctrl: connectivity {:?} -> {:?}", self.connectivity.class, report.class);
                }
                self.connectivity = report;
                out.display.deliver(DisplayMessage::Wifi {
                    rssi: report.rssi,
                    glyph: report.class.glyph(),
                });
            }

            ControllerMessage::HydroReading { reading, valid } => {
                self.on_hydro_reading(reading, valid, now_ms, out);
            }

            ControllerMessage::HydroInventory(list) => {
                info!("Ctrl: {} hydrometer(s) in range", list.len());
                out.display.deliver(DisplayMessage::HydroInventory(list));
            }

            ControllerMessage::TimerFired(id) => self.on_timer(id, now_ms, out),
        }
    }

    fn poll_period_secs(&self, next_poll_ms: u32) -> u32 {
        if next_poll_ms == 0 {
            self.timing.cloud_default_secs
        } else {
            (next_poll_ms / 1000).clamp(MIN_POLL_SECS, MAX_POLL_SECS)
        }
    }

    fn on_hydro_reading<D, A, C, W, H>(
        &mut self,
        reading: HydroReading,
        valid: bool,
        now_ms: u64,
        out: &mut Downstream<D, A, C, W, H>,
    ) where
        D: Outbox<DisplayMessage>,
        C: Outbox<CommsRequest>,
    {
        if valid {
            let gravity_x1000 = self.calibration.gravity_x1000(reading.angle_x100);
            out.display.deliver(DisplayMessage::Hydrometer {
                gravity_x1000,
                temperature_x10: reading.temperature_x10,
                battery_x1000: reading.battery_x1000,
                rssi: reading.rssi,
                valid: true,
            });
            if self.connectivity.class.is_online() {
                out.comms.deliver(CommsRequest::Hydrometer {
                    gravity_x1000,
                    temperature_x10: reading.temperature_x10,
                    battery_x1000: reading.battery_x1000,
                });
            }
            if self.hydro_enabled {
                self.timers
                    .reschedule(TimerId::HydroRead, self.timing.hydro_healthy_secs, now_ms);
            }
        } else {
            out.display.deliver(DisplayMessage::Hydrometer {
                gravity_x1000: 0,
                temperature_x10: 0,
                battery_x1000: 0,
                rssi: reading.rssi,
                valid: false,
            });
            if self.hydro_enabled {
                self.timers
                    .reschedule(TimerId::HydroRead, self.timing.hydro_retry_secs, now_ms);
            }
        }
    }

    fn on_timer<D, A, C, W, H>(
        &mut self,
        id: TimerId,
        now_ms: u64,
        out: &mut Downstream<D, A, C, W, H>,
    ) where
        D: Outbox<DisplayMessage>,
        C: Outbox<CommsRequest>,
        H: Outbox<HydroInput>,
    {
        let online = self.connectivity.class.is_online();
        match id {
            TimerId::CloudSync => {
                if !online || !self.temperature_valid {
                    debug!(
                        "Ctrl: cloud sync skipped (online={}, temperature valid={})",
                        online, self.temperature_valid
                    );
                    self.timers
                        .reschedule(id, self.timing.cloud_default_secs, now_ms);
                    return;
                }
                out.comms.deliver(CommsRequest::CloudSync {
                    temperature_x10: self.temperature_x10,
                    actuators: self.bitmask,
                });
            }
            TimerId::SetpointSync if online => out.comms.deliver(CommsRequest::SetpointSync),
            TimerId::TimeSync if online => out.comms.deliver(CommsRequest::TimeSync),
            TimerId::SetpointSync | TimerId::TimeSync => {
                debug!("Ctrl: {:?} skipped, offline", id);
            }
            TimerId::HydroRead => out.hydro.deliver(HydroCommand::GetReading.into()),
            TimerId::DisplayRefresh => self.refresh_display(now_ms, out),
        }
    }

    fn refresh_display<D, A, C, W, H>(&self, now_ms: u64, out: &mut Downstream<D, A, C, W, H>)
    where
        D: Outbox<DisplayMessage>,
    {
        out.display.deliver(DisplayMessage::Temperature {
            value_x10: self.temperature_x10,
            valid: self.temperature_valid,
        });
        out.display.deliver(DisplayMessage::Actuators {
            bitmask: self.shown_bitmask,
            valid: self.actuators_valid,
        });
        let countdown = self
            .timers
            .remaining_ms(TimerId::CloudSync, now_ms)
            .map_or(0, |ms| (ms / 1000).min(u64::from(u16::MAX)) as u16);
        out.display.deliver(DisplayMessage::Heartbeat {
            countdown,
            max: self.heartbeat_max,
            valid: self.heartbeat_valid,
        });
    }
}

// ───────────────────────────────────────────────────────────────
// Task body
// ───────────────────────────────────────────────────────────────

/// Controller task: receive with a short wait, route, then run timers.
pub fn run<
    const N: usize,
    const ND: usize,
    const NA: usize,
    const NC: usize,
    const NW: usize,
    const NH: usize,
>(
    mut ctrl: Controller,
    inbox: &Queue<ControllerMessage, N>,
    mut out: Downstream<
        &Queue<DisplayMessage, ND>,
        &Queue<ActuatorCommand, NA>,
        &Queue<CommsRequest, NC>,
        &Queue<WifiInput, NW>,
        &Queue<HydroInput, NH>,
    >,
    wait: core::time::Duration,
    clock: BootClock,
) -> ! {
    ctrl.start(clock.now_ms(), &mut out);
    loop {
        if let Some(msg) = inbox.receive(wait) {
            ctrl.handle(msg, clock.now_ms(), &mut out);
        }
        ctrl.poll_timers(clock.now_ms(), &mut out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::DeviceName;

    fn online(ctrl: &mut Controller, out: &mut Recorded) {
        ctrl.handle(
            ControllerMessage::Connectivity(ConnectivityReport {
                rssi: -60,
                class: Connectivity::InternetUp,
            }),
            0,
            out,
        );
    }

    #[test]
    fn start_requests_wifi_and_greets() {
        let mut ctrl = Controller::new(&SystemConfig::default());
        let mut out = Recorded::recording();
        ctrl.start(0, &mut out);
        assert_eq!(out.wifi, vec![WifiCommand::StartWifi.into()]);
        assert_eq!(out.display, vec![DisplayMessage::Status("Welcome !")]);
        assert!(ctrl.timers().is_armed(TimerId::HydroRead));
    }

    #[test]
    fn portal_boot_and_disabled_hydrometer() {
        let mut cfg = SystemConfig::default();
        cfg.wifi.boot_into_portal = true;
        cfg.hydrometer.enabled = false;
        let mut ctrl = Controller::new(&cfg);
        let mut out = Recorded::recording();
        ctrl.start(0, &mut out);
        assert_eq!(out.wifi, vec![WifiCommand::StartPortal.into()]);
        assert!(!ctrl.timers().is_armed(TimerId::HydroRead));
    }

    #[test]
    fn invalid_temperature_reaches_display_only() {
        let mut ctrl = Controller::new(&SystemConfig::default());
        let mut out = Recorded::recording();
        ctrl.handle(
            ControllerMessage::SensorTemperature { value_x10: 185, valid: false },
            0,
            &mut out,
        );
        assert!(out.comms.is_empty());
        assert_eq!(
            out.display,
            vec![DisplayMessage::Temperature { value_x10: 185, valid: false }]
        );
    }

    #[test]
    fn bitmask_republished_only_on_change() {
        let mut ctrl = Controller::new(&SystemConfig::default());
        let mut out = Recorded::recording();
        let update = |bitmask| ControllerMessage::ActuatorsUpdate {
            bitmask,
            valid: true,
            next_poll_ms: 0,
        };
        ctrl.handle(update(0b01), 0, &mut out);
        ctrl.handle(update(0b01), 0, &mut out);
        ctrl.handle(update(0b10), 0, &mut out);
        assert_eq!(
            out.actuators,
            vec![ActuatorCommand::SetBitmask(0b01), ActuatorCommand::SetBitmask(0b10)]
        );
    }

    #[test]
    fn stale_bitmask_is_not_adopted() {
        let mut ctrl = Controller::new(&SystemConfig::default());
        let mut out = Recorded::recording();
        ctrl.handle(
            ControllerMessage::ActuatorsUpdate { bitmask: 0b11, valid: false, next_poll_ms: 5000 },
            0,
            &mut out,
        );
        assert_eq!(ctrl.bitmask(), 0);
        assert!(out.actuators.is_empty());
        assert_eq!(out.display, vec![DisplayMessage::Actuators { bitmask: 0b11, valid: false }]);
    }

    #[test]
    fn server_poll_interval_is_clamped() {
        let mut ctrl = Controller::new(&SystemConfig::default());
        let mut out = Recorded::recording();
        ctrl.start(0, &mut out);
        let update = |next_poll_ms| ControllerMessage::ActuatorsUpdate {
            bitmask: 0,
            valid: true,
            next_poll_ms,
        };
        ctrl.handle(update(30_000), 0, &mut out);
        assert_eq!(ctrl.timers().period_secs(TimerId::CloudSync), Some(30));
        ctrl.handle(update(999_000), 0, &mut out);
        assert_eq!(ctrl.timers().period_secs(TimerId::CloudSync), Some(255));
        ctrl.handle(update(10), 0, &mut out);
        assert_eq!(ctrl.timers().period_secs(TimerId::CloudSync), Some(1));
        ctrl.handle(update(0), 0, &mut out);
        assert_eq!(ctrl.timers().period_secs(TimerId::CloudSync), Some(60));
    }

    #[test]
    fn device_name_is_moved_to_display() {
        let mut ctrl = Controller::new(&SystemConfig::default());
        let mut out = Recorded::recording();
        ctrl.handle(ControllerMessage::DeviceName(DeviceName::new("Keller")), 0, &mut out);
        match out.display.pop() {
            Some(DisplayMessage::DeviceName(n)) => assert_eq!(n.as_str(), "Keller"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cloud_sync_needs_network_and_temperature() {
        let mut ctrl = Controller::new(&SystemConfig::default());
        let mut out = Recorded::recording();
        ctrl.handle(ControllerMessage::TimerFired(TimerId::CloudSync), 0, &mut out);
        assert!(out.comms.is_empty());

        online(&mut ctrl, &mut out);
        ctrl.handle(ControllerMessage::TimerFired(TimerId::CloudSync), 0, &mut out);
        assert!(out.comms.is_empty());

        ctrl.handle(
            ControllerMessage::SensorTemperature { value_x10: 192, valid: true },
            0,
            &mut out,
        );
        out.comms.clear();
        ctrl.handle(ControllerMessage::TimerFired(TimerId::CloudSync), 0, &mut out);
        assert_eq!(
            out.comms,
            vec![CommsRequest::CloudSync { temperature_x10: 192, actuators: 0 }]
        );
    }

    #[test]
    fn hydro_retry_is_faster_than_healthy_cadence() {
        let mut ctrl = Controller::new(&SystemConfig::default());
        let mut out = Recorded::recording();
        ctrl.start(0, &mut out);
        ctrl.handle(
            ControllerMessage::HydroReading { reading: HydroReading::default(), valid: false },
            0,
            &mut out,
        );
        assert_eq!(ctrl.timers().period_secs(TimerId::HydroRead), Some(60));
        let reading = HydroReading { angle_x100: 2500, ..HydroReading::default() };
        ctrl.handle(ControllerMessage::HydroReading { reading, valid: true }, 0, &mut out);
        assert_eq!(ctrl.timers().period_secs(TimerId::HydroRead), Some(900));
        assert!(matches!(
            out.display.last(),
            Some(DisplayMessage::Hydrometer { gravity_x1000: 1000, valid: true, .. })
        ));
    }

    #[test]
    fn display_refresh_reports_cloud_countdown() {
        let mut ctrl = Controller::new(&SystemConfig::default());
        let mut out = Recorded::recording();
        ctrl.start(0, &mut out);
        out.display.clear();
        ctrl.poll_timers(1000, &mut out);
        assert_eq!(
            out.display.last(),
            Some(&DisplayMessage::Heartbeat { countdown: 9, max: 0, valid: false })
        );
        assert!(out.display.contains(&DisplayMessage::Actuators { bitmask: 0, valid: false }));
    }

    #[test]
    fn display_refresh_keeps_stale_actuators_stale() {
        let mut ctrl = Controller::new(&SystemConfig::default());
        let mut out = Recorded::recording();
        ctrl.start(0, &mut out);
        let update = |bitmask, valid| ControllerMessage::ActuatorsUpdate {
            bitmask,
            valid,
            next_poll_ms: 0,
        };
        ctrl.handle(update(0b01, true), 0, &mut out);
        ctrl.handle(update(0b11, false), 500, &mut out);
        out.display.clear();
        ctrl.poll_timers(1000, &mut out);
        assert!(out.display.contains(&DisplayMessage::Actuators { bitmask: 0b11, valid: false }));
        assert_eq!(ctrl.bitmask(), 0b01);

        ctrl.handle(update(0b01, true), 1500, &mut out);
        out.display.clear();
        ctrl.poll_timers(2000, &mut out);
        assert!(out.display.contains(&DisplayMessage::Actuators { bitmask: 0b01, valid: true }));
    }
}
