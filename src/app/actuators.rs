//! Delay-protected relay outputs.
//!
//! Each actuator tracks what the backend *requested* and what the relay
//! *actually* does. The two only converge once the relevant dwell counter
//! has run down to zero:
//!
//! ```text
//!            requested && on_remaining == 0
//!    ┌─────┐ ────────────────────────────────▶ ┌────┐
//!    │ OFF │                                   │ ON │
//!    └─────┘ ◀──────────────────────────────── └────┘
//!           !requested && off_remaining == 0
//!
//!   switching on arms off_remaining, switching off arms on_remaining
//! ```
//!
//! Counters tick down once per control tick whether or not a change is
//! requested, so the dwell time is measured from the last transition. Both
//! counters start armed at boot, so a reboot loop cannot short-cycle a
//! compressor.

use core::time::Duration;
use std::time::Instant;

use log::{info, warn};

use crate::config::{ActiveLevel, RelayConfig, RELAY_COUNT};
use crate::queue::Queue;

use super::commands::ActuatorCommand;
use super::events::ControllerMessage;
use super::ports::{Outbox, RelayPort};

/// State of one delay-protected output.
#[derive(Debug, Clone)]
pub struct Actuator {
    pub label: heapless::String<8>,
    pub requested: bool,
    pub actual: bool,
    pub on_remaining: u16,
    pub off_remaining: u16,
    pub on_delay: u16,
    pub off_delay: u16,
    pub active_level: ActiveLevel,
}

impl Actuator {
    /// Seed both counters from this actuator's own configuration.
    pub fn from_config(cfg: &RelayConfig) -> Self {
        Self {
            label: cfg.label.clone(),
            requested: false,
            actual: false,
            on_remaining: cfg.on_delay_secs,
            off_remaining: cfg.off_delay_secs,
            on_delay: cfg.on_delay_secs,
            off_delay: cfg.off_delay_secs,
            active_level: cfg.active_level,
        }
    }
}

/// Owns both actuators and the relay port that drives them.
pub struct ActuatorController<R: RelayPort> {
    relays: R,
    actuators: [Actuator; RELAY_COUNT],
    tick_count: u64,
}

impl<R: RelayPort> ActuatorController<R> {
    /// Build the controller and drive every output to its inactive level.
    pub fn new(config: &[RelayConfig; RELAY_COUNT], relays: R) -> Self {
        let mut ctrl = Self {
            relays,
            actuators: core::array::from_fn(|i| Actuator::from_config(&config[i])),
            tick_count: 0,
        };
        for id in 0..RELAY_COUNT as u8 {
            ctrl.drive(id, false);
        }
        ctrl
    }

    pub fn handle(&mut self, cmd: ActuatorCommand) {
        match cmd {
            ActuatorCommand::SetBitmask(mask) => {
                for id in 0..RELAY_COUNT as u8 {
                    self.set_requested(id, mask & (1 << id) != 0);
                }
            }
        }
    }

    /// Record the requested state of actuator `id`. Unknown ids are ignored.
    pub fn set_requested(&mut self, id: u8, on: bool) {
        if let Some(a) = self.actuators.get_mut(usize::from(id)) {
            if a.requested != on {
                info!("Actuators: {} requested {}", a.label, if on { "ON" } else { "OFF" });
            }
            a.requested = on;
        }
    }

    /// Run one control tick over every actuator.
    pub fn tick(&mut self, out: &mut impl Outbox<ControllerMessage>) {
        self.tick_count += 1;
        for id in 0..RELAY_COUNT as u8 {
            self.tick_one(id, out);
        }
    }

    fn tick_one(&mut self, id: u8, out: &mut impl Outbox<ControllerMessage>) {
        let idx = usize::from(id);

        // ── On side ──
        let a = &self.actuators[idx];
        if a.requested && !a.actual {
            out.deliver(ControllerMessage::ActuatorDelay {
                id,
                requested: true,
                remaining: a.on_remaining,
            });
        }
        if a.requested && !a.actual && a.on_remaining == 0 {
            // The freshly armed off delay starts counting next tick.
            self.switch(id, true, out);
            return;
        }
        let a = &mut self.actuators[idx];
        a.on_remaining = a.on_remaining.saturating_sub(1);

        // ── Off side ──
        let a = &self.actuators[idx];
        if !a.requested && a.actual {
            out.deliver(ControllerMessage::ActuatorDelay {
                id,
                requested: false,
                remaining: a.off_remaining,
            });
        }
        if !a.requested && a.actual && a.off_remaining == 0 {
            self.switch(id, false, out);
        } else {
            let a = &mut self.actuators[idx];
            a.off_remaining = a.off_remaining.saturating_sub(1);
        }
    }

    fn switch(&mut self, id: u8, on: bool, out: &mut impl Outbox<ControllerMessage>) {
        let a = &mut self.actuators[usize::from(id)];
        a.actual = on;
        if on {
            a.off_remaining = a.off_delay;
        } else {
            a.on_remaining = a.on_delay;
        }
        info!(
            "Actuators: {} switched {} at tick {}",
            a.label,
            if on { "ON" } else { "OFF" },
            self.tick_count
        );
        self.drive(id, on);
        out.deliver(ControllerMessage::ActuatorSwitched { id, on });
    }

    fn drive(&mut self, id: u8, on: bool) {
        let level = self.actuators[usize::from(id)].active_level.level_for(on);
        if let Err(e) = self.relays.set_level(id, level) {
            warn!("Actuators: relay {} write failed: {}", id, e);
        }
    }

    // ── Queries ──

    pub fn actuator(&self, id: u8) -> Option<&Actuator> {
        self.actuators.get(usize::from(id))
    }

    /// Bitmask of the outputs that are actually on.
    pub fn actual_mask(&self) -> u8 {
        self.actuators
            .iter()
            .enumerate()
            .filter(|(_, a)| a.actual)
            .fold(0, |m, (i, _)| m | (1 << i))
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn relays(&self) -> &R {
        &self.relays
    }
}

/// Actuator task body: apply every command that arrives, tick once per
/// `tick`. Commands never shorten or stretch the tick period.
pub fn run<R: RelayPort, const N: usize, const M: usize>(
    mut ctrl: ActuatorController<R>,
    inbox: &Queue<ActuatorCommand, N>,
    mut upstream: &Queue<ControllerMessage, M>,
    tick: Duration,
) -> ! {
    info!("Actuators: task started, tick {:?}", tick);
    let mut next_tick = Instant::now() + tick;
    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            if let Some(cmd) = inbox.receive(wait) {
                ctrl.handle(cmd);
                continue;
            }
        }
        ctrl.tick(&mut upstream);
        next_tick += tick;
    }
}
