//! Soft timer engine.
//!
//! Recurring software timers owned by the Controller. Each timer has a
//! deadline and a reload period; when polled past its deadline it fires
//! once and reloads from the poll time. A period change restarts the
//! timer, so the server-provided poll interval takes effect immediately.
//!
//! ```text
//!   arm(id, first, period) ──▶ ┌──────────────┐
//!   reschedule(id, period) ──▶ │  SoftTimers  │ ──expired(now)──▶ TimerFired(id)
//!   cancel(id) ─────────────▶  └──────────────┘
//! ```
//!
//! Time is passed in as milliseconds since boot; the engine never reads a
//! clock itself.

use heapless::Vec;
use log::debug;

use crate::app::events::TimerId;

const TIMER_COUNT: usize = 5;

impl TimerId {
    pub const ALL: [TimerId; TIMER_COUNT] = [
        TimerId::CloudSync,
        TimerId::SetpointSync,
        TimerId::TimeSync,
        TimerId::HydroRead,
        TimerId::DisplayRefresh,
    ];

    const fn index(self) -> usize {
        match self {
            Self::CloudSync => 0,
            Self::SetpointSync => 1,
            Self::TimeSync => 2,
            Self::HydroRead => 3,
            Self::DisplayRefresh => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    deadline_ms: u64,
    period_ms: u64,
}

/// Fixed set of auto-reloading timers, one per [`TimerId`].
#[derive(Debug, Default)]
pub struct SoftTimers {
    slots: [Option<Slot>; TIMER_COUNT],
}

impl SoftTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `id`: first fire after `first_secs`, then every `period_secs`.
    pub fn arm(&mut self, id: TimerId, first_secs: u32, period_secs: u32, now_ms: u64) {
        debug!("Timer: {:?} armed, first in {}s then every {}s", id, first_secs, period_secs);
        self.slots[id.index()] = Some(Slot {
            deadline_ms: now_ms + secs_to_ms(first_secs),
            period_ms: secs_to_ms(period_secs),
        });
    }

    /// Change the period of `id` and restart it from `now_ms`.
    pub fn reschedule(&mut self, id: TimerId, period_secs: u32, now_ms: u64) {
        self.arm(id, period_secs, period_secs, now_ms);
    }

    pub fn cancel(&mut self, id: TimerId) {
        self.slots[id.index()] = None;
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.slots[id.index()].is_some()
    }

    /// Milliseconds until `id` fires, if armed.
    pub fn remaining_ms(&self, id: TimerId, now_ms: u64) -> Option<u64> {
        self.slots[id.index()].map(|s| s.deadline_ms.saturating_sub(now_ms))
    }

    /// Current reload period of `id` in seconds, if armed.
    pub fn period_secs(&self, id: TimerId) -> Option<u32> {
        self.slots[id.index()].map(|s| (s.period_ms / 1000) as u32)
    }

    /// Collect every timer whose deadline has passed and reload it.
    ///
    /// A timer that missed several periods fires once.
    pub fn expired(&mut self, now_ms: u64) -> Vec<TimerId, TIMER_COUNT> {
        let mut fired = Vec::new();
        for id in TimerId::ALL {
            if let Some(slot) = self.slots[id.index()].as_mut() {
                if now_ms >= slot.deadline_ms {
                    slot.deadline_ms = now_ms + slot.period_ms;
                    // Capacity equals the number of timers.
                    let _ = fired.push(id);
                }
            }
        }
        fired
    }
}

const fn secs_to_ms(secs: u32) -> u64 {
    secs as u64 * 1000
}
