//! Log-based display adapter.
//!
//! Implements [`DisplaySink`] by writing each notification as one
//! structured line to the logger (UART / USB-CDC in production). Stale
//! values render as dashes, never as the last known number.

use core::fmt::Write;

use log::info;

use crate::app::events::DisplayMessage;
use crate::app::ports::DisplaySink;
use crate::queue::Queue;

/// Adapter that logs every [`DisplayMessage`] to the serial console.
#[derive(Default)]
pub struct LogDisplay {
    rendered: u32,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages rendered so far.
    pub fn rendered(&self) -> u32 {
        self.rendered
    }
}

impl DisplaySink for LogDisplay {
    fn render(&mut self, msg: DisplayMessage) {
        self.rendered = self.rendered.wrapping_add(1);
        info!("DISP | {}", describe(&msg));
    }
}

fn tenths(out: &mut String, value_x10: i16, valid: bool, unit: &str) {
    if valid {
        let sign = if value_x10 < 0 { "-" } else { "" };
        let v = value_x10.unsigned_abs();
        let _ = write!(out, "{}{}.{}{}", sign, v / 10, v % 10, unit);
    } else {
        let _ = write!(out, "--.-{}", unit);
    }
}

/// Format one notification as a single display line.
pub fn describe(msg: &DisplayMessage) -> String {
    let mut s = String::new();
    match msg {
        DisplayMessage::Status(text) => s.push_str(text),
        DisplayMessage::Temperature { value_x10, valid } => {
            s.push_str("temp=");
            tenths(&mut s, *value_x10, *valid, "\u{00b0}C");
        }
        DisplayMessage::Setpoint { value_x10, valid } => {
            s.push_str("setpoint=");
            tenths(&mut s, *value_x10, *valid, "\u{00b0}C");
        }
        DisplayMessage::Actuators { bitmask, valid } => {
            if *valid {
                let _ = write!(s, "relays=0b{:02b}", bitmask);
            } else {
                s.push_str("relays=??");
            }
        }
        DisplayMessage::Delay { id, requested, remaining } => {
            let _ = write!(
                s,
                "delay[{}] {} in {}s",
                id,
                if *requested { "on" } else { "off" },
                remaining
            );
        }
        DisplayMessage::Relay { id, on } => {
            let _ = write!(s, "relay[{}]={}", id, if *on { "ON" } else { "OFF" });
        }
        DisplayMessage::Wifi { rssi, glyph } => {
            let _ = write!(s, "wifi={} rssi={}", glyph, rssi);
        }
        DisplayMessage::Time { hour, minute, valid } => {
            if *valid {
                let _ = write!(s, "time={:02}:{:02}", hour, minute);
            } else {
                s.push_str("time=--:--");
            }
        }
        DisplayMessage::Heartbeat { countdown, max, valid } => {
            if *valid {
                let _ = write!(s, "heartbeat={}/{}", countdown, max);
            } else {
                s.push_str("heartbeat=--");
            }
        }
        DisplayMessage::DeviceName(name) => {
            let _ = write!(s, "name={}", name);
        }
        DisplayMessage::Hydrometer {
            gravity_x1000,
            temperature_x10,
            battery_x1000,
            rssi,
            valid,
        } => {
            if *valid {
                let _ = write!(
                    s,
                    "sg={}.{:03} t={}.{}\u{00b0}C bat={}.{:03}V rssi={}",
                    gravity_x1000 / 1000,
                    gravity_x1000 % 1000,
                    temperature_x10 / 10,
                    temperature_x10 % 10,
                    battery_x1000 / 1000,
                    battery_x1000 % 1000,
                    rssi
                );
            } else {
                s.push_str("sg=-.--- (no reading)");
            }
        }
        DisplayMessage::HydroInventory(inv) => {
            let _ = write!(s, "bricks={}", inv.len());
            for addr in inv.iter() {
                let _ = write!(s, " {}", addr);
            }
        }
    }
    s
}

/// Display task body.
pub fn run<const N: usize>(
    mut sink: impl DisplaySink,
    inbox: &Queue<DisplayMessage, N>,
    wait: core::time::Duration,
) -> ! {
    info!("Display: task started");
    loop {
        if let Some(msg) = inbox.receive(wait) {
            sink.render(msg);
        }
    }
}
