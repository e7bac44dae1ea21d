//! WiFi connectivity manager.
//!
//! ```text
//!            StartWifi               GotIp
//!  Stopped ────────────▶ WifiRequested ──────▶ WifiConnected
//!     ▲   │                    │                     │
//!     │   │ StartPortal        └─ LostIp/Disconnected┤
//!     │   ▼                       or connect timeout │
//!     │  PortalRequested ──Connected──▶ PortalConnected
//!     │                                              │
//!     └──────────────── Stop (any state) ◀───────────┘
//! ```
//!
//! Commands and radio events share one inbox. Independently of the
//! transitions, a connectivity report goes to the Controller every status
//! interval. While the link is up, a reachability probe runs every
//! `ping_interval_reports` reports (every `ping_retry_reports` after a
//! failure) and decides between `LinkUp` and `InternetUp`.
//!
//! ## Reconnection policy
//!
//! When the link drops (or a connect attempt produces no IP in time) and
//! the last request was `StartWifi` or `StartPortal`, that request is
//! re-issued after an exponential backoff (2 s → 4 s → 8 s … capped at
//! 60 s). A successful `GotIp` resets the backoff.

use log::{debug, info, warn};

use crate::adapters::time::BootClock;
use crate::config::WifiConfig;
use crate::queue::Queue;

use super::commands::{WifiCommand, WifiEvent, WifiInput};
use super::events::{Connectivity, ConnectivityReport, ControllerMessage, RSSI_UNKNOWN};
use super::ports::{Outbox, WifiRadio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Stopped,
    WifiRequested,
    WifiConnected,
    PortalRequested,
    PortalConnected,
}

pub struct WifiManager<R: WifiRadio> {
    radio: R,
    cfg: WifiConfig,
    state: WifiState,
    last_request: Option<WifiCommand>,
    internet_up: bool,
    /// Seconds since the last status report.
    status_counter: u16,
    /// Reports left until the next reachability probe.
    ping_countdown: u16,
    /// When the current connect attempt was issued.
    requested_at_ms: u64,
    backoff_secs: u16,
    retry_at_ms: Option<u64>,
}

impl<R: WifiRadio> WifiManager<R> {
    pub fn new(cfg: WifiConfig, radio: R) -> Self {
        let backoff_secs = cfg.reconnect_min_backoff_secs;
        Self {
            radio,
            cfg,
            state: WifiState::Stopped,
            last_request: None,
            internet_up: false,
            status_counter: 0,
            ping_countdown: 1,
            requested_at_ms: 0,
            backoff_secs,
            retry_at_ms: None,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    pub fn last_request(&self) -> Option<WifiCommand> {
        self.last_request
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Whether a re-issue of the last request is pending.
    pub fn retry_at_ms(&self) -> Option<u64> {
        self.retry_at_ms
    }

    /// The link counts as up only once an IP address has been obtained.
    pub fn is_link_up(&self) -> bool {
        self.state == WifiState::WifiConnected
    }

    // ── Inputs ────────────────────────────────────────────────

    pub fn handle(&mut self, input: WifiInput, now_ms: u64) {
        match input {
            WifiInput::Command(cmd) => self.handle_command(cmd, now_ms),
            WifiInput::Event(ev) => self.handle_event(ev, now_ms),
        }
    }

    fn handle_command(&mut self, cmd: WifiCommand, now_ms: u64) {
        info!("WiFi: command {:?} in {:?}", cmd, self.state);
        self.last_request = Some(cmd);
        self.retry_at_ms = None;
        self.backoff_secs = self.cfg.reconnect_min_backoff_secs;
        match cmd {
            WifiCommand::StartWifi => match self.state {
                WifiState::Stopped => self.request_wifi(now_ms),
                WifiState::PortalRequested | WifiState::PortalConnected => {
                    self.radio.stop();
                    self.request_wifi(now_ms);
                }
                WifiState::WifiRequested | WifiState::WifiConnected => {}
            },
            WifiCommand::StartPortal => {
                if self.state != WifiState::Stopped {
                    self.radio.stop();
                }
                self.request_portal(now_ms);
            }
            WifiCommand::Stop => {
                self.radio.stop();
                self.enter(WifiState::Stopped);
            }
        }
    }

    fn handle_event(&mut self, ev: WifiEvent, now_ms: u64) {
        debug!("WiFi: event {:?} in {:?}", ev, self.state);
        match ev {
            WifiEvent::GotIp => {
                if matches!(self.state, WifiState::WifiRequested | WifiState::WifiConnected) {
                    self.backoff_secs = self.cfg.reconnect_min_backoff_secs;
                    self.enter(WifiState::WifiConnected);
                } else {
                    debug!("WiFi: GotIp ignored in {:?}", self.state);
                }
            }
            WifiEvent::Connected => {
                if self.state == WifiState::PortalRequested {
                    self.enter(WifiState::PortalConnected);
                }
            }
            WifiEvent::LostIp | WifiEvent::Disconnected => {
                if self.state != WifiState::Stopped {
                    self.enter(WifiState::Stopped);
                    self.schedule_retry(now_ms);
                }
            }
        }
    }

    // ── Periodic work ─────────────────────────────────────────

    /// Check the connect timeout and a pending reconnect.
    pub fn poll(&mut self, now_ms: u64) {
        if self.state == WifiState::WifiRequested {
            let timeout_ms = u64::from(self.cfg.connect_timeout_secs) * 1000;
            if now_ms.saturating_sub(self.requested_at_ms) >= timeout_ms {
                warn!("WiFi: no IP after {}s, giving up", self.cfg.connect_timeout_secs);
                self.radio.stop();
                self.enter(WifiState::Stopped);
                self.schedule_retry(now_ms);
            }
        }

        if self.state == WifiState::Stopped {
            if let Some(at) = self.retry_at_ms {
                if now_ms >= at {
                    self.retry_at_ms = None;
                    match self.last_request {
                        Some(WifiCommand::StartWifi) => self.request_wifi(now_ms),
                        Some(WifiCommand::StartPortal) => self.request_portal(now_ms),
                        _ => {}
                    }
                }
            }
        }
    }

    /// Advance the one-second status counter; every status interval a
    /// report is delivered to `out`.
    pub fn tick_second(&mut self, out: &mut impl Outbox<ControllerMessage>) {
        self.status_counter += 1;
        if self.status_counter >= self.cfg.status_interval_ticks {
            self.status_counter = 0;
            let report = self.status_report();
            out.deliver(ControllerMessage::Connectivity(report));
        }
    }

    /// Classify the current connectivity, probing the internet when due.
    pub fn status_report(&mut self) -> ConnectivityReport {
        match self.state {
            WifiState::WifiConnected => {
                if self.ping_countdown == 0 {
                    self.internet_up = self.radio.probe_internet(&self.cfg.ping_host);
                    let every = if self.internet_up {
                        self.cfg.ping_interval_reports
                    } else {
                        warn!("WiFi: {} unreachable", self.cfg.ping_host);
                        self.cfg.ping_retry_reports
                    };
                    self.ping_countdown = every.saturating_sub(1);
                } else {
                    self.ping_countdown -= 1;
                }
                ConnectivityReport {
                    rssi: self.radio.rssi().unwrap_or(RSSI_UNKNOWN),
                    class: if self.internet_up {
                        Connectivity::InternetUp
                    } else {
                        Connectivity::LinkUp
                    },
                }
            }
            WifiState::PortalRequested | WifiState::PortalConnected => {
                self.reset_probe();
                ConnectivityReport { rssi: RSSI_UNKNOWN, class: Connectivity::Portal }
            }
            WifiState::Stopped | WifiState::WifiRequested => {
                self.reset_probe();
                ConnectivityReport { rssi: RSSI_UNKNOWN, class: Connectivity::Unconnected }
            }
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn request_wifi(&mut self, now_ms: u64) {
        match self.radio.connect() {
            Ok(()) => {
                self.requested_at_ms = now_ms;
                self.enter(WifiState::WifiRequested);
            }
            Err(e) => {
                warn!("WiFi: connect refused: {}", e);
                self.enter(WifiState::Stopped);
                self.schedule_retry(now_ms);
            }
        }
    }

    fn request_portal(&mut self, now_ms: u64) {
        match self.radio.start_portal() {
            Ok(()) => {
                info!("WiFi: portal '{}' open", self.cfg.portal_ssid);
                self.enter(WifiState::PortalRequested);
            }
            Err(e) => {
                warn!("WiFi: portal failed: {}", e);
                self.enter(WifiState::Stopped);
                self.schedule_retry(now_ms);
            }
        }
    }

    fn schedule_retry(&mut self, now_ms: u64) {
        if !matches!(
            self.last_request,
            Some(WifiCommand::StartWifi | WifiCommand::StartPortal)
        ) {
            return;
        }
        info!("WiFi: retry in {}s", self.backoff_secs);
        self.retry_at_ms = Some(now_ms + u64::from(self.backoff_secs) * 1000);
        self.backoff_secs = self
            .backoff_secs
            .saturating_mul(2)
            .min(self.cfg.reconnect_max_backoff_secs);
    }

    fn reset_probe(&mut self) {
        self.internet_up = false;
        self.ping_countdown = 1;
    }

    fn enter(&mut self, next: WifiState) {
        if next != self.state {
            info!("WiFi: {:?} -> {:?}", self.state, next);
        }
        if next != WifiState::WifiConnected {
            self.reset_probe();
        }
        self.state = next;
    }
}

/// WiFi task body.
pub fn run<R: WifiRadio, const N: usize, const M: usize>(
    mut mgr: WifiManager<R>,
    inbox: &Queue<WifiInput, N>,
    mut controller: &Queue<ControllerMessage, M>,
    wait: core::time::Duration,
    clock: BootClock,
) -> ! {
    info!("WiFi: task started");
    let mut next_second_ms = clock.now_ms();
    loop {
        let now_ms = clock.now_ms();
        if let Some(input) = inbox.receive(wait) {
            mgr.handle(input, now_ms);
        }
        mgr.poll(now_ms);
        if now_ms >= next_second_ms {
            next_second_ms += 1_000;
            mgr.tick_second(&mut controller);
        }
    }
}
