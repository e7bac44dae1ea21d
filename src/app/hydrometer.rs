//! Hydrometer acquisition manager (BLE central state machine).
//!
//! ```text
//!  Idle ──GetReading/ScanBricks──▶ StartScan ──▶ Scanning
//!                                                 │   │
//!            SingleRegistered: registered address │   │ EnumerateAll: ScanComplete
//!                                                 ▼   │
//!                                          Discovered │
//!                                                 │   │
//!                                       Connected │   │
//!                                                 ▼   ▼
//!  Idle ◀── Result ◀─────────────────────── Connected / Result
//!             ▲
//!             └── Timeout ◀── deadline passed / Disconnected / host error
//! ```
//!
//! The deadline is armed when a scan starts and disarmed once the peer is
//! connected; past it the machine is forced into `Timeout` from whatever
//! state it is in. There is no internal retry: the Controller decides when
//! to ask again.

use heapless::Vec;
use log::{debug, info, warn};

use crate::adapters::time::BootClock;
use crate::config::HydrometerConfig;
use crate::queue::Queue;

use super::commands::{HydroCommand, HydroEvent, HydroInput};
use super::events::{BdAddr, ControllerMessage, HydroReading, ScanInventory};
use super::ports::{BleCentral, Outbox, ScanParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydroState {
    Idle,
    StartScan,
    Scanning,
    Discovered,
    Connected,
    Timeout,
    Result,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Find the registered hydrometer and read it.
    SingleRegistered,
    /// Collect every hydrometer in range.
    EnumerateAll,
}

/// Largest characteristic value the machine reads.
const READ_BUF_LEN: usize = 20;
const HISTORY_LEN: usize = 8;

pub struct HydrometerManager<B: BleCentral> {
    ble: B,
    registered: BdAddr,
    params: ScanParams,
    timeout_ms: u64,
    state: HydroState,
    mode: ScanMode,
    discovered: Option<(BdAddr, i16)>,
    reading: Option<HydroReading>,
    inventory: ScanInventory,
    deadline_ms: Option<u64>,
    history: Vec<HydroState, HISTORY_LEN>,
}

impl<B: BleCentral> HydrometerManager<B> {
    pub fn new(cfg: &HydrometerConfig, ble: B) -> Self {
        Self {
            ble,
            registered: BdAddr(cfg.registered_address),
            params: ScanParams {
                interval: cfg.scan_interval,
                window: cfg.scan_window,
                active: cfg.active_scan,
                duration_secs: cfg.scan_duration_secs,
            },
            timeout_ms: u64::from(cfg.timeout_secs) * 1000,
            state: HydroState::Idle,
            mode: ScanMode::SingleRegistered,
            discovered: None,
            reading: None,
            inventory: Vec::new(),
            deadline_ms: None,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> HydroState {
        self.state
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn is_timeout_armed(&self) -> bool {
        self.deadline_ms.is_some()
    }

    /// States entered since the last command, oldest first.
    pub fn history(&self) -> &[HydroState] {
        &self.history
    }

    pub fn ble(&self) -> &B {
        &self.ble
    }

    /// Advance the machine by one input (or none) at time `now_ms`.
    pub fn step(
        &mut self,
        input: Option<HydroInput>,
        now_ms: u64,
        out: &mut impl Outbox<ControllerMessage>,
    ) {
        if let Some(input) = input {
            match input {
                HydroInput::Command(cmd) => self.handle_command(cmd, now_ms, out),
                HydroInput::Event(ev) => self.handle_event(ev, out),
            }
        }

        if let Some(deadline) = self.deadline_ms {
            if now_ms >= deadline && self.is_busy() {
                warn!("Hydro: timed out in {:?}", self.state);
                self.fail(out);
            }
        }
    }

    fn is_busy(&self) -> bool {
        !matches!(self.state, HydroState::Idle)
    }

    fn handle_command(
        &mut self,
        cmd: HydroCommand,
        now_ms: u64,
        out: &mut impl Outbox<ControllerMessage>,
    ) {
        if self.is_busy() {
            info!("Hydro: {:?} ignored, busy in {:?}", cmd, self.state);
            return;
        }
        self.mode = match cmd {
            HydroCommand::GetReading => ScanMode::SingleRegistered,
            HydroCommand::ScanBricks => ScanMode::EnumerateAll,
        };
        self.discovered = None;
        self.reading = None;
        self.inventory.clear();
        self.history.clear();

        self.enter(HydroState::StartScan);
        self.deadline_ms = Some(now_ms + self.timeout_ms);
        match self.ble.start_scan(&self.params) {
            Ok(()) => self.enter(HydroState::Scanning),
            Err(e) => {
                warn!("Hydro: scan start failed: {}", e);
                self.fail(out);
            }
        }
    }

    fn handle_event(&mut self, ev: HydroEvent, out: &mut impl Outbox<ControllerMessage>) {
        match (self.state, ev) {
            (HydroState::Scanning, HydroEvent::Advertised { address, rssi }) => {
                self.on_advertised(address, rssi, out);
            }
            (HydroState::Scanning, HydroEvent::ScanComplete) => {
                if self.mode == ScanMode::EnumerateAll {
                    info!("Hydro: scan complete, {} found", self.inventory.len());
                    self.finish(out);
                } else {
                    debug!("Hydro: scan ended without the registered device");
                }
            }
            (HydroState::Discovered, HydroEvent::Connected) => {
                self.deadline_ms = None;
                self.enter(HydroState::Connected);
                self.read_connected(out);
            }
            (
                HydroState::Discovered | HydroState::Connected,
                HydroEvent::Disconnected,
            ) => {
                warn!("Hydro: peer dropped before the read");
                self.fail(out);
            }
            (state, HydroEvent::Timeout) if state != HydroState::Idle => {
                warn!("Hydro: host timeout in {:?}", state);
                self.fail(out);
            }
            (state, ev) => debug!("Hydro: {:?} ignored in {:?}", ev, state),
        }
    }

    fn on_advertised(
        &mut self,
        address: BdAddr,
        rssi: i16,
        out: &mut impl Outbox<ControllerMessage>,
    ) {
        match self.mode {
            ScanMode::SingleRegistered => {
                if address != self.registered {
                    return;
                }
                info!("Hydro: found {} at {} dBm", address, rssi);
                self.ble.stop_scan();
                self.discovered = Some((address, rssi));
                self.enter(HydroState::Discovered);
                if let Err(e) = self.ble.connect(address) {
                    warn!("Hydro: connect failed: {}", e);
                    self.fail(out);
                }
            }
            ScanMode::EnumerateAll => {
                if self.inventory.contains(&address) {
                    return;
                }
                if self.inventory.push(address).is_err() {
                    debug!("Hydro: inventory full, {} dropped", address);
                }
            }
        }
    }

    fn read_connected(&mut self, out: &mut impl Outbox<ControllerMessage>) {
        let rssi = self.discovered.map_or(0, |(_, rssi)| rssi);
        let mut buf = [0u8; READ_BUF_LEN];
        self.reading = match self.ble.read_reading(&mut buf) {
            Ok(n) => {
                let decoded = HydroReading::decode(&buf[..n], rssi);
                if decoded.is_none() {
                    warn!("Hydro: short record ({} bytes)", n);
                }
                decoded
            }
            Err(e) => {
                warn!("Hydro: read failed: {}", e);
                None
            }
        };
        self.ble.disconnect();
        self.finish(out);
    }

    /// Failure path: release the radio, then report an invalid result.
    fn fail(&mut self, out: &mut impl Outbox<ControllerMessage>) {
        let from = self.state;
        self.enter(HydroState::Timeout);
        match from {
            HydroState::Scanning | HydroState::StartScan => self.ble.stop_scan(),
            HydroState::Discovered | HydroState::Connected => self.ble.disconnect(),
            _ => {}
        }
        self.reading = None;
        self.finish(out);
    }

    fn finish(&mut self, out: &mut impl Outbox<ControllerMessage>) {
        self.deadline_ms = None;
        self.enter(HydroState::Result);
        match self.mode {
            ScanMode::SingleRegistered => {
                let valid = self.reading.is_some();
                let reading = self.reading.unwrap_or_default();
                info!("Hydro: result valid={} {:?}", valid, reading);
                out.deliver(ControllerMessage::HydroReading { reading, valid });
            }
            ScanMode::EnumerateAll => {
                out.deliver(ControllerMessage::HydroInventory(core::mem::take(
                    &mut self.inventory,
                )));
            }
        }
        self.enter(HydroState::Idle);
    }

    fn enter(&mut self, next: HydroState) {
        debug!("Hydro: {:?} -> {:?}", self.state, next);
        self.state = next;
        if self.history.is_full() {
            self.history.remove(0);
        }
        // Room was made above.
        let _ = self.history.push(next);
    }
}

/// Hydrometer task body. Must run on the core that owns the BLE host.
pub fn run<B: BleCentral, const N: usize, const M: usize>(
    mut mgr: HydrometerManager<B>,
    inbox: &Queue<HydroInput, N>,
    mut controller: &Queue<ControllerMessage, M>,
    wait: core::time::Duration,
    clock: BootClock,
) -> ! {
    info!("Hydro: task started");
    loop {
        let input = inbox.receive(wait);
        let now_ms = clock.now_ms();
        mgr.step(input, now_ms, &mut controller);
    }
}
