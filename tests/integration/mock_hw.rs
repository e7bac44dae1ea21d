//! Mock hardware adapters for integration tests.
//!
//! Each mock records every call so tests can assert on the full command
//! history without touching real hardware or the network.

use brewbrick::app::events::{BdAddr, HydroReading};
use brewbrick::app::ports::{
    BleCentral, BleError, ConnectivityError, HttpClient, RelayPort, ScanParams, WifiRadio,
};
use brewbrick::config::SystemConfig;
use brewbrick::error::{ActuatorError, CommsError};

// ── Relays ────────────────────────────────────────────────────

/// Records every level written, as `(relay id, high)`.
#[derive(Debug, Default)]
pub struct RecordingRelays {
    pub writes: Vec<(u8, bool)>,
}

#[allow(dead_code)]
impl RecordingRelays {
    /// Last level written to relay `id`.
    pub fn level(&self, id: u8) -> Option<bool> {
        self.writes.iter().rev().find(|(i, _)| *i == id).map(|(_, h)| *h)
    }
}

impl RelayPort for RecordingRelays {
    fn set_level(&mut self, id: u8, high: bool) -> Result<(), ActuatorError> {
        self.writes.push((id, high));
        Ok(())
    }
}

// ── WiFi radio ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioCall {
    Connect,
    StartPortal,
    Stop,
    Probe,
}

pub struct MockRadio {
    pub calls: Vec<RadioCall>,
    pub refuse_connect: bool,
    pub internet: bool,
    pub rssi: i16,
}

#[allow(dead_code)]
impl MockRadio {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            refuse_connect: false,
            internet: true,
            rssi: -55,
        }
    }

    pub fn count(&self, call: RadioCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiRadio for MockRadio {
    fn connect(&mut self) -> Result<(), ConnectivityError> {
        self.calls.push(RadioCall::Connect);
        if self.refuse_connect {
            Err(ConnectivityError::ConnectionFailed)
        } else {
            Ok(())
        }
    }

    fn start_portal(&mut self) -> Result<(), ConnectivityError> {
        self.calls.push(RadioCall::StartPortal);
        Ok(())
    }

    fn stop(&mut self) {
        self.calls.push(RadioCall::Stop);
    }

    fn rssi(&self) -> Option<i16> {
        Some(self.rssi)
    }

    fn probe_internet(&mut self, _host: &str) -> bool {
        self.calls.push(RadioCall::Probe);
        self.internet
    }
}

// ── BLE central ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleCall {
    StartScan,
    StopScan,
    Connect(BdAddr),
    Read,
    Disconnect,
}

pub struct MockBle {
    pub calls: Vec<BleCall>,
    /// Bytes returned by the characteristic read.
    pub record: Vec<u8>,
    pub refuse_scan: bool,
}

#[allow(dead_code)]
impl MockBle {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            record: Vec::new(),
            refuse_scan: false,
        }
    }

    /// A peer whose characteristic holds `reading`.
    pub fn serving(reading: &HydroReading) -> Self {
        let mut record = vec![reading.status];
        record.extend_from_slice(&reading.angle_x100.to_le_bytes());
        record.extend_from_slice(&reading.temperature_x10.to_le_bytes());
        record.extend_from_slice(&reading.battery_x1000.to_le_bytes());
        Self {
            record,
            ..Self::new()
        }
    }
}

impl Default for MockBle {
    fn default() -> Self {
        Self::new()
    }
}

impl BleCentral for MockBle {
    fn start_scan(&mut self, _params: &ScanParams) -> Result<(), BleError> {
        self.calls.push(BleCall::StartScan);
        if self.refuse_scan {
            Err(BleError::HostError(-1))
        } else {
            Ok(())
        }
    }

    fn stop_scan(&mut self) {
        self.calls.push(BleCall::StopScan);
    }

    fn connect(&mut self, address: BdAddr) -> Result<(), BleError> {
        self.calls.push(BleCall::Connect(address));
        Ok(())
    }

    fn read_reading(&mut self, buf: &mut [u8]) -> Result<usize, BleError> {
        self.calls.push(BleCall::Read);
        let n = self.record.len().min(buf.len());
        buf[..n].copy_from_slice(&self.record[..n]);
        Ok(n)
    }

    fn disconnect(&mut self) {
        self.calls.push(BleCall::Disconnect);
    }
}

// ── Config helpers ────────────────────────────────────────────

/// Default config with the given relay delays `(on, off)` per relay.
#[allow(dead_code)]
pub fn config_with_delays(relay0: (u16, u16), relay1: (u16, u16)) -> SystemConfig {
    let mut cfg = SystemConfig::default();
    cfg.relays[0].on_delay_secs = relay0.0;
    cfg.relays[0].off_delay_secs = relay0.1;
    cfg.relays[1].on_delay_secs = relay1.0;
    cfg.relays[1].off_delay_secs = relay1.1;
    cfg
}

#[allow(dead_code)]
pub fn registered_address() -> BdAddr {
    BdAddr(SystemConfig::default().hydrometer.registered_address)
}

// ── HTTP ──────────────────────────────────────────────────────

/// Answers each GET with the next scripted body and records the URL.
pub struct ScriptedHttp {
    pub bodies: std::collections::VecDeque<Result<&'static str, CommsError>>,
    pub urls: Vec<String>,
}

#[allow(dead_code)]
impl ScriptedHttp {
    pub fn new(bodies: Vec<Result<&'static str, CommsError>>) -> Self {
        Self {
            bodies: bodies.into(),
            urls: Vec::new(),
        }
    }
}

impl HttpClient for ScriptedHttp {
    fn get(&mut self, url: &str) -> Result<Vec<u8>, CommsError> {
        self.urls.push(url.to_owned());
        match self.bodies.pop_front() {
            Some(Ok(body)) => Ok(body.as_bytes().to_vec()),
            Some(Err(e)) => Err(e),
            None => Err(CommsError::RequestFailed),
        }
    }
}
