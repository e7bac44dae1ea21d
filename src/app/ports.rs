//! Port traits: the boundary between the state machines and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ state machine (domain)
//! ```
//!
//! Driven adapters (relay GPIOs, radio, BLE host, HTTP, display) implement
//! these traits. The managers in this module tree consume them via
//! generics, so the domain never touches hardware directly and every
//! machine can be driven by a recording mock in tests.

use core::fmt;

use crate::error::{ActuatorError, CommsError, SensorError};

use super::events::{BdAddr, DisplayMessage};

// ───────────────────────────────────────────────────────────────
// Outbox (domain → another task's inbox)
// ───────────────────────────────────────────────────────────────

/// Where a state machine delivers messages for another task.
///
/// Implemented by the static inboxes for production and by `Vec<T>` so
/// tests can record everything a machine emitted.
pub trait Outbox<T> {
    fn deliver(&mut self, msg: T);
}

impl<T> Outbox<T> for Vec<T> {
    fn deliver(&mut self, msg: T) {
        self.push(msg);
    }
}

// ───────────────────────────────────────────────────────────────
// Relay port (domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Drives the physical relay outputs.
pub trait RelayPort {
    /// Set the electrical level of relay `id` (`true` = high).
    ///
    /// Polarity is resolved by the caller; the port only writes levels.
    fn set_level(&mut self, id: u8, high: bool) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Temperature probe (hardware → domain)
// ───────────────────────────────────────────────────────────────

/// A temperature sensor that can be polled for a single reading.
pub trait TemperatureProbe {
    fn read_celsius(&mut self) -> Result<f32, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// WiFi radio
// ───────────────────────────────────────────────────────────────

/// Station/AP control. Outcomes of `connect` arrive later as
/// [`WifiEvent`](super::commands::WifiEvent)s on the WiFi inbox.
pub trait WifiRadio {
    /// Start associating with the configured access point.
    fn connect(&mut self) -> Result<(), ConnectivityError>;

    /// Open the configuration access point.
    fn start_portal(&mut self) -> Result<(), ConnectivityError>;

    fn stop(&mut self);

    /// Signal strength of the current association, if any.
    fn rssi(&self) -> Option<i16>;

    /// Check that `host` can be reached over the current link.
    fn probe_internet(&mut self, host: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    /// The driver refused to start the connection.
    ConnectionFailed,
    /// The access point could not be started.
    PortalFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::PortalFailed => write!(f, "configuration portal failed to start"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// BLE central
// ───────────────────────────────────────────────────────────────

/// Parameters of a hydrometer scan. Interval and window are in 0.625 ms units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParams {
    pub interval: u16,
    pub window: u16,
    pub active: bool,
    pub duration_secs: u16,
}

/// BLE host operations used by the hydrometer machine.
///
/// Discovery and connection outcomes arrive asynchronously as
/// [`HydroEvent`](super::commands::HydroEvent)s; only the characteristic
/// read is synchronous.
pub trait BleCentral {
    /// Scan for devices advertising the hydrometer service.
    fn start_scan(&mut self, params: &ScanParams) -> Result<(), BleError>;

    fn stop_scan(&mut self);

    fn connect(&mut self, address: BdAddr) -> Result<(), BleError>;

    /// Read the reading characteristic of the connected peer into `buf`,
    /// returning the number of bytes received.
    fn read_reading(&mut self, buf: &mut [u8]) -> Result<usize, BleError>;

    fn disconnect(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleError {
    /// The BLE host rejected the request.
    HostError(i32),
    /// No peer is connected.
    NotConnected,
    /// The service or characteristic was not found on the peer.
    AttributeNotFound,
    /// The operation did not complete in time.
    Timeout,
}

impl fmt::Display for BleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostError(code) => write!(f, "BLE host error {code}"),
            Self::NotConnected => write!(f, "no peer connected"),
            Self::AttributeNotFound => write!(f, "attribute not found"),
            Self::Timeout => write!(f, "operation timed out"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// HTTP client (communication collaborator)
// ───────────────────────────────────────────────────────────────

/// Minimal blocking HTTP GET.
pub trait HttpClient {
    /// Fetch `url` and return the response body of a 2xx answer.
    fn get(&mut self, url: &str) -> Result<Vec<u8>, CommsError>;
}

// ───────────────────────────────────────────────────────────────
// Display sink (domain → screen / log)
// ───────────────────────────────────────────────────────────────

/// Renders display notifications. Takes ownership so owned payloads are
/// released by the renderer.
pub trait DisplaySink {
    fn render(&mut self, msg: DisplayMessage);
}
