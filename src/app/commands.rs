//! Downstream messages: what the Controller asks of the other tasks, and
//! the merged command/event inputs of the two radio state machines.

use super::events::BdAddr;

/// Actuator task inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCommand {
    /// Bit `n` is the requested state of actuator `n`.
    SetBitmask(u8),
}

/// Communication task inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsRequest {
    /// Latest valid temperature, kept for the next cloud exchange.
    Temperature { value_x10: i16 },
    /// Call the IoT API now with the current temperature and relay state.
    CloudSync { temperature_x10: i16, actuators: u8 },
    /// Fetch device name and target temperature.
    SetpointSync,
    /// Fetch the wall-clock time.
    TimeSync,
    /// Upload a hydrometer reading.
    Hydrometer {
        gravity_x1000: u16,
        temperature_x10: u16,
        battery_x1000: u16,
    },
}

// ───────────────────────────────────────────────────────────────
// WiFi inbox
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiCommand {
    StartWifi,
    StartPortal,
    Stop,
}

/// Radio-stack notifications relayed from the driver callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiEvent {
    GotIp,
    LostIp,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiInput {
    Command(WifiCommand),
    Event(WifiEvent),
}

impl From<WifiCommand> for WifiInput {
    fn from(c: WifiCommand) -> Self {
        Self::Command(c)
    }
}

impl From<WifiEvent> for WifiInput {
    fn from(e: WifiEvent) -> Self {
        Self::Event(e)
    }
}

// ───────────────────────────────────────────────────────────────
// Hydrometer inbox
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydroCommand {
    /// Scan for the registered hydrometer and read it.
    GetReading,
    /// List every hydrometer in range.
    ScanBricks,
}

/// BLE host notifications relayed from the GAP/GATTC callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydroEvent {
    /// A device advertising the hydrometer service was seen.
    Advertised { address: BdAddr, rssi: i16 },
    /// The scan ran for its full duration.
    ScanComplete,
    Connected,
    Disconnected,
    /// The host gave up on the current operation.
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydroInput {
    Command(HydroCommand),
    Event(HydroEvent),
}

impl From<HydroCommand> for HydroInput {
    fn from(c: HydroCommand) -> Self {
        Self::Command(c)
    }
}

impl From<HydroEvent> for HydroInput {
    fn from(e: HydroEvent) -> Self {
        Self::Event(e)
    }
}
