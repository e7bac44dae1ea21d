//! Upstream messages: everything that flows into the Controller, and
//! everything the Controller fans out to the display.
//!
//! Each fact that can go stale carries a `valid` flag. Invalid facts are
//! still delivered so the display can render "unknown" instead of a stale
//! value.

use core::fmt;
use core::str::FromStr;

// ───────────────────────────────────────────────────────────────
// Device name (the one owned payload)
// ───────────────────────────────────────────────────────────────

/// Display name of the brewing device, as reported by the backend.
///
/// Move-only: it is handed from the communication task to the Controller
/// and on to the display, and the last holder drops it. There is no
/// `Clone` so two owners cannot exist.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceName(String);

impl DeviceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ───────────────────────────────────────────────────────────────
// Connectivity
// ───────────────────────────────────────────────────────────────

/// RSSI reported while the link is down.
pub const RSSI_UNKNOWN: i16 = -127;

/// Coarse network state used for display and request pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Unconnected,
    /// Associated and holding an IP address.
    LinkUp,
    /// Link up and the reachability probe succeeded.
    InternetUp,
    /// Configuration portal is open.
    Portal,
}

impl Connectivity {
    /// Single-character status glyph for the display.
    pub const fn glyph(self) -> char {
        match self {
            Self::Unconnected => '-',
            Self::LinkUp => 'A',
            Self::InternetUp => 'I',
            Self::Portal => 'p',
        }
    }

    /// Whether outbound requests have a chance of reaching the backend.
    pub const fn is_online(self) -> bool {
        matches!(self, Self::LinkUp | Self::InternetUp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityReport {
    pub rssi: i16,
    pub class: Connectivity,
}

// ───────────────────────────────────────────────────────────────
// Hydrometer
// ───────────────────────────────────────────────────────────────

/// Bluetooth device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BdAddr(pub [u8; 6]);

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BdAddrParseError;

impl fmt::Display for BdAddrParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected six hex octets separated by ':'")
    }
}

impl FromStr for BdAddr {
    type Err = BdAddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 6];
        let mut parts = s.split(':');
        for byte in &mut out {
            let part = parts.next().ok_or(BdAddrParseError)?;
            if part.len() != 2 {
                return Err(BdAddrParseError);
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| BdAddrParseError)?;
        }
        if parts.next().is_some() {
            return Err(BdAddrParseError);
        }
        Ok(Self(out))
    }
}

/// Maximum number of hydrometers kept by an inventory scan.
pub const MAX_INVENTORY: usize = 8;

/// Addresses found by an inventory scan, in discovery order.
pub type ScanInventory = heapless::Vec<BdAddr, MAX_INVENTORY>;

/// Status bit: battery is charging.
pub const HYDRO_STATUS_CHARGING: u8 = 0x01;
/// Status bit: the hydrometer reports a hardware fault.
pub const HYDRO_STATUS_HW_ERROR: u8 = 0x80;

/// One decoded hydrometer reading plus the RSSI it was received at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HydroReading {
    pub status: u8,
    pub angle_x100: u16,
    pub temperature_x10: u16,
    pub battery_x1000: u16,
    pub rssi: i16,
}

impl HydroReading {
    /// Size of the packed record in the reading characteristic.
    pub const RECORD_LEN: usize = 7;

    /// Decode the packed little-endian record
    /// `{status u8, angle_x100 u16, temperature_x10 u16, battery_x1000 u16}`.
    ///
    /// Returns `None` for a short record; trailing bytes are ignored.
    pub fn decode(bytes: &[u8], rssi: i16) -> Option<Self> {
        if bytes.len() < Self::RECORD_LEN {
            return None;
        }
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        Some(Self {
            status: bytes[0],
            angle_x100: u16_at(1),
            temperature_x10: u16_at(3),
            battery_x1000: u16_at(5),
            rssi,
        })
    }

    pub fn angle_degrees(&self) -> f32 {
        f32::from(self.angle_x100) / 100.0
    }

    pub fn is_charging(&self) -> bool {
        self.status & HYDRO_STATUS_CHARGING != 0
    }

    pub fn has_hardware_error(&self) -> bool {
        self.status & HYDRO_STATUS_HW_ERROR != 0
    }
}

// ───────────────────────────────────────────────────────────────
// Controller inbox
// ───────────────────────────────────────────────────────────────

/// Soft timers owned by the Controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    CloudSync,
    SetpointSync,
    TimeSync,
    HydroRead,
    DisplayRefresh,
}

/// Everything the Controller can receive.
#[derive(Debug, PartialEq)]
pub enum ControllerMessage {
    // ── sensor task ──
    SensorTemperature { value_x10: i16, valid: bool },

    // ── communication task ──
    /// Relay bitmask requested by the backend (bit n = actuator n) and the
    /// server's next poll interval (`0` = not provided).
    ActuatorsUpdate { bitmask: u8, valid: bool, next_poll_ms: u32 },
    SetpointUpdate { value_x10: i16, valid: bool },
    DeviceName(DeviceName),
    TimeUpdate { hour: u8, minute: u8, valid: bool },
    Heartbeat { countdown: u16, max: u16, valid: bool },

    // ── actuator task ──
    /// Pending delay of an actuator whose output lags its request.
    ActuatorDelay { id: u8, requested: bool, remaining: u16 },
    ActuatorSwitched { id: u8, on: bool },

    // ── wifi task ──
    Connectivity(ConnectivityReport),

    // ── hydrometer task ──
    HydroReading { reading: HydroReading, valid: bool },
    HydroInventory(ScanInventory),

    // ── internal ──
    TimerFired(TimerId),
}

// ───────────────────────────────────────────────────────────────
// Display inbox
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget notifications for the display. Each variant is
/// independent; the display must not assume two kinds are consistent.
#[derive(Debug, PartialEq)]
pub enum DisplayMessage {
    Status(&'static str),
    Temperature { value_x10: i16, valid: bool },
    Setpoint { value_x10: i16, valid: bool },
    Actuators { bitmask: u8, valid: bool },
    Delay { id: u8, requested: bool, remaining: u16 },
    Relay { id: u8, on: bool },
    Wifi { rssi: i16, glyph: char },
    Time { hour: u8, minute: u8, valid: bool },
    Heartbeat { countdown: u16, max: u16, valid: bool },
    DeviceName(DeviceName),
    Hydrometer {
        gravity_x1000: u16,
        temperature_x10: u16,
        battery_x1000: u16,
        rssi: i16,
        valid: bool,
    },
    HydroInventory(ScanInventory),
}
