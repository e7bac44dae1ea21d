//! System configuration parameters
//!
//! All tunable parameters for the BrewBrick controller, grouped by the task
//! that consumes them. Host builds may override the defaults with a JSON
//! file named by `BREWBRICK_CONFIG`.

use heapless::String;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pins;

/// Number of relay outputs on the board.
pub const RELAY_COUNT: usize = 2;

/// Environment variable naming a JSON config override (host builds).
pub const CONFIG_ENV: &str = "BREWBRICK_CONFIG";

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub relays: [RelayConfig; RELAY_COUNT],
    pub timing: TimingConfig,
    pub wifi: WifiConfig,
    pub hydrometer: HydrometerConfig,
    pub cloud: CloudConfig,
    pub sensor: SensorConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            relays: [
                // Cooling compressor needs a long restart delay.
                RelayConfig::labelled("Cool", pins::RELAY0_GPIO, 200),
                RelayConfig::labelled("Heat", pins::RELAY1_GPIO, 0),
            ],
            timing: TimingConfig::default(),
            wifi: WifiConfig::default(),
            hydrometer: HydrometerConfig::default(),
            cloud: CloudConfig::default(),
            sensor: SensorConfig::default(),
        }
    }
}

// ── Relays ──

/// Electrical level that switches a relay on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActiveLevel {
    /// Output low energises the relay (typical open-drain relay board).
    #[default]
    Low,
    High,
}

impl ActiveLevel {
    /// Electrical level for the logical state `on`.
    pub const fn level_for(self, on: bool) -> bool {
        match self {
            Self::High => on,
            Self::Low => !on,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub label: String<8>,
    pub gpio: i32,
    pub active_level: ActiveLevel,
    /// Minimum seconds between turning off and turning on again.
    pub on_delay_secs: u16,
    /// Minimum seconds between turning on and turning off again.
    pub off_delay_secs: u16,
}

impl RelayConfig {
    fn labelled(label: &str, gpio: i32, on_delay_secs: u16) -> Self {
        Self {
            label: heapless_str(label),
            gpio,
            active_level: ActiveLevel::Low,
            on_delay_secs,
            off_delay_secs: 0,
        }
    }
}

// ── Timing ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Actuator control tick (milliseconds).
    pub actuator_tick_ms: u32,
    /// Sensor read interval (milliseconds).
    pub sensor_read_interval_ms: u32,
    pub cloud_first_secs: u32,
    /// Cloud interval used until the server provides one.
    pub cloud_default_secs: u32,
    pub setpoint_first_secs: u32,
    pub setpoint_interval_secs: u32,
    pub time_first_secs: u32,
    pub time_interval_secs: u32,
    pub hydro_first_secs: u32,
    /// Hydrometer cadence after a good reading.
    pub hydro_healthy_secs: u32,
    /// Hydrometer cadence after a failed reading.
    pub hydro_retry_secs: u32,
    pub display_refresh_secs: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            actuator_tick_ms: 1000,
            sensor_read_interval_ms: 2000,
            cloud_first_secs: 10,
            cloud_default_secs: 60,
            setpoint_first_secs: 20,
            setpoint_interval_secs: 60,
            time_first_secs: 5,
            time_interval_secs: 60,
            hydro_first_secs: 30,
            hydro_healthy_secs: 900,
            hydro_retry_secs: 60,
            display_refresh_secs: 1,
        }
    }
}

// ── WiFi ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub ssid: String<32>,
    pub password: String<64>,
    /// SSID of the configuration access point.
    pub portal_ssid: String<32>,
    pub hostname: String<32>,
    /// Open the portal instead of joining the network at boot.
    pub boot_into_portal: bool,
    /// Status reports are produced every this many 1 s ticks.
    pub status_interval_ticks: u16,
    /// Reachability probe every this many reports while it succeeds.
    pub ping_interval_reports: u16,
    /// Reachability probe every this many reports after a failure.
    pub ping_retry_reports: u16,
    pub ping_host: String<64>,
    /// Give up on a connect that produced no IP after this long.
    pub connect_timeout_secs: u16,
    pub reconnect_min_backoff_secs: u16,
    pub reconnect_max_backoff_secs: u16,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            portal_ssid: heapless_str("BOOKESBRICK"),
            hostname: heapless_str("bookesbrick"),
            boot_into_portal: false,
            status_interval_ticks: 1,
            ping_interval_reports: 30,
            ping_retry_reports: 3,
            ping_host: heapless_str("brewbricks.com"),
            connect_timeout_secs: 20,
            reconnect_min_backoff_secs: 2,
            reconnect_max_backoff_secs: 60,
        }
    }
}

// ── Hydrometer ──

/// Specific-gravity polynomial over the tilt angle in degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GravityCalibration {
    pub c0: f32,
    pub c1: f32,
    pub c2: f32,
    pub c3: f32,
}

impl Default for GravityCalibration {
    fn default() -> Self {
        // Linear fit: 25° → 1.000, 65° → 1.090.
        Self {
            c0: 0.943_75,
            c1: 0.002_25,
            c2: 0.0,
            c3: 0.0,
        }
    }
}

impl GravityCalibration {
    pub fn gravity(&self, angle_deg: f32) -> f32 {
        let a = angle_deg;
        self.c0 + a * (self.c1 + a * (self.c2 + a * self.c3))
    }

    /// Specific gravity × 1000 for a tilt angle in hundredths of a degree.
    pub fn gravity_x1000(&self, angle_x100: u16) -> u16 {
        let sg = self.gravity(f32::from(angle_x100) / 100.0) * 1000.0;
        sg.round().clamp(0.0, f32::from(u16::MAX)) as u16
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HydrometerConfig {
    pub enabled: bool,
    /// Address of the paired hydrometer, most significant byte first.
    pub registered_address: [u8; 6],
    pub timeout_secs: u16,
    pub scan_duration_secs: u16,
    /// Scan interval (0.625 ms units).
    pub scan_interval: u16,
    /// Scan window (0.625 ms units).
    pub scan_window: u16,
    pub active_scan: bool,
    pub calibration: GravityCalibration,
}

impl Default for HydrometerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            registered_address: [0xA2, 0x4B, 0xED, 0x2B, 0xCC, 0x4B],
            timeout_secs: 15,
            scan_duration_secs: 10,
            scan_interval: 1349,
            scan_window: 449,
            active_scan: true,
            calibration: GravityCalibration::default(),
        }
    }
}

// ── Cloud ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub api_base: String<64>,
    pub api_key: String<32>,
    pub pro_api_key: String<32>,
    pub device_id: String<16>,
    /// Device type reported to the IoT API; the API keys its answer on it.
    pub device_type: String<16>,
    pub brand: String<16>,
    pub version: String<8>,
    pub time_api_url: String<96>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_base: heapless_str("https://brewbricks.com/api"),
            api_key: String::new(),
            pro_api_key: String::new(),
            device_id: String::new(),
            device_type: heapless_str("bookesbrick"),
            brand: heapless_str("bierbot"),
            version: heapless_str("0.2"),
            time_api_url: heapless_str("https://timeapi.io/api/Time/current/zone?timeZone=UTC"),
        }
    }
}

// ── Sensor ──

/// Temperature sensor hardware fitted to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SensorKind {
    #[default]
    Simulated,
    OneWireDigital,
    I2CHumidityTemp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub backend: SensorKind,
    /// Samples further than this from the window median are discarded
    /// (tenths of a degree).
    pub max_deviation: i32,
    pub onewire_gpio: i32,
    pub i2c_sda_gpio: i32,
    pub i2c_scl_gpio: i32,
    pub i2c_address: u8,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            backend: SensorKind::Simulated,
            max_deviation: 100,
            onewire_gpio: pins::ONEWIRE_GPIO,
            i2c_sda_gpio: pins::I2C_SDA_GPIO,
            i2c_scl_gpio: pins::I2C_SCL_GPIO,
            i2c_address: pins::SHT3X_I2C_ADDR,
        }
    }
}

fn heapless_str<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

// ───────────────────────────────────────────────────────────────
// Validation and loading
// ───────────────────────────────────────────────────────────────

impl SystemConfig {
    /// Reject values that would stall a task loop or defeat a protection.
    pub fn validate(&self) -> Result<()> {
        let t = &self.timing;
        if t.actuator_tick_ms == 0 || t.sensor_read_interval_ms == 0 {
            return Err(Error::Config("task periods must be non-zero"));
        }
        if [
            t.cloud_default_secs,
            t.setpoint_interval_secs,
            t.time_interval_secs,
            t.hydro_healthy_secs,
            t.hydro_retry_secs,
            t.display_refresh_secs,
        ]
        .contains(&0)
        {
            return Err(Error::Config("timer intervals must be non-zero"));
        }
        let w = &self.wifi;
        if w.status_interval_ticks == 0 || w.ping_interval_reports == 0 || w.ping_retry_reports == 0 {
            return Err(Error::Config("wifi report intervals must be non-zero"));
        }
        if w.ping_retry_reports > w.ping_interval_reports {
            return Err(Error::Config("ping retry must not exceed ping interval"));
        }
        if w.reconnect_min_backoff_secs == 0
            || w.reconnect_min_backoff_secs > w.reconnect_max_backoff_secs
        {
            return Err(Error::Config("reconnect backoff range is empty"));
        }
        if self.hydrometer.timeout_secs == 0 {
            return Err(Error::Config("hydrometer timeout must be non-zero"));
        }
        if self.sensor.max_deviation <= 0 {
            return Err(Error::Config("filter deviation must be positive"));
        }
        Ok(())
    }

    /// Load the host override named by `BREWBRICK_CONFIG`, or defaults.
    ///
    /// A missing variable is normal; an unreadable or invalid file is logged
    /// and replaced by defaults.
    pub fn load() -> Self {
        let Ok(path) = std::env::var(CONFIG_ENV) else {
            return Self::default();
        };
        match Self::from_file(&path) {
            Ok(cfg) => {
                info!("Config: loaded {}", path);
                cfg
            }
            Err(e) => {
                warn!("Config: {} rejected ({}), using defaults", path, e);
                Self::default()
            }
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|_| Error::Config("file not readable"))?;
        let cfg: Self =
            serde_json::from_slice(&bytes).map_err(|_| Error::Config("file is not valid JSON"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
