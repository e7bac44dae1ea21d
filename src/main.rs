//! BrewBrick Firmware: Main Entry Point
//!
//! Seven tasks, each owning one inbox and talking to the others only
//! through the static queues in [`brewbrick::channels`].
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  sensor ──┐                                 ┌──▶ actuators   │
//! │  cloud ───┤                                 ├──▶ display     │
//! │  wifi ────┼──▶ controller (router + timers) ├──▶ cloud       │
//! │  hydro ───┤                                 ├──▶ wifi        │
//! │  actuators┘                                 └──▶ hydro       │
//! │                                                              │
//! │  hydro is pinned to the protocol core (BLE host lives there) │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use brewbrick::adapters::ble::{BleUnavailable, HydroBle};
use brewbrick::adapters::cloud::{self, CloudClient};
use brewbrick::adapters::display::{self, LogDisplay};
use brewbrick::adapters::relay::GpioRelays;
use brewbrick::adapters::time::BootClock;
use brewbrick::adapters::wifi::StationRadio;
use brewbrick::app::actuators::{self, ActuatorController};
use brewbrick::app::controller::{self, Controller, Downstream};
use brewbrick::app::hydrometer::{self, HydrometerManager};
use brewbrick::app::ports::BleError;
use brewbrick::app::wifi::{self, WifiManager};
use brewbrick::channels;
use brewbrick::config::SystemConfig;
use brewbrick::drivers::task_pin::{spawn_on_core, Core};
use brewbrick::sensors::{self, SensorBackend, TemperatureSampler};

// ── Task table: (priority, stack KB) ──────────────────────────
const SENSOR_TASK: (u8, usize) = (5, 4);
const ACTUATOR_TASK: (u8, usize) = (6, 4);
const CONTROLLER_TASK: (u8, usize) = (5, 8);
const DISPLAY_TASK: (u8, usize) = (3, 4);
const CLOUD_TASK: (u8, usize) = (4, 12);
const WIFI_TASK: (u8, usize) = (4, 6);
const HYDRO_TASK: (u8, usize) = (5, 8);

fn main() -> Result<()> {
    // ── 1. Platform bootstrap ─────────────────────────────────
    init_logging()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  BrewBrick v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    let config = SystemConfig::load();
    config.validate().context("configuration rejected")?;
    if config.wifi.ssid.is_empty() && !config.wifi.boot_into_portal {
        warn!("No WiFi credentials configured; the network will stay down");
    }
    let clock = BootClock::new();

    // ── 3. Adapters ───────────────────────────────────────────
    let relays =
        GpioRelays::new(&config.relays).map_err(|e| anyhow!("relay outputs: {}", e))?;

    #[cfg(target_os = "espidf")]
    let (backend, radio, http) = {
        use esp_idf_hal::peripherals::Peripherals;
        use esp_idf_svc::eventloop::EspSystemEventLoop;
        use esp_idf_svc::nvs::EspDefaultNvsPartition;

        let peripherals = Peripherals::take().context("peripherals already taken")?;
        let sys_loop = EspSystemEventLoop::take().context("system event loop")?;
        let nvs = match EspDefaultNvsPartition::take() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("NVS partition unavailable ({}), WiFi calibration not cached", e);
                None
            }
        };
        let backend = SensorBackend::open(&config.sensor, peripherals.i2c0);
        let radio = StationRadio::new(&config.wifi, peripherals.modem, sys_loop, nvs)?;
        let http = cloud::HttpsTransport::new()?;
        (backend, radio, http)
    };

    #[cfg(not(target_os = "espidf"))]
    let (backend, radio, http) = (
        SensorBackend::open(&config.sensor),
        StationRadio::new(&config.wifi)?,
        cloud::SimBackend::new(),
    );

    let chip_id = cloud::chip_id();
    info!("Chip ID: {:012x}", chip_id);

    // ── 4. State machines ─────────────────────────────────────
    let actuator_ctrl = ActuatorController::new(&config.relays, relays);
    let sampler = TemperatureSampler::new(config.sensor.max_deviation);
    let ctrl = Controller::new(&config);
    let wifi_mgr = WifiManager::new(config.wifi.clone(), radio);
    let cloud_client = CloudClient::new(config.cloud.clone(), chip_id, http);

    let sensor_interval = Duration::from_millis(u64::from(config.timing.sensor_read_interval_ms));
    let actuator_tick = Duration::from_millis(u64::from(config.timing.actuator_tick_ms));

    // ── 5. Tasks ──────────────────────────────────────────────
    spawn_on_core(Core::App, ACTUATOR_TASK.0, ACTUATOR_TASK.1, "actuators\0", move || {
        actuators::run(actuator_ctrl, &channels::ACTUATORS, &channels::CONTROLLER, actuator_tick)
    })?;

    spawn_on_core(Core::App, SENSOR_TASK.0, SENSOR_TASK.1, "sensor\0", move || {
        sensors::run(backend, sampler, sensor_interval, &channels::CONTROLLER)
    })?;

    spawn_on_core(Core::App, DISPLAY_TASK.0, DISPLAY_TASK.1, "display\0", move || {
        display::run(LogDisplay::new(), &channels::DISPLAY, channels::DISPLAY_WAIT)
    })?;

    spawn_on_core(Core::App, CLOUD_TASK.0, CLOUD_TASK.1, "cloud\0", move || {
        cloud::run(cloud_client, &channels::COMMS, &channels::CONTROLLER, channels::COMMS_WAIT)
    })?;

    spawn_on_core(Core::App, WIFI_TASK.0, WIFI_TASK.1, "wifi\0", move || {
        wifi::run(wifi_mgr, &channels::WIFI, &channels::CONTROLLER, channels::WIFI_WAIT, clock)
    })?;

    // The BLE host must be brought up on the core the task runs on.
    let hydro_cfg = config.hydrometer.clone();
    spawn_on_core(Core::Pro, HYDRO_TASK.0, HYDRO_TASK.1, "hydro\0", move || {
        let (inbox, controller) = (&channels::HYDRO, &channels::CONTROLLER);
        let wait = channels::HYDRO_WAIT;
        match open_ble(&hydro_cfg) {
            Ok(ble) => {
                let mgr = HydrometerManager::new(&hydro_cfg, ble);
                hydrometer::run(mgr, inbox, controller, wait, clock)
            }
            Err(e) => {
                log::error!("Hydro: BLE unavailable ({}), every reading will be invalid", e);
                let mgr = HydrometerManager::new(&hydro_cfg, BleUnavailable(e));
                hydrometer::run(mgr, inbox, controller, wait, clock)
            }
        }
    })?;

    // Controller last, so its start-up messages find every consumer running.
    spawn_on_core(Core::App, CONTROLLER_TASK.0, CONTROLLER_TASK.1, "controller\0", move || {
        let downstream = Downstream {
            display: &channels::DISPLAY,
            actuators: &channels::ACTUATORS,
            comms: &channels::COMMS,
            wifi: &channels::WIFI,
            hydro: &channels::HYDRO,
        };
        controller::run(ctrl, &channels::CONTROLLER, downstream, channels::CONTROLLER_WAIT, clock)
    })?;

    info!("System ready.");

    loop {
        std::thread::sleep(Duration::from_secs(60));
        info!("Uptime {}s", clock.uptime_secs());
    }
}

#[cfg(target_os = "espidf")]
fn init_logging() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn init_logging() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()?;
    Ok(())
}

#[cfg(target_os = "espidf")]
fn open_ble(_cfg: &brewbrick::config::HydrometerConfig) -> Result<HydroBle, BleError> {
    HydroBle::new()
}

/// The simulation puts the registered hydrometer in range.
#[cfg(not(target_os = "espidf"))]
fn open_ble(cfg: &brewbrick::config::HydrometerConfig) -> Result<HydroBle, BleError> {
    use brewbrick::adapters::ble::SimPeer;
    use brewbrick::app::events::{BdAddr, HydroReading};

    let reading = HydroReading {
        status: 0,
        angle_x100: 4200,
        temperature_x10: 194,
        battery_x1000: 3870,
        rssi: -68,
    };
    Ok(HydroBle::with_peers(vec![SimPeer::new(BdAddr(cfg.registered_address), &reading)]))
}
