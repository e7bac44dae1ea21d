//! Cloud backend client: the communication task.
//!
//! Three HTTP GET exchanges, each answered with JSON:
//!
//! | Request        | Endpoint                         | Produces                          |
//! |----------------|----------------------------------|-----------------------------------|
//! | `CloudSync`    | `{api_base}/iot/v1?...`          | `ActuatorsUpdate`, `Heartbeat`    |
//! | `SetpointSync` | `{api_base}/device?...`          | `SetpointUpdate`, `DeviceName`    |
//! | `TimeSync`     | `{time_api_url}`                 | `TimeUpdate`                      |
//!
//! Transport and parse failures never escape this module: they turn into
//! the same messages with `valid = false`.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspHttpConnection` with the certificate
//!   bundle attached.
//! - **all other targets**: a simulated backend with canned answers.

use core::fmt::Write as _;

use heapless::String;
use log::{debug, info, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::app::commands::CommsRequest;
use crate::app::events::{ControllerMessage, DeviceName};
use crate::app::ports::{HttpClient, Outbox};
use crate::config::CloudConfig;
use crate::error::CommsError;
use crate::queue::Queue;

const IOT_PATH: &str = "/iot/v1";
const PRO_DEVICE_PATH: &str = "/device";
const URL_LEN: usize = 384;
/// Largest response body accepted.
const MAX_BODY: usize = 4096;
/// Poll interval assumed when the backend does not name one.
const DEFAULT_POLL_SECS: u16 = 60;

// ───────────────────────────────────────────────────────────────
// Response shapes
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct IotResponse {
    epower_0_state: Option<u8>,
    epower_1_state: Option<u8>,
    next_request_ms: Option<u32>,
    #[serde(default)]
    used_for_devices: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TargetState {
    #[serde(rename = "tempCelsius")]
    temp_celsius: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct DeviceResponse {
    name: Option<std::string::String>,
    #[serde(rename = "targetState")]
    target_state: Option<TargetState>,
    active: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TimeResponse {
    hour: u8,
    minute: u8,
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, CommsError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Cloud: bad JSON: {}", e);
        CommsError::MalformedResponse
    })
}

// ───────────────────────────────────────────────────────────────
// Client
// ───────────────────────────────────────────────────────────────

/// Latest hydrometer values, attached to the next IoT call.
#[derive(Debug, Clone, Copy)]
struct HydroSample {
    gravity_x1000: u16,
    temperature_x10: u16,
    battery_x1000: u16,
}

pub struct CloudClient<H: HttpClient> {
    http: H,
    cfg: CloudConfig,
    chip_id: u64,
    temperature_x10: Option<i16>,
    hydro: Option<HydroSample>,
    /// Backend device the brick is assigned to, from `used_for_devices`.
    device_id: Option<String<32>>,
    last_name: Option<std::string::String>,
}

impl<H: HttpClient> CloudClient<H> {
    pub fn new(cfg: CloudConfig, chip_id: u64, http: H) -> Self {
        // A configured device id holds until the backend names another.
        let device_id = if cfg.device_id.is_empty() {
            None
        } else {
            let mut id = String::new();
            id.push_str(&cfg.device_id).ok().map(|()| id)
        };
        Self {
            http,
            cfg,
            chip_id,
            temperature_x10: None,
            hydro: None,
            device_id,
            last_name: None,
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    pub fn handle(&mut self, req: CommsRequest, out: &mut impl Outbox<ControllerMessage>) {
        match req {
            CommsRequest::Temperature { value_x10 } => self.temperature_x10 = Some(value_x10),
            CommsRequest::CloudSync { temperature_x10, actuators } => {
                self.cloud_sync(temperature_x10, actuators, out)
            }
            CommsRequest::SetpointSync => self.setpoint_sync(out),
            CommsRequest::TimeSync => self.time_sync(out),
            CommsRequest::Hydrometer { gravity_x1000, temperature_x10, battery_x1000 } => {
                debug!("Cloud: hydrometer SG {}.{:03}", gravity_x1000 / 1000, gravity_x1000 % 1000);
                self.hydro = Some(HydroSample { gravity_x1000, temperature_x10, battery_x1000 });
            }
        }
    }

    // ── IoT API ──────────────────────────────────────────────

    fn iot_url(&self, temperature_x10: i16, actuators: u8) -> Result<String<URL_LEN>, CommsError> {
        let mut url = String::new();
        write!(
            url,
            "{}{}?apikey={}&type={}&brand={}&version={}&chipid={:06x}{:06x}\
             &s_number_temp_0={:.1}&s_number_temp_id_0=0&a_bool_epower_0={}&a_bool_epower_1={}",
            self.cfg.api_base,
            IOT_PATH,
            self.cfg.api_key,
            self.cfg.device_type,
            self.cfg.brand,
            self.cfg.version,
            (self.chip_id >> 24) & 0xFF_FFFF,
            self.chip_id & 0xFF_FFFF,
            f32::from(temperature_x10) / 10.0,
            actuators & 1,
            (actuators >> 1) & 1,
        )
        .map_err(|_| CommsError::UrlTooLong)?;
        if let Some(h) = self.hydro {
            write!(
                url,
                "&s_number_sg_0={:.3}&s_number_sg_temp_0={:.1}&s_number_sg_batt_0={:.3}",
                f32::from(h.gravity_x1000) / 1000.0,
                f32::from(h.temperature_x10) / 10.0,
                f32::from(h.battery_x1000) / 1000.0,
            )
            .map_err(|_| CommsError::UrlTooLong)?;
        }
        Ok(url)
    }

    fn cloud_sync(
        &mut self,
        temperature_x10: i16,
        actuators: u8,
        out: &mut impl Outbox<ControllerMessage>,
    ) {
        // The comms inbox is FIFO, so the cached sample is never older.
        let temperature_x10 = self.temperature_x10.unwrap_or(temperature_x10);
        let result = self
            .iot_url(temperature_x10, actuators)
            .and_then(|url| self.http.get(&url))
            .and_then(|body| parse::<IotResponse>(&body));

        let (bitmask, valid, next_poll_ms) = match result {
            Ok(resp) => {
                if let Some(first) = resp.used_for_devices.first() {
                    self.adopt_device(first);
                }
                match (resp.epower_0_state, resp.epower_1_state) {
                    (Some(e0), Some(e1)) => {
                        ((e0 & 1) | ((e1 & 1) << 1), true, resp.next_request_ms.unwrap_or(0))
                    }
                    _ => {
                        warn!("Cloud: epower states missing");
                        (0, false, resp.next_request_ms.unwrap_or(0))
                    }
                }
            }
            Err(e) => {
                warn!("Cloud: IoT call failed: {}", e);
                (0, false, 0)
            }
        };
        info!("Cloud: actuators {:#04b} valid={} next={}ms", bitmask, valid, next_poll_ms);
        out.deliver(ControllerMessage::ActuatorsUpdate { bitmask, valid, next_poll_ms });

        let secs = if next_poll_ms == 0 {
            DEFAULT_POLL_SECS
        } else {
            (next_poll_ms / 1000).clamp(1, 255) as u16
        };
        out.deliver(ControllerMessage::Heartbeat { countdown: secs, max: secs, valid });
    }

    fn adopt_device(&mut self, id: &serde_json::Value) {
        let text = match id {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return,
        };
        let mut device = String::new();
        if device.push_str(&text).is_err() {
            warn!("Cloud: device id '{}' too long", text);
            return;
        }
        if self.device_id.as_ref() != Some(&device) {
            info!("Cloud: assigned to device {}", device);
            self.device_id = Some(device);
        }
    }

    // ── PRO API ──────────────────────────────────────────────

    fn setpoint_sync(&mut self, out: &mut impl Outbox<ControllerMessage>) {
        let Some(device_id) = self.device_id.clone() else {
            info!("Cloud: no device assigned yet, setpoint skipped");
            return;
        };
        let mut url: String<URL_LEN> = String::new();
        let result = write!(
            url,
            "{}{}?apikey={}&proapikey={}&deviceid={}",
            self.cfg.api_base, PRO_DEVICE_PATH, self.cfg.api_key, self.cfg.pro_api_key, device_id
        )
        .map_err(|_| CommsError::UrlTooLong)
        .and_then(|()| self.http.get(&url))
        .and_then(|body| parse::<DeviceResponse>(&body));

        match result {
            Ok(resp) => {
                if let Some(name) = resp.name {
                    if self.last_name.as_deref() != Some(name.as_str()) {
                        self.last_name = Some(name.clone());
                        out.deliver(ControllerMessage::DeviceName(DeviceName::new(name)));
                    }
                }
                let celsius = resp.target_state.and_then(|t| t.temp_celsius);
                let value_x10 = celsius.map_or(0, |c| (c * 10.0).round() as i16);
                let valid = celsius.is_some() && resp.active.unwrap_or(false);
                out.deliver(ControllerMessage::SetpointUpdate { value_x10, valid });
            }
            Err(e) => {
                warn!("Cloud: PRO API call failed: {}", e);
                out.deliver(ControllerMessage::SetpointUpdate { value_x10: 0, valid: false });
            }
        }
    }

    // ── Time ─────────────────────────────────────────────────

    fn time_sync(&mut self, out: &mut impl Outbox<ControllerMessage>) {
        let result = self
            .http
            .get(&self.cfg.time_api_url)
            .and_then(|body| parse::<TimeResponse>(&body));
        let msg = match result {
            Ok(t) if t.hour < 24 && t.minute < 60 => {
                ControllerMessage::TimeUpdate { hour: t.hour, minute: t.minute, valid: true }
            }
            Ok(t) => {
                warn!("Cloud: implausible time {}:{}", t.hour, t.minute);
                ControllerMessage::TimeUpdate { hour: 0, minute: 0, valid: false }
            }
            Err(e) => {
                warn!("Cloud: time call failed: {}", e);
                ControllerMessage::TimeUpdate { hour: 0, minute: 0, valid: false }
            }
        };
        out.deliver(msg);
    }
}

/// Communication task body.
pub fn run<H: HttpClient, const N: usize, const M: usize>(
    mut client: CloudClient<H>,
    inbox: &Queue<CommsRequest, N>,
    mut controller: &Queue<ControllerMessage, M>,
    wait: core::time::Duration,
) -> ! {
    info!("Cloud: task started");
    loop {
        if let Some(req) = inbox.receive(wait) {
            client.handle(req, &mut controller);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Transport
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct HttpsTransport {
    client: embedded_svc::http::client::Client<esp_idf_svc::http::client::EspHttpConnection>,
}

#[cfg(target_os = "espidf")]
impl HttpsTransport {
    pub fn new() -> crate::error::Result<Self> {
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
        let conf = Configuration {
            timeout: Some(core::time::Duration::from_secs(10)),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let conn = EspHttpConnection::new(&conf)
            .map_err(|_| crate::error::Error::Init("http client"))?;
        Ok(Self { client: embedded_svc::http::client::Client::wrap(conn) })
    }
}

#[cfg(target_os = "espidf")]
impl HttpClient for HttpsTransport {
    fn get(&mut self, url: &str) -> Result<Vec<u8>, CommsError> {
        use embedded_svc::http::Status;
        use embedded_svc::io::Read;

        let request = self.client.get(url).map_err(|_| CommsError::RequestFailed)?;
        let mut response = request.submit().map_err(|_| CommsError::RequestFailed)?;
        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(CommsError::HttpStatus(status));
        }
        let mut body = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            let n = response.read(&mut chunk).map_err(|_| CommsError::RequestFailed)?;
            if n == 0 {
                break;
            }
            if body.len() + n > MAX_BODY {
                return Err(CommsError::MalformedResponse);
            }
            body.extend_from_slice(&chunk[..n]);
        }
        Ok(body)
    }
}

/// Factory MAC as the chip id reported to the backend.
#[cfg(target_os = "espidf")]
pub fn chip_id() -> u64 {
    let mut mac = [0u8; 8];
    unsafe { esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr()) };
    u64::from_be_bytes([0, 0, mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]])
}

#[cfg(not(target_os = "espidf"))]
pub fn chip_id() -> u64 {
    0x0000_24A1_60C0_FFEE
}

// ── Simulated backend ─────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(not(target_os = "espidf"))]
static SIM_BACKEND_DOWN: AtomicBool = AtomicBool::new(false);

/// Make every simulated request fail at the transport level.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_backend_down(down: bool) {
    SIM_BACKEND_DOWN.store(down, Ordering::Relaxed);
}

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct SimBackend {
    requests: u32,
}

#[cfg(not(target_os = "espidf"))]
impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(not(target_os = "espidf"))]
impl HttpClient for SimBackend {
    fn get(&mut self, url: &str) -> Result<Vec<u8>, CommsError> {
        self.requests += 1;
        if SIM_BACKEND_DOWN.load(Ordering::Relaxed) {
            return Err(CommsError::RequestFailed);
        }
        info!("Cloud(sim): GET {}", url);
        let body = if url.contains(IOT_PATH) {
            // Alternate the cooling relay every other exchange.
            let cool = self.requests / 2 % 2;
            format!(
                r#"{{"epower_0_state":{cool},"epower_1_state":0,"next_request_ms":30000,"used_for_devices":["4711"]}}"#
            )
        } else if url.contains(PRO_DEVICE_PATH) {
            r#"{"name":"Gärkeller","type":"brewbrick","targetState":{"tempCelsius":12.5},"active":true}"#
                .to_owned()
        } else {
            let secs = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |d| d.as_secs());
            format!(r#"{{"hour":{},"minute":{}}}"#, secs / 3600 % 24, secs / 60 % 60)
        };
        Ok(body.into_bytes())
    }
}
