//! WiFi radio adapter.
//!
//! Implements [`WifiRadio`], the boundary between the connectivity state
//! machine and the network stack. Commands are issued synchronously; their
//! outcomes (association, DHCP lease, link loss) come back as
//! [`WifiEvent`]s posted to the WiFi inbox from the system event loop.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::EspWifi` in station or
//!   access-point mode, events bridged from `EspSystemEventLoop`.
//! - **all other targets**: a simulated access point steered through
//!   [`sim_set_access_point`], [`sim_set_internet`] and [`sim_drop_link`].

#[cfg(target_os = "espidf")]
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(target_os = "espidf")]
use std::time::Duration;

use log::info;

use crate::app::commands::WifiEvent;
use crate::app::ports::{ConnectivityError, WifiRadio};
use crate::config::WifiConfig;

/// Budget for one reachability probe (DNS + TCP connect).
#[cfg(target_os = "espidf")]
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
#[cfg(target_os = "espidf")]
const PROBE_PORT: u16 = 80;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

fn post(ev: WifiEvent) {
    crate::channels::WIFI.post(ev.into());
}

/// TCP reachability of `host`.
#[cfg(target_os = "espidf")]
fn tcp_probe(host: &str) -> bool {
    let addr = match (host, PROBE_PORT).to_socket_addrs() {
        Ok(mut addrs) => addrs.next(),
        Err(e) => {
            log::warn!("WiFi: probe DNS lookup of '{}' failed: {}", host, e);
            None
        }
    };
    addr.is_some_and(|a| TcpStream::connect_timeout(&a, PROBE_TIMEOUT).is_ok())
}

// ───────────────────────────────────────────────────────────────
// Simulation knobs
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(not(target_os = "espidf"))]
static SIM_AP_PRESENT: AtomicBool = AtomicBool::new(true);
#[cfg(not(target_os = "espidf"))]
static SIM_INTERNET: AtomicBool = AtomicBool::new(true);

/// Whether the simulated access point answers association requests.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_access_point(present: bool) {
    SIM_AP_PRESENT.store(present, Ordering::Relaxed);
}

/// Whether the simulated reachability probe succeeds.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_internet(up: bool) {
    SIM_INTERNET.store(up, Ordering::Relaxed);
}

/// Simulate the access point going away.
#[cfg(not(target_os = "espidf"))]
pub fn sim_drop_link() {
    post(WifiEvent::LostIp);
    post(WifiEvent::Disconnected);
}

// ───────────────────────────────────────────────────────────────
// Radio
// ───────────────────────────────────────────────────────────────

pub struct StationRadio {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    portal_ssid: heapless::String<32>,
    associated: bool,
    #[cfg(target_os = "espidf")]
    wifi: esp_idf_svc::wifi::EspWifi<'static>,
    #[cfg(target_os = "espidf")]
    _subscriptions: (
        esp_idf_svc::eventloop::EspSubscription<'static, esp_idf_svc::eventloop::System>,
        esp_idf_svc::eventloop::EspSubscription<'static, esp_idf_svc::eventloop::System>,
    ),
}

impl StationRadio {
    /// Take the modem and bridge WiFi/IP events into the WiFi inbox.
    #[cfg(target_os = "espidf")]
    pub fn new(
        cfg: &WifiConfig,
        modem: esp_idf_hal::modem::Modem,
        sys_loop: esp_idf_svc::eventloop::EspSystemEventLoop,
        nvs: Option<esp_idf_svc::nvs::EspDefaultNvsPartition>,
    ) -> crate::error::Result<Self> {
        use crate::error::Error;
        use esp_idf_svc::netif::IpEvent;
        use esp_idf_svc::wifi::{EspWifi, WifiEvent as EspWifiEvent};

        let wifi = EspWifi::new(modem, sys_loop.clone(), nvs).map_err(|_| Error::Init("wifi driver"))?;

        let wifi_sub = sys_loop
            .subscribe::<EspWifiEvent, _>(|event| match event {
                EspWifiEvent::StaConnected(_) | EspWifiEvent::ApStaConnected(_) => {
                    post(WifiEvent::Connected)
                }
                EspWifiEvent::StaDisconnected(_) => post(WifiEvent::Disconnected),
                _ => {}
            })
            .map_err(|_| Error::Init("wifi event subscription"))?;
        let ip_sub = sys_loop
            .subscribe::<IpEvent, _>(|event| match event {
                IpEvent::DhcpIpAssigned(_) => post(WifiEvent::GotIp),
                IpEvent::DhcpIpDeassigned(_) => post(WifiEvent::LostIp),
                _ => {}
            })
            .map_err(|_| Error::Init("ip event subscription"))?;

        Ok(Self {
            ssid: cfg.ssid.clone(),
            password: cfg.password.clone(),
            portal_ssid: cfg.portal_ssid.clone(),
            associated: false,
            wifi,
            _subscriptions: (wifi_sub, ip_sub),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(cfg: &WifiConfig) -> crate::error::Result<Self> {
        Ok(Self {
            ssid: cfg.ssid.clone(),
            password: cfg.password.clone(),
            portal_ssid: cfg.portal_ssid.clone(),
            associated: false,
        })
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };
        let conf = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.as_str().try_into().map_err(|_| ConnectivityError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });
        self.wifi
            .set_configuration(&conf)
            .map_err(|_| ConnectivityError::ConnectionFailed)?;
        self.wifi.start().map_err(|_| ConnectivityError::ConnectionFailed)?;
        // Non-blocking: the outcome arrives as StaConnected / DhcpIpAssigned.
        self.wifi.connect().map_err(|_| ConnectivityError::ConnectionFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        if SIM_AP_PRESENT.load(Ordering::Relaxed) {
            info!("WiFi(sim): associated with '{}'", self.ssid);
            post(WifiEvent::Connected);
            post(WifiEvent::GotIp);
        } else {
            info!("WiFi(sim): '{}' not in range", self.ssid);
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_start_portal(&mut self) -> Result<(), ConnectivityError> {
        use embedded_svc::wifi::{AccessPointConfiguration, AuthMethod, Configuration};

        let conf = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: self
                .portal_ssid
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidSsid)?,
            auth_method: AuthMethod::None,
            channel: 1,
            ..Default::default()
        });
        self.wifi
            .set_configuration(&conf)
            .map_err(|_| ConnectivityError::PortalFailed)?;
        self.wifi.start().map_err(|_| ConnectivityError::PortalFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start_portal(&mut self) -> Result<(), ConnectivityError> {
        info!("WiFi(sim): portal '{}' open", self.portal_ssid);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        if let Err(e) = self.wifi.stop() {
            log::warn!("WiFi: stop failed: {:?}", e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        info!("WiFi(sim): radio off");
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i16> {
        let mut ap_info: esp_idf_svc::sys::wifi_ap_record_t = unsafe { core::mem::zeroed() };
        let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        (ret == esp_idf_svc::sys::ESP_OK).then_some(i16::from(ap_info.rssi))
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i16> {
        SIM_AP_PRESENT.load(Ordering::Relaxed).then_some(-58)
    }

    #[cfg(target_os = "espidf")]
    fn platform_probe(&mut self, host: &str) -> bool {
        tcp_probe(host)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_probe(&mut self, host: &str) -> bool {
        let up = SIM_INTERNET.load(Ordering::Relaxed);
        info!("WiFi(sim): probe '{}' -> {}", host, up);
        up
    }
}

// ───────────────────────────────────────────────────────────────
// WifiRadio
// ───────────────────────────────────────────────────────────────

impl WifiRadio for StationRadio {
    fn connect(&mut self) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        validate_ssid(&self.ssid)?;
        validate_password(&self.password)?;
        info!("WiFi: connecting to '{}'", self.ssid);
        self.platform_connect()?;
        self.associated = true;
        Ok(())
    }

    fn start_portal(&mut self) -> Result<(), ConnectivityError> {
        validate_ssid(&self.portal_ssid)?;
        info!("WiFi: opening portal '{}'", self.portal_ssid);
        self.associated = false;
        self.platform_start_portal()
    }

    fn stop(&mut self) {
        self.platform_stop();
        self.associated = false;
    }

    fn rssi(&self) -> Option<i16> {
        if !self.associated {
            return None;
        }
        self.platform_rssi()
    }

    fn probe_internet(&mut self, host: &str) -> bool {
        self.platform_probe(host)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
