//! BLE central adapter for the wireless hydrometer.
//!
//! Implements [`BleCentral`]: scan, connect, read the reading record,
//! disconnect.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GAP + GATT client via the raw
//!   `esp_idf_svc::sys` bindings.
//! - **all other targets**: a simulated peer that answers through the
//!   hydrometer inbox exactly like the real callbacks do.
//!
//! ## Callback bridge
//!
//! Bluedroid callbacks run on the Bluedroid task. They only record handles
//! in atomics and `post` once: a [`HydroEvent`] to the hydrometer inbox, or
//! the characteristic value to the read slot. Every decision is taken by
//! the state machine on its own task.
//!
//! | Bluedroid event                   | Posted                        |
//! |-----------------------------------|-------------------------------|
//! | GAP scan result with our service  | `Advertised { address, rssi }`|
//! | GAP scan complete                 | `ScanComplete`                |
//! | GATTC open succeeded              | `Connected`                   |
//! | GATTC open failed / disconnect    | `Disconnected`                |
//! | GATTC read of the reading char    | record to the read slot       |
//! | GATTC search or read failure      | error to the read slot        |
//!
//! `read_reading` waits on the read slot with a bounded wait, so the
//! characteristic value never crosses tasks through shared memory.

use core::time::Duration;

use log::{info, warn};

use crate::app::events::{BdAddr, HydroReading};
use crate::app::ports::{BleCentral, BleError, ScanParams};
use crate::queue::{NO_WAIT, Queue};

/// Hydrometer GATT service.
pub const SERVICE_UUID: u128 = 0x63875899_6490_4d1b_9f0a_abee8653282c;
/// Characteristic holding the packed reading record.
pub const READING_CHAR_UUID: u128 = 0x35f14e74_c1ae_4153_9abb_938481aa24cf;

const READ_BUF_LEN: usize = 20;

/// Longest `read_reading` waits for the characteristic value.
pub const READ_WAIT: Duration = Duration::from_secs(5);

/// Value of one characteristic read, or why there is none.
pub type ReadOutcome = Result<heapless::Vec<u8, READ_BUF_LEN>, BleError>;

/// Single-slot hand-off from the read callback to the hydrometer task.
pub type ReadSlot = Queue<ReadOutcome, 1>;

/// Drop a value left over from an earlier connection.
fn clear_slot(slot: &ReadSlot) {
    while slot.receive(NO_WAIT).is_some() {}
}

/// Wait at most `wait` for the read outcome and copy it into `buf`.
fn take_read(slot: &ReadSlot, buf: &mut [u8], wait: Duration) -> Result<usize, BleError> {
    let record = slot.receive(wait).ok_or(BleError::Timeout)??;
    let n = record.len().min(buf.len());
    buf[..n].copy_from_slice(&record[..n]);
    Ok(n)
}

// ── ESP-IDF static state (callback bridge) ────────────────────

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
static GATTC_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static CONN_ID: AtomicU32 = AtomicU32::new(u32::MAX);
#[cfg(target_os = "espidf")]
static SVC_RANGE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static SCAN_DURATION_SECS: AtomicU32 = AtomicU32::new(10);

#[cfg(target_os = "espidf")]
static READ_SLOT: ReadSlot = Queue::new("ble-read");

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    t.uuid.uuid128 = uuid.to_le_bytes();
    t
}

#[cfg(target_os = "espidf")]
fn post(ev: crate::app::commands::HydroEvent) {
    crate::channels::HYDRO.post(ev.into());
}

/// Does the advertisement carry our 128-bit service UUID?
#[cfg(target_os = "espidf")]
unsafe fn advertises_service(adv: *mut u8) -> bool {
    use esp_idf_svc::sys::*;
    let wanted = SERVICE_UUID.to_le_bytes();
    for ad_type in [
        esp_ble_adv_data_type_ESP_BLE_AD_TYPE_128SRV_CMPL,
        esp_ble_adv_data_type_ESP_BLE_AD_TYPE_128SRV_PART,
    ] {
        let mut len: u8 = 0;
        let p = unsafe { esp_ble_resolve_adv_data(adv, ad_type as u8, &mut len) };
        if p.is_null() {
            continue;
        }
        let data = unsafe { core::slice::from_raw_parts(p, len as usize) };
        if data.chunks_exact(16).any(|c| c == wanted) {
            return true;
        }
    }
    false
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use crate::app::commands::HydroEvent;
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_PARAM_SET_COMPLETE_EVT => {
            unsafe { esp_ble_gap_start_scanning(SCAN_DURATION_SECS.load(AtomicOrdering::Relaxed)) };
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_START_COMPLETE_EVT => {
            let status = unsafe { (*param).scan_start_cmpl.status };
            if status != esp_bt_status_t_ESP_BT_STATUS_SUCCESS {
                log::warn!("BLE GAP: scan start failed ({})", status);
                post(HydroEvent::Timeout);
            }
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_RESULT_EVT => {
            let r = unsafe { &mut (*param).scan_rst };
            match r.search_evt {
                esp_gap_search_evt_t_ESP_GAP_SEARCH_INQ_RES_EVT => {
                    if unsafe { advertises_service(r.ble_adv.as_mut_ptr()) } {
                        post(HydroEvent::Advertised {
                            address: BdAddr(r.bda),
                            rssi: r.rssi as i16,
                        });
                    }
                }
                esp_gap_search_evt_t_ESP_GAP_SEARCH_INQ_CMPL_EVT => {
                    post(HydroEvent::ScanComplete);
                }
                _ => {}
            }
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn gattc_event_handler(
    event: esp_idf_svc::sys::esp_gattc_cb_event_t,
    gattc_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gattc_cb_param_t,
) {
    use crate::app::commands::HydroEvent;
    use esp_idf_svc::sys::*;

    match event {
        esp_gattc_cb_event_t_ESP_GATTC_REG_EVT => {
            GATTC_IF.store(gattc_if as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTC: app registered (if={})", gattc_if);
        }
        esp_gattc_cb_event_t_ESP_GATTC_OPEN_EVT => {
            let p = unsafe { &(*param).open };
            if p.status != esp_gatt_status_t_ESP_GATT_OK {
                log::warn!("BLE GATTC: open failed ({})", p.status);
                post(HydroEvent::Disconnected);
                return;
            }
            CONN_ID.store(u32::from(p.conn_id), AtomicOrdering::Relaxed);
            SVC_RANGE.store(0, AtomicOrdering::Relaxed);
            let mut filter = uuid128_to_esp(SERVICE_UUID);
            unsafe { esp_ble_gattc_search_service(gattc_if, p.conn_id, &mut filter) };
            post(HydroEvent::Connected);
        }
        esp_gattc_cb_event_t_ESP_GATTC_SEARCH_RES_EVT => {
            let p = unsafe { &(*param).search_res };
            SVC_RANGE.store(
                (u32::from(p.start_handle) << 16) | u32::from(p.end_handle),
                AtomicOrdering::Relaxed,
            );
        }
        esp_gattc_cb_event_t_ESP_GATTC_SEARCH_CMPL_EVT => {
            let p = unsafe { &(*param).search_cmpl };
            let range = SVC_RANGE.load(AtomicOrdering::Relaxed);
            if p.status != esp_gatt_status_t_ESP_GATT_OK || range == 0 {
                log::warn!("BLE GATTC: hydrometer service not found");
                READ_SLOT.post(Err(BleError::AttributeNotFound));
                return;
            }
            let char_uuid = uuid128_to_esp(READING_CHAR_UUID);
            let mut elem: esp_gattc_char_elem_t = unsafe { core::mem::zeroed() };
            let mut count: u16 = 1;
            let status = unsafe {
                esp_ble_gattc_get_char_by_uuid(
                    gattc_if,
                    p.conn_id,
                    (range >> 16) as u16,
                    (range & 0xFFFF) as u16,
                    char_uuid,
                    &mut elem,
                    &mut count,
                )
            };
            if status != esp_gatt_status_t_ESP_GATT_OK || count == 0 {
                log::warn!("BLE GATTC: reading characteristic not found");
                READ_SLOT.post(Err(BleError::AttributeNotFound));
                return;
            }
            unsafe {
                esp_ble_gattc_read_char(
                    gattc_if,
                    p.conn_id,
                    elem.char_handle,
                    esp_gatt_auth_req_t_ESP_GATT_AUTH_REQ_NONE,
                )
            };
        }
        esp_gattc_cb_event_t_ESP_GATTC_READ_CHAR_EVT => {
            let p = unsafe { &(*param).read };
            let outcome = if p.status == esp_gatt_status_t_ESP_GATT_TIMEOUT {
                Err(BleError::Timeout)
            } else if p.status != esp_gatt_status_t_ESP_GATT_OK {
                log::warn!("BLE GATTC: read failed ({})", p.status);
                Err(BleError::HostError(p.status as i32))
            } else {
                let data = unsafe { core::slice::from_raw_parts(p.value, p.value_len as usize) };
                let n = data.len().min(READ_BUF_LEN);
                heapless::Vec::from_slice(&data[..n]).map_err(|()| BleError::AttributeNotFound)
            };
            READ_SLOT.post(outcome);
        }
        esp_gattc_cb_event_t_ESP_GATTC_DISCONNECT_EVT => {
            CONN_ID.store(u32::MAX, AtomicOrdering::Relaxed);
            post(HydroEvent::Disconnected);
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// Simulated peer
// ───────────────────────────────────────────────────────────────

/// A hydrometer the host simulation pretends is in range.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone)]
pub struct SimPeer {
    pub address: BdAddr,
    pub rssi: i16,
    pub record: heapless::Vec<u8, READ_BUF_LEN>,
}

#[cfg(not(target_os = "espidf"))]
impl SimPeer {
    pub fn new(address: BdAddr, reading: &HydroReading) -> Self {
        let mut record = heapless::Vec::new();
        let _ = record.push(reading.status);
        let _ = record.extend_from_slice(&reading.angle_x100.to_le_bytes());
        let _ = record.extend_from_slice(&reading.temperature_x10.to_le_bytes());
        let _ = record.extend_from_slice(&reading.battery_x1000.to_le_bytes());
        Self { address, rssi: reading.rssi, record }
    }
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct HydroBle {
    scanning: bool,
    connected: bool,
    #[cfg(not(target_os = "espidf"))]
    peers: std::vec::Vec<SimPeer>,
    #[cfg(not(target_os = "espidf"))]
    link: Option<usize>,
    #[cfg(not(target_os = "espidf"))]
    read_slot: ReadSlot,
}

impl HydroBle {
    /// Bring up the controller and Bluedroid, register the GAP and GATTC
    /// callbacks. Must be called on the core the hydrometer task runs on.
    #[cfg(target_os = "espidf")]
    pub fn new() -> Result<Self, BleError> {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            check(esp_bt_controller_init(&mut bt_cfg), "bt_controller_init")?;
            check(esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE), "bt_controller_enable")?;
            check(esp_bluedroid_init(), "bluedroid_init")?;
            check(esp_bluedroid_enable(), "bluedroid_enable")?;
            check(esp_ble_gap_register_callback(Some(gap_event_handler)), "gap_register")?;
            check(esp_ble_gattc_register_callback(Some(gattc_event_handler)), "gattc_register")?;
            check(esp_ble_gattc_app_register(0), "gattc_app_register")?;
            check(
                esp_ble_tx_power_set(
                    esp_ble_power_type_t_ESP_BLE_PWR_TYPE_SCAN,
                    esp_power_level_t_ESP_PWR_LVL_P9,
                ),
                "tx_power_set",
            )?;
        }
        info!("BLE(espidf): Bluedroid central ready");
        Ok(Self { scanning: false, connected: false })
    }

    /// Simulated central with the given peers in range.
    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Result<Self, BleError> {
        Ok(Self::with_peers(std::vec::Vec::new()))
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn with_peers(peers: std::vec::Vec<SimPeer>) -> Self {
        info!("BLE(sim): {} simulated hydrometer(s)", peers.len());
        Self {
            scanning: false,
            connected: false,
            peers,
            link: None,
            read_slot: Queue::new("ble-read"),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start_scan(&mut self, params: &ScanParams) -> Result<(), BleError> {
        use esp_idf_svc::sys::*;
        SCAN_DURATION_SECS.store(u32::from(params.duration_secs), AtomicOrdering::Relaxed);
        let mut scan = esp_ble_scan_params_t {
            scan_type: if params.active {
                esp_ble_scan_type_t_BLE_SCAN_TYPE_ACTIVE
            } else {
                esp_ble_scan_type_t_BLE_SCAN_TYPE_PASSIVE
            },
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            scan_filter_policy: esp_ble_scan_filter_t_BLE_SCAN_FILTER_ALLOW_ALL,
            scan_interval: params.interval,
            scan_window: params.window,
            scan_duplicate: esp_ble_scan_duplicate_t_BLE_SCAN_DUPLICATE_ENABLE,
        };
        // Scanning starts from the SCAN_PARAM_SET_COMPLETE callback.
        check(unsafe { esp_ble_gap_set_scan_params(&mut scan) }, "set_scan_params")
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start_scan(&mut self, params: &ScanParams) -> Result<(), BleError> {
        use crate::app::commands::HydroEvent;
        info!("BLE(sim): scanning for {}s", params.duration_secs);
        for peer in &self.peers {
            crate::channels::HYDRO.post(
                HydroEvent::Advertised { address: peer.address, rssi: peer.rssi }.into(),
            );
        }
        crate::channels::HYDRO.post(HydroEvent::ScanComplete.into());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop_scan(&mut self) {
        unsafe { esp_idf_svc::sys::esp_ble_gap_stop_scanning() };
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop_scan(&mut self) {
        info!("BLE(sim): scan stopped");
    }

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, address: BdAddr) -> Result<(), BleError> {
        use esp_idf_svc::sys::*;
        clear_slot(&READ_SLOT);
        let mut bda = address.0;
        let gattc_if = GATTC_IF.load(AtomicOrdering::Relaxed) as esp_gatt_if_t;
        check(
            unsafe {
                esp_ble_gattc_open(
                    gattc_if,
                    bda.as_mut_ptr(),
                    esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                    true,
                )
            },
            "gattc_open",
        )
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, address: BdAddr) -> Result<(), BleError> {
        use crate::app::commands::HydroEvent;
        clear_slot(&self.read_slot);
        match self.peers.iter().position(|p| p.address == address) {
            Some(i) => {
                self.link = Some(i);
                crate::channels::HYDRO.post(HydroEvent::Connected.into());
                self.read_slot.post(Ok(self.peers[i].record.clone()));
                Ok(())
            }
            None => {
                crate::channels::HYDRO.post(HydroEvent::Disconnected.into());
                Ok(())
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_read(&mut self, buf: &mut [u8]) -> Result<usize, BleError> {
        take_read(&READ_SLOT, buf, READ_WAIT)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_read(&mut self, buf: &mut [u8]) -> Result<usize, BleError> {
        if self.link.is_none() {
            return Err(BleError::NotConnected);
        }
        take_read(&self.read_slot, buf, READ_WAIT)
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        use esp_idf_svc::sys::*;
        let conn_id = CONN_ID.swap(u32::MAX, AtomicOrdering::Relaxed);
        if conn_id != u32::MAX {
            let gattc_if = GATTC_IF.load(AtomicOrdering::Relaxed) as esp_gatt_if_t;
            unsafe { esp_ble_gattc_close(gattc_if, conn_id as u16) };
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        self.link = None;
        clear_slot(&self.read_slot);
    }
}

#[cfg(target_os = "espidf")]
fn check(ret: esp_idf_svc::sys::esp_err_t, what: &str) -> Result<(), BleError> {
    if ret == esp_idf_svc::sys::ESP_OK {
        Ok(())
    } else {
        log::error!("BLE: {} failed ({})", what, ret);
        Err(BleError::HostError(ret))
    }
}

/// Stands in for a BLE host that failed to come up. Every scan is refused,
/// so each request still ends in an invalid result.
#[derive(Debug, Clone, Copy)]
pub struct BleUnavailable(pub BleError);

impl BleCentral for BleUnavailable {
    fn start_scan(&mut self, _params: &ScanParams) -> Result<(), BleError> {
        Err(self.0)
    }

    fn stop_scan(&mut self) {}

    fn connect(&mut self, _address: BdAddr) -> Result<(), BleError> {
        Err(self.0)
    }

    fn read_reading(&mut self, _buf: &mut [u8]) -> Result<usize, BleError> {
        Err(BleError::NotConnected)
    }

    fn disconnect(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// BleCentral implementation
// ───────────────────────────────────────────────────────────────

impl BleCentral for HydroBle {
    fn start_scan(&mut self, params: &ScanParams) -> Result<(), BleError> {
        info!(
            "BLE: scan interval={} window={} active={}",
            params.interval, params.window, params.active
        );
        self.platform_start_scan(params)?;
        self.scanning = true;
        Ok(())
    }

    fn stop_scan(&mut self) {
        if self.scanning {
            self.platform_stop_scan();
            self.scanning = false;
        }
    }

    fn connect(&mut self, address: BdAddr) -> Result<(), BleError> {
        info!("BLE: connecting to {}", address);
        self.platform_connect(address)?;
        self.connected = true;
        Ok(())
    }

    fn read_reading(&mut self, buf: &mut [u8]) -> Result<usize, BleError> {
        if !self.connected {
            return Err(BleError::NotConnected);
        }
        self.platform_read(buf)
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.platform_disconnect();
            self.connected = false;
            info!("BLE: disconnected");
        } else {
            warn!("BLE: disconnect without a link");
        }
    }
}
