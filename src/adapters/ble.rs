//! BLE link adapter.
//!
//! Implements [`LinkController`]: the radio-stack side of connection
//! management.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GAP/GATTS via `esp_idf_svc::sys`.
//! - **all other targets**: simulated radio for host-side tests.
//!
//! ## Connection objects
//!
//! Every peer connection is a reference-counted object.  The stack holds one
//! reference while the link is up; connection management takes a second one
//! when it is told about the connection.  The slot returns to the free pool
//! (`on_slot_recycled`) when the last reference is dropped, which is usually
//! the manager's release after the disconnection.
//!
//! | Stack event          | Observer notification                |
//! |----------------------|--------------------------------------|
//! | link established     | `on_connected(peer, Success)`        |
//! | connect failed       | `on_connected(peer, Failed(status))` |
//! | link lost            | `on_disconnected(peer, reason)`      |
//! | last reference drop  | `on_slot_recycled()`                 |

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

use log::{debug, info, warn};

use crate::app::ports::{AdvertiseError, LinkController, LinkObserver, SubscribeError};
use crate::config::MAX_CONNECTIONS;
use crate::gap::{AdvertisingPayload, ConnectOutcome, PeerHandle};

// ───────────────────────────────────────────────────────────────
// Connection object table
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeerEntry {
    refs: u32,
    linked: bool,
}

/// Reference counts of live connection objects.
#[derive(Debug, Default)]
struct PeerTable {
    peers: BTreeMap<PeerHandle, PeerEntry>,
}

impl PeerTable {
    /// New connection object, holding the stack's reference.
    fn open(&mut self, peer: PeerHandle, linked: bool) {
        if self.peers.insert(peer, PeerEntry { refs: 1, linked }).is_some() {
            warn!("BLE: {} reopened while still referenced", peer);
        }
    }

    fn retain(&mut self, peer: PeerHandle) {
        match self.peers.get_mut(&peer) {
            Some(entry) => entry.refs += 1,
            None => warn!("BLE: retain of unknown {}", peer),
        }
    }

    /// Drop one reference.  Returns `true` if the object was freed.
    fn release(&mut self, peer: PeerHandle) -> bool {
        let Some(entry) = self.peers.get_mut(&peer) else {
            warn!("BLE: release of unknown {}", peer);
            return false;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            self.peers.remove(&peer);
            true
        } else {
            false
        }
    }

    fn unlink(&mut self, peer: PeerHandle) {
        if let Some(entry) = self.peers.get_mut(&peer) {
            entry.linked = false;
        }
    }

    fn refs(&self, peer: PeerHandle) -> u32 {
        self.peers.get(&peer).map_or(0, |e| e.refs)
    }

    fn linked(&self) -> usize {
        self.peers.values().filter(|e| e.linked).count()
    }

    fn allocated(&self) -> usize {
        self.peers.len()
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleLink {
    device_name: heapless::String<24>,
    peers: Mutex<PeerTable>,
    observer: OnceLock<Arc<dyn LinkObserver>>,
    #[cfg(not(target_os = "espidf"))]
    sim: sim::SimRadio,
}

impl BleLink {
    pub fn new(device_name: heapless::String<24>) -> Self {
        Self {
            device_name,
            peers: Mutex::new(PeerTable::default()),
            observer: OnceLock::new(),
            #[cfg(not(target_os = "espidf"))]
            sim: sim::SimRadio::default(),
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// References currently held on `peer`'s connection object.
    pub fn peer_refs(&self, peer: PeerHandle) -> u32 {
        self.peers.lock().map_or(0, |t| t.refs(peer))
    }

    /// Peers with an established link.
    pub fn linked_peers(&self) -> usize {
        self.peers.lock().map_or(0, |t| t.linked())
    }

    /// Connection objects not yet returned to the pool.
    pub fn allocated_slots(&self) -> usize {
        self.peers.lock().map_or(0, |t| t.allocated())
    }

    // ── stack event entry points ──────────────────────────────

    /// A connection attempt completed.  `status` is the HCI status.
    pub fn stack_connected(&self, peer: PeerHandle, status: u8) {
        let outcome = ConnectOutcome::from_hci(status);
        self.with_peers(|t| t.open(peer, outcome.is_success()));
        #[cfg(not(target_os = "espidf"))]
        self.sim.advertising_consumed();

        debug!("BLE: {} connect complete (status 0x{:02x})", peer, status);
        if let Some(observer) = self.observer.get() {
            observer.on_connected(peer, outcome);
        }

        // A failed attempt leaves no link for the stack to hold.
        if !outcome.is_success() {
            self.drop_ref(peer);
        }
    }

    /// The link to `peer` is lost; the stack lets go of its reference.
    pub fn stack_disconnected(&self, peer: PeerHandle, reason: u8) {
        self.with_peers(|t| t.unlink(peer));
        debug!("BLE: {} link lost (reason 0x{:02x})", peer, reason);
        if let Some(observer) = self.observer.get() {
            observer.on_disconnected(peer, reason);
        }
        self.drop_ref(peer);
    }

    fn drop_ref(&self, peer: PeerHandle) {
        let freed = self.with_peers(|t| t.release(peer)).unwrap_or(false);
        if freed {
            debug!("BLE: {} connection object recycled", peer);
            if let Some(observer) = self.observer.get() {
                observer.on_slot_recycled();
            }
        }
    }

    /// Run `f` on the peer table.  The lock is never held while the
    /// observer runs: it calls back into `retain`/`release`.
    fn with_peers<R>(&self, f: impl FnOnce(&mut PeerTable) -> R) -> Option<R> {
        match self.peers.lock() {
            Ok(mut table) => Some(f(&mut table)),
            Err(_) => {
                warn!("BLE: peer table poisoned");
                None
            }
        }
    }
}

impl LinkController for BleLink {
    fn subscribe(&self, observer: Arc<dyn LinkObserver>) -> Result<(), SubscribeError> {
        self.observer
            .set(observer)
            .map_err(|_| SubscribeError::AlreadySubscribed)
    }

    fn advertise_start(&self, payload: &AdvertisingPayload) -> Result<(), AdvertiseError> {
        if self.allocated_slots() >= usize::from(MAX_CONNECTIONS) {
            return Err(AdvertiseError::NoResources);
        }
        self.platform_advertise(payload)
    }

    fn retain(&self, peer: PeerHandle) {
        self.with_peers(|t| t.retain(peer));
    }

    fn release(&self, peer: PeerHandle) {
        self.drop_ref(peer);
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF (Bluedroid)
// ───────────────────────────────────────────────────────────────

/// The link Bluedroid callbacks report to.  Bluedroid callbacks are C
/// function pointers and cannot capture the adapter.
#[cfg(target_os = "espidf")]
static ACTIVE_LINK: OnceLock<Arc<BleLink>> = OnceLock::new();

#[cfg(target_os = "espidf")]
const ADV_INT_MIN: u16 = 0x20;
#[cfg(target_os = "espidf")]
const ADV_INT_MAX: u16 = 0x40;

#[cfg(target_os = "espidf")]
impl BleLink {
    /// Bring up the controller and Bluedroid, and route stack callbacks to
    /// `link`.  Must be called once, before advertising.
    pub fn start(link: Arc<BleLink>) -> crate::error::Result<()> {
        use crate::error::Error;
        use esp_idf_svc::sys::*;

        if ACTIVE_LINK.set(Arc::clone(&link)).is_err() {
            return Err(Error::Init("BLE link already started"));
        }

        unsafe {
            // BLE only: release classic BT memory.
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            if esp_bt_controller_init(&mut bt_cfg) != ESP_OK as i32 {
                return Err(Error::Init("bt_controller_init"));
            }
            if esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE) != ESP_OK as i32 {
                return Err(Error::Init("bt_controller_enable"));
            }
            if esp_bluedroid_init() != ESP_OK as i32 {
                return Err(Error::Init("bluedroid_init"));
            }
            if esp_bluedroid_enable() != ESP_OK as i32 {
                return Err(Error::Init("bluedroid_enable"));
            }

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            esp_ble_gatts_app_register(0);

            let mut name = heapless::Vec::<u8, 25>::new();
            let _ = name.extend_from_slice(link.device_name.as_bytes());
            let _ = name.push(0);
            esp_ble_gap_set_device_name(name.as_ptr() as *const _);
        }

        info!("BLE: Bluedroid stack initialized as '{}'", link.device_name);
        Ok(())
    }

    fn platform_advertise(&self, payload: &AdvertisingPayload) -> Result<(), AdvertiseError> {
        use esp_idf_svc::sys::*;

        let check = |ret: esp_err_t| -> Result<(), AdvertiseError> {
            match ret {
                r if r == ESP_OK as i32 => Ok(()),
                r if r == ESP_ERR_NO_MEM as i32 => Err(AdvertiseError::NoResources),
                r if r == ESP_ERR_INVALID_STATE as i32 => Err(AdvertiseError::NotReady),
                r => Err(AdvertiseError::Rejected(r)),
            }
        };

        let mut adv = heapless::Vec::<u8, 31>::new();
        let _ = adv.extend_from_slice(payload.adv_data());
        let mut scan = heapless::Vec::<u8, 31>::new();
        let _ = scan.extend_from_slice(payload.scan_data());

        unsafe {
            check(esp_ble_gap_config_adv_data_raw(adv.as_mut_ptr(), adv.len() as u32))?;
            check(esp_ble_gap_config_scan_rsp_data_raw(scan.as_mut_ptr(), scan.len() as u32))?;

            let mut adv_params = esp_ble_adv_params_t {
                adv_int_min: ADV_INT_MIN,
                adv_int_max: ADV_INT_MAX,
                adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
                own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
                adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
                ..core::mem::zeroed()
            };
            check(esp_ble_gap_start_advertising(&mut adv_params))
        }
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            let status = unsafe { (*param).adv_start_cmpl.status };
            if status == esp_bt_status_t_ESP_BT_STATUS_SUCCESS {
                debug!("BLE GAP: advertising started");
            } else {
                warn!("BLE GAP: advertising start failed (status={})", status);
            }
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            debug!("BLE GAP: advertising stopped");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    let Some(link) = ACTIVE_LINK.get() else {
        return;
    };

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            info!("BLE GATTS: app registered (if={})", gatts_if);
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let p = unsafe { &(*param).connect };
            // Bluedroid only reports established links.
            link.stack_connected(PeerHandle(p.conn_id), 0);
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            let p = unsafe { &(*param).disconnect };
            link.stack_disconnected(PeerHandle(p.conn_id), p.reason as u8);
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Simulated advertiser state.
    #[derive(Debug, Default)]
    pub(super) struct SimRadio {
        pub(super) advertising: AtomicBool,
        pub(super) refuse: AtomicBool,
        pub(super) starts: AtomicU32,
    }

    impl SimRadio {
        /// A connection consumes the advertising set.
        pub(super) fn advertising_consumed(&self) {
            self.advertising.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl BleLink {
    fn platform_advertise(&self, payload: &AdvertisingPayload) -> Result<(), AdvertiseError> {
        use core::sync::atomic::Ordering;

        if self.sim.refuse.load(Ordering::SeqCst) {
            warn!("BLE(sim): advertising refused");
            return Err(AdvertiseError::NotReady);
        }
        if self.sim.advertising.swap(true, Ordering::SeqCst) {
            // EALREADY
            return Err(AdvertiseError::Rejected(-120));
        }
        self.sim.starts.fetch_add(1, Ordering::SeqCst);
        info!(
            "BLE(sim): advertising '{}' ({} + {} bytes)",
            self.device_name,
            payload.adv_data().len(),
            payload.scan_data().len()
        );
        Ok(())
    }

    /// Make the next advertising starts fail (`true`) or succeed.
    pub fn sim_refuse_advertising(&self, refuse: bool) {
        self.sim
            .refuse
            .store(refuse, core::sync::atomic::Ordering::SeqCst);
    }

    pub fn sim_is_advertising(&self) -> bool {
        self.sim.advertising.load(core::sync::atomic::Ordering::SeqCst)
    }

    /// Successful advertising starts so far.
    pub fn sim_advertising_starts(&self) -> u32 {
        self.sim.starts.load(core::sync::atomic::Ordering::SeqCst)
    }
}
