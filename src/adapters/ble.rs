//! BLE pinpad adapter.
//!
//! Implements [`PublishPort`], the outbound half of the BLE boundary.
//! Inbound writes to the RPC characteristic never touch this struct: the
//! GATTS callback copies them into [`crate::rpc::channels::INBOUND`] and
//! connection events into [`crate::rpc::channels::LINK_EVENTS`].  Writes
//! longer than the negotiated MTU arrive as prepared fragments and are
//! reassembled on execute.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via raw `esp_idf_svc::sys` calls.
//! - **all other targets**: values are mirrored in memory for host-side tests.
//!
//! ## GATT Service Layout
//!
//! | Characteristic  | UUID                                   | Props        |
//! |-----------------|----------------------------------------|--------------|
//! | Service         | `909e937a-e826-11ee-bd3d-0242ac120000` | —            |
//! | Status          | `…0001`                                | Read+Notify  |
//! | RPC command     | `…0002`                                | Write        |
//! | Security mode   | `…0003`                                | Read         |
//! | HOTP counter    | `…0004`                                | Read         |
//! | User id         | `…0005`                                | Read         |
//! | Cmd             | `…0006`                                | Read         |
//! | User commands   | `…0007`                                | Read+Notify  |

use log::{info, warn};

use crate::app::ports::PublishPort;
use crate::config::SecurityMode;
use crate::error::BleError;
use crate::fsm::StateId;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x909e937a_e826_11ee_bd3d_0242ac120000;

/// Largest attribute value (ATT limit).
pub const MAX_VALUE_LEN: usize = 512;

/// Requested ATT MTU (largest Bluedroid allows).
#[cfg(target_os = "espidf")]
const LOCAL_MTU: u16 = 517;

/// Advertised name limit (31-byte advertising payload minus headers).
pub const MAX_DEVICE_NAME_LEN: usize = 24;

/// Characteristics of the pinpad service, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Characteristic {
    Status = 0,
    Rpc = 1,
    SecurityMode = 2,
    HotpCounter = 3,
    UserId = 4,
    Cmd = 5,
    UserCommands = 6,
}

impl Characteristic {
    pub const COUNT: usize = 7;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Status,
        Self::Rpc,
        Self::SecurityMode,
        Self::HotpCounter,
        Self::UserId,
        Self::Cmd,
        Self::UserCommands,
    ];

    /// 128-bit UUID: the service base with the characteristic number in
    /// the last byte.
    pub fn uuid(self) -> u128 {
        SERVICE_UUID | (self as u128 + 1)
    }

    pub fn is_writable(self) -> bool {
        self == Self::Rpc
    }

    pub fn notifies(self) -> bool {
        matches!(self, Self::Status | Self::UserCommands)
    }
}

// ───────────────────────────────────────────────────────────────
// BLE state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Failed,
}

// ── ESP-IDF BLE static state ───────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures.  These atomics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONN_ID: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONNECTED: AtomicBool = AtomicBool::new(false);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
/// Index of the characteristic whose ADD_CHAR_EVT is awaited.
#[cfg(target_os = "espidf")]
static BLE_CHAR_STEP: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
#[allow(clippy::declare_interior_mutable_const)]
const HANDLE_INIT: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CHAR_HANDLES: [AtomicU32; Characteristic::COUNT] = [HANDLE_INIT; Characteristic::COUNT];

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    // SAFETY: esp_bt_uuid_t is a plain C struct; all-zero is valid.
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    t.uuid.uuid128 = uuid.to_le_bytes();
    t
}

#[cfg(target_os = "espidf")]
unsafe fn add_gatt_char(svc_handle: u16, ch: Characteristic) {
    use esp_idf_svc::sys::*;
    let mut char_uuid = uuid128_to_esp(ch.uuid());
    let (perm, mut prop) = if ch.is_writable() {
        (ESP_GATT_PERM_WRITE, ESP_GATT_CHAR_PROP_BIT_WRITE)
    } else {
        (ESP_GATT_PERM_READ, ESP_GATT_CHAR_PROP_BIT_READ)
    };
    if ch.notifies() {
        prop |= ESP_GATT_CHAR_PROP_BIT_NOTIFY;
    }
    let mut value = esp_attr_value_t {
        attr_max_len: MAX_VALUE_LEN as u16,
        attr_len: 0,
        attr_value: core::ptr::null_mut(),
    };
    let mut control = esp_attr_control_t {
        auto_rsp: ESP_GATT_AUTO_RSP as u8,
    };
    // SAFETY: all pointers reference locals that outlive the call; the
    // stack copies them before returning.
    unsafe {
        esp_ble_gatts_add_char(
            svc_handle,
            &mut char_uuid,
            perm as esp_gatt_perm_t,
            prop as esp_gatt_char_prop_t,
            &mut value,
            &mut control,
        );
    }
}

#[cfg(target_os = "espidf")]
fn char_handle(ch: Characteristic) -> u16 {
    BLE_CHAR_HANDLES[ch as usize].load(AtomicOrdering::Relaxed) as u16
}

#[cfg(target_os = "espidf")]
unsafe fn start_advertising() {
    use esp_idf_svc::sys::*;
    // SAFETY: zeroed fields are valid defaults for the remaining members.
    unsafe {
        let mut adv_params = esp_ble_adv_params_t {
            adv_int_min: 0x20,
            adv_int_max: 0x40,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..core::mem::zeroed()
        };
        esp_ble_gap_start_advertising(&mut adv_params);
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT => {
            // SAFETY: called on the Bluedroid task after the stack is up.
            unsafe { start_advertising() };
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SEC_REQ_EVT => {
            // SAFETY: `param` is valid for the duration of the callback.
            unsafe {
                esp_ble_gap_security_rsp((*param).ble_security.ble_req.bd_addr.as_mut_ptr(), true);
            }
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_AUTH_CMPL_EVT => {
            // SAFETY: `param` is valid for the duration of the callback.
            let p = unsafe { &(*param).ble_security.auth_cmpl };
            if p.success {
                log::info!("BLE GAP: authentication complete (bonded)");
            } else {
                log::warn!("BLE GAP: authentication failed (reason={})", p.fail_reason);
            }
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
    use crate::rpc::channels::{self, LinkEvent};
    use esp_idf_svc::sys::*;

    BLE_GATTS_IF.store(gatts_if as u32, AtomicOrdering::Relaxed);

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            log::info!("BLE GATTS: app registered (if={})", gatts_if);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: uuid128_to_esp(SERVICE_UUID),
                    inst_id: 0,
                },
                is_primary: true,
            };
            // Service declaration + declaration/value pair per characteristic.
            let handles = 1 + 2 * Characteristic::COUNT as u16;
            // SAFETY: `svc_id` outlives the call.
            unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, handles) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            // SAFETY: `param` is valid for the duration of the callback.
            let svc_handle = unsafe { (*param).create.service_handle };
            BLE_SVC_HANDLE.store(svc_handle as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: service created (handle={})", svc_handle);
            BLE_CHAR_STEP.store(0, AtomicOrdering::Relaxed);
            // SAFETY: the service handle was just issued by the stack.
            unsafe {
                esp_ble_gatts_start_service(svc_handle);
                add_gatt_char(svc_handle, Characteristic::ALL[0]);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            // SAFETY: `param` is valid for the duration of the callback.
            let handle = unsafe { (*param).add_char.attr_handle };
            let step = BLE_CHAR_STEP.load(AtomicOrdering::Relaxed) as usize;
            let Some(&ch) = Characteristic::ALL.get(step) else {
                return;
            };
            BLE_CHAR_HANDLES[step].store(handle as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: {:?} char (handle={})", ch, handle);

            BLE_CHAR_STEP.store(step as u32 + 1, AtomicOrdering::Relaxed);
            if let Some(&next) = Characteristic::ALL.get(step + 1) {
                let svc_handle = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;
                // SAFETY: service handle is live.
                unsafe { add_gatt_char(svc_handle, next) };
            } else {
                log::info!("BLE GATTS: all characteristics registered");
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            // SAFETY: `param` is valid for the duration of the callback.
            let conn_id = unsafe { (*param).connect.conn_id };
            BLE_CONN_ID.store(conn_id as u32, AtomicOrdering::Relaxed);
            BLE_CONNECTED.store(true, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: client connected (conn_id={})", conn_id);
            if channels::LINK_EVENTS.try_send(LinkEvent::Connected).is_err() {
                log::warn!("BLE GATTS: link event queue full");
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            BLE_CONNECTED.store(false, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: client disconnected");
            if channels::LINK_EVENTS.try_send(LinkEvent::Disconnected).is_err() {
                log::warn!("BLE GATTS: link event queue full");
            }
            // SAFETY: stack is up; restarting advertising is always allowed here.
            unsafe { start_advertising() };
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            // SAFETY: `param` is valid for the duration of the callback and
            // `value` points at `len` bytes owned by the stack.
            let p = unsafe { &(*param).write };
            if p.handle == char_handle(Characteristic::Rpc) {
                let data = unsafe { core::slice::from_raw_parts(p.value, p.len as usize) };
                if p.is_prep {
                    channels::push_prepared(usize::from(p.offset), data);
                } else {
                    channels::push_inbound(data);
                }
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_EXEC_WRITE_EVT => {
            // SAFETY: `param` is valid for the duration of the callback.
            let flag = unsafe { (*param).exec_write.exec_write_flag };
            channels::exec_prepared(u32::from(flag) == ESP_GATT_PREP_WRITE_EXEC);
        }
        esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
            // SAFETY: `param` is valid for the duration of the callback.
            let mtu = unsafe { (*param).mtu.mtu };
            log::info!("BLE GATTS: MTU {}", mtu);
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleAdapter {
    state: BleState,
    device_name: heapless::String<MAX_DEVICE_NAME_LEN>,
    /// Last value written to each characteristic, indexed by `Characteristic as usize`.
    values: [heapless::Vec<u8, MAX_VALUE_LEN>; Characteristic::COUNT],
    /// Simulation: notifications sent, in order.
    #[cfg(not(target_os = "espidf"))]
    notified: Vec<Characteristic>,
}

impl BleAdapter {
    pub fn new(device_name: &str) -> Result<Self, BleError> {
        let mut name = heapless::String::new();
        name.push_str(device_name)
            .map_err(|()| BleError::DeviceNameTooLong)?;
        Ok(Self {
            state: BleState::Idle,
            device_name: name,
            values: Default::default(),
            #[cfg(not(target_os = "espidf"))]
            notified: Vec::new(),
        })
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == BleState::Advertising
    }

    /// Last value published on `ch`.
    pub fn value(&self, ch: Characteristic) -> &[u8] {
        &self.values[ch as usize]
    }

    /// Last value published on `ch`, as text.
    pub fn value_str(&self, ch: Characteristic) -> &str {
        core::str::from_utf8(self.value(ch)).unwrap_or("")
    }

    /// Simulation: characteristics notified so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn notified(&self) -> &[Characteristic] {
        &self.notified
    }

    pub fn start(&mut self) -> Result<(), BleError> {
        info!("BLE: starting pinpad service as '{}'", self.device_name);
        match self.platform_start() {
            Ok(()) => {
                self.state = BleState::Advertising;
                Ok(())
            }
            Err(e) => {
                self.state = BleState::Failed;
                Err(e)
            }
        }
    }

    pub fn stop(&mut self) {
        self.platform_stop();
        self.state = BleState::Idle;
        info!("BLE: stopped");
    }

    fn set_value(&mut self, ch: Characteristic, data: &[u8]) {
        let len = if data.len() > MAX_VALUE_LEN {
            warn!(
                "BLE: {:?} value truncated ({} > {})",
                ch,
                data.len(),
                MAX_VALUE_LEN
            );
            MAX_VALUE_LEN
        } else {
            data.len()
        };
        let slot = &mut self.values[ch as usize];
        slot.clear();
        // `len` never exceeds the capacity.
        let _ = slot.extend_from_slice(&data[..len]);
        self.platform_set_value(ch);
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> Result<(), BleError> {
        use esp_idf_svc::sys::*;

        fn check(what: &str, ret: esp_err_t) -> Result<(), BleError> {
            if ret == ESP_OK as esp_err_t {
                Ok(())
            } else {
                log::error!("BLE: {} failed ({})", what, ret);
                Err(BleError::StackInitFailed(ret))
            }
        }

        // SAFETY: single call from the main task during bring-up; all
        // pointers reference locals that outlive each call.
        unsafe {
            // Release classic BT memory (BLE-only mode saves ~30 KB).
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            check("bt_controller_init", esp_bt_controller_init(&mut bt_cfg))?;
            check(
                "bt_controller_enable",
                esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
            )?;
            check("bluedroid_init", esp_bluedroid_init())?;
            check("bluedroid_enable", esp_bluedroid_enable())?;

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            check("gatts_app_register", esp_ble_gatts_app_register(0))?;
            // Lets a whole payload fit in one write once the peer
            // negotiates; shorter MTUs fall back to prepared writes.
            check("set_local_mtu", esp_ble_gatt_set_local_mtu(LOCAL_MTU))?;

            // Just-works pairing with bonding.
            let auth_req = esp_ble_auth_req_t_ESP_LE_AUTH_REQ_SC_BOND;
            let iocap = esp_ble_io_cap_t_ESP_IO_CAP_NONE;
            let key_size: u8 = 16;
            let keys: u8 = (ESP_BLE_ENC_KEY_MASK | ESP_BLE_ID_KEY_MASK) as u8;
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_AUTHEN_REQ_MODE,
                &auth_req as *const _ as *mut _,
                core::mem::size_of_val(&auth_req) as u32,
            );
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_IOCAP_MODE,
                &iocap as *const _ as *mut _,
                core::mem::size_of_val(&iocap) as u32,
            );
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_MAX_KEY_SIZE,
                &key_size as *const _ as *mut _,
                1,
            );
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_SET_INIT_KEY,
                &keys as *const _ as *mut _,
                1,
            );
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_SET_RSP_KEY,
                &keys as *const _ as *mut _,
                1,
            );

            let mut name = [0u8; MAX_DEVICE_NAME_LEN + 1];
            name[..self.device_name.len()].copy_from_slice(self.device_name.as_bytes());
            check(
                "set_device_name",
                esp_ble_gap_set_device_name(name.as_ptr().cast()),
            )?;

            // Advertising starts from ADV_DATA_SET_COMPLETE_EVT.
            let mut adv_data = esp_ble_adv_data_t {
                set_scan_rsp: false,
                include_name: true,
                include_txpower: false,
                flag: (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8,
                ..core::mem::zeroed()
            };
            check(
                "config_adv_data",
                esp_ble_gap_config_adv_data(&mut adv_data),
            )?;
        }

        info!(
            "BLE(espidf): Bluedroid stack initialised, advertising as '{}'",
            self.device_name
        );
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) -> Result<(), BleError> {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        use esp_idf_svc::sys::*;
        // SAFETY: tears down what platform_start brought up, from the same task.
        unsafe {
            esp_ble_gap_stop_advertising();
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
        BLE_CONNECTED.store(false, AtomicOrdering::Relaxed);
        info!("BLE(espidf): stack shut down");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        info!("BLE(sim): stopped");
    }

    #[cfg(target_os = "espidf")]
    fn platform_set_value(&mut self, ch: Characteristic) {
        use esp_idf_svc::sys::*;
        let handle = char_handle(ch);
        if handle == 0 {
            // Service not registered yet; the mirror is re-published on demand.
            return;
        }
        let value = &self.values[ch as usize];
        // SAFETY: `value` is valid for `value.len()` bytes; the stack copies it.
        unsafe {
            esp_ble_gatts_set_attr_value(handle, value.len() as u16, value.as_ptr());
            if ch.notifies() && BLE_CONNECTED.load(AtomicOrdering::Relaxed) {
                esp_ble_gatts_send_indicate(
                    BLE_GATTS_IF.load(AtomicOrdering::Relaxed) as esp_gatt_if_t,
                    BLE_CONN_ID.load(AtomicOrdering::Relaxed) as u16,
                    handle,
                    value.len() as u16,
                    value.as_ptr() as *mut u8,
                    false,
                );
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_set_value(&mut self, ch: Characteristic) {
        if ch.notifies() {
            self.notified.push(ch);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// PublishPort implementation
// ───────────────────────────────────────────────────────────────

impl PublishPort for BleAdapter {
    fn publish_status(&mut self, state: StateId) {
        self.set_value(Characteristic::Status, &[state.as_byte()]);
    }

    fn publish_user_id(&mut self, user_id: &str) {
        self.set_value(Characteristic::UserId, user_id.as_bytes());
    }

    fn publish_cmd(&mut self, cmd_id: &str) {
        self.set_value(Characteristic::Cmd, cmd_id.as_bytes());
    }

    fn publish_user_commands(&mut self, table: &str) {
        self.set_value(Characteristic::UserCommands, table.as_bytes());
    }

    fn publish_security_mode(&mut self, mode: SecurityMode) {
        self.set_value(Characteristic::SecurityMode, mode.as_str().as_bytes());
    }

    fn publish_hotp_counter(&mut self, counter: u32) {
        use core::fmt::Write;
        let mut text = heapless::String::<10>::new();
        let _ = write!(text, "{}", counter);
        self.set_value(Characteristic::HotpCounter, text.as_bytes());
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
