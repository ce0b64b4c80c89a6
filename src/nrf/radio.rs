//! [`Radio`] over the Nordic SoftDevice S140.
//!
//! Most calls are raw `sd_*` SVCs.  Advertising itself runs in the BLE
//! task through `nrf_softdevice::ble::peripheral`, so starting and stopping
//! it only posts an [`AdvCommand`] for that task to pick up.

use dice_ble::ble::adv_builder::AdData;
use dice_ble::ble::radio::{AdvParams, ConnHandle, ConnParams, Links, PhyPreference};
use dice_ble::ble::{Radio, RadioEvent};
use dice_ble::RawError;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use nrf_softdevice::ble::TxPower;
use nrf_softdevice::raw;

/// Advertising control for the BLE task.
#[derive(Clone, Copy)]
pub enum AdvCommand {
    Start(AdvParams),
    Stop,
}

pub static ADV_CONTROL: Signal<CriticalSectionRawMutex, AdvCommand> = Signal::new();

/// Raised after each accepted notification with the link it went out on.
pub static TX_QUEUED: Signal<CriticalSectionRawMutex, ConnHandle> = Signal::new();

/// The SoftDevice's only advertising set.
const ADV_HANDLE: u8 = 0;

fn check(ret: u32) -> Result<(), RawError> {
    if ret == raw::NRF_SUCCESS {
        Ok(())
    } else {
        Err(RawError(ret))
    }
}

fn to_raw(params: &ConnParams) -> raw::ble_gap_conn_params_t {
    raw::ble_gap_conn_params_t {
        min_conn_interval: params.min_interval,
        max_conn_interval: params.max_interval,
        slave_latency: params.slave_latency,
        conn_sup_timeout: params.supervision_timeout,
    }
}

pub fn from_raw(params: &raw::ble_gap_conn_params_t) -> ConnParams {
    ConnParams {
        min_interval: params.min_conn_interval,
        max_interval: params.max_conn_interval,
        slave_latency: params.slave_latency,
        supervision_timeout: params.conn_sup_timeout,
    }
}

/// Nearest supported TX power at or below `dbm`.
fn tx_power(dbm: i8) -> TxPower {
    match dbm {
        i8::MIN..=-40 => TxPower::Minus40dBm,
        -39..=-20 => TxPower::Minus20dBm,
        -19..=-16 => TxPower::Minus16dBm,
        -15..=-12 => TxPower::Minus12dBm,
        -11..=-8 => TxPower::Minus8dBm,
        -7..=-4 => TxPower::Minus4dBm,
        -3..=2 => TxPower::ZerodBm,
        3 => TxPower::Plus3dBm,
        4..=i8::MAX => TxPower::Plus4dBm,
    }
}

/// Payload buffers handed to the SoftDevice while advertising.
///
/// The SoftDevice keeps reading the buffers it was given, so an update
/// goes into the other pair.
pub struct AdvBuffers {
    pairs: [(AdData, AdData); 2],
    active: usize,
}

impl AdvBuffers {
    pub const fn new() -> Self {
        Self {
            pairs: [
                (AdData::new(), AdData::new()),
                (AdData::new(), AdData::new()),
            ],
            active: 0,
        }
    }
}

pub struct SoftdeviceRadio {
    buffers: &'static mut AdvBuffers,
    tx_power: TxPower,
    advertising: bool,
    link: Option<ConnHandle>,
    rssi_threshold: u8,
    rssi_last: Option<i8>,
}

impl SoftdeviceRadio {
    pub fn new(buffers: &'static mut AdvBuffers) -> Self {
        Self {
            buffers,
            tx_power: TxPower::ZerodBm,
            advertising: false,
            link: None,
            rssi_threshold: 0,
            rssi_last: None,
        }
    }

    pub fn tx_power(&self) -> TxPower {
        self.tx_power
    }

    /// Current advertisement and scan response.
    pub fn adv_data(&self) -> (AdData, AdData) {
        self.buffers.pairs[self.buffers.active].clone()
    }

    /// The BLE task stopped advertising on its own (connect, timeout, error).
    pub fn advertising_ended(&mut self) {
        self.advertising = false;
    }

    pub fn attach(&mut self, conn: ConnHandle) {
        self.link = Some(conn);
        self.advertising = false;
    }

    pub fn detach(&mut self) {
        self.link = None;
        self.rssi_last = None;
    }

    /// Sample RSSI on the sampled link; yields an event when it moved by
    /// at least the configured threshold.
    pub fn poll_rssi(&mut self) -> Option<RadioEvent> {
        let conn = self.link?;
        let last = self.rssi_last?;
        let mut rssi: i8 = 0;
        let mut channel: u8 = 0;
        check(unsafe { raw::sd_ble_gap_rssi_get(conn.0, &mut rssi, &mut channel) }).ok()?;

        if (rssi as i16 - last as i16).unsigned_abs() < self.rssi_threshold as u16 {
            return None;
        }
        self.rssi_last = Some(rssi);
        Some(RadioEvent::RssiChanged {
            conn,
            rssi,
            channel,
        })
    }
}

impl Radio for SoftdeviceRadio {
    fn set_device_name(&mut self, name: &[u8]) -> Result<(), RawError> {
        // open link: security mode 1, level 1
        let sec_mode = raw::ble_gap_conn_sec_mode_t {
            _bitfield_1: raw::ble_gap_conn_sec_mode_t::new_bitfield_1(1, 1),
        };
        check(unsafe { raw::sd_ble_gap_device_name_set(&sec_mode, name.as_ptr(), name.len() as u16) })
    }

    fn set_preferred_conn_params(&mut self, params: &ConnParams) -> Result<(), RawError> {
        let params = to_raw(params);
        check(unsafe { raw::sd_ble_gap_ppcp_set(&params) })
    }

    fn set_adv_tx_power(&mut self, dbm: i8) -> Result<(), RawError> {
        self.tx_power = tx_power(dbm);
        Ok(())
    }

    fn set_adv_data(&mut self, adv: &[u8], scan_response: &[u8]) -> Result<(), RawError> {
        let next = 1 - self.buffers.active;
        let (adv_buf, scan_buf) = &mut self.buffers.pairs[next];
        adv_buf.clear();
        scan_buf.clear();
        adv_buf
            .extend_from_slice(adv)
            .map_err(|_| RawError(raw::NRF_ERROR_DATA_SIZE))?;
        scan_buf
            .extend_from_slice(scan_response)
            .map_err(|_| RawError(raw::NRF_ERROR_DATA_SIZE))?;

        if self.advertising {
            let data = raw::ble_gap_adv_data_t {
                adv_data: raw::ble_data_t {
                    p_data: adv_buf.as_mut_ptr(),
                    len: adv_buf.len() as u16,
                },
                scan_rsp_data: raw::ble_data_t {
                    p_data: scan_buf.as_mut_ptr(),
                    len: scan_buf.len() as u16,
                },
            };
            let mut handle = ADV_HANDLE;
            check(unsafe { raw::sd_ble_gap_adv_set_configure(&mut handle, &data, core::ptr::null()) })?;
        }
        self.buffers.active = next;
        Ok(())
    }

    fn start_advertising(&mut self, params: &AdvParams) -> Result<(), RawError> {
        if self.link.is_some() {
            return Err(RawError(raw::NRF_ERROR_INVALID_STATE));
        }
        self.advertising = true;
        ADV_CONTROL.signal(AdvCommand::Start(*params));
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), RawError> {
        if !self.advertising {
            return Err(RawError(raw::NRF_ERROR_INVALID_STATE));
        }
        self.advertising = false;
        ADV_CONTROL.signal(AdvCommand::Stop);
        Ok(())
    }

    fn notify(&mut self, conn: ConnHandle, attr_handle: u16, data: &[u8]) -> Result<(), RawError> {
        let mut len = data.len() as u16;
        let params = raw::ble_gatts_hvx_params_t {
            handle: attr_handle,
            type_: raw::BLE_GATT_HVX_NOTIFICATION as u8,
            offset: 0,
            p_len: &mut len,
            p_data: data.as_ptr(),
        };
        check(unsafe { raw::sd_ble_gatts_hvx(conn.0, &params) })?;
        TX_QUEUED.signal(conn);
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> Result<(), RawError> {
        check(unsafe { raw::sd_ble_gap_disconnect(conn.0, reason) })
    }

    fn update_conn_params(&mut self, conn: ConnHandle, params: &ConnParams) -> Result<(), RawError> {
        let params = to_raw(params);
        check(unsafe { raw::sd_ble_gap_conn_param_update(conn.0, &params) })
    }

    fn reply_phy_update(&mut self, conn: ConnHandle, phys: PhyPreference) -> Result<(), RawError> {
        let phys = raw::ble_gap_phys_t {
            tx_phys: phys.tx.bits(),
            rx_phys: phys.rx.bits(),
        };
        check(unsafe { raw::sd_ble_gap_phy_update(conn.0, &phys) })
    }

    fn reply_data_length_update(&mut self, conn: ConnHandle) -> Result<(), RawError> {
        check(unsafe {
            raw::sd_ble_gap_data_length_update(conn.0, core::ptr::null(), core::ptr::null_mut())
        })
    }

    fn reply_mtu_exchange(&mut self, conn: ConnHandle, server_mtu: u16) -> Result<(), RawError> {
        check(unsafe { raw::sd_ble_gatts_exchange_mtu_reply(conn.0, server_mtu) })
    }

    fn reply_sec_params(&mut self, conn: ConnHandle, status: u8) -> Result<(), RawError> {
        check(unsafe {
            raw::sd_ble_gap_sec_params_reply(conn.0, status, core::ptr::null(), core::ptr::null())
        })
    }

    fn set_empty_sys_attr(&mut self, conn: ConnHandle) -> Result<(), RawError> {
        check(unsafe { raw::sd_ble_gatts_sys_attr_set(conn.0, core::ptr::null(), 0, 0) })
    }

    fn start_rssi(&mut self, conn: ConnHandle, threshold_dbm: u8, skip_count: u8) -> Result<(), RawError> {
        check(unsafe { raw::sd_ble_gap_rssi_start(conn.0, threshold_dbm, skip_count) })?;
        self.rssi_threshold = threshold_dbm;
        // i8::MIN makes the first sample always report
        self.rssi_last = Some(i8::MIN);
        Ok(())
    }

    fn stop_rssi(&mut self, conn: ConnHandle) -> Result<(), RawError> {
        self.rssi_last = None;
        check(unsafe { raw::sd_ble_gap_rssi_stop(conn.0) })
    }

    fn links(&self) -> Links {
        let mut links = Links::new();
        if let Some(conn) = self.link {
            let _ = links.push(conn);
        }
        links
    }
}
