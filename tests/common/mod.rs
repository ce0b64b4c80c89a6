//! Mock radio and board shared by the integration and property tests.
//!
//! Radio calls, board hooks and subscriber callbacks all land in one
//! thread-local log so tests can assert on their relative order.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use dice_ble::ble::radio::{AdvParams, ConnHandle, ConnParams, Links, PhyPreference};
use dice_ble::ble::{Radio, RadioEvent, Token};
use dice_ble::board::{BatteryMonitor, Identity, RollReading, RollSensor, RollState, SystemControl};
use dice_ble::config::StackConfig;
use dice_ble::{RawError, Session};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    SetDeviceName(Vec<u8>),
    SetPreferredConnParams(ConnParams),
    SetAdvTxPower(i8),
    SetAdvData { adv: Vec<u8>, scan_response: Vec<u8> },
    StartAdvertising(AdvParams),
    StopAdvertising,
    Notify { conn: ConnHandle, attr_handle: u16, data: Vec<u8> },
    Disconnect { conn: ConnHandle, reason: u8 },
    UpdateConnParams(ConnHandle, ConnParams),
    ReplyPhyUpdate(ConnHandle, PhyPreference),
    ReplyDataLengthUpdate(ConnHandle),
    ReplyMtuExchange(ConnHandle, u16),
    ReplySecParams(ConnHandle, u8),
    SetEmptySysAttr(ConnHandle),
    StartRssi(ConnHandle, u8, u8),
    StopRssi(ConnHandle),

    HookRoll,
    UnhookRoll,
    HookBattery,
    UnhookBattery,
    Reset,

    /// `(subscriber, token, connected)`
    ConnectionEvent(&'static str, Token, bool),
    /// `(subscriber, token, rssi, channel)`
    RssiEvent(&'static str, Token, i8, u8),
}

thread_local! {
    static LOG: RefCell<Vec<Call>> = RefCell::new(Vec::new());
    static WATCHDOG_FEEDS: Cell<usize> = Cell::new(0);
}

fn record(call: Call) {
    LOG.with(|log| log.borrow_mut().push(call));
}

/// Drain the log.
pub fn take_log() -> Vec<Call> {
    LOG.with(|log| std::mem::take(&mut *log.borrow_mut()))
}

pub fn watchdog_feeds() -> usize {
    WATCHDOG_FEEDS.with(Cell::get)
}

/// Connection subscriber that logs what it receives.
pub fn on_connection(token: Token, connected: bool) {
    record(Call::ConnectionEvent("main", token, connected));
}

/// A second, distinct connection subscriber.
pub fn on_connection_other(token: Token, connected: bool) {
    record(Call::ConnectionEvent("other", token, connected));
}

pub fn on_rssi(token: Token, rssi: i8, channel: u8) {
    record(Call::RssiEvent("main", token, rssi, channel));
}

pub fn on_rssi_other(token: Token, rssi: i8, channel: u8) {
    record(Call::RssiEvent("other", token, rssi, channel));
}

pub fn on_rssi_third(token: Token, rssi: i8, channel: u8) {
    record(Call::RssiEvent("third", token, rssi, channel));
}

#[derive(Default)]
pub struct MockRadio {
    pub links: Vec<ConnHandle>,
    pub fail_device_name: Option<RawError>,
    pub fail_start_advertising: Option<RawError>,
    pub fail_notify: Option<RawError>,
    pub fail_disconnect: Option<RawError>,
    pub fail_start_rssi: Option<RawError>,
}

impl Radio for MockRadio {
    fn set_device_name(&mut self, name: &[u8]) -> Result<(), RawError> {
        if let Some(e) = self.fail_device_name {
            return Err(e);
        }
        record(Call::SetDeviceName(name.to_vec()));
        Ok(())
    }

    fn set_preferred_conn_params(&mut self, params: &ConnParams) -> Result<(), RawError> {
        record(Call::SetPreferredConnParams(*params));
        Ok(())
    }

    fn set_adv_tx_power(&mut self, dbm: i8) -> Result<(), RawError> {
        record(Call::SetAdvTxPower(dbm));
        Ok(())
    }

    fn set_adv_data(&mut self, adv: &[u8], scan_response: &[u8]) -> Result<(), RawError> {
        record(Call::SetAdvData {
            adv: adv.to_vec(),
            scan_response: scan_response.to_vec(),
        });
        Ok(())
    }

    fn start_advertising(&mut self, params: &AdvParams) -> Result<(), RawError> {
        if let Some(e) = self.fail_start_advertising {
            return Err(e);
        }
        record(Call::StartAdvertising(*params));
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), RawError> {
        record(Call::StopAdvertising);
        Ok(())
    }

    fn notify(&mut self, conn: ConnHandle, attr_handle: u16, data: &[u8]) -> Result<(), RawError> {
        if let Some(e) = self.fail_notify {
            return Err(e);
        }
        record(Call::Notify {
            conn,
            attr_handle,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> Result<(), RawError> {
        if let Some(e) = self.fail_disconnect {
            return Err(e);
        }
        record(Call::Disconnect { conn, reason });
        Ok(())
    }

    fn update_conn_params(&mut self, conn: ConnHandle, params: &ConnParams) -> Result<(), RawError> {
        record(Call::UpdateConnParams(conn, *params));
        Ok(())
    }

    fn reply_phy_update(&mut self, conn: ConnHandle, phys: PhyPreference) -> Result<(), RawError> {
        record(Call::ReplyPhyUpdate(conn, phys));
        Ok(())
    }

    fn reply_data_length_update(&mut self, conn: ConnHandle) -> Result<(), RawError> {
        record(Call::ReplyDataLengthUpdate(conn));
        Ok(())
    }

    fn reply_mtu_exchange(&mut self, conn: ConnHandle, server_mtu: u16) -> Result<(), RawError> {
        record(Call::ReplyMtuExchange(conn, server_mtu));
        Ok(())
    }

    fn reply_sec_params(&mut self, conn: ConnHandle, status: u8) -> Result<(), RawError> {
        record(Call::ReplySecParams(conn, status));
        Ok(())
    }

    fn set_empty_sys_attr(&mut self, conn: ConnHandle) -> Result<(), RawError> {
        record(Call::SetEmptySysAttr(conn));
        Ok(())
    }

    fn start_rssi(&mut self, conn: ConnHandle, threshold_dbm: u8, skip_count: u8) -> Result<(), RawError> {
        if let Some(e) = self.fail_start_rssi {
            return Err(e);
        }
        record(Call::StartRssi(conn, threshold_dbm, skip_count));
        Ok(())
    }

    fn stop_rssi(&mut self, conn: ConnHandle) -> Result<(), RawError> {
        record(Call::StopRssi(conn));
        Ok(())
    }

    fn links(&self) -> Links {
        self.links.iter().copied().collect()
    }
}

pub struct MockBoard {
    pub name: &'static str,
    pub roll: RollReading,
    pub level: f32,
    pub led_count: u8,
    pub design_and_color: u8,
    pub device_id: u32,
    pub build_timestamp: u32,
}

impl Default for MockBoard {
    fn default() -> Self {
        Self {
            name: "Dice",
            roll: RollReading {
                state: RollState::OnFace,
                face: 1,
            },
            level: 1.0,
            led_count: 21,
            design_and_color: 3,
            device_id: 0xDEAD_BEEF,
            build_timestamp: 0x5F5E_1000,
        }
    }
}

impl RollSensor for MockBoard {
    fn current_roll(&self) -> RollReading {
        self.roll
    }

    fn hook_roll_state(&mut self) {
        record(Call::HookRoll);
    }

    fn unhook_roll_state(&mut self) {
        record(Call::UnhookRoll);
    }
}

impl BatteryMonitor for MockBoard {
    fn current_level(&self) -> f32 {
        self.level
    }

    fn hook_level(&mut self) {
        record(Call::HookBattery);
    }

    fn unhook_level(&mut self) {
        record(Call::UnhookBattery);
    }
}

impl Identity for MockBoard {
    fn device_name(&self) -> &str {
        self.name
    }

    fn design_and_color(&self) -> u8 {
        self.design_and_color
    }

    fn led_count(&self) -> u8 {
        self.led_count
    }

    fn device_id(&self) -> u32 {
        self.device_id
    }

    fn build_timestamp(&self) -> u32 {
        self.build_timestamp
    }
}

impl SystemControl for MockBoard {
    fn reset(&mut self) {
        record(Call::Reset);
    }

    fn feed_watchdog(&mut self) {
        WATCHDOG_FEEDS.with(|c| c.set(c.get() + 1));
    }
}

pub type TestSession = Session<MockRadio, MockBoard>;

pub const LINK: ConnHandle = ConnHandle(7);

/// Parameters inside the preferred range.
pub const GOOD_PARAMS: ConnParams = ConnParams {
    min_interval: 24,
    max_interval: 24,
    slave_latency: 0,
    supervision_timeout: 400,
};

/// Initialised session with an empty log.
pub fn session_with(board: MockBoard, config: StackConfig) -> TestSession {
    let mut session = Session::new(MockRadio::default(), board, config);
    session.init().unwrap();
    take_log();
    session
}

pub fn session() -> TestSession {
    session_with(MockBoard::default(), StackConfig::default())
}

/// Deliver a connect for [`LINK`] and register the link with the radio.
pub fn connect(session: &mut TestSession) {
    connect_with(session, GOOD_PARAMS);
}

pub fn connect_with(session: &mut TestSession, params: ConnParams) {
    connect_link(session, LINK, params);
}

pub fn connect_link(session: &mut TestSession, conn: ConnHandle, params: ConnParams) {
    session.radio_mut().links = vec![conn];
    session.handle_event(RadioEvent::Connected { conn, params });
}

pub fn disconnect(session: &mut TestSession, reason: u8) {
    disconnect_link(session, LINK, reason);
}

pub fn disconnect_link(session: &mut TestSession, conn: ConnHandle, reason: u8) {
    session.radio_mut().links.retain(|&l| l != conn);
    session.handle_event(RadioEvent::Disconnected { conn, reason });
}

/// Only the board hook/unhook calls, in order.
pub fn hook_calls(log: &[Call]) -> Vec<Call> {
    log.iter()
        .filter(|c| {
            matches!(
                c,
                Call::HookRoll | Call::UnhookRoll | Call::HookBattery | Call::UnhookBattery
            )
        })
        .cloned()
        .collect()
}

pub fn count(log: &[Call], pred: impl Fn(&Call) -> bool) -> usize {
    log.iter().filter(|c| pred(c)).count()
}
