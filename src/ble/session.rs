//! Connection / advertising state machine.
//!
//! [`Session`] owns the single connection slot, the advertising payloads,
//! the notification channel and the event registries.  It is the only
//! place radio-stack events are interpreted:
//!
//! ```text
//!            start / slow                 connect
//!   Idle ──────────────────> Advertising ─────────> Connected
//!    ^   <──────────────────  (Fast|Slow)  <─────────    │
//!    │    stop / timeout          ^        disconnect    │
//!    │                            │      (auto-advertise)│
//!    └────────────────────────────┴──────────────────────┘
//!                     disconnect (auto-advertise off)
//! ```
//!
//! Sensor producers are hooked exactly while advertising so the payload
//! stays live, and unhooked on connect, when the advertised state freezes.
//!
//! Every handler runs to completion on the caller's context and never
//! panics; steady-state stack failures are logged and swallowed.

use crate::ble::advertising::{AdvPayload, AdvertisedState, PayloadComposer};
use crate::ble::conn_params::{ConnParamsNegotiation, NegotiationAction};
use crate::ble::notify::{NotificationChannel, SendError};
use crate::ble::radio::{
    hci, AdvMode, AdvParams, ConnHandle, ConnParams, PhyPreference, Radio, RadioEvent,
    SEC_STATUS_PAIRING_NOT_SUPPORTED,
};
use crate::ble::registry::{ConnectionHandler, EventRegistry, RssiHandler, Token};
use crate::board::{Board, RollReading};
use crate::config::{StackConfig, ATT_MTU_DEFAULT, MAX_CONNECTION_CLIENTS, MAX_RSSI_CLIENTS};
use crate::error::{Error, RawError};

/// Externally visible link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Idle,
    Advertising(AdvMode),
    Connected,
}

/// The one peer slot.
#[derive(Debug, Clone, Copy, Default)]
struct ConnectionSlot {
    handle: Option<ConnHandle>,
    connected: bool,
    advertising: bool,
    /// One-shot: reset the device once the link drops.
    reset_on_disconnect: bool,
}

/// Log a failed steady-state stack call.
fn log_failure(what: &'static str, result: Result<(), RawError>) {
    if let Err(e) = result {
        warn!("{=str} failed: {=u32:#x}", what, e.0);
    }
}

pub struct Session<R: Radio, B: Board> {
    radio: R,
    board: B,
    config: StackConfig,
    slot: ConnectionSlot,
    adv_mode: AdvMode,
    sensors_hooked: bool,
    auto_advertise: bool,
    initialized: bool,
    composer: PayloadComposer,
    channel: NotificationChannel,
    connection_clients: EventRegistry<ConnectionHandler, MAX_CONNECTION_CLIENTS>,
    rssi_clients: EventRegistry<RssiHandler, MAX_RSSI_CLIENTS>,
    rssi_active: bool,
    negotiation: ConnParamsNegotiation,
    att_mtu: u16,
    now_ms: u64,
}

impl<R: Radio, B: Board> Session<R, B> {
    pub fn new(radio: R, board: B, config: StackConfig) -> Self {
        Self {
            composer: PayloadComposer::new(config.company_id),
            negotiation: ConnParamsNegotiation::new(&config),
            auto_advertise: config.advertise_on_disconnect,
            radio,
            board,
            config,
            slot: ConnectionSlot::default(),
            adv_mode: AdvMode::Idle,
            sensors_hooked: false,
            initialized: false,
            channel: NotificationChannel::new(),
            connection_clients: EventRegistry::new(),
            rssi_clients: EventRegistry::new(),
            rssi_active: false,
            att_mtu: ATT_MTU_DEFAULT,
            now_ms: 0,
        }
    }

    /// Configure the stack and render the first payloads.
    ///
    /// Any failure here is a startup failure; the caller should abort.
    pub fn init(&mut self) -> Result<(), Error> {
        self.composer.build_initial(&self.board)?;
        self.radio.set_device_name(self.composer.name().as_bytes())?;
        self.radio
            .set_preferred_conn_params(&self.config.preferred_conn_params)?;
        self.radio.set_adv_tx_power(self.config.adv_tx_power_dbm)?;
        self.publish()?;
        self.initialized = true;
        info!("session initialised");
        Ok(())
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.slot.connected
    }

    pub fn is_advertising(&self) -> bool {
        self.slot.advertising
    }

    pub fn link_state(&self) -> LinkState {
        if self.slot.connected {
            LinkState::Connected
        } else if self.slot.advertising {
            LinkState::Advertising(self.adv_mode)
        } else {
            LinkState::Idle
        }
    }

    pub fn conn_handle(&self) -> Option<ConnHandle> {
        self.slot.handle
    }

    /// Effective ATT MTU of the current link.
    pub fn att_mtu(&self) -> u16 {
        self.att_mtu
    }

    /// Whether the roll-state and battery producers are currently hooked.
    pub fn sensors_hooked(&self) -> bool {
        self.sensors_hooked
    }

    pub fn advertised_state(&self) -> &AdvertisedState {
        self.composer.state()
    }

    pub fn adv_payload(&self) -> &AdvPayload {
        self.composer.published()
    }

    // ── Subscriptions ──────────────────────────────────────────────────────

    /// Subscribe to connect/disconnect. Returns `false` when full.
    pub fn hook_connection_events(&mut self, handler: ConnectionHandler, token: Token) -> bool {
        let ok = self.connection_clients.register(token, handler);
        if !ok {
            warn!("connection registry full");
        }
        ok
    }

    pub fn unhook_connection_events(&mut self, handler: ConnectionHandler) -> bool {
        self.connection_clients.unregister_handler(handler)
    }

    pub fn unhook_connection_events_by_token(&mut self, token: Token) -> bool {
        self.connection_clients.unregister_token(token)
    }

    /// Subscribe to RSSI samples. The first subscriber starts sampling.
    pub fn hook_rssi(&mut self, handler: RssiHandler, token: Token) -> bool {
        if !self.rssi_clients.register(token, handler) {
            warn!("rssi registry full");
            return false;
        }
        // also retries a start that failed for an earlier subscriber
        self.start_rssi_sampling();
        true
    }

    /// The last subscriber leaving stops sampling.
    pub fn unhook_rssi(&mut self, handler: RssiHandler) -> bool {
        let removed = self.rssi_clients.unregister_handler(handler);
        if removed && self.rssi_clients.is_empty() {
            self.stop_rssi_sampling();
        }
        removed
    }

    pub fn unhook_rssi_by_token(&mut self, token: Token) -> bool {
        let removed = self.rssi_clients.unregister_token(token);
        if removed && self.rssi_clients.is_empty() {
            self.stop_rssi_sampling();
        }
        removed
    }

    fn start_rssi_sampling(&mut self) {
        // without a link, sampling starts at the next connect
        let Some(conn) = self.slot.handle else {
            return;
        };
        if self.rssi_active {
            return;
        }
        match self.radio.start_rssi(
            conn,
            self.config.rssi_threshold_dbm,
            self.config.rssi_skip_count,
        ) {
            Ok(()) => self.rssi_active = true,
            Err(e) => warn!("rssi start failed: {=u32:#x}", e.0),
        }
    }

    fn stop_rssi_sampling(&mut self) {
        if !self.rssi_active {
            return;
        }
        self.rssi_active = false;
        if let Some(conn) = self.slot.handle {
            log_failure("rssi stop", self.radio.stop_rssi(conn));
        }
    }

    // ── Advertising ────────────────────────────────────────────────────────

    /// Start fast advertising with a freshly sampled payload.
    pub fn start_advertising(&mut self) -> Result<(), Error> {
        self.advertise(AdvMode::Fast)
    }

    pub fn slow_advertising(&mut self) -> Result<(), Error> {
        self.advertise(AdvMode::Slow)
    }

    pub fn stop_advertising(&mut self) -> Result<(), Error> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        if self.slot.advertising {
            self.radio.stop_advertising()?;
            info!("advertising stopped");
        }
        self.enter_idle();
        Ok(())
    }

    pub fn enable_advertising_on_disconnect(&mut self) {
        self.auto_advertise = true;
    }

    pub fn disable_advertising_on_disconnect(&mut self) {
        self.auto_advertise = false;
    }

    fn advertise(&mut self, mode: AdvMode) -> Result<(), Error> {
        let timing = match mode {
            AdvMode::Fast => self.config.fast,
            AdvMode::Slow => self.config.slow,
            AdvMode::Idle => return self.stop_advertising(),
        };
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        if self.slot.connected {
            return Err(Error::InvalidState);
        }
        if self.slot.advertising {
            log_failure("advertising stop", self.radio.stop_advertising());
            self.slot.advertising = false;
        }

        let params = AdvParams {
            mode,
            interval: timing.interval,
            duration: timing.duration,
        };
        if let Err(e) = self.begin_advertising(&params) {
            self.enter_idle();
            return Err(e);
        }

        self.slot.advertising = true;
        self.adv_mode = mode;
        self.hook_sensors();
        info!("advertising: {}", mode);
        Ok(())
    }

    /// Sample the sensors, publish the payload and start the radio.
    fn begin_advertising(&mut self, params: &AdvParams) -> Result<(), Error> {
        let reading = self.board.current_roll();
        let level = self.board.current_level();
        self.composer.refresh(reading, level)?;
        self.publish()?;
        self.radio.start_advertising(params)?;
        Ok(())
    }

    fn enter_idle(&mut self) {
        self.slot.advertising = false;
        self.adv_mode = AdvMode::Idle;
        self.unhook_sensors();
    }

    fn on_advertising_timeout(&mut self) {
        // the stack has already stopped advertising
        self.slot.advertising = false;
        if self.adv_mode == AdvMode::Fast && self.config.slow_after_fast {
            if let Err(e) = self.advertise(AdvMode::Slow) {
                warn!("slow advertising failed: {}", e);
            }
        } else {
            info!("advertising: idle");
            self.enter_idle();
        }
    }

    fn publish(&mut self) -> Result<(), RawError> {
        let payload = self.composer.published();
        self.radio.set_adv_data(&payload.adv, &payload.scan_response)
    }

    // ── Sensor hooks ───────────────────────────────────────────────────────

    fn hook_sensors(&mut self) {
        if self.sensors_hooked {
            return;
        }
        self.board.hook_roll_state();
        self.board.hook_level();
        self.sensors_hooked = true;
    }

    fn unhook_sensors(&mut self) {
        if !self.sensors_hooked {
            return;
        }
        self.board.unhook_roll_state();
        self.board.unhook_level();
        self.sensors_hooked = false;
    }

    /// Roll-state producer callback.
    pub fn on_roll_state_changed(&mut self, reading: RollReading) {
        if !self.initialized || self.slot.connected {
            return;
        }
        let result = self.composer.apply_roll_change(reading);
        self.republish(result);
    }

    /// Battery producer callback, `level` in `0.0..=1.0`.
    pub fn on_battery_level_changed(&mut self, level: f32) {
        if !self.initialized || self.slot.connected {
            return;
        }
        let result = self.composer.apply_battery_change(level);
        self.republish(result);
    }

    fn republish(&mut self, rendered: Result<(), Error>) {
        if let Err(e) = rendered {
            warn!("payload render failed: {}", e);
            return;
        }
        if self.slot.advertising {
            log_failure("adv data update", self.publish());
        }
    }

    // ── Connection ─────────────────────────────────────────────────────────

    /// Arm a device reset for when the current link drops.
    pub fn reset_on_disconnect(&mut self) {
        self.slot.reset_on_disconnect = true;
    }

    /// Drop every link the stack knows about.
    ///
    /// Returns how many disconnect requests the stack accepted.
    pub fn disconnect(&mut self) -> usize {
        let mut requested = 0;
        for conn in self.radio.links() {
            match self
                .radio
                .disconnect(conn, hci::REMOTE_USER_TERMINATED_CONNECTION)
            {
                Ok(()) => requested += 1,
                Err(e) => warn!("disconnect conn={=u16} failed: {=u32:#x}", conn.0, e.0),
            }
        }
        requested
    }

    // ── Notifications ──────────────────────────────────────────────────────

    pub fn can_send(&self) -> bool {
        self.channel.can_send()
    }

    /// Notify `data` on the characteristic value `attr_handle`.
    pub fn send(&mut self, attr_handle: u16, data: &[u8]) -> Result<(), SendError> {
        let result = self
            .channel
            .send(&mut self.radio, self.slot.handle, attr_handle, data);
        self.board.feed_watchdog();
        result
    }

    // ── Radio events ───────────────────────────────────────────────────────

    /// Whether `event` belongs to the link in the slot.
    ///
    /// A failed connection attempt is reported for a handle that never
    /// became current, so it is accepted while no link is up.
    fn is_current(&self, event: &RadioEvent) -> bool {
        match *event {
            RadioEvent::Connected { .. } | RadioEvent::AdvertisingTimeout => true,
            RadioEvent::Disconnected {
                reason: hci::CONN_FAILED_TO_BE_ESTABLISHED,
                ..
            } if !self.slot.connected => true,
            _ => event.conn() == self.slot.handle,
        }
    }

    /// Interpret one radio-stack event.
    ///
    /// Events for a link other than the current one are dropped.
    pub fn handle_event(&mut self, event: RadioEvent) {
        debug!("radio event: {}", event);
        if !self.is_current(&event) {
            debug!("ignoring event for stale link");
            self.board.feed_watchdog();
            return;
        }
        match event {
            RadioEvent::Connected { conn, params } => self.on_connected(conn, params),
            RadioEvent::Disconnected { conn, reason } => self.on_disconnected(conn, reason),
            RadioEvent::ConnParamsUpdated { params, .. } => {
                self.negotiation.on_params_updated(self.now_ms, &params)
            }
            RadioEvent::PhyUpdateRequest { conn } => log_failure(
                "phy update reply",
                self.radio.reply_phy_update(conn, PhyPreference::AUTO),
            ),
            RadioEvent::DataLengthUpdateRequest { conn } => log_failure(
                "data length reply",
                self.radio.reply_data_length_update(conn),
            ),
            RadioEvent::MtuExchangeRequest { conn, client_mtu } => {
                let mtu = client_mtu.min(self.config.att_mtu).max(ATT_MTU_DEFAULT);
                match self.radio.reply_mtu_exchange(conn, mtu) {
                    Ok(()) => self.att_mtu = mtu,
                    Err(e) => warn!("mtu reply failed: {=u32:#x}", e.0),
                }
            }
            RadioEvent::RssiChanged { rssi, channel, .. } => self
                .rssi_clients
                .dispatch(|token, handler| handler(token, rssi, channel)),
            RadioEvent::GattClientTimeout { conn } | RadioEvent::GattServerTimeout { conn } => {
                warn!("gatt timeout, dropping conn={=u16}", conn.0);
                log_failure(
                    "disconnect",
                    self.radio
                        .disconnect(conn, hci::REMOTE_USER_TERMINATED_CONNECTION),
                );
            }
            RadioEvent::SecParamsRequest { conn } => log_failure(
                "sec params reply",
                self.radio
                    .reply_sec_params(conn, SEC_STATUS_PAIRING_NOT_SUPPORTED),
            ),
            RadioEvent::SysAttrMissing { conn } => {
                log_failure("sys attr set", self.radio.set_empty_sys_attr(conn))
            }
            RadioEvent::NotificationTxComplete { .. } | RadioEvent::IndicationConfirmed { .. } => {
                self.channel.complete();
            }
            RadioEvent::AdvertisingTimeout => self.on_advertising_timeout(),
        }
        self.board.feed_watchdog();
    }

    /// Advance the session clock and run due connection parameter work.
    pub fn on_tick(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        let Some(conn) = self.slot.handle else {
            return;
        };
        match self.negotiation.poll(now_ms) {
            Some(NegotiationAction::RequestUpdate(params)) => log_failure(
                "conn params update",
                self.radio.update_conn_params(conn, &params),
            ),
            Some(NegotiationAction::GiveUp) => {
                warn!("conn params negotiation failed");
                log_failure(
                    "disconnect",
                    self.radio
                        .disconnect(conn, hci::CONN_INTERVAL_UNACCEPTABLE),
                );
            }
            None => {}
        }
    }

    fn on_connected(&mut self, conn: ConnHandle, params: ConnParams) {
        info!("connected: conn={=u16}", conn.0);
        self.slot.handle = Some(conn);
        self.slot.connected = true;
        self.slot.advertising = false;
        self.adv_mode = AdvMode::Idle;
        self.unhook_sensors();
        self.channel.reset();
        self.att_mtu = ATT_MTU_DEFAULT;
        if !self.rssi_clients.is_empty() {
            self.start_rssi_sampling();
        }
        self.negotiation.start(self.now_ms, &params);

        self.connection_clients
            .dispatch(|token, handler| handler(token, true));
    }

    fn on_disconnected(&mut self, conn: ConnHandle, reason: u8) {
        info!("disconnected: conn={=u16} reason={=u8:#x}", conn.0, reason);
        self.slot.handle = None;
        self.slot.connected = false;
        self.channel.reset();
        self.negotiation.stop();
        self.rssi_active = false;
        self.att_mtu = ATT_MTU_DEFAULT;

        let reset = self.slot.reset_on_disconnect;
        if reset || !self.auto_advertise {
            self.enter_idle();
        } else {
            // also covers a connection that failed to establish
            self.slot.advertising = false;
            if let Err(e) = self.advertise(AdvMode::Fast) {
                warn!("advertising restart failed: {}", e);
            }
        }

        self.connection_clients
            .dispatch(|token, handler| handler(token, false));

        if reset {
            self.slot.reset_on_disconnect = false;
            info!("resetting after disconnect");
            self.board.reset();
        }
    }
}
