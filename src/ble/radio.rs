//! The radio stack as seen by the session.
//!
//! The stack (link layer, GATT, security) is a fixed external service.
//! [`Radio`] is the set of calls the session makes into it and
//! [`RadioEvent`] the events it delivers back, one at a time, on the
//! radio event context.

use crate::config::MAX_LINKS;
use crate::error::RawError;
use heapless::Vec;

/// HCI status codes used as disconnect reasons.
pub mod hci {
    pub const REMOTE_USER_TERMINATED_CONNECTION: u8 = 0x13;
    pub const CONN_INTERVAL_UNACCEPTABLE: u8 = 0x3B;
    pub const CONN_FAILED_TO_BE_ESTABLISHED: u8 = 0x3E;
}

/// `BLE_GAP_SEC_STATUS_PAIRING_NOT_SUPP`.
pub const SEC_STATUS_PAIRING_NOT_SUPPORTED: u8 = 0x85;

/// Connection handle assigned by the radio stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnHandle(pub u16);

/// Links currently known to the stack.
pub type Links = Vec<ConnHandle, MAX_LINKS>;

/// Advertising mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvMode {
    #[default]
    Idle,
    Fast,
    Slow,
}

/// Parameters for one advertising run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvParams {
    pub mode: AdvMode,
    /// Interval in 0.625 ms units.
    pub interval: u32,
    /// Duration in 10 ms units, 0 = until stopped.
    pub duration: u16,
}

/// GAP connection parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnParams {
    /// Minimum connection interval (1.25 ms units).
    pub min_interval: u16,
    /// Maximum connection interval (1.25 ms units).
    pub max_interval: u16,
    pub slave_latency: u16,
    /// Supervision timeout (10 ms units).
    pub supervision_timeout: u16,
}

impl ConnParams {
    /// Whether the parameters a central chose fall inside our preferred
    /// range. Centrals report the chosen interval in both interval fields.
    pub fn is_acceptable(&self, preferred: &ConnParams) -> bool {
        self.max_interval >= preferred.min_interval
            && self.max_interval <= preferred.max_interval
            && self.slave_latency <= preferred.slave_latency
    }
}

/// PHY selection for one link direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phy {
    Auto,
    OneMbps,
    TwoMbps,
    Coded,
}

impl Phy {
    /// `BLE_GAP_PHY_*` bit.
    pub const fn bits(self) -> u8 {
        match self {
            Phy::Auto => 0x00,
            Phy::OneMbps => 0x01,
            Phy::TwoMbps => 0x02,
            Phy::Coded => 0x04,
        }
    }
}

/// PHYs for both link directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhyPreference {
    pub tx: Phy,
    pub rx: Phy,
}

impl PhyPreference {
    pub const AUTO: Self = Self {
        tx: Phy::Auto,
        rx: Phy::Auto,
    };
}

/// Events delivered by the radio stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioEvent {
    /// A central connected; advertising has stopped.
    Connected { conn: ConnHandle, params: ConnParams },
    /// The link dropped (or never got established).
    Disconnected { conn: ConnHandle, reason: u8 },
    /// The central applied new connection parameters.
    ConnParamsUpdated { conn: ConnHandle, params: ConnParams },
    /// The peer proposes a PHY change.
    PhyUpdateRequest { conn: ConnHandle },
    /// The peer proposes a data length change.
    DataLengthUpdateRequest { conn: ConnHandle },
    /// The client asks for a larger ATT MTU.
    MtuExchangeRequest { conn: ConnHandle, client_mtu: u16 },
    /// New RSSI sample on the link.
    RssiChanged { conn: ConnHandle, rssi: i8, channel: u8 },
    GattClientTimeout { conn: ConnHandle },
    GattServerTimeout { conn: ConnHandle },
    /// The peer wants to pair.
    SecParamsRequest { conn: ConnHandle },
    /// The peer expects persisted GATT state for a bond.
    SysAttrMissing { conn: ConnHandle },
    /// Queued notifications left the radio.
    NotificationTxComplete { conn: ConnHandle, count: u8 },
    /// The peer confirmed an indication.
    IndicationConfirmed { conn: ConnHandle, attr_handle: u16 },
    /// The current advertising run reached its duration.
    AdvertisingTimeout,
}

impl RadioEvent {
    /// Link the event refers to, if any.
    pub fn conn(&self) -> Option<ConnHandle> {
        match *self {
            RadioEvent::Connected { conn, .. }
            | RadioEvent::Disconnected { conn, .. }
            | RadioEvent::ConnParamsUpdated { conn, .. }
            | RadioEvent::PhyUpdateRequest { conn }
            | RadioEvent::DataLengthUpdateRequest { conn }
            | RadioEvent::MtuExchangeRequest { conn, .. }
            | RadioEvent::RssiChanged { conn, .. }
            | RadioEvent::GattClientTimeout { conn }
            | RadioEvent::GattServerTimeout { conn }
            | RadioEvent::SecParamsRequest { conn }
            | RadioEvent::SysAttrMissing { conn }
            | RadioEvent::NotificationTxComplete { conn, .. }
            | RadioEvent::IndicationConfirmed { conn, .. } => Some(conn),
            RadioEvent::AdvertisingTimeout => None,
        }
    }
}

/// Calls the session makes into the radio stack.
///
/// Every call is synchronous and short; results arrive later as
/// [`RadioEvent`]s where the stack works asynchronously.
pub trait Radio {
    /// Set the GAP device name (open security mode).
    fn set_device_name(&mut self, name: &[u8]) -> Result<(), RawError>;

    /// Set the peripheral preferred connection parameters.
    fn set_preferred_conn_params(&mut self, params: &ConnParams) -> Result<(), RawError>;

    /// TX power used while advertising.
    fn set_adv_tx_power(&mut self, dbm: i8) -> Result<(), RawError>;

    /// Hand a fully composed advertisement and scan response to the stack.
    /// Valid while idle and while advertising.
    fn set_adv_data(&mut self, adv: &[u8], scan_response: &[u8]) -> Result<(), RawError>;

    fn start_advertising(&mut self, params: &AdvParams) -> Result<(), RawError>;

    fn stop_advertising(&mut self) -> Result<(), RawError>;

    /// Queue a notification of `data` on `attr_handle`.
    fn notify(&mut self, conn: ConnHandle, attr_handle: u16, data: &[u8]) -> Result<(), RawError>;

    fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> Result<(), RawError>;

    fn update_conn_params(&mut self, conn: ConnHandle, params: &ConnParams) -> Result<(), RawError>;

    fn reply_phy_update(&mut self, conn: ConnHandle, phys: PhyPreference) -> Result<(), RawError>;

    /// Accept a data length update with automatic parameters.
    fn reply_data_length_update(&mut self, conn: ConnHandle) -> Result<(), RawError>;

    fn reply_mtu_exchange(&mut self, conn: ConnHandle, server_mtu: u16) -> Result<(), RawError>;

    fn reply_sec_params(&mut self, conn: ConnHandle, status: u8) -> Result<(), RawError>;

    /// Install an empty system attribute set for the link.
    fn set_empty_sys_attr(&mut self, conn: ConnHandle) -> Result<(), RawError>;

    fn start_rssi(&mut self, conn: ConnHandle, threshold_dbm: u8, skip_count: u8) -> Result<(), RawError>;

    fn stop_rssi(&mut self, conn: ConnHandle) -> Result<(), RawError>;

    /// All currently connected links.
    fn links(&self) -> Links;
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFERRED: ConnParams = ConnParams {
        min_interval: 16,
        max_interval: 160,
        slave_latency: 1,
        supervision_timeout: 300,
    };

    fn chosen(interval: u16, latency: u16) -> ConnParams {
        ConnParams {
            min_interval: interval,
            max_interval: interval,
            slave_latency: latency,
            supervision_timeout: 400,
        }
    }

    #[test]
    fn conn_params_inside_range_are_acceptable() {
        assert!(chosen(16, 0).is_acceptable(&PREFERRED));
        assert!(chosen(160, 1).is_acceptable(&PREFERRED));
    }

    #[test]
    fn conn_params_outside_range_are_rejected() {
        assert!(!chosen(6, 0).is_acceptable(&PREFERRED));
        assert!(!chosen(200, 0).is_acceptable(&PREFERRED));
    }

    #[test]
    fn conn_params_latency_above_preferred_is_rejected() {
        assert!(!chosen(24, 4).is_acceptable(&PREFERRED));
    }

    #[test]
    fn event_conn_extraction() {
        let conn = ConnHandle(3);
        assert_eq!(RadioEvent::SysAttrMissing { conn }.conn(), Some(conn));
        assert_eq!(RadioEvent::AdvertisingTimeout.conn(), None);
    }

    #[test]
    fn phy_auto_is_zero_bits() {
        assert_eq!(PhyPreference::AUTO.tx.bits(), 0);
        assert_eq!(PhyPreference::AUTO.rx.bits(), 0);
    }
}
