//! Application-wide constants and compile-time configuration.
//!
//! All radio timing parameters, protocol constants and registry sizes
//! live here so they can be tuned in one place.  [`StackConfig`] bundles
//! the values the session needs at runtime.

use crate::ble::radio::ConnParams;

// Advertising

/// Fast advertising interval (in 0.625 ms units). 300 = 187.5 ms.
pub const ADV_FAST_INTERVAL: u32 = 300;

/// Fast advertising duration (in 10 ms units). 0 = unlimited.
pub const ADV_FAST_DURATION: u16 = 0;

/// Slow advertising interval (in 0.625 ms units). 1600 = 1 s.
pub const ADV_SLOW_INTERVAL: u32 = 1600;

/// Slow advertising duration (in 10 ms units). 0 = unlimited.
pub const ADV_SLOW_DURATION: u16 = 0;

/// Radio TX power while advertising (dBm).
pub const ADV_TX_POWER_DBM: i8 = 4;

/// Legacy advertising / scan response payload size limit.
pub const LEGACY_ADV_DATA_LEN: usize = 31;

/// Longest device name the settings store can hold.
pub const MAX_DEVICE_NAME_LEN: usize = 10;

/// Bluetooth SIG company identifier carried in the manufacturer data.
/// 0xFFFF is the reserved test value until an id is assigned.
pub const COMPANY_ID: u16 = 0xFFFF;

/// Device Information Service, advertised and used as the service data key.
pub const DEVICE_INFORMATION_SERVICE_UUID: u16 = 0x180A;

/// Die generic data service: 6E400001-B5A3-F393-E0A9-E50E24DCCA9E,
/// stored little-endian as it goes over the air.
pub const GENERIC_DATA_SERVICE_UUID: [u8; 16] = [
    0x9E, 0xCA, 0xDC, 0x24, 0x0E, 0xE5, 0xA9, 0xE0, 0x93, 0xF3, 0xA3, 0xB5, 0x01, 0x00, 0x40, 0x6E,
];

// Connection parameters

/// Preferred connection interval range (in 1.25 ms units).
/// 16 = 20 ms, 160 = 200 ms.
pub const MIN_CONN_INTERVAL: u16 = 16;
pub const MAX_CONN_INTERVAL: u16 = 160;

/// Slave latency (number of connection events the peripheral can skip).
pub const SLAVE_LATENCY: u16 = 1;

/// Supervision timeout (in 10 ms units). 300 = 3 s.
pub const CONN_SUP_TIMEOUT: u16 = 300;

/// Delay from connect to the first connection parameter update request (ms).
pub const FIRST_CONN_PARAMS_UPDATE_DELAY_MS: u64 = 5_000;

/// Delay between subsequent update requests (ms).
pub const NEXT_CONN_PARAMS_UPDATE_DELAY_MS: u64 = 30_000;

/// Update requests before the link is dropped.
pub const MAX_CONN_PARAMS_UPDATE_COUNT: u8 = 3;

// GATT

/// Default ATT MTU before any exchange.
pub const ATT_MTU_DEFAULT: u16 = 23;

/// Largest ATT MTU we agree to.
pub const ATT_MTU_MAX: u16 = 247;

// RSSI

/// Minimum RSSI change (dBm) before the stack reports a new sample.
pub const RSSI_THRESHOLD_DBM: u8 = 1;

/// Samples that must pass the threshold before a report.
pub const RSSI_SKIP_COUNT: u8 = 1;

// Registries

/// Connection-event subscribers.
pub const MAX_CONNECTION_CLIENTS: usize = 2;

/// RSSI subscribers.
pub const MAX_RSSI_CLIENTS: usize = 2;

/// Links tracked by the radio stack (one central at a time).
pub const MAX_LINKS: usize = 1;

// ── Battery ──────────────────────────────────────────────────────────

/// Cell voltage reported as an empty battery (mV).
pub const BATTERY_EMPTY_MV: u32 = 3_000;

/// Cell voltage reported as a full battery (mV).
pub const BATTERY_FULL_MV: u32 = 4_200;

/// One advertising mode's timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvTiming {
    /// Interval in 0.625 ms units.
    pub interval: u32,
    /// Duration in 10 ms units, 0 = until stopped.
    pub duration: u16,
}

/// Runtime configuration handed to [`crate::Session`].
#[derive(Clone, Debug, PartialEq)]
pub struct StackConfig {
    pub fast: AdvTiming,
    pub slow: AdvTiming,
    /// Fall back to slow advertising when fast advertising times out.
    pub slow_after_fast: bool,
    /// Resume advertising automatically once the central disconnects.
    pub advertise_on_disconnect: bool,
    pub adv_tx_power_dbm: i8,
    pub preferred_conn_params: ConnParams,
    pub first_conn_params_update_delay_ms: u64,
    pub next_conn_params_update_delay_ms: u64,
    pub max_conn_params_update_count: u8,
    pub att_mtu: u16,
    pub rssi_threshold_dbm: u8,
    pub rssi_skip_count: u8,
    pub company_id: u16,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            fast: AdvTiming {
                interval: ADV_FAST_INTERVAL,
                duration: ADV_FAST_DURATION,
            },
            slow: AdvTiming {
                interval: ADV_SLOW_INTERVAL,
                duration: ADV_SLOW_DURATION,
            },
            slow_after_fast: true,
            advertise_on_disconnect: true,
            adv_tx_power_dbm: ADV_TX_POWER_DBM,
            preferred_conn_params: ConnParams {
                min_interval: MIN_CONN_INTERVAL,
                max_interval: MAX_CONN_INTERVAL,
                slave_latency: SLAVE_LATENCY,
                supervision_timeout: CONN_SUP_TIMEOUT,
            },
            first_conn_params_update_delay_ms: FIRST_CONN_PARAMS_UPDATE_DELAY_MS,
            next_conn_params_update_delay_ms: NEXT_CONN_PARAMS_UPDATE_DELAY_MS,
            max_conn_params_update_count: MAX_CONN_PARAMS_UPDATE_COUNT,
            att_mtu: ATT_MTU_MAX,
            rssi_threshold_dbm: RSSI_THRESHOLD_DBM,
            rssi_skip_count: RSSI_SKIP_COUNT,
            company_id: COMPANY_ID,
        }
    }
}
