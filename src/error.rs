//! Unified error type for dice-ble.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

/// Raw status code returned by a radio stack call (`NRF_ERROR_*` on the
/// SoftDevice).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawError(pub u32);

impl RawError {
    /// `NRF_ERROR_INVALID_STATE`.
    pub const INVALID_STATE: Self = Self(0x08);
    /// `NRF_ERROR_RESOURCES` - e.g. the notification queue is full.
    pub const RESOURCES: Self = Self(0x13);
    /// `BLE_ERROR_INVALID_CONN_HANDLE` - the peer is already gone.
    pub const INVALID_CONN_HANDLE: Self = Self(0x3002);
}

/// Top-level error type used across the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The radio stack refused a call.
    Stack(RawError),

    /// The session has not been initialised yet.
    NotInitialized,

    /// The operation does not apply in the current link state
    /// (e.g. advertising while a central is connected).
    InvalidState,

    /// An advertising structure does not fit the legacy 31-byte payload.
    PayloadOverflow,
}

// Convenience conversions

impl From<RawError> for Error {
    fn from(e: RawError) -> Self {
        Error::Stack(e)
    }
}
