//! Interfaces to the collaborators around the BLE core.
//!
//! The accelerometer, battery gauge, settings store and power manager are
//! developed separately; the session only sees them through these traits.
//! Sensor producers are "hooked" while the die advertises: a hooked
//! producer reports every change through
//! [`Session::on_roll_state_changed`](crate::Session::on_roll_state_changed)
//! or [`Session::on_battery_level_changed`](crate::Session::on_battery_level_changed).

/// Motion state reported by the accelerometer face detector.
///
/// The discriminants are the byte carried in the manufacturer data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RollState {
    #[default]
    Unknown = 0,
    OnFace = 1,
    Handling = 2,
    Rolling = 3,
    Crooked = 4,
}

impl RollState {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl From<u8> for RollState {
    fn from(code: u8) -> Self {
        match code {
            1 => RollState::OnFace,
            2 => RollState::Handling,
            3 => RollState::Rolling,
            4 => RollState::Crooked,
            _ => RollState::Unknown,
        }
    }
}

/// A roll-state sample: motion state plus the face currently up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RollReading {
    pub state: RollState,
    pub face: u8,
}

/// Accelerometer-side roll-state provider.
pub trait RollSensor {
    /// Read the current state synchronously.
    fn current_roll(&self) -> RollReading;

    /// Start reporting roll-state changes to the session.
    fn hook_roll_state(&mut self);

    /// Stop reporting roll-state changes.
    fn unhook_roll_state(&mut self);
}

/// Battery gauge. Levels are fractions in `0.0..=1.0`.
pub trait BatteryMonitor {
    fn current_level(&self) -> f32;

    fn hook_level(&mut self);

    fn unhook_level(&mut self);
}

/// Linear charge estimate of a LiPo cell, in `0.0..=1.0`.
pub fn battery_level_from_millivolts(mv: u32) -> f32 {
    use crate::config::{BATTERY_EMPTY_MV, BATTERY_FULL_MV};

    let span = (BATTERY_FULL_MV - BATTERY_EMPTY_MV) as f32;
    let above = mv.clamp(BATTERY_EMPTY_MV, BATTERY_FULL_MV) - BATTERY_EMPTY_MV;
    above as f32 / span
}

/// Board configuration, settings store and device identity.
pub trait Identity {
    /// Advertised device name (at most [`MAX_DEVICE_NAME_LEN`](crate::config::MAX_DEVICE_NAME_LEN) bytes are used).
    fn device_name(&self) -> &str;

    /// Physical design / color code.
    fn design_and_color(&self) -> u8;

    fn led_count(&self) -> u8;

    /// Factory-programmed 32-bit device identifier.
    fn device_id(&self) -> u32;

    /// Firmware build time, seconds since the Unix epoch.
    fn build_timestamp(&self) -> u32;
}

/// Power management hooks.
pub trait SystemControl {
    /// Full device reset. Does not return on hardware.
    fn reset(&mut self);

    /// Feed the power-manager watchdog; called on every radio event and send.
    fn feed_watchdog(&mut self) {}
}

/// Everything the session needs from the board, in one bound.
pub trait Board: RollSensor + BatteryMonitor + Identity + SystemControl {}

impl<T: RollSensor + BatteryMonitor + Identity + SystemControl> Board for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roll_state_from_unknown_code() {
        assert_eq!(RollState::from(0xFF), RollState::Unknown);
        assert_eq!(RollState::from(3), RollState::Rolling);
    }

    #[test]
    fn battery_level_is_linear_between_limits() {
        assert_eq!(battery_level_from_millivolts(3_000), 0.0);
        assert_eq!(battery_level_from_millivolts(3_600), 0.5);
        assert_eq!(battery_level_from_millivolts(4_200), 1.0);
    }

    #[test]
    fn battery_level_saturates_outside_limits() {
        assert_eq!(battery_level_from_millivolts(0), 0.0);
        assert_eq!(battery_level_from_millivolts(5_000), 1.0);
    }

    #[test]
    fn roll_state_code_roundtrip() {
        for state in [
            RollState::Unknown,
            RollState::OnFace,
            RollState::Handling,
            RollState::Rolling,
            RollState::Crooked,
        ] {
            assert_eq!(RollState::from(state.code()), state);
        }
    }
}
