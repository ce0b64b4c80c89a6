//! Board collaborators on the nRF52840.
//!
//! Sensor readings land in the atomics below through [`publish_roll`]
//! (fed from [`ROLL_CHANGED`](super::ROLL_CHANGED) by the roll task) and
//! [`publish_battery`] (fed by the battery task).  While the session has
//! a producer hooked, the publish call also forwards the change into the
//! session.

use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};

use dice_ble::board::{
    BatteryMonitor, Identity, RollReading, RollSensor, RollState, SystemControl,
};

use super::with_session;

static ROLL_STATE: AtomicU8 = AtomicU8::new(0);
static FACE: AtomicU8 = AtomicU8::new(0);
/// Battery level in 1/1000ths.
static BATTERY_PERMILLE: AtomicU16 = AtomicU16::new(1000);

static ROLL_HOOKED: AtomicBool = AtomicBool::new(false);
static BATTERY_HOOKED: AtomicBool = AtomicBool::new(false);

/// SAADC full scale with the default gain (1/6) and 0.6 V reference.
const ADC_FULL_SCALE_MV: u32 = 3_600;
const ADC_COUNTS: u32 = 4_096;

/// Battery sense divider (10M over 4M), as a ratio in tenths.
const VBAT_DIVIDER_X10: u32 = 14;

/// Cell voltage from a 12-bit single-ended sample of the sense divider.
pub fn vbat_millivolts(raw: i16) -> u32 {
    let raw = raw.max(0) as u32;
    raw * ADC_FULL_SCALE_MV * VBAT_DIVIDER_X10 / (ADC_COUNTS * 10)
}

pub fn publish_roll(reading: RollReading) {
    ROLL_STATE.store(reading.state.code(), Ordering::Relaxed);
    FACE.store(reading.face, Ordering::Relaxed);
    if ROLL_HOOKED.load(Ordering::Relaxed) {
        with_session(|s| s.on_roll_state_changed(reading));
    }
}

/// `level` in `0.0..=1.0`.
pub fn publish_battery(level: f32) {
    let permille = (level.clamp(0.0, 1.0) * 1000.0) as u16;
    BATTERY_PERMILLE.store(permille, Ordering::Relaxed);
    if BATTERY_HOOKED.load(Ordering::Relaxed) {
        with_session(|s| s.on_battery_level_changed(level));
    }
}

/// Factory settings of this die.
pub struct DieBoard {
    name: &'static str,
    design_and_color: u8,
    led_count: u8,
    device_id: u32,
}

impl DieBoard {
    pub fn new(name: &'static str, design_and_color: u8, led_count: u8) -> Self {
        Self {
            name,
            design_and_color,
            led_count,
            device_id: embassy_nrf::pac::FICR.deviceid(0).read(),
        }
    }
}

impl RollSensor for DieBoard {
    fn current_roll(&self) -> RollReading {
        RollReading {
            state: RollState::from(ROLL_STATE.load(Ordering::Relaxed)),
            face: FACE.load(Ordering::Relaxed),
        }
    }

    fn hook_roll_state(&mut self) {
        ROLL_HOOKED.store(true, Ordering::Relaxed);
    }

    fn unhook_roll_state(&mut self) {
        ROLL_HOOKED.store(false, Ordering::Relaxed);
    }
}

impl BatteryMonitor for DieBoard {
    fn current_level(&self) -> f32 {
        BATTERY_PERMILLE.load(Ordering::Relaxed) as f32 / 1000.0
    }

    fn hook_level(&mut self) {
        BATTERY_HOOKED.store(true, Ordering::Relaxed);
    }

    fn unhook_level(&mut self) {
        BATTERY_HOOKED.store(false, Ordering::Relaxed);
    }
}

impl Identity for DieBoard {
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
        env!("BUILD_TIMESTAMP").parse().unwrap_or(0)
    }
}

impl SystemControl for DieBoard {
    fn reset(&mut self) {
        cortex_m::peripheral::SCB::sys_reset();
    }
}
