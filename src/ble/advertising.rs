//! Advertising payload composer.
//!
//! The die advertises its live sensor snapshot so the companion app can
//! identify it before connecting. Two custom blocks carry it:
//!
//! ```text
//! ManufacturerData (5 bytes, inside the manufacturer-specific AD):
//!   Byte 0: LED count
//!   Byte 1: Design and color code
//!   Byte 2: Roll state
//!   Byte 3: Current face
//!   Byte 4: Battery level (0..=255)
//!
//! ServiceData (8 bytes, inside the 0x180A service data AD):
//!   Byte 0-3: Device id        (u32, little-endian)
//!   Byte 4-7: Build timestamp  (u32, little-endian)
//! ```
//!
//! Rendering always targets the unpublished half of a double buffer and
//! only then flips it, so the radio never sees a half-written payload.

use crate::ble::adv_builder::{
    AdBuilder, AdData, FLAG_BR_EDR_NOT_SUPPORTED, FLAG_LE_GENERAL_DISC_MODE,
};
use crate::board::{BatteryMonitor, Identity, RollReading, RollState};
use crate::config::{
    DEVICE_INFORMATION_SERVICE_UUID, GENERIC_DATA_SERVICE_UUID, MAX_DEVICE_NAME_LEN,
};
use crate::error::Error;
use heapless::String;

/// Manufacturer data block size in bytes.
pub const MANUFACTURER_DATA_SIZE: usize = 5;

/// Service data block size in bytes.
pub const SERVICE_DATA_SIZE: usize = 8;

/// Bytes the advertisement keeps free after the name:
/// 16-bit UUID list (2 + 2) and manufacturer data (2 + 2 + 5).
const ADV_TAIL_RESERVE: usize = 4 + 4 + MANUFACTURER_DATA_SIZE;

/// The sensor snapshot and identity mirrored into the payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisedState {
    pub led_count: u8,
    pub design_and_color: u8,
    pub roll_state: RollState,
    pub current_face: u8,
    pub battery_level: u8,
    pub device_id: u32,
    pub build_timestamp: u32,
}

impl AdvertisedState {
    pub fn manufacturer_data(&self) -> ManufacturerData {
        ManufacturerData {
            led_count: self.led_count,
            design_and_color: self.design_and_color,
            roll_state: self.roll_state,
            current_face: self.current_face,
            battery_level: self.battery_level,
        }
    }

    pub fn service_data(&self) -> ServiceData {
        ServiceData {
            device_id: self.device_id,
            build_timestamp: self.build_timestamp,
        }
    }
}

/// Custom manufacturer-specific block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ManufacturerData {
    pub led_count: u8,
    pub design_and_color: u8,
    pub roll_state: RollState,
    pub current_face: u8,
    pub battery_level: u8,
}

impl ManufacturerData {
    pub fn encode(&self) -> [u8; MANUFACTURER_DATA_SIZE] {
        [
            self.led_count,
            self.design_and_color,
            self.roll_state.code(),
            self.current_face,
            self.battery_level,
        ]
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < MANUFACTURER_DATA_SIZE {
            return None;
        }
        Some(Self {
            led_count: data[0],
            design_and_color: data[1],
            roll_state: RollState::from(data[2]),
            current_face: data[3],
            battery_level: data[4],
        })
    }
}

/// Custom service data block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceData {
    pub device_id: u32,
    pub build_timestamp: u32,
}

impl ServiceData {
    pub fn encode(&self) -> [u8; SERVICE_DATA_SIZE] {
        let mut out = [0u8; SERVICE_DATA_SIZE];
        out[0..4].copy_from_slice(&self.device_id.to_le_bytes());
        out[4..8].copy_from_slice(&self.build_timestamp.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < SERVICE_DATA_SIZE {
            return None;
        }
        Some(Self {
            device_id: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            build_timestamp: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        })
    }
}

/// Quantize a 0.0..=1.0 battery fraction to a byte.
pub fn quantize_battery(level: f32) -> u8 {
    // NaN saturates to 0
    (level.clamp(0.0, 1.0) * 255.0) as u8
}

/// A complete advertisement + scan response pair.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct AdvPayload {
    pub adv: AdData,
    pub scan_response: AdData,
}

/// Renders [`AdvertisedState`] into the two advertising payloads.
pub struct PayloadComposer {
    state: AdvertisedState,
    name: String<MAX_DEVICE_NAME_LEN>,
    company_id: u16,
    buffers: [AdvPayload; 2],
    published: usize,
}

impl PayloadComposer {
    pub fn new(company_id: u16) -> Self {
        Self {
            state: AdvertisedState::default(),
            name: String::new(),
            company_id,
            buffers: [AdvPayload::default(), AdvPayload::default()],
            published: 0,
        }
    }

    /// Load the static identity and a fresh battery reading, reset the
    /// dynamic fields, and render.
    pub fn build_initial<B: Identity + BatteryMonitor>(&mut self, board: &B) -> Result<(), Error> {
        self.name.clear();
        for c in board.device_name().chars() {
            if self.name.push(c).is_err() {
                break;
            }
        }
        self.state = AdvertisedState {
            led_count: board.led_count(),
            design_and_color: board.design_and_color(),
            roll_state: RollState::Unknown,
            current_face: 0,
            battery_level: quantize_battery(board.current_level()),
            device_id: board.device_id(),
            build_timestamp: board.build_timestamp(),
        };
        self.render()
    }

    pub fn apply_roll_change(&mut self, reading: RollReading) -> Result<(), Error> {
        self.state.roll_state = reading.state;
        self.state.current_face = reading.face;
        self.render()
    }

    /// Take a full live sample (roll state, face and battery) and render once.
    pub fn refresh(&mut self, reading: RollReading, level: f32) -> Result<(), Error> {
        self.state.roll_state = reading.state;
        self.state.current_face = reading.face;
        self.state.battery_level = quantize_battery(level);
        self.render()
    }

    pub fn apply_battery_change(&mut self, level: f32) -> Result<(), Error> {
        self.state.battery_level = quantize_battery(level);
        self.render()
    }

    /// Encode both payloads into the staging buffer and publish it.
    ///
    /// On error the previously published payload stays in place.
    pub fn render(&mut self) -> Result<(), Error> {
        let staging = 1 - self.published;

        let mut adv = AdBuilder::new();
        adv.flags(FLAG_LE_GENERAL_DISC_MODE | FLAG_BR_EDR_NOT_SUPPORTED)?;
        adv.local_name(&self.name, ADV_TAIL_RESERVE)?;
        adv.complete_uuids16(&[DEVICE_INFORMATION_SERVICE_UUID])?;
        adv.manufacturer_data(self.company_id, &self.state.manufacturer_data().encode())?;

        let mut scan = AdBuilder::new();
        scan.complete_uuids128(&[GENERIC_DATA_SERVICE_UUID])?;
        scan.service_data16(
            DEVICE_INFORMATION_SERVICE_UUID,
            &self.state.service_data().encode(),
        )?;

        self.buffers[staging] = AdvPayload {
            adv: adv.finish(),
            scan_response: scan.finish(),
        };
        self.published = staging;
        Ok(())
    }

    pub fn state(&self) -> &AdvertisedState {
        &self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The last fully rendered payload.
    pub fn published(&self) -> &AdvPayload {
        &self.buffers[self.published]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::adv_builder::{ad_type, find_ad};

    struct FakeBoard {
        name: &'static str,
        level: f32,
    }

    impl Identity for FakeBoard {
        fn device_name(&self) -> &str {
            self.name
        }
        fn design_and_color(&self) -> u8 {
            3
        }
        fn led_count(&self) -> u8 {
            21
        }
        fn device_id(&self) -> u32 {
            0xDEAD_BEEF
        }
        fn build_timestamp(&self) -> u32 {
            0x5F5E_1000
        }
    }

    impl BatteryMonitor for FakeBoard {
        fn current_level(&self) -> f32 {
            self.level
        }
        fn hook_level(&mut self) {}
        fn unhook_level(&mut self) {}
    }

    fn composer() -> PayloadComposer {
        let mut c = PayloadComposer::new(0xFFFF);
        c.build_initial(&FakeBoard {
            name: "Dice",
            level: 1.0,
        })
        .unwrap();
        c
    }

    fn manufacturer_block(payload: &AdvPayload) -> &[u8] {
        // skip the 2-byte company id
        &find_ad(&payload.adv, ad_type::MANUFACTURER_SPECIFIC_DATA).unwrap()[2..]
    }

    fn service_block(payload: &AdvPayload) -> &[u8] {
        &find_ad(&payload.scan_response, ad_type::SERVICE_DATA_16BIT).unwrap()[2..]
    }

    #[test]
    fn manufacturer_data_byte_layout() {
        let data = ManufacturerData {
            led_count: 21,
            design_and_color: 3,
            roll_state: RollState::Rolling,
            current_face: 5,
            battery_level: 128,
        };
        assert_eq!(data.encode(), [0x15, 0x03, 0x03, 0x05, 0x80]);
    }

    #[test]
    fn service_data_is_little_endian() {
        let data = ServiceData {
            device_id: 0xDEAD_BEEF,
            build_timestamp: 0x5F5E_1000,
        };
        assert_eq!(
            data.encode(),
            [0xEF, 0xBE, 0xAD, 0xDE, 0x00, 0x10, 0x5E, 0x5F]
        );
    }

    #[test]
    fn decode_rejects_short_blocks() {
        assert!(ManufacturerData::decode(&[1, 2, 3, 4]).is_none());
        assert!(ServiceData::decode(&[0; 7]).is_none());
    }

    #[test]
    fn initial_build_reads_identity_and_battery() {
        let c = composer();
        let state = c.state();
        assert_eq!(state.led_count, 21);
        assert_eq!(state.design_and_color, 3);
        assert_eq!(state.roll_state, RollState::Unknown);
        assert_eq!(state.current_face, 0);
        assert_eq!(state.battery_level, 255);
        assert_eq!(state.device_id, 0xDEAD_BEEF);
        assert_eq!(c.name(), "Dice");
    }

    #[test]
    fn render_matches_documented_bytes() {
        let mut c = composer();
        c.apply_roll_change(RollReading {
            state: RollState::Rolling,
            face: 5,
        })
        .unwrap();
        c.state.battery_level = 128;
        c.render().unwrap();

        let payload = c.published();
        assert_eq!(manufacturer_block(payload), &[0x15, 0x03, 0x03, 0x05, 0x80]);
        assert_eq!(
            service_block(payload),
            &[0xEF, 0xBE, 0xAD, 0xDE, 0x00, 0x10, 0x5E, 0x5F]
        );
    }

    #[test]
    fn render_is_deterministic() {
        let mut c = composer();
        c.render().unwrap();
        let first = c.published().clone();
        c.render().unwrap();
        assert_eq!(c.published(), &first);
    }

    #[test]
    fn advertisement_carries_name_and_uuid() {
        let c = composer();
        let adv = &c.published().adv;
        assert_eq!(find_ad(adv, ad_type::COMPLETE_LOCAL_NAME), Some(&b"Dice"[..]));
        assert_eq!(
            find_ad(adv, ad_type::COMPLETE_16BIT_UUIDS),
            Some(&[0x0A, 0x18][..])
        );
        assert_eq!(find_ad(adv, ad_type::FLAGS), Some(&[0x06][..]));
        assert!(adv.len() <= 31);
    }

    #[test]
    fn scan_response_carries_data_service_uuid() {
        let c = composer();
        let scan = &c.published().scan_response;
        assert_eq!(
            find_ad(scan, ad_type::COMPLETE_128BIT_UUIDS),
            Some(&GENERIC_DATA_SERVICE_UUID[..])
        );
        assert_eq!(scan.len(), 30);
    }

    #[test]
    fn battery_change_is_quantized() {
        let mut c = composer();
        c.apply_battery_change(0.5).unwrap();
        assert_eq!(c.state().battery_level, 127);
        assert_eq!(manufacturer_block(c.published())[4], 127);
    }

    #[test]
    fn quantize_battery_saturates() {
        assert_eq!(quantize_battery(0.0), 0);
        assert_eq!(quantize_battery(1.0), 255);
        assert_eq!(quantize_battery(1.7), 255);
        assert_eq!(quantize_battery(-0.2), 0);
        assert_eq!(quantize_battery(f32::NAN), 0);
    }

    #[test]
    fn long_name_is_truncated_to_settings_capacity() {
        let mut c = PayloadComposer::new(0xFFFF);
        c.build_initial(&FakeBoard {
            name: "AVeryLongDieName",
            level: 0.0,
        })
        .unwrap();
        assert_eq!(c.name(), "AVeryLongD");
        assert_eq!(
            find_ad(&c.published().adv, ad_type::COMPLETE_LOCAL_NAME),
            Some(&b"AVeryLongD"[..])
        );
    }

    #[test]
    fn render_flips_published_buffer() {
        let mut c = composer();
        let before = c.published;
        c.render().unwrap();
        assert_ne!(c.published, before);
    }
}
