//! Host-testable core of the dice BLE firmware.
//!
//! Everything in this library is pure logic: the event registry, the
//! advertising payload composer, the flow-controlled notification channel
//! and the connection/advertising state machine.  The radio stack and the
//! sensor/settings collaborators are reached through the traits in
//! [`ble::radio`] and [`board`], so the whole core runs on the host.
//!
//! Usage: `cargo test --lib` / `cargo test`
//!
//! Note: The embedded binary uses main.rs with #![no_std] and #![no_main]
//! and links this library against the Nordic SoftDevice S140.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod ble;
pub mod board;
pub mod config;
pub mod error;

pub use ble::session::Session;
pub use error::{Error, RawError};

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::board::RollState;
    use super::config;

    #[test]
    fn advertising_payloads_fit_legacy_limit() {
        // flags + longest name + 16-bit uuid list + manufacturer block
        let adv = 3 + (2 + config::MAX_DEVICE_NAME_LEN) + 4 + (2 + 2 + 5);
        assert!(adv <= config::LEGACY_ADV_DATA_LEN);

        // 128-bit uuid list + service data block
        let scan_rsp = (2 + 16) + (2 + 2 + 8);
        assert!(scan_rsp <= config::LEGACY_ADV_DATA_LEN);
    }

    #[test]
    fn roll_state_codes_are_stable() {
        assert_eq!(RollState::Unknown.code(), 0);
        assert_eq!(RollState::OnFace.code(), 1);
        assert_eq!(RollState::Handling.code(), 2);
        assert_eq!(RollState::Rolling.code(), 3);
        assert_eq!(RollState::Crooked.code(), 4);
    }

    fn newest_mtime(dir: &std::path::Path) -> u64 {
        let mut newest = 0;
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let secs = if path.is_dir() {
                newest_mtime(&path)
            } else {
                std::fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .unwrap()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap()
                    .as_secs()
            };
            newest = newest.max(secs);
        }
        newest
    }

    #[test]
    fn build_timestamp_is_not_older_than_sources() {
        let stamp: u64 = env!("BUILD_TIMESTAMP").parse().unwrap();
        let src = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
        assert!(stamp > 0);
        assert!(stamp >= newest_mtime(&src));
    }

    #[test]
    fn default_preferred_params_are_self_consistent() {
        let p = config::StackConfig::default().preferred_conn_params;
        assert!(p.min_interval <= p.max_interval);
        assert!(p.is_acceptable(&p));
    }
}
