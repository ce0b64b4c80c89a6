//! Legacy advertising data (AD structure) encoding.
//!
//! Each AD structure is `[len][type][payload...]` where `len` counts the
//! type byte plus the payload.  A legacy advertisement or scan response
//! holds at most 31 bytes of them.

use crate::config::LEGACY_ADV_DATA_LEN;
use crate::error::Error;
use heapless::Vec;

/// AD type codes (Bluetooth Assigned Numbers, "Common Data Types").
pub mod ad_type {
    pub const FLAGS: u8 = 0x01;
    pub const COMPLETE_16BIT_UUIDS: u8 = 0x03;
    pub const COMPLETE_128BIT_UUIDS: u8 = 0x07;
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    pub const SERVICE_DATA_16BIT: u8 = 0x16;
    pub const MANUFACTURER_SPECIFIC_DATA: u8 = 0xFF;
}

/// LE General Discoverable Mode.
pub const FLAG_LE_GENERAL_DISC_MODE: u8 = 0x02;
/// BR/EDR Not Supported.
pub const FLAG_BR_EDR_NOT_SUPPORTED: u8 = 0x04;

/// One encoded advertising payload.
pub type AdData = Vec<u8, LEGACY_ADV_DATA_LEN>;

/// Appends AD structures into a 31-byte payload.
#[derive(Default)]
pub struct AdBuilder {
    buf: AdData,
}

impl AdBuilder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Bytes still free in the payload.
    pub fn remaining(&self) -> usize {
        LEGACY_ADV_DATA_LEN - self.buf.len()
    }

    /// Append one AD structure built from several payload pieces.
    fn push_parts(&mut self, ad_type: u8, parts: &[&[u8]]) -> Result<(), Error> {
        let payload_len: usize = parts.iter().map(|p| p.len()).sum();
        if payload_len + 2 > self.remaining() {
            return Err(Error::PayloadOverflow);
        }
        // Capacity was checked above; the pushes below cannot fail.
        let _ = self.buf.push(payload_len as u8 + 1);
        let _ = self.buf.push(ad_type);
        for part in parts {
            let _ = self.buf.extend_from_slice(part);
        }
        Ok(())
    }

    pub fn push(&mut self, ad_type: u8, payload: &[u8]) -> Result<(), Error> {
        self.push_parts(ad_type, &[payload])
    }

    pub fn flags(&mut self, flags: u8) -> Result<(), Error> {
        self.push(ad_type::FLAGS, &[flags])
    }

    /// Local name, complete if it fits while keeping `reserve` bytes free
    /// for the structures that follow, shortened otherwise.
    pub fn local_name(&mut self, name: &str, reserve: usize) -> Result<(), Error> {
        let room = self
            .remaining()
            .checked_sub(reserve + 2)
            .ok_or(Error::PayloadOverflow)?;
        if name.len() <= room {
            return self.push(ad_type::COMPLETE_LOCAL_NAME, name.as_bytes());
        }
        if room == 0 {
            return Err(Error::PayloadOverflow);
        }
        let mut cut = room;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        self.push(ad_type::SHORTENED_LOCAL_NAME, &name.as_bytes()[..cut])
    }

    pub fn complete_uuids16(&mut self, uuids: &[u16]) -> Result<(), Error> {
        let mut raw: Vec<u8, LEGACY_ADV_DATA_LEN> = Vec::new();
        for uuid in uuids {
            raw.extend_from_slice(&uuid.to_le_bytes())
                .map_err(|_| Error::PayloadOverflow)?;
        }
        self.push(ad_type::COMPLETE_16BIT_UUIDS, &raw)
    }

    /// 128-bit UUIDs, already in over-the-air (little-endian) byte order.
    pub fn complete_uuids128(&mut self, uuids: &[[u8; 16]]) -> Result<(), Error> {
        let mut raw: Vec<u8, LEGACY_ADV_DATA_LEN> = Vec::new();
        for uuid in uuids {
            raw.extend_from_slice(uuid)
                .map_err(|_| Error::PayloadOverflow)?;
        }
        self.push(ad_type::COMPLETE_128BIT_UUIDS, &raw)
    }

    pub fn manufacturer_data(&mut self, company_id: u16, data: &[u8]) -> Result<(), Error> {
        self.push_parts(
            ad_type::MANUFACTURER_SPECIFIC_DATA,
            &[&company_id.to_le_bytes(), data],
        )
    }

    pub fn service_data16(&mut self, uuid: u16, data: &[u8]) -> Result<(), Error> {
        self.push_parts(ad_type::SERVICE_DATA_16BIT, &[&uuid.to_le_bytes(), data])
    }

    pub fn finish(self) -> AdData {
        self.buf
    }
}

/// Payload of the first AD structure of `ad_type` in `data`.
///
/// Stops at the first malformed length, like a scanner would.
pub fn find_ad(data: &[u8], ad_type: u8) -> Option<&[u8]> {
    let mut i = 0;
    while i < data.len() {
        let len = data[i] as usize;
        if len == 0 || i + len >= data.len() {
            break;
        }
        if data[i + 1] == ad_type {
            return Some(&data[i + 2..i + 1 + len]);
        }
        i += len + 1;
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
