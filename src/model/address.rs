// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Three-address parsing/encoding.

use std::{
    collections::VecDeque,
    fmt,
    sync::Mutex,
};

use once_cell::sync::Lazy;

use crate::{
    error::{RamsesError, Result},
    model::helpers::{dev_id_to_hex, hex_id_to_dec},
};

/// Device type of the null address sentinel (`--:------`).
pub const NULL_DEVICE_TYPE: u8 = 63;
/// Tag of the null address sentinel (field present but unused).
pub const NULL_TAG: u32 = u32::MAX; // never equals a real tag (max real tag is 262143)
/// Tag of the broadcast/unknown sentinel `63:262142`.
pub const BROADCAST_TAG: u32 = 262142;

/// A single RAMSES-II device address, `TT:NNNNNN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub device_type: u8,
    pub tag: u32,
}

impl Address {
    pub const NULL: Address = Address {
        device_type: NULL_DEVICE_TYPE,
        tag: NULL_TAG,
    };

    pub const BROADCAST: Address = Address {
        device_type: NULL_DEVICE_TYPE,
        tag: BROADCAST_TAG,
    };

    pub fn new(device_type: u8, tag: u32) -> Self {
        Address { device_type, tag }
    }

    pub fn is_null(&self) -> bool {
        *self == Address::NULL
    }

    /// True if this address is of type `01`, `02`, or `23` — the three
    /// controller-capable device types.
    pub fn is_controller_type(&self) -> bool {
        matches!(self.device_type, 1 | 2 | 23)
    }

    /// Parse a 9-character id, e.g. `"01:145038"` or `"--:------"`.
    pub fn parse(text: &str) -> Result<Address> {
        if text.len() != 9 || text.as_bytes()[2] != b':' {
            return Err(RamsesError::CorruptAddrSet(format!(
                "malformed address field: {text:?}"
            )));
        }
        if &text[3..] == "------" {
            return Ok(Address::NULL);
        }
        let device_type: u8 = text[..2]
            .parse()
            .map_err(|_| RamsesError::CorruptAddrSet(format!("bad device type in {text:?}")))?;
        let tag: u32 = text[3..]
            .parse()
            .map_err(|_| RamsesError::CorruptAddrSet(format!("bad tag in {text:?}")))?;
        Ok(Address::new(device_type, tag))
    }

    pub fn to_id_string(self) -> String {
        if self.is_null() {
            "--:------".to_string()
        } else {
            format!("{:02}:{:06}", self.device_type, self.tag)
        }
    }

    pub fn to_hex(self) -> String {
        if self.is_null() {
            "FFFFFE".to_string()
        } else {
            dev_id_to_hex(self.device_type, self.tag)
        }
    }

    pub fn from_hex(hex: &str) -> Result<Address> {
        if hex == "FFFFFE" {
            return Ok(Address::BROADCAST);
        }
        let (device_type, tag) = hex_id_to_dec(hex)?;
        Ok(Address::new(device_type, tag))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_id_string())
    }
}

/// Bounded (≤128 entries) cache of already-validated address strings, a
/// pure optimisation mirroring the source's `@lru_cache(maxsize=128)` on
/// `is_valid_dev_id`.
struct AddressCache {
    order: VecDeque<String>,
    entries: std::collections::HashMap<String, Address>,
}

const ADDRESS_CACHE_CAPACITY: usize = 128;

static ADDRESS_CACHE: Lazy<Mutex<AddressCache>> = Lazy::new(|| {
    Mutex::new(AddressCache {
        order: VecDeque::with_capacity(ADDRESS_CACHE_CAPACITY),
        entries: std::collections::HashMap::with_capacity(ADDRESS_CACHE_CAPACITY),
    })
});

/// Parse a single address, consulting (and populating) the bounded cache.
pub fn parse_cached(text: &str) -> Result<Address> {
    {
        let cache = ADDRESS_CACHE.lock().expect("address cache mutex poisoned");
        if let Some(addr) = cache.entries.get(text) {
            return Ok(*addr);
        }
    }
    let addr = Address::parse(text)?;
    let mut cache = ADDRESS_CACHE.lock().expect("address cache mutex poisoned");
    if cache.entries.len() >= ADDRESS_CACHE_CAPACITY
        && let Some(oldest) = cache.order.pop_front()
    {
        cache.entries.remove(&oldest);
    }
    cache.order.push_back(text.to_string());
    cache.entries.insert(text.to_string(), addr);
    Ok(addr)
}

/// The resolved `(src, dst)` pair for a frame, plus the raw three slots.
#[derive(Debug, Clone, Copy)]
pub struct AddressSet {
    pub src: Address,
    pub dst: Address,
    pub raw: [Address; 3],
}

/// Parse the 29-character three-address field and resolve `(src, dst)`.
pub fn parse_three_addr(text: &str) -> Result<AddressSet> {
    if text.len() != 29 {
        return Err(RamsesError::CorruptAddrSet(format!(
            "three-address field must be 29 chars, got {}",
            text.len()
        )));
    }
    let a0 = parse_cached(&text[0..9])?;
    let a1 = parse_cached(&text[10..19])?;
    let a2 = parse_cached(&text[20..29])?;
    let raw = [a0, a1, a2];

    let d0 = !a0.is_null();
    let d1 = !a1.is_null();
    let d2 = !a2.is_null();

    let (src, dst) = match (d0, d1, d2) {
        (true, false, true) => (a0, a2),
        (true, true, false) => (a0, a1),
        (false, true, true) => (a1, a2),
        (true, false, false) => (a0, Address::NULL),
        (false, false, true) => (a2, Address::NULL),
        (true, true, true) => (a0, a1),
        _ => {
            return Err(RamsesError::CorruptAddrSet(format!(
                "no device present in address set: {text:?}"
            )));
        }
    };

    Ok(AddressSet { src, dst, raw })
}

/// Inverse of [`parse_three_addr`]: render `(src, dst)` back into the
/// 29-character field, inserting nulls per the same table. A
/// self-announce (`src == dst`) puts the null in the middle slot
/// (`D - D`), matching the wire a real device emits; every other case
/// puts it last (`src dst -`).
pub fn encode_three_addr(src: Address, dst: Address) -> String {
    if src == dst {
        format!(
            "{} {} {}",
            src.to_id_string(),
            Address::NULL.to_id_string(),
            dst.to_id_string()
        )
    } else {
        format!(
            "{} {} {}",
            src.to_id_string(),
            dst.to_id_string(),
            Address::NULL.to_id_string()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_self_announce() {
        let set = parse_three_addr("01:145038 --:------ 01:145038").expect("parses");
        assert_eq!(set.src, Address::new(1, 145038));
        assert_eq!(set.dst, Address::new(1, 145038));
    }

    #[test]
    fn parse_src_dst() {
        let set = parse_three_addr("18:000730 01:222222 --:------").expect("parses");
        assert_eq!(set.src, Address::new(18, 730));
        assert_eq!(set.dst, Address::new(1, 222222));
    }

    #[test]
    fn parse_third_party() {
        let set = parse_three_addr("--:------ 01:222222 13:111111").expect("parses");
        assert_eq!(set.src, Address::new(1, 222222));
        assert_eq!(set.dst, Address::new(13, 111111));
    }

    #[test]
    fn parse_all_null_fails() {
        let err = parse_three_addr("--:------ --:------ --:------").unwrap_err();
        assert!(matches!(err, RamsesError::CorruptAddrSet(_)));
    }

    #[test]
    fn address_to_id_string_and_hex_roundtrip() {
        let addr = Address::new(1, 145038);
        assert_eq!(addr.to_id_string(), "01:145038");
        assert_eq!(Address::from_hex(&addr.to_hex()).expect("decode"), addr);
    }

    #[test]
    fn null_address_hex_is_sentinel() {
        assert_eq!(Address::NULL.to_hex(), "FFFFFE");
    }

    #[test]
    fn encode_self_announce_puts_null_in_the_middle_slot() {
        let addr = Address::new(3, 150994);
        assert_eq!(
            encode_three_addr(addr, addr),
            "03:150994 --:------ 03:150994"
        );
    }

    #[test]
    fn encode_src_dst_puts_null_last() {
        let src = Address::new(18, 730);
        let dst = Address::new(1, 222222);
        assert_eq!(
            encode_three_addr(src, dst),
            "18:000730 01:222222 --:------"
        );
    }
}
