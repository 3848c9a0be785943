// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Bit-level payload codecs shared by several opcode payloads: the packed
//! datetime field, the fixed-point temperature field, and the device-id
//! hex packing used by [`crate::model::address`].
//!
//! None of these participate in frame parsing or FSM/store decisions; they
//! are helpers that payload-specific parsers (out of scope for this core)
//! would call into.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{RamsesError, UnknownDeviceType};

/// Sentinel hex for "no datetime present".
pub const DTS_NULL_HEX: &str = "00000000007F";

/// Decode the 12-hex-char (48-bit) packed datetime field:
/// `second(7)|minute(6)|hour(5)|DoW(3, discarded)|day(5)|month(4)|year(7)`,
/// MSB-first.
pub fn datetime_from_hex(value: &str) -> crate::error::Result<Option<NaiveDateTime>> {
    if value == DTS_NULL_HEX {
        return Ok(None);
    }
    if value.len() != 12 {
        return Err(RamsesError::InvalidFrameGrammar(format!(
            "datetime field must be 12 hex chars, got {}",
            value.len()
        )));
    }
    let v = u64::from_str_radix(value, 16)
        .map_err(|e| RamsesError::InvalidFrameGrammar(format!("bad datetime hex: {e}")))?;

    let year = ((v & (0b111_1111 << 24)) >> 24) as i32 + 2000;
    let month = ((v & (0b1111 << 36)) >> 36) as u32;
    let day = ((v & (0b1_1111 << 31)) >> 31) as u32;
    let hour = ((v & (0b1_1111 << 19)) >> 19) as u32;
    let minute = ((v & (0b11_1111 << 13)) >> 13) as u32;
    let second = ((v & (0b11_1111 << 7)) >> 7) as u32;

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        RamsesError::InvalidFrameGrammar(format!("invalid date {year}-{month}-{day}"))
    })?;
    let dt = date
        .and_hms_opt(hour, minute, second)
        .ok_or_else(|| RamsesError::InvalidFrameGrammar("invalid time of day".into()))?;
    Ok(Some(dt))
}

/// Encode a [`NaiveDateTime`] into the packed 12-hex-char datetime field.
/// `None` encodes as the null sentinel.
pub fn datetime_to_hex(dtm: Option<NaiveDateTime>) -> String {
    use chrono::{Datelike, Timelike};

    let Some(dtm) = dtm else {
        return DTS_NULL_HEX.to_string();
    };
    let year = (dtm.year() % 100) as u64;
    let v = (year << 24)
        | ((dtm.month() as u64) << 36)
        | ((dtm.day() as u64) << 31)
        | ((dtm.hour() as u64) << 19)
        | ((dtm.minute() as u64) << 13)
        | ((dtm.second() as u64) << 7);
    format!("{v:012X}")
}

/// Signed hundredths-of-a-degree temperature field. `0x7FFF` is "no
/// reading" (sensor fault/absent); `0x7EFF` is "not present".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Temperature {
    Value(f32),
    Absent,
    NotPresent,
}

pub fn temp_from_hex(value: &str) -> crate::error::Result<Temperature> {
    let raw = u16::from_str_radix(value, 16)
        .map_err(|e| RamsesError::InvalidFrameGrammar(format!("bad temp hex: {e}")))?;
    match raw {
        0x7FFF => Ok(Temperature::Absent),
        0x7EFF => Ok(Temperature::NotPresent),
        _ => {
            let signed = raw as i16;
            Ok(Temperature::Value(f32::from(signed) / 100.0))
        }
    }
}

pub fn temp_to_hex(value: Temperature) -> String {
    match value {
        Temperature::Absent => "7FFF".to_string(),
        Temperature::NotPresent => "7EFF".to_string(),
        Temperature::Value(v) => {
            let raw = (v * 100.0).round() as i32;
            format!("{:04X}", raw as u16)
        }
    }
}

/// Pack `(device_type << 18) | tag` into 24 bits, rendered as 6 uppercase
/// hex chars. `device_type` is the 2-digit decimal code (e.g. 18 = HGI).
pub fn dev_id_to_hex(device_type: u8, tag: u32) -> String {
    let packed = ((device_type as u32) << 18) + tag;
    format!("{packed:06X}")
}

/// Inverse of [`dev_id_to_hex`]. `"FFFFFE"` is the null/broadcast sentinel
/// and decodes to device type 63, tag 262142.
pub fn hex_id_to_dec(hex: &str) -> crate::error::Result<(u8, u32)> {
    let packed = u32::from_str_radix(hex, 16)
        .map_err(|e| RamsesError::InvalidFrameGrammar(format!("bad address hex: {e}")))?;
    let device_type = ((packed & 0xFC_0000) >> 18) as u8;
    let tag = packed & 0x03_FFFF;
    if device_type > 63 {
        return Err(UnknownDeviceType(device_type).into());
    }
    Ok((device_type, tag))
}
