// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! ASCII-hex frame grammar: parsing and serialisation.

use std::fmt;

use once_cell::sync::OnceCell;

use crate::{
    error::{RamsesError, Result},
    model::address::{Address, parse_three_addr},
};

/// Protocol verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    I,
    RQ,
    RP,
    W,
}

impl Verb {
    pub fn as_wire_str(self) -> &'static str {
        match self {
            Verb::I => " I",
            Verb::RQ => "RQ",
            Verb::RP => "RP",
            Verb::W => " W",
        }
    }

    pub fn parse(text: &str) -> Result<Verb> {
        match text.trim() {
            "I" => Ok(Verb::I),
            "RQ" => Ok(Verb::RQ),
            "RP" => Ok(Verb::RP),
            "W" => Ok(Verb::W),
            other => Err(RamsesError::InvalidFrameGrammar(format!(
                "unknown verb: {other:?}"
            ))),
        }
    }

    /// Flip `RQ`→`RP`, `W`→`I` — used when deriving the expected reply
    /// header.
    pub fn flip_for_rx(self) -> Option<Verb> {
        match self {
            Verb::RQ => Some(Verb::RP),
            Verb::W => Some(Verb::I),
            Verb::I | Verb::RP => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire_str())
    }
}

/// An immutable, fully-parsed RAMSES-II line.
///
/// Derived fields (`has_array`, `has_ctl`, `idx`, `ctx`, `hdr`) are
/// computed lazily by [`crate::model::context`] and cached here with
/// `OnceCell`, matching the source's `functools.cached_property` style of
/// lazy, idempotent derivation.
#[derive(Debug, Clone)]
pub struct Frame {
    pub dtm: chrono::NaiveDateTime,
    pub rssi: String,
    pub verb: Verb,
    pub seq: String,
    pub src: Address,
    pub dst: Address,
    pub addrs: [Address; 3],
    pub opcode: u16,
    pub len: usize,
    pub payload: String,
    pub trailer: Option<String>,

    pub(crate) has_array: OnceCell<bool>,
    pub(crate) has_ctl: OnceCell<bool>,
    pub(crate) idx: OnceCell<Option<String>>,
    pub(crate) ctx: OnceCell<Option<String>>,
}

/// `rssi == "000"` marks an echo of our own transmission.
pub const ECHO_RSSI: &str = "000";

impl Frame {
    pub fn is_echo(&self) -> bool {
        self.rssi == ECHO_RSSI
    }

    /// Split off a trailing ` * err`, ` # comment`, or ` < hint` suffix,
    /// returning the cleaned core line and the (optionally) captured
    /// trailer text.
    fn partition(line: &str) -> (&str, Option<String>) {
        for marker in ['<', '*', '#'] {
            if let Some(pos) = line.find(marker) {
                let (core, trailer) = line.split_at(pos);
                return (core.trim_end(), Some(trailer.trim().to_string()));
            }
        }
        (line.trim_end(), None)
    }

    /// Parse one raw line into a [`Frame`]. `dtm` is the capture
    /// timestamp supplied by the caller (the transport or the replay
    /// log), not taken from the line itself.
    pub fn parse(line: &str, dtm: chrono::NaiveDateTime) -> Result<Frame> {
        let (core, trailer) = Self::partition(line.trim());
        let fields: Vec<&str> = core.split_whitespace().collect();

        // rssi verb seq a0 a1 a2 opcode len payload == 9 whitespace-separated tokens
        // once the addr block (29 chars incl. internal spaces) is re-joined.
        if fields.len() < 8 {
            return Err(RamsesError::InvalidFrameGrammar(format!(
                "too few fields in line: {line:?}"
            )));
        }

        let rssi = fields[0].to_string();
        let verb = Verb::parse(fields[1])?;
        let seq = fields[2].to_string();
        let addrs_text = format!("{} {} {}", fields[3], fields[4], fields[5]);
        let addr_set = parse_three_addr(&addrs_text)?;

        let opcode = u16::from_str_radix(fields[6], 16).map_err(|e| {
            RamsesError::InvalidFrameGrammar(format!("bad opcode {:?}: {e}", fields[6]))
        })?;
        let len: usize = fields[7]
            .parse()
            .map_err(|_| RamsesError::InvalidFrameGrammar(format!("bad len: {:?}", fields[7])))?;
        let payload = fields.get(8).copied().unwrap_or("").to_string();

        if len * 2 != payload.len() {
            return Err(RamsesError::InvalidFrameLength {
                declared: len,
                actual: payload.len(),
            });
        }

        Ok(Frame {
            dtm,
            rssi,
            verb,
            seq,
            src: addr_set.src,
            dst: addr_set.dst,
            addrs: addr_set.raw,
            opcode,
            len,
            payload,
            trailer,
            has_array: OnceCell::new(),
            has_ctl: OnceCell::new(),
            idx: OnceCell::new(),
            ctx: OnceCell::new(),
        })
    }

    /// Render the fixed-width wire form (without trailer).
    ///
    /// Uses the original three address slots (not a re-derivation from
    /// `src`/`dst`) so that `encode(parse(F)) == F` holds byte-for-byte
    /// even for address patterns (e.g. self-announce `D - D`) whose
    /// `(src, dst)` resolution does not preserve slot order.
    pub fn to_wire(&self) -> String {
        format!(
            "{:>3} {} {:>3} {} {} {} {:04X} {:03} {}",
            self.rssi,
            self.verb,
            self.seq,
            self.addrs[0].to_id_string(),
            self.addrs[1].to_id_string(),
            self.addrs[2].to_id_string(),
            self.opcode,
            self.len,
            self.payload.to_uppercase(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dtm() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2023, 1, 1)
            .expect("date")
            .and_hms_opt(0, 0, 0)
            .expect("time")
    }

    #[test]
    fn parse_sample_frame() {
        let line = "085  I --- 01:145038 --:------ 01:145038 1F09 003 0005C8";
        let f = Frame::parse(line, dtm()).expect("parses");
        assert_eq!(f.rssi, "085");
        assert_eq!(f.verb, Verb::I);
        assert_eq!(f.opcode, 0x1F09);
        assert_eq!(f.len, 3);
        assert_eq!(f.payload, "0005C8");
        assert!(!f.is_echo());
    }

    #[test]
    fn roundtrip_byte_equal() {
        let line = "085  I --- 01:145038 --:------ 01:145038 1F09 003 0005C8";
        let f = Frame::parse(line, dtm()).expect("parses");
        assert_eq!(f.to_wire(), line);
    }

    #[test]
    fn echo_rssi_detected() {
        let line = "000  I --- 03:150994 --:------ 03:150994 30C9 003 000891";
        let f = Frame::parse(line, dtm()).expect("parses");
        assert!(f.is_echo());
    }

    #[test]
    fn mismatched_length_rejected() {
        let line = "085  I --- 01:145038 --:------ 01:145038 1F09 004 0005C8";
        let err = Frame::parse(line, dtm()).unwrap_err();
        assert!(matches!(err, RamsesError::InvalidFrameLength { .. }));
    }

    #[test]
    fn trailer_is_stripped_and_captured() {
        let line = "085  I --- 01:145038 --:------ 01:145038 1F09 003 0005C8 # a comment";
        let f = Frame::parse(line, dtm()).expect("parses");
        assert_eq!(f.trailer.as_deref(), Some("# a comment"));
        assert_eq!(f.payload, "0005C8");
    }
}
