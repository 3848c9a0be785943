// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Context key derivation: `has_array`, `has_ctl`, `idx`, `ctx`, `hdr`,
//! computed lazily and cached on the [`Frame`].

use crate::model::{
    address::Address,
    frame::{Frame, Verb},
    opcode::{self, IdxClass},
};

const DOMAIN_IDS: [&str; 6] = ["F8", "F9", "FA", "FB", "FC", "FD"];

fn payload_slice(payload: &str, range: std::ops::Range<usize>) -> Option<&str> {
    payload.get(range)
}

/// `has_array` derivation, shared between [`Frame`] and
/// [`crate::model::command::Command`] so the header a command precomputes
/// agrees with the header a real echoed/replied [`Frame`] derives.
pub(crate) fn compute_has_array(
    opcode: u16,
    verb: Verb,
    src: Address,
    dst: Address,
    len: usize,
) -> bool {
    if opcode == 0x1FC9 {
        return verb != Verb::RQ;
    }
    let Some(unit_len) = opcode::is_array_capable(opcode) else {
        return false;
    };
    if verb != Verb::I {
        return false;
    }
    if len == unit_len {
        // A single-element array is indistinguishable from a scalar
        // payload of the same width; accepted false negative.
        return false;
    }
    if len % unit_len != 0 {
        return false;
    }
    let producer_is_ctl_or_self = src.is_controller_type() || src == dst;
    if !producer_is_ctl_or_self {
        return false;
    }
    if matches!(src.device_type, 12 | 22) && !dst.is_null() {
        return false;
    }
    true
}

/// `idx` derivation, shared the same way as [`compute_has_array`].
pub(crate) fn compute_idx(
    opcode: u16,
    payload: &str,
    verb: Verb,
    src: Address,
    dst: Address,
    len: usize,
) -> Option<String> {
    match opcode {
        0x0005 => Some(compute_has_array(opcode, verb, src, dst, len).to_string()),
        0x0009 if src.device_type == 10 => None,
        0x000C => {
            let domain_hint = payload_slice(payload, 2..4);
            match domain_hint {
                Some("0D") | Some("0E") => Some("FA".to_string()),
                Some("0F") => Some("FC".to_string()),
                _ => payload_slice(payload, 0..2).map(str::to_string),
            }
        }
        0x0418 => payload_slice(payload, 4..6).map(str::to_string),
        0x1100 => {
            let head = payload_slice(payload, 0..2);
            match head {
                Some(s) if s.starts_with('F') => Some(s.to_string()),
                _ => None,
            }
        }
        0x3220 => payload_slice(payload, 4..6).map(str::to_string),
        _ => match opcode::idx_class(opcode) {
            IdxClass::None => Some("00".to_string()),
            IdxClass::Simple => payload_slice(payload, 0..2).map(str::to_string),
            IdxClass::Domain => payload_slice(payload, 0..2)
                .filter(|s| DOMAIN_IDS.contains(s))
                .map(str::to_string),
            IdxClass::Complex => payload_slice(payload, 0..2).map(str::to_string),
        },
    }
}

/// `ctx` derivation, shared the same way as [`compute_has_array`].
pub(crate) fn compute_ctx(
    opcode: u16,
    payload: &str,
    verb: Verb,
    src: Address,
    dst: Address,
    len: usize,
) -> Option<String> {
    match opcode {
        0x0005 | 0x000C => payload_slice(payload, 0..4).map(str::to_string),
        0x0404 => match (payload_slice(payload, 0..2), payload_slice(payload, 10..12)) {
            (Some(a), Some(b)) => Some(format!("{a}{b}")),
            _ => None,
        },
        _ => compute_idx(opcode, payload, verb, src, dst, len),
    }
}

impl Frame {
    pub fn has_array(&self) -> bool {
        *self.has_array.get_or_init(|| {
            compute_has_array(self.opcode, self.verb, self.src, self.dst, self.len)
        })
    }

    pub fn has_ctl(&self) -> bool {
        *self.has_ctl.get_or_init(|| self.compute_has_ctl())
    }

    fn compute_has_ctl(&self) -> bool {
        if self.src.is_controller_type() || self.dst.is_controller_type() {
            return true;
        }
        if self.src == self.dst {
            let only_ctl_opcode = opcode::is_ctl_only(self.opcode)
                || matches!(self.opcode, 0x31D9 | 0x31DA)
                || (self.opcode == 0x3B00 && self.payload.starts_with("FC"));
            if only_ctl_opcode {
                return true;
            }
        }
        if self.dst.is_null() && self.src.device_type != 10 {
            return true;
        }
        if matches!(self.dst.device_type, 12 | 22) {
            return true;
        }
        false
    }

    /// Two-hex-character context (zone index, domain id, or `None`).
    pub fn idx(&self) -> Option<String> {
        self.idx
            .get_or_init(|| {
                compute_idx(self.opcode, &self.payload, self.verb, self.src, self.dst, self.len)
            })
            .clone()
    }

    /// Extended index used to shard the message store.
    pub fn ctx(&self) -> Option<String> {
        self.ctx
            .get_or_init(|| {
                compute_ctx(self.opcode, &self.payload, self.verb, self.src, self.dst, self.len)
            })
            .clone()
    }

    /// QoS fingerprint used to correlate sent commands with their echo
    /// and reply: `opcode|verb|addr[|ctx]`.
    pub fn hdr(&self, rx: bool) -> Option<String> {
        if self.opcode == 0x1FC9 {
            // Binding handshake headers are out of scope; `1FC9` is
            // always pass-through, never matched.
            return None;
        }

        let addr = if self.src.device_type == 18 {
            self.dst
        } else {
            self.src
        };

        let verb = if rx {
            match self.verb.flip_for_rx() {
                Some(v) => v,
                None => return None, // I/RP (or self-directed) has no rx header
            }
        } else {
            self.verb
        };

        if rx && self.src == self.dst {
            return None;
        }

        let mut hdr = format!("{:04X}|{}|{}", self.opcode, verb, addr);
        if let Some(ctx) = self.ctx() {
            hdr.push('|');
            hdr.push_str(&ctx);
        }
        Some(hdr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::frame::Frame;

    fn dtm() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2023, 1, 1)
            .expect("date")
            .and_hms_opt(0, 0, 0)
            .expect("time")
    }

    #[test]
    fn sample_frame_context_keys() {
        let f = Frame::parse(
            "085  I --- 01:145038 --:------ 01:145038 1F09 003 0005C8",
            dtm(),
        )
        .expect("parses");
        assert!(!f.has_array());
        assert_eq!(f.idx(), Some("00".to_string()));
        assert_eq!(f.hdr(false), Some("1F09| I|01:145038|00".to_string()));
    }

    #[test]
    fn fault_log_idx_is_log_index() {
        let f = Frame::parse(
            "092 RP --- 01:145038 18:000730 --:------ 0418 016 000100B00000F6FF7F00000066B036E7",
            dtm(),
        )
        .expect("parses");
        assert_eq!(f.idx(), Some("00".to_string()));
    }

    #[test]
    fn array_capable_payload_from_controller_is_array() {
        let f = Frame::parse(
            "092  I --- 01:145038 --:------ 01:145038 000A 018 001001F40DAC011001F40DAC021001F40DAC",
            dtm(),
        )
        .expect("parses");
        assert!(f.has_array());
    }

    #[test]
    fn rssi_000_frames_still_parse_has_array_independent_of_echo() {
        let f = Frame::parse(
            "000  I --- 03:150994 --:------ 03:150994 30C9 003 000891",
            dtm(),
        )
        .expect("parses");
        assert!(f.is_echo());
        assert!(!f.has_array());
    }
}
