// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Static opcode registry: indexing discipline, array capability, and
//! expiry, all keyed by the 16-bit opcode.

use std::time::Duration;

use crate::model::frame::Verb;

/// How an opcode's context index (`idx`) is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdxClass {
    /// Index is unconditionally `"00"`.
    None,
    /// Index is `payload[0..2]`.
    Simple,
    /// Per-opcode rule, handled in [`crate::model::context`].
    Complex,
    /// Index is a one-byte domain id in `{F8,F9,FA,FB,FC,FD}`.
    Domain,
}

/// An opcode's expiry policy for the message store (C7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Falls back to the verb-based defaults in `default_expiry_for`.
    Default,
    /// Never expires (sentinel).
    Never,
    /// A fixed duration.
    After(Duration),
}

/// One entry of the static opcode table.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeEntry {
    pub opcode: u16,
    pub name: &'static str,
    pub idx_class: IdxClass,
    /// `Some(unit_len)` iff this opcode is array-capable from a
    /// controller-originated `I` frame.
    pub array_unit_len: Option<usize>,
    /// True iff this opcode is only ever emitted by a controller
    /// (`CODE_ONLY_FROM_CTL`).
    pub only_from_ctl: bool,
    pub expiry: Expiry,
}

/// The static opcode registry. Ordering is irrelevant; lookups are by
/// linear scan (the table is small — tens of entries, not worth a
/// hashmap at const-eval time).
pub static OPCODES: &[OpcodeEntry] = &[
    OpcodeEntry {
        opcode: 0x0002,
        name: "outdoor sensor",
        idx_class: IdxClass::None,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x0004,
        name: "zone name",
        idx_class: IdxClass::Simple,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x0005,
        name: "system zones",
        idx_class: IdxClass::Complex,
        array_unit_len: Some(4),
        only_from_ctl: true,
        expiry: Expiry::Never,
    },
    OpcodeEntry {
        opcode: 0x0006,
        name: "schedule sync",
        idx_class: IdxClass::None,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x0008,
        name: "relay demand",
        idx_class: IdxClass::Domain,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x0009,
        name: "relay failsafe",
        idx_class: IdxClass::Complex,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x000A,
        name: "zone parameters",
        idx_class: IdxClass::Simple,
        array_unit_len: Some(6),
        only_from_ctl: true,
        expiry: Expiry::After(Duration::from_secs(60 * 60)),
    },
    OpcodeEntry {
        opcode: 0x000C,
        name: "system schema (zone actuators)",
        idx_class: IdxClass::Complex,
        array_unit_len: None,
        only_from_ctl: true,
        expiry: Expiry::Never,
    },
    OpcodeEntry {
        opcode: 0x0418,
        name: "system fault log entry",
        idx_class: IdxClass::Complex,
        array_unit_len: None,
        only_from_ctl: true,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x1030,
        name: "mixing valve params",
        idx_class: IdxClass::Simple,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x1060,
        name: "actuator battery status",
        idx_class: IdxClass::Simple,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x1100,
        name: "TPI parameters",
        idx_class: IdxClass::Complex,
        array_unit_len: None,
        only_from_ctl: true,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x10E0,
        name: "device info",
        idx_class: IdxClass::None,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Never,
    },
    OpcodeEntry {
        opcode: 0x12B0,
        name: "window status",
        idx_class: IdxClass::Simple,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x1F09,
        name: "system sync",
        idx_class: IdxClass::None,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::After(Duration::from_secs(300)),
    },
    OpcodeEntry {
        opcode: 0x1FC9,
        name: "binding / RF bind",
        idx_class: IdxClass::Complex,
        array_unit_len: Some(6),
        only_from_ctl: false,
        expiry: Expiry::Never,
    },
    OpcodeEntry {
        opcode: 0x2309,
        name: "zone setpoint",
        idx_class: IdxClass::Simple,
        array_unit_len: Some(3),
        only_from_ctl: true,
        expiry: Expiry::After(Duration::from_secs(15 * 60)),
    },
    OpcodeEntry {
        opcode: 0x30C9,
        name: "zone temperature",
        idx_class: IdxClass::Simple,
        array_unit_len: Some(3),
        only_from_ctl: true,
        expiry: Expiry::After(Duration::from_secs(15 * 60)),
    },
    OpcodeEntry {
        opcode: 0x3150,
        name: "heat demand",
        idx_class: IdxClass::Simple,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x3220,
        name: "OpenTherm message",
        idx_class: IdxClass::Complex,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Never,
    },
    OpcodeEntry {
        opcode: 0x31D9,
        name: "ventilation state",
        idx_class: IdxClass::None,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x31DA,
        name: "ventilation extended state",
        idx_class: IdxClass::None,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x3B00,
        name: "actuator sync",
        idx_class: IdxClass::Domain,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x0404,
        name: "zone schedule fragment",
        idx_class: IdxClass::Complex,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
    OpcodeEntry {
        opcode: 0x7FFF,
        name: "puzzle / self-test",
        idx_class: IdxClass::None,
        array_unit_len: None,
        only_from_ctl: false,
        expiry: Expiry::Default,
    },
];

pub fn lookup(opcode: u16) -> Option<&'static OpcodeEntry> {
    OPCODES.iter().find(|e| e.opcode == opcode)
}

pub fn is_array_capable(opcode: u16) -> Option<usize> {
    lookup(opcode).and_then(|e| e.array_unit_len)
}

pub fn is_ctl_only(opcode: u16) -> bool {
    lookup(opcode).map(|e| e.only_from_ctl).unwrap_or(false)
}

pub fn idx_class(opcode: u16) -> IdxClass {
    lookup(opcode).map(|e| e.idx_class).unwrap_or(IdxClass::Simple)
}

/// `_PUZZ` pseudo-opcode bypassing the active-command equality check in
/// the Send FSM.
pub const PUZZLE_OPCODE: u16 = 0x7FFF;

/// Default message-store expiry by verb, used when an opcode has no
/// explicit table entry or its entry defers to `Expiry::Default`.
pub fn default_expiry_for(opcode: u16, verb: Verb) -> Duration {
    match verb {
        Verb::RQ | Verb::W => Duration::from_secs(3),
        _ => {
            if let Some(entry) = lookup(opcode) {
                match entry.expiry {
                    Expiry::Never => Duration::from_secs(u64::MAX / 2),
                    Expiry::After(d) => d,
                    Expiry::Default => Duration::from_secs(60 * 60),
                }
            } else {
                Duration::from_secs(60 * 60)
            }
        }
    }
}

pub fn expiry_for(opcode: u16, verb: Verb) -> Expiry {
    if matches!(verb, Verb::RQ | Verb::W) {
        return Expiry::After(Duration::from_secs(3));
    }
    lookup(opcode).map(|e| e.expiry).unwrap_or(Expiry::Default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_opcode_lookup() {
        let e = lookup(0x1F09).expect("present");
        assert_eq!(e.name, "system sync");
    }

    #[test]
    fn unknown_opcode_lookup_is_none() {
        assert!(lookup(0xABCD).is_none());
    }

    #[test]
    fn array_capability_lookup() {
        assert_eq!(is_array_capable(0x000A), Some(6));
        assert_eq!(is_array_capable(0x0008), None);
    }

    #[test]
    fn rq_w_always_expire_fast() {
        assert_eq!(expiry_for(0x000C, Verb::RQ), Expiry::After(Duration::from_secs(3)));
    }
}
