// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Zone entity, its restricted type-promotion state machine, and the
//! valve-position-to-heat-demand transform. Grounded in
//! `original_source/ramses_rf/zones.py`'s `Zone`/`EleZone`/`ValZone`/
//! `RadZone`/`UfhZone`/`MixZone` hierarchy and `_transform()`.

use crate::{
    error::{RamsesError, Result},
    model::address::Address,
    store::entity_store::EntityStore,
};

/// A zone's actuator/sensor role class. `Unknown` promotes to one of
/// the concrete roles on the first frame that implies it; promotion is
/// one-way and restricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneType {
    Unknown,
    Rad,
    Ufh,
    Val,
    Ele,
    Mix,
}

impl ZoneType {
    /// Whether `self -> next` is a legal promotion. Matches the
    /// source's `assert self._zone_type in (...)` guards: `Ele` may
    /// still promote to `Val` (relay zones that turn out to gate a
    /// zone valve), every other concrete class is terminal.
    fn can_promote_to(self, next: ZoneType) -> bool {
        match self {
            ZoneType::Unknown => true,
            ZoneType::Ele => next == ZoneType::Val,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct Zone {
    pub idx: String,
    pub zone_type: ZoneType,
    pub actuators: Vec<Address>,
    pub sensor: Option<Address>,
    pub store: EntityStore,
}

impl Zone {
    pub fn new(idx: String) -> Zone {
        Zone {
            idx,
            zone_type: ZoneType::Unknown,
            actuators: Vec::new(),
            sensor: None,
            store: EntityStore::new(),
        }
    }

    /// Attempt to promote this zone's type. Re-observing the zone's
    /// current type is always fine. An illegal transition raises
    /// `CorruptState` and leaves the zone's type unchanged, matching the
    /// source's `raise CorruptStateError` on a conflicting classification.
    pub fn promote(&mut self, next: ZoneType) -> Result<()> {
        if next == self.zone_type {
            return Ok(());
        }
        if self.zone_type.can_promote_to(next) {
            self.zone_type = next;
            Ok(())
        } else {
            Err(RamsesError::CorruptState(format!(
                "zone {} is already classified {:?}, cannot promote to {:?}",
                self.idx, self.zone_type, next
            )))
        }
    }

    /// `0008`/`0009` (relay demand/failsafe) on a zone of unknown type
    /// promotes it to `Ele`.
    pub fn observe_relay_demand(&mut self) -> Result<()> {
        self.promote(ZoneType::Ele)
    }

    /// `3150` (heat demand) promotes by source device class: TRV -> Rad,
    /// relay -> Val, UFH controller -> Ufh.
    pub fn observe_heat_demand(&mut self, source_class: ZoneSourceClass) -> Result<()> {
        let next = match source_class {
            ZoneSourceClass::Trv => ZoneType::Rad,
            ZoneSourceClass::Relay => ZoneType::Val,
            ZoneSourceClass::UfhController => ZoneType::Ufh,
        };
        self.promote(next)
    }

    /// An explicit `000C` schema packet is authoritative: it sets the
    /// type directly, bypassing the restricted promotion table.
    pub fn apply_schema(&mut self, zone_type: ZoneType, actuators: Vec<Address>) {
        self.zone_type = zone_type;
        self.actuators = actuators;
    }

    /// Aggregate heat demand: the maximum of the zone's child actuator
    /// demands, piecewise-transformed per `_transform()` in
    /// `zones.py`. `actuator_demands` are raw valve positions in
    /// `0.0..=1.0`.
    pub fn heat_demand(actuator_demands: &[f64]) -> Option<f64> {
        let max = actuator_demands.iter().cloned().fold(0.0_f64, f64::max);
        if actuator_demands.is_empty() {
            return None;
        }
        Some(transform(max))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ZoneSourceClass {
    Trv,
    Relay,
    UfhController,
}

/// `_transform()`: valve position (`0.0..=1.0`) to heat demand percent
/// (`0.0..=1.0`).
fn transform(valve_pos: f64) -> f64 {
    let scaled = valve_pos * 100.0;
    if scaled <= 30.0 {
        return 0.0;
    }
    let (t0, t1, t2): (f64, f64, f64) = if scaled <= 70.0 {
        (0.0, 30.0, 70.0)
    } else {
        (30.0, 70.0, 100.0)
    };
    ((scaled - t1) * t1 / (t2 - t1) + t0 + 0.5).floor() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_below_threshold_is_zero() {
        assert_eq!(transform(0.20), 0.0);
    }

    #[test]
    fn transform_midrange_matches_reference_points() {
        // valve_pos=0.50 -> scaled=50 -> t0,t1,t2=(0,30,70)
        // (50-30)*30/40 + 0 + 0.5 = 15.5 -> floor 15 -> 0.15
        assert_eq!(transform(0.50), 0.15);
    }

    #[test]
    fn transform_high_range_matches_reference_points() {
        // valve_pos=0.90 -> scaled=90 -> t0,t1,t2=(30,70,100)
        // (90-70)*70/30 + 30 + 0.5 = 77.17 -> floor 77 -> 0.77
        assert_eq!(transform(0.90), 0.77);
    }

    #[test]
    fn unknown_zone_promotes_to_ele_on_relay_demand() {
        let mut z = Zone::new("00".to_string());
        z.observe_relay_demand().expect("legal promotion");
        assert_eq!(z.zone_type, ZoneType::Ele);
    }

    #[test]
    fn ele_zone_may_still_promote_to_val() {
        let mut z = Zone::new("00".to_string());
        z.zone_type = ZoneType::Ele;
        z.promote(ZoneType::Val).expect("legal promotion");
        assert_eq!(z.zone_type, ZoneType::Val);
    }

    #[test]
    fn rad_zone_rejects_demotion_to_ufh_as_corrupt_state() {
        let mut z = Zone::new("00".to_string());
        z.zone_type = ZoneType::Rad;
        let err = z.promote(ZoneType::Ufh).unwrap_err();
        assert!(matches!(err, RamsesError::CorruptState(_)));
        assert_eq!(z.zone_type, ZoneType::Rad);
    }

    #[test]
    fn reobserving_the_same_zone_type_is_not_an_error() {
        let mut z = Zone::new("00".to_string());
        z.zone_type = ZoneType::Rad;
        z.promote(ZoneType::Rad).expect("re-observing own type is fine");
        assert_eq!(z.zone_type, ZoneType::Rad);
    }
}
