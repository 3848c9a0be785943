// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Temperature control system (the controller and everything it owns):
//! its zones, optional hot water zone, and directly-attached devices.

use std::collections::HashMap;

use crate::{
    entities::{device::Device, dhw::DhwZone, zone::Zone},
    error::{RamsesError, Result},
    model::address::Address,
    store::entity_store::EntityStore,
};

#[derive(Debug)]
pub struct System {
    pub controller: Address,
    pub zones: HashMap<String, Zone>,
    pub dhw: Option<DhwZone>,
    pub devices: HashMap<Address, Device>,
    pub store: EntityStore,
    pub max_zones: u8,
}

impl System {
    pub fn new(controller: Address, max_zones: u8) -> System {
        System {
            controller,
            zones: HashMap::new(),
            dhw: None,
            devices: HashMap::new(),
            store: EntityStore::new(),
            max_zones,
        }
    }

    /// Get or create the zone at `idx`, enforcing the `max_zones` cap.
    pub fn zone_mut(&mut self, idx: &str) -> Result<&mut Zone> {
        if !self.zones.contains_key(idx) && self.zones.len() as u8 >= self.max_zones {
            return Err(RamsesError::CorruptState(format!(
                "zone {idx} would exceed max_zones ({})",
                self.max_zones
            )));
        }
        Ok(self
            .zones
            .entry(idx.to_string())
            .or_insert_with(|| Zone::new(idx.to_string())))
    }

    pub fn dhw_mut(&mut self) -> &mut DhwZone {
        self.dhw.get_or_insert_with(DhwZone::new)
    }

    pub fn device_mut(&mut self, addr: Address) -> &mut Device {
        self.devices
            .entry(addr)
            .or_insert_with(|| Device::new(addr, Some(self.controller)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_cap_is_enforced() {
        let mut sys = System::new(Address::new(1, 145038), 1);
        sys.zone_mut("00").expect("first zone ok");
        let err = sys.zone_mut("01").unwrap_err();
        assert!(matches!(err, RamsesError::CorruptState(_)));
    }

    #[test]
    fn same_zone_idx_does_not_count_twice_against_cap() {
        let mut sys = System::new(Address::new(1, 145038), 1);
        sys.zone_mut("00").expect("first zone ok");
        sys.zone_mut("00").expect("same zone ok again");
    }
}
