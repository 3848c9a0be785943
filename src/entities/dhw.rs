// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Hot water zone entity, grounded in
//! `original_source/ramses_rf/zones.py::DhwZone`.

use crate::{model::address::Address, store::entity_store::EntityStore};

#[derive(Debug)]
pub struct DhwZone {
    /// Domain id, always `FA` for the hot water zone.
    pub idx: &'static str,
    pub sensor: Option<Address>,
    pub dhw_valve: Option<Address>,
    pub heating_valve: Option<Address>,
    pub store: EntityStore,
}

impl DhwZone {
    pub fn new() -> DhwZone {
        DhwZone {
            idx: "FA",
            sensor: None,
            dhw_valve: None,
            heating_valve: None,
            store: EntityStore::new(),
        }
    }
}

impl Default for DhwZone {
    fn default() -> Self {
        DhwZone::new()
    }
}
