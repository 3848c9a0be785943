// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A bare device node in the entity graph. Devices that are also zone
//! actuators/sensors are additionally tracked by `idx`/role inside
//! their owning [`crate::entities::zone::Zone`].

use crate::{model::address::Address, store::entity_store::EntityStore};

#[derive(Debug)]
pub struct Device {
    pub addr: Address,
    /// The controller that this device was created under, if any.
    /// `None` for devices observed with no established parent
    /// (eavesdropping disabled, or no controller side in the observed
    /// frame).
    pub parent: Option<Address>,
    pub store: EntityStore,
}

impl Device {
    pub fn new(addr: Address, parent: Option<Address>) -> Device {
        Device {
            addr,
            parent,
            store: EntityStore::new(),
        }
    }
}
