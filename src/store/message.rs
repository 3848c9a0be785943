// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A single stored observation: one [`Frame`] plus its expiry policy.

use std::time::Duration;

use crate::model::{frame::Frame, opcode};

/// One cell of a [`crate::store::entity_store::EntityStore`].
#[derive(Debug, Clone)]
pub struct Message {
    pub frame: Frame,
    expiry: Duration,
}

impl Message {
    pub fn new(frame: Frame) -> Message {
        let expiry = opcode::default_expiry_for(frame.opcode, frame.verb);
        Message { frame, expiry }
    }

    /// `(now - dtm) / expiry`. Values `> 1.0` are "expired", `> 2.0` are
    /// "tombstoned" and must be evicted on next access.
    fn age_ratio(&self, now: chrono::NaiveDateTime) -> f64 {
        let age = (now - self.frame.dtm).num_milliseconds().max(0) as f64;
        let expiry_ms = self.expiry.as_millis().max(1) as f64;
        age / expiry_ms
    }

    pub fn is_expired(&self, now: chrono::NaiveDateTime) -> bool {
        self.age_ratio(now) > 1.0
    }

    pub fn is_tombstoned(&self, now: chrono::NaiveDateTime) -> bool {
        self.age_ratio(now) > 2.0
    }
}
