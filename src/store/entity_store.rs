// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-entity message store: `store[opcode][verb][ctx] -> Message`.

use std::collections::HashMap;

use crate::{
    model::frame::{Frame, Verb},
    store::message::Message,
};

type CtxBucket = HashMap<Option<String>, Message>;
type VerbBucket = HashMap<Verb, CtxBucket>;

#[derive(Debug, Default)]
pub struct EntityStore {
    by_opcode: HashMap<u16, VerbBucket>,
}

impl EntityStore {
    pub fn new() -> EntityStore {
        EntityStore::default()
    }

    /// Record an observed frame. Writes are idempotent on timestamp: a
    /// write is dropped unless it is strictly newer than whatever
    /// already occupies the same `(opcode, verb, ctx)` cell.
    pub fn insert(&mut self, frame: Frame) {
        let ctx = frame.ctx();
        let bucket = self
            .by_opcode
            .entry(frame.opcode)
            .or_default()
            .entry(frame.verb)
            .or_default();
        let should_write = match bucket.get(&ctx) {
            Some(existing) => frame.dtm > existing.frame.dtm,
            None => true,
        };
        if should_write {
            bucket.insert(ctx, Message::new(frame));
        }
    }

    /// Drop every tombstoned cell. Called lazily on each access, since
    /// tombstoned entries must be evicted on next access.
    fn evict_tombstoned(&mut self, now: chrono::NaiveDateTime) {
        for verbs in self.by_opcode.values_mut() {
            for ctxs in verbs.values_mut() {
                ctxs.retain(|_, msg| !msg.is_tombstoned(now));
            }
        }
    }

    /// Query by `(opcode[, verb][, ctx])`. Omitting `verb` searches
    /// every verb for the given `ctx` and returns the most recent live
    /// match; omitting `ctx` means "no context" (the `None` slot), not
    /// "any context".
    pub fn get(
        &mut self,
        opcode: u16,
        verb: Option<Verb>,
        ctx: Option<&str>,
        now: chrono::NaiveDateTime,
    ) -> Option<&Message> {
        self.evict_tombstoned(now);
        let ctx_key = ctx.map(str::to_string);
        let verbs = self.by_opcode.get(&opcode)?;
        match verb {
            Some(v) => verbs.get(&v)?.get(&ctx_key),
            None => verbs
                .values()
                .filter_map(|bucket| bucket.get(&ctx_key))
                .max_by_key(|msg| msg.frame.dtm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::frame::Frame;

    fn frame(line: &str, dtm: chrono::NaiveDateTime) -> Frame {
        Frame::parse(line, dtm).expect("parses")
    }

    fn dtm(offset_secs: i64) -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .expect("date")
            .and_hms_opt(12, 0, 0)
            .expect("time")
            + chrono::Duration::seconds(offset_secs)
    }

    #[test]
    fn newer_frame_supersedes_older_same_cell() {
        let mut store = EntityStore::new();
        store.insert(frame(
            "085  I --- 01:145038 --:------ 01:145038 1F09 003 0005C8",
            dtm(0),
        ));
        store.insert(frame(
            "085  I --- 01:145038 --:------ 01:145038 1F09 003 0006C8",
            dtm(5),
        ));
        let msg = store
            .get(0x1F09, Some(Verb::I), Some("00"), dtm(5))
            .expect("present");
        assert_eq!(msg.frame.payload, "0006C8");
    }

    #[test]
    fn stale_write_is_dropped() {
        let mut store = EntityStore::new();
        store.insert(frame(
            "085  I --- 01:145038 --:------ 01:145038 1F09 003 0005C8",
            dtm(5),
        ));
        store.insert(frame(
            "085  I --- 01:145038 --:------ 01:145038 1F09 003 0006C8",
            dtm(0),
        ));
        let msg = store
            .get(0x1F09, Some(Verb::I), Some("00"), dtm(5))
            .expect("present");
        assert_eq!(msg.frame.payload, "0005C8");
    }

    #[test]
    fn tombstoned_entry_is_evicted_on_access() {
        let mut store = EntityStore::new();
        store.insert(frame(
            "085 RQ --- 01:145038 18:000730 --:------ 000A 001 00",
            dtm(0),
        ));
        assert!(store.get(0x000A, Some(Verb::RQ), Some("00"), dtm(1)).is_some());
        assert!(store.get(0x000A, Some(Verb::RQ), Some("00"), dtm(10)).is_none());
    }

    #[test]
    fn verb_omitted_returns_most_recent_match() {
        let mut store = EntityStore::new();
        store.insert(frame(
            "085 RQ --- 01:145038 18:000730 --:------ 000A 001 00",
            dtm(0),
        ));
        store.insert(frame(
            "085 RP --- 18:000730 01:145038 --:------ 000A 001 00",
            dtm(1),
        ));
        let msg = store.get(0x000A, None, Some("00"), dtm(1)).expect("present");
        assert_eq!(msg.frame.verb, Verb::RP);
    }
}
