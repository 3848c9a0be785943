// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Bounded priority send queue.

use std::{cmp::Ordering, collections::BinaryHeap, time::Instant};

use tokio::sync::oneshot;

use crate::{error::RamsesError, model::{command::Command, frame::Frame}};

/// Lower value sends sooner. Mirrors the source's `SendPriority` IntEnum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SendPriority {
    High = 0,
    Default = 1,
    Low = 2,
}

pub type SendResult = std::result::Result<Frame, RamsesError>;

pub struct QueueEntry {
    pub priority: SendPriority,
    pub submitted: Instant,
    pub cmd: Command,
    pub expires: Instant,
    pub max_retries: u8,
    pub responder: oneshot::Sender<SendResult>,
}

impl QueueEntry {
    fn sort_key(&self) -> (SendPriority, std::cmp::Reverse<Instant>) {
        // BinaryHeap is a max-heap; we want the *lowest* priority value
        // and the *earliest* submission time to sort first, so invert
        // priority's usual meaning and reverse the timestamp.
        (
            match self.priority {
                SendPriority::High => SendPriority::Low,
                SendPriority::Default => SendPriority::Default,
                SendPriority::Low => SendPriority::High,
            },
            std::cmp::Reverse(self.submitted),
        )
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}
impl Eq for QueueEntry {}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Capacity-10 priority queue of pending sends.
pub struct SendQueue {
    capacity: usize,
    heap: BinaryHeap<QueueEntry>,
}

impl SendQueue {
    pub fn new(capacity: usize) -> Self {
        SendQueue {
            capacity,
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Push a new entry. Fails immediately with [`RamsesError::QueueFull`]
    /// when at capacity.
    pub fn push(&mut self, entry: QueueEntry) -> Result<(), (QueueEntry, RamsesError)> {
        if self.heap.len() >= self.capacity {
            return Err((entry, RamsesError::QueueFull));
        }
        self.heap.push(entry);
        Ok(())
    }

    /// Drop any entries whose deadline has passed, failing their
    /// responders with [`RamsesError::ProtocolWaitFailed`].
    pub fn expire_stale(&mut self, now: Instant) {
        let mut retained = BinaryHeap::with_capacity(self.heap.len());
        for entry in self.heap.drain() {
            if entry.expires <= now {
                let _ = entry.responder.send(Err(RamsesError::ProtocolWaitFailed));
            } else {
                retained.push(entry);
            }
        }
        self.heap = retained;
    }

    /// Pop the highest-priority, earliest-submitted live entry, skipping
    /// (and failing) any whose responder has already been dropped by a
    /// cancelled caller.
    pub fn pop_next(&mut self) -> Option<QueueEntry> {
        while let Some(entry) = self.heap.pop() {
            if entry.responder.is_closed() {
                continue; // caller cancelled; drop silently
            }
            return Some(entry);
        }
        None
    }
}
