// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Periodic per-entity probe scheduler.
//!
//! Walks the entity graph on a fixed tick, and for every (entity, probe
//! kind) pair whose schedule has come due, checks the per-opcode
//! throttle window against that entity's own message store before
//! issuing an `RQ` probe. Shuts down cooperatively on a
//! `CancellationToken` raced against the tick interval in a `select!`.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::time::{Instant, interval};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::entities::gateway::{Gateway, ProbeTarget};

/// How often the scheduler re-walks the entity graph and checks due
/// probes. Independent of any individual probe's own cadence.
const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ProbeKind {
    Schema,
    Params,
    Status,
}

impl ProbeKind {
    const ALL: [ProbeKind; 3] = [ProbeKind::Schema, ProbeKind::Params, ProbeKind::Status];

    /// `(initial delay, period)`, identical across entity classes.
    fn cadence(self) -> (Duration, Duration) {
        match self {
            ProbeKind::Schema => (Duration::from_secs(1), Duration::from_secs(24 * 60 * 60)),
            ProbeKind::Params => (Duration::from_secs(3), Duration::from_secs(6 * 60 * 60)),
            ProbeKind::Status => (Duration::from_secs(5), Duration::from_secs(15 * 60)),
        }
    }

    /// Opcode this probe kind polls for, per entity class. No probe
    /// kind is skipped for any entity class.
    fn opcode_for(self, target: &ProbeTarget) -> u16 {
        match (self, target) {
            (ProbeKind::Schema, ProbeTarget::Zone(..)) => 0x000C,
            (ProbeKind::Params, ProbeTarget::Zone(..)) => 0x000A,
            (ProbeKind::Status, ProbeTarget::Zone(..)) => 0x30C9,
            (ProbeKind::Schema, ProbeTarget::Dhw(_)) => 0x000C,
            (ProbeKind::Params, ProbeTarget::Dhw(_)) => 0x10A0,
            (ProbeKind::Status, ProbeTarget::Dhw(_)) => 0x1260,
            (ProbeKind::Schema, ProbeTarget::System(_)) => 0x0005,
            (ProbeKind::Params, ProbeTarget::System(_)) => 0x1100,
            (ProbeKind::Status, ProbeTarget::System(_)) => 0x1F09,
        }
    }
}

/// Per-opcode suppression window: a probe is skipped if a message for
/// its opcode arrived more recently than this.
fn throttle_window_for(opcode: u16) -> Duration {
    match opcode {
        0x0004 | 0x000A | 0x10A0 => Duration::from_secs(15 * 60),
        _ => Duration::from_secs(2 * 60),
    }
}

/// Drives the periodic discovery walk until cancelled.
pub struct DiscoveryScheduler {
    gateway: Arc<Gateway>,
    cancel: CancellationToken,
    due: HashMap<(ProbeTarget, ProbeKind), Instant>,
}

impl DiscoveryScheduler {
    pub fn new(gateway: Arc<Gateway>, cancel: CancellationToken) -> DiscoveryScheduler {
        DiscoveryScheduler {
            gateway,
            cancel,
            due: HashMap::new(),
        }
    }

    /// Run until the cancellation token fires.
    pub async fn run(mut self) {
        let mut ticker = interval(TICK_PERIOD);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    async fn tick(&mut self) {
        let now = Instant::now();
        let targets = self.gateway.probe_targets().await;

        for target in targets {
            for kind in ProbeKind::ALL {
                let key = (target.clone(), kind);
                let next = *self
                    .due
                    .entry(key.clone())
                    .or_insert_with(|| now + kind.cadence().0);
                if next > now {
                    continue;
                }

                let opcode = kind.opcode_for(&target);
                if !self.is_due(&target, opcode, now).await {
                    self.due.insert(key, now + kind.cadence().1);
                    continue;
                }

                trace!(?target, opcode = %format!("{opcode:04X}"), "discovery probe due");
                self.gateway.send_probe(&target, opcode).await;
                self.due.insert(key, now + kind.cadence().1);
            }
        }
    }

    /// False if the entity's own store already has a message for this
    /// opcode fresher than the throttle window.
    async fn is_due(&self, target: &ProbeTarget, opcode: u16, now: Instant) -> bool {
        let Some(last_dtm) = self.gateway.last_seen(target, opcode).await else {
            return true;
        };
        let current_wall = chrono::Utc::now().naive_utc();
        let age = current_wall - last_dtm;
        let window = throttle_window_for(opcode);
        let _ = now;
        age.to_std().map(|a| a >= window).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{entities::gateway::Gateway, fsm::context::FsmConfig, transport::ChannelTransport};

    fn gateway() -> Arc<Gateway> {
        let (a, _b) = ChannelTransport::pair();
        Gateway::new(FsmConfig::default(), Arc::new(a), 12, true)
    }

    #[tokio::test]
    async fn probe_suppressed_when_the_store_already_has_a_fresh_message() {
        let gw = gateway();
        let controller = crate::model::address::Address::new(1, 145038);
        gw.ingest_line("000  I --- 01:145038 --:------ 01:145038 0008 002 0000")
            .await
            .expect("ingest ok");

        let scheduler = DiscoveryScheduler::new(gw, CancellationToken::new());
        let target = ProbeTarget::System(controller);
        assert!(!scheduler.is_due(&target, 0x0008, Instant::now()).await);
    }

    #[tokio::test]
    async fn probe_due_when_the_store_has_nothing_for_that_opcode() {
        let gw = gateway();
        let controller = crate::model::address::Address::new(1, 145038);
        gw.ingest_line("000  I --- 01:145038 --:------ 01:145038 0008 002 0000")
            .await
            .expect("ingest ok");

        let scheduler = DiscoveryScheduler::new(gw, CancellationToken::new());
        let target = ProbeTarget::System(controller);
        assert!(scheduler.is_due(&target, 0x1100, Instant::now()).await);
    }

    #[test]
    fn default_throttle_window_is_two_minutes() {
        assert_eq!(throttle_window_for(0x30C9), Duration::from_secs(2 * 60));
    }

    #[test]
    fn named_opcodes_use_the_longer_window() {
        assert_eq!(throttle_window_for(0x000A), Duration::from_secs(15 * 60));
        assert_eq!(throttle_window_for(0x0004), Duration::from_secs(15 * 60));
        assert_eq!(throttle_window_for(0x10A0), Duration::from_secs(15 * 60));
    }

    #[test]
    fn schema_params_status_cadences_match_the_table() {
        assert_eq!(
            ProbeKind::Schema.cadence(),
            (Duration::from_secs(1), Duration::from_secs(24 * 60 * 60))
        );
        assert_eq!(
            ProbeKind::Params.cadence(),
            (Duration::from_secs(3), Duration::from_secs(6 * 60 * 60))
        );
        assert_eq!(
            ProbeKind::Status.cadence(),
            (Duration::from_secs(5), Duration::from_secs(15 * 60))
        );
    }
}
