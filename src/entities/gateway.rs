// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The entity-graph root and top-level orchestrator: owns transport,
//! the Send/Echo/Reply FSM, and the per-entity message-store root.
//! Construction and promotion rules are grounded in
//! `original_source/ramses_rf/zones.py`.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    entities::{device::Device, system::System, zone::ZoneSourceClass},
    error::{RamsesError, Result},
    fsm::{
        context::{Context, FsmConfig},
        queue::SendPriority,
    },
    model::{address::Address, command::Command, frame::Frame},
    transport::{ByteLineSink, ByteLineSource},
};

/// TRV, BDR-style relay, and UFH-controller device types, used to
/// classify the source of a `3150` heat-demand frame. These are the
/// device-type codes the wider RAMSES-II device population uses for
/// those three roles.
const DEVICE_TYPE_TRV: u8 = 4;
const DEVICE_TYPE_RELAY: u8 = 13;
const DEVICE_TYPE_UFH_CONTROLLER: u8 = 2;

struct Graph {
    systems: HashMap<Address, System>,
    orphans: HashMap<Address, Device>,
}

/// One addressable entity the discovery scheduler can probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProbeTarget {
    System(Address),
    Zone(Address, String),
    Dhw(Address),
}

/// Owns the entity graph, the per-transport Send/Echo/Reply FSM, and
/// the byte-line transport; the single top-level handle callers and
/// the discovery scheduler hold.
pub struct Gateway {
    graph: Mutex<Graph>,
    pub fsm: Arc<Context>,
    max_zones: u8,
    /// Whether observing a controller<->device frame should attach the
    /// device to that controller's system, or leave it parentless.
    eavesdrop_enabled: bool,
}

impl Gateway {
    pub fn new(
        fsm_config: FsmConfig,
        sink: Arc<dyn ByteLineSink>,
        max_zones: u8,
        eavesdrop_enabled: bool,
    ) -> Arc<Gateway> {
        Arc::new(Gateway {
            graph: Mutex::new(Graph {
                systems: HashMap::new(),
                orphans: HashMap::new(),
            }),
            fsm: Context::new(fsm_config, sink),
            max_zones,
            eavesdrop_enabled,
        })
    }

    /// Submit a command for transmission through the owned FSM.
    pub async fn send_cmd(
        &self,
        cmd: Command,
        wait_for_reply: Option<bool>,
        max_retries: Option<u8>,
        timeout: Option<std::time::Duration>,
        priority: SendPriority,
    ) -> std::result::Result<Frame, RamsesError> {
        self.fsm
            .send_cmd(cmd, wait_for_reply, max_retries, timeout, priority)
            .await
    }

    /// Run the receive loop to completion (source EOF) or until an
    /// unrecoverable transport error.
    pub async fn run(self: Arc<Self>, source: Arc<dyn ByteLineSource>) -> Result<()> {
        self.fsm.made_connection(false).await;
        loop {
            let line = source
                .read_line()
                .await
                .map_err(|e| RamsesError::TransportError(e.to_string()))?;
            let Some(line) = line else {
                self.fsm.lost_connection().await;
                return Ok(());
            };
            if let Err(err) = self.ingest_line(&line).await {
                warn!(%err, %line, "dropped invalid frame");
            }
        }
    }

    /// Parse and apply one raw wire line, as [`Gateway::run`] does for
    /// each line the transport yields. Exposed directly so a caller can
    /// replay a captured log without standing up a transport.
    pub async fn ingest_line(&self, line: &str) -> Result<()> {
        let frame = Frame::parse(line, chrono::Utc::now().naive_utc())?;
        trace!(opcode = %format!("{:04X}", frame.opcode), "accepted frame");

        let resolved = self.fsm.rcvd_pkt(&frame).await;
        if resolved {
            debug!(opcode = %format!("{:04X}", frame.opcode), "frame resolved an active command");
        }
        if !frame.is_echo() {
            self.observe(&frame).await?;
        }
        Ok(())
    }

    /// Apply the entity-graph construction/promotion rules for one
    /// accepted frame, then write it into the appropriate entity's
    /// store. A conflicting zone-type promotion raises `CorruptState`
    /// and aborts before the frame is stored, leaving the zone's type
    /// unchanged.
    async fn observe(&self, frame: &Frame) -> Result<()> {
        let mut graph = self.graph.lock().await;
        let (src, dst) = (frame.src, frame.dst);

        if src.is_controller_type() && src != dst {
            graph.ensure_system(src, self.max_zones);
            if self.eavesdrop_enabled {
                graph.attach_device(dst, Some(src));
            } else {
                graph.attach_orphan(dst);
            }
        } else if dst.is_controller_type() && src != dst {
            graph.ensure_system(dst, self.max_zones);
            if self.eavesdrop_enabled {
                graph.attach_device(src, Some(dst));
            } else {
                graph.attach_orphan(src);
            }
        } else if src == dst {
            if src.is_controller_type() {
                graph.ensure_system(src, self.max_zones);
            } else {
                graph.attach_orphan(src);
            }
        } else if let Some(ctl) = graph.controller_owning(src) {
            graph.attach_device(dst, Some(ctl));
        } else if let Some(ctl) = graph.controller_owning(dst) {
            graph.attach_device(src, Some(ctl));
        } else {
            graph.attach_orphan(src);
            graph.attach_orphan(dst);
        }

        self.apply_promotions(&mut graph, frame)?;
        graph.store_for(src, dst).insert(frame.clone());
        Ok(())
    }

    /// All entities currently known, for the discovery scheduler to
    /// walk each tick.
    pub(crate) async fn probe_targets(&self) -> Vec<ProbeTarget> {
        let graph = self.graph.lock().await;
        let mut targets = Vec::new();
        for (ctl, system) in &graph.systems {
            targets.push(ProbeTarget::System(*ctl));
            if system.dhw.is_some() {
                targets.push(ProbeTarget::Dhw(*ctl));
            }
            for idx in system.zones.keys() {
                targets.push(ProbeTarget::Zone(*ctl, idx.clone()));
            }
        }
        targets
    }

    /// Timestamp of the freshest stored message for `opcode` against
    /// `target`'s own store, if any.
    pub(crate) async fn last_seen(
        &self,
        target: &ProbeTarget,
        opcode: u16,
    ) -> Option<chrono::NaiveDateTime> {
        let mut graph = self.graph.lock().await;
        let now = chrono::Utc::now().naive_utc();
        let store = match target {
            ProbeTarget::System(ctl) => &mut graph.systems.get_mut(ctl)?.store,
            ProbeTarget::Dhw(ctl) => &mut graph.systems.get_mut(ctl)?.dhw.as_mut()?.store,
            ProbeTarget::Zone(ctl, idx) => {
                &mut graph.systems.get_mut(ctl)?.zones.get_mut(idx)?.store
            }
        };
        store.get(opcode, None, None, now).map(|msg| msg.frame.dtm)
    }

    /// Send an `RQ` probe for `opcode` against `target`'s controller,
    /// fire-and-forget (discovery probes don't block on a reply).
    pub(crate) async fn send_probe(&self, target: &ProbeTarget, opcode: u16) {
        let ctl = match target {
            ProbeTarget::System(ctl) | ProbeTarget::Dhw(ctl) | ProbeTarget::Zone(ctl, _) => *ctl,
        };
        let payload = match target {
            ProbeTarget::Zone(_, idx) => idx.clone(),
            ProbeTarget::Dhw(_) => "FA".to_string(),
            ProbeTarget::System(_) => "00".to_string(),
        };
        let cmd = Command::new(
            crate::model::frame::Verb::RQ,
            Address::new(18, 0),
            ctl,
            opcode,
            payload,
            false,
        );
        if let Err(err) = self
            .send_cmd(cmd, Some(false), None, None, SendPriority::Low)
            .await
        {
            debug!(%err, opcode = %format!("{opcode:04X}"), "discovery probe not sent");
        }
    }

    /// Current promotion state of a zone, if its system and zone are
    /// already known.
    pub async fn zone_type(&self, controller: Address, idx: &str) -> Option<crate::entities::zone::ZoneType> {
        let graph = self.graph.lock().await;
        graph
            .systems
            .get(&controller)?
            .zones
            .get(idx)
            .map(|z| z.zone_type)
    }

    /// Whether `controller` has an established system in the graph.
    pub async fn has_system(&self, controller: Address) -> bool {
        self.graph.lock().await.systems.contains_key(&controller)
    }

    /// Whether `device` is attached under `controller`'s system.
    pub async fn has_device(&self, controller: Address, device: Address) -> bool {
        self.graph
            .lock()
            .await
            .systems
            .get(&controller)
            .map(|sys| sys.devices.contains_key(&device))
            .unwrap_or(false)
    }

    fn apply_promotions(&self, graph: &mut Graph, frame: &Frame) -> Result<()> {
        let Some(idx) = frame.idx() else { return Ok(()) };
        let system_addr = if graph.systems.contains_key(&frame.src) {
            Some(frame.src)
        } else {
            graph.device_parent(frame.src)
        };
        let Some(system) = system_addr.and_then(|addr| graph.systems.get_mut(&addr)) else {
            return Ok(());
        };
        match frame.opcode {
            0x0008 | 0x0009 => {
                if let Ok(zone) = system.zone_mut(&idx) {
                    zone.observe_relay_demand()?;
                }
            }
            0x3150 => {
                let class = match frame.src.device_type {
                    DEVICE_TYPE_TRV => Some(ZoneSourceClass::Trv),
                    DEVICE_TYPE_RELAY => Some(ZoneSourceClass::Relay),
                    DEVICE_TYPE_UFH_CONTROLLER => Some(ZoneSourceClass::UfhController),
                    _ => None,
                };
                if let (Ok(zone), Some(class)) = (system.zone_mut(&idx), class) {
                    zone.observe_heat_demand(class)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Graph {
    fn ensure_system(&mut self, controller: Address, max_zones: u8) {
        self.systems
            .entry(controller)
            .or_insert_with(|| System::new(controller, max_zones));
        self.orphans.remove(&controller);
    }

    fn attach_device(&mut self, addr: Address, parent: Option<Address>) {
        if let Some(ctl) = parent
            && let Some(system) = self.systems.get_mut(&ctl)
        {
            system.device_mut(addr);
            self.orphans.remove(&addr);
            return;
        }
        self.attach_orphan(addr);
    }

    fn attach_orphan(&mut self, addr: Address) {
        if !self.systems.contains_key(&addr) {
            self.orphans
                .entry(addr)
                .or_insert_with(|| Device::new(addr, None));
        }
    }

    fn controller_owning(&self, addr: Address) -> Option<Address> {
        self.systems
            .values()
            .find(|sys| sys.devices.contains_key(&addr))
            .map(|sys| sys.controller)
    }

    fn device_parent(&self, addr: Address) -> Option<Address> {
        self.orphans
            .get(&addr)
            .and_then(|d| d.parent)
            .or_else(|| self.controller_owning(addr))
    }

    fn store_for(&mut self, src: Address, dst: Address) -> &mut crate::store::entity_store::EntityStore {
        if let Some(system) = self.systems.get_mut(&src) {
            return &mut system.store;
        }
        if let Some(system) = self.systems.get_mut(&dst) {
            return &mut system.store;
        }
        if let Some(ctl) = self.controller_owning(src) {
            return &mut self.systems.get_mut(&ctl).expect("just resolved").store;
        }
        &mut self
            .orphans
            .entry(src)
            .or_insert_with(|| Device::new(src, None))
            .store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;

    #[tokio::test]
    async fn controller_device_frame_creates_a_system_and_device() {
        let (a, _b) = ChannelTransport::pair();
        let gw = Gateway::new(FsmConfig::default(), Arc::new(a), 12, true);
        gw.ingest_line("085  I --- 01:145038 --:------ 13:111111 3150 002 0046")
            .await
            .expect("ingest ok");
        let graph = gw.graph.lock().await;
        assert!(graph.systems.contains_key(&Address::new(1, 145038)));
        assert!(
            graph
                .systems
                .get(&Address::new(1, 145038))
                .expect("system")
                .devices
                .contains_key(&Address::new(13, 111111))
        );
    }

    #[tokio::test]
    async fn self_announce_creates_an_orphan_device() {
        let (a, _b) = ChannelTransport::pair();
        let gw = Gateway::new(FsmConfig::default(), Arc::new(a), 12, true);
        gw.ingest_line("000  I --- 03:150994 --:------ 03:150994 30C9 003 000891")
            .await
            .expect("ingest ok");
        let graph = gw.graph.lock().await;
        assert!(graph.orphans.contains_key(&Address::new(3, 150994)));
    }
}
