// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Drives [`Gateway`] through a sequence of observed frames and checks
//! the entity-graph construction and zone-type promotion rules land
//! where they should.

use std::sync::Arc;

use ramses_core::{
    entities::{gateway::Gateway, zone::ZoneType},
    error::RamsesError,
    fsm::context::FsmConfig,
    model::address::Address,
    transport::ChannelTransport,
};

const CONTROLLER: Address = Address { device_type: 1, tag: 145038 };
const RELAY: Address = Address { device_type: 13, tag: 111111 };
const TRV: Address = Address { device_type: 4, tag: 222222 };

fn gateway() -> Arc<Gateway> {
    let (a, _b) = ChannelTransport::pair();
    Gateway::new(FsmConfig::default(), Arc::new(a), 12, true)
}

#[tokio::test]
async fn relay_failsafe_then_heat_demand_promotes_ele_to_val() {
    let gw = gateway();

    gw.ingest_line("067  I --- 13:111111 01:145038 --:------ 0009 002 00FF")
        .await
        .expect("ingest ok");
    assert!(gw.has_system(CONTROLLER).await);
    assert!(gw.has_device(CONTROLLER, RELAY).await);
    assert_eq!(gw.zone_type(CONTROLLER, "00").await, Some(ZoneType::Ele));

    gw.ingest_line("068  I --- 13:111111 01:145038 --:------ 3150 002 0064")
        .await
        .expect("ingest ok");
    assert_eq!(gw.zone_type(CONTROLLER, "00").await, Some(ZoneType::Val));
}

#[tokio::test]
async fn trv_heat_demand_promotes_unknown_zone_to_rad() {
    let gw = gateway();

    gw.ingest_line("070  I --- 04:222222 01:145038 --:------ 3150 002 0132")
        .await
        .expect("ingest ok");
    assert!(gw.has_device(CONTROLLER, TRV).await);
    assert_eq!(gw.zone_type(CONTROLLER, "01").await, Some(ZoneType::Rad));
}

#[tokio::test]
async fn rad_zone_raises_corrupt_state_on_a_conflicting_relay_reading() {
    let gw = gateway();

    gw.ingest_line("070  I --- 04:222222 01:145038 --:------ 3150 002 0132")
        .await
        .expect("ingest ok");
    assert_eq!(gw.zone_type(CONTROLLER, "01").await, Some(ZoneType::Rad));

    // A relay reporting against the same zone index cannot move a
    // terminal Rad zone to Val; the conflict surfaces as CorruptState
    // and the zone's type is left unchanged.
    let err = gw
        .ingest_line("071  I --- 13:111111 01:145038 --:------ 3150 002 0164")
        .await
        .expect_err("conflicting promotion must be rejected");
    assert!(matches!(err, RamsesError::CorruptState(_)));
    assert_eq!(gw.zone_type(CONTROLLER, "01").await, Some(ZoneType::Rad));
}
