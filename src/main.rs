// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use ramses_core::{
    cfg::{
        cli::resolve_config_path,
        config::{GatewayConfig, TransportConfig},
        logger::init_logger_from_config,
    },
    discovery::DiscoveryScheduler,
    entities::gateway::Gateway,
    transport::{ChannelTransport, StdioTransport},
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg_path =
        resolve_config_path("config/gateway.yaml").context("failed to resolve config path")?;
    let cfg = GatewayConfig::load_from_file(cfg_path).context("failed to load gateway config")?;

    let _logger_guard = init_logger_from_config(cfg.log.clone())?;
    info!("ramses-gateway starting up");

    let (source, sink) = match cfg.transport {
        TransportConfig::Stdio => {
            let t = Arc::new(StdioTransport::default());
            (t.clone() as Arc<dyn ramses_core::transport::ByteLineSource>, t as Arc<dyn ramses_core::transport::ByteLineSink>)
        }
        TransportConfig::Channel => {
            let (a, _b) = ChannelTransport::pair();
            let a = Arc::new(a);
            (a.clone() as Arc<dyn ramses_core::transport::ByteLineSource>, a as Arc<dyn ramses_core::transport::ByteLineSink>)
        }
    };

    let gateway = Gateway::new(cfg.fsm.to_fsm_config(), sink, cfg.max_zones, cfg.eavesdrop);

    let cancel = CancellationToken::new();
    let discovery_handle = if cfg.discovery.enabled {
        let scheduler = DiscoveryScheduler::new(gateway.clone(), cancel.child_token());
        Some(tokio::spawn(scheduler.run()))
    } else {
        None
    };

    let run_cancel = cancel.clone();
    let run_gateway = gateway.clone();
    let run_handle = tokio::spawn(async move {
        tokio::select! {
            _ = run_cancel.cancelled() => Ok(()),
            result = run_gateway.run(source) => result,
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    cancel.cancel();

    if let Some(handle) = discovery_handle {
        let _ = handle.await;
    }
    run_handle.await.context("gateway run loop panicked")??;

    Ok(())
}
