// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GatewayConfig {
    /// Selects and parameterises the `ByteLineSource`/`ByteLineSink` pair.
    pub transport: TransportConfig,
    /// Upper bound on zones a `System` will track.
    #[serde(default = "default_max_zones")]
    pub max_zones: u8,
    /// Attach devices observed on traffic the gateway didn't originate
    /// to the controller they were seen talking to, instead of leaving
    /// them parentless.
    #[serde(default = "default_eavesdrop")]
    pub eavesdrop: bool,
    /// Send/Echo/Reply FSM timeouts and retry budget.
    #[serde(default)]
    pub fsm: FsmSettings,
    /// Discovery scheduler toggle and per-class cadence overrides.
    #[serde(default)]
    pub discovery: DiscoverySettings,
    /// Structured logging configuration.
    pub log: super::logger::LogConfig,
}

fn default_max_zones() -> u8 {
    12
}

fn default_eavesdrop() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum TransportConfig {
    Stdio,
    Channel,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FsmSettings {
    #[serde(default = "default_outer_timeout")]
    pub outer_timeout_secs: f64,
    #[serde(default = "default_echo_timeout")]
    pub echo_timeout_secs: f64,
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_secs: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_outer_timeout() -> f64 {
    3.0
}
fn default_echo_timeout() -> f64 {
    0.50
}
fn default_reply_timeout() -> f64 {
    0.50
}
fn default_max_retries() -> u8 {
    3
}
fn default_queue_capacity() -> usize {
    10
}

impl Default for FsmSettings {
    fn default() -> Self {
        FsmSettings {
            outer_timeout_secs: default_outer_timeout(),
            echo_timeout_secs: default_echo_timeout(),
            reply_timeout_secs: default_reply_timeout(),
            max_retries: default_max_retries(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl FsmSettings {
    pub fn to_fsm_config(&self) -> crate::fsm::context::FsmConfig {
        crate::fsm::context::FsmConfig {
            outer_timeout: std::time::Duration::from_secs_f64(self.outer_timeout_secs),
            echo_timeout: std::time::Duration::from_secs_f64(self.echo_timeout_secs),
            reply_timeout: std::time::Duration::from_secs_f64(self.reply_timeout_secs),
            max_retries: self.max_retries,
            queue_capacity: self.queue_capacity,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DiscoverySettings {
    #[serde(default = "default_discovery_enabled")]
    pub enabled: bool,
}

fn default_discovery_enabled() -> bool {
    true
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        DiscoverySettings {
            enabled: default_discovery_enabled(),
        }
    }
}

impl GatewayConfig {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: GatewayConfig =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants named in the design notes.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(self.max_zones > 0, "max_zones must be >= 1");
        ensure!(
            self.fsm.outer_timeout_secs > 0.0,
            "fsm.outer_timeout_secs must be positive"
        );
        ensure!(
            self.fsm.echo_timeout_secs > 0.0,
            "fsm.echo_timeout_secs must be positive"
        );
        ensure!(
            self.fsm.reply_timeout_secs > 0.0,
            "fsm.reply_timeout_secs must be positive"
        );
        ensure!(self.fsm.queue_capacity > 0, "fsm.queue_capacity must be >= 1");

        let min_outer = self.fsm.echo_timeout_secs
            + self.fsm.reply_timeout_secs * self.fsm.max_retries as f64;
        ensure!(
            self.fsm.outer_timeout_secs > min_outer,
            "fsm.outer_timeout_secs ({}) must exceed echo_timeout_secs + reply_timeout_secs * \
             max_retries ({min_outer})",
            self.fsm.outer_timeout_secs
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::logger::{LogConfig, Output};

    fn base_config() -> GatewayConfig {
        GatewayConfig {
            transport: TransportConfig::Stdio,
            max_zones: 12,
            eavesdrop: true,
            fsm: FsmSettings::default(),
            discovery: DiscoverySettings::default(),
            log: LogConfig {
                level: "info".to_string(),
                output: Output::Stdout,
                is_show_line: false,
                is_show_module_path: false,
                is_show_target: true,
                file: None,
            },
        }
    }

    #[test]
    fn default_settings_validate() {
        let mut cfg = base_config();
        cfg.validate_and_normalize().expect("defaults are valid");
    }

    #[test]
    fn zero_max_zones_rejected() {
        let mut cfg = base_config();
        cfg.max_zones = 0;
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn outer_timeout_not_exceeding_retry_budget_rejected() {
        let mut cfg = base_config();
        cfg.fsm.outer_timeout_secs = 2.0; // echo 0.5 + reply 0.5*3 = 2.0, needs >2.0
        assert!(cfg.validate_and_normalize().is_err());
    }
}
