// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Reactor configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Configuration is always validated after loading.

use core::time::Duration;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CfgError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The largest base timeout accepted, one week.
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 3600;

/// Base idle timeouts at zero load, per session kind.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct TimeoutCfg {
    pub icmp_secs: u64,
    /// UDP to the DNS port.
    pub udp_dns_secs: u64,
    pub udp_secs: u64,
    /// TCP in LISTEN, SYN_SENT or SYN_RECV.
    pub tcp_init_secs: u64,
    /// TCP in ESTABLISHED.
    pub tcp_idle_secs: u64,
    /// TCP in any closing state.
    pub tcp_close_secs: u64,
    /// The timeout of every kind at full load.
    pub floor_ms: u64,
}

impl Default for TimeoutCfg {
    fn default() -> Self {
        Self {
            icmp_secs: 5,
            udp_dns_secs: 15,
            udp_secs: 300,
            tcp_init_secs: 20,
            tcp_idle_secs: 3600,
            tcp_close_secs: 20,
            floor_ms: 1000,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ReactorCfg {
    /// Hard ceiling on sessions regardless of the descriptor limit.
    pub max_table_size: usize,
    /// Percent of the soft descriptor limit available to sessions.
    pub descriptor_fraction: u8,
    /// Minimum time between reconciliation passes. Also the wait used
    /// when a pass was skipped.
    pub reconciliation_min_interval_ms: u64,
    pub wait_timeout_floor_secs: u64,
    pub wait_timeout_ceiling_secs: u64,
    pub max_events_per_wait: usize,
    pub timeouts: TimeoutCfg,
}

impl Default for ReactorCfg {
    fn default() -> Self {
        Self {
            max_table_size: 1024 * 40 / 100,
            descriptor_fraction: 40,
            reconciliation_min_interval_ms: 100,
            wait_timeout_floor_secs: 1,
            wait_timeout_ceiling_secs: 3600,
            max_events_per_wait: 20,
            timeouts: TimeoutCfg::default(),
        }
    }
}

impl ReactorCfg {
    pub fn reconciliation_min_interval(&self) -> Duration {
        Duration::from_millis(self.reconciliation_min_interval_ms)
    }

    pub fn wait_timeout_floor(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_floor_secs)
    }

    pub fn wait_timeout_ceiling(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_ceiling_secs)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, CfgError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CfgError> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|source| CfgError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn to_toml_string(&self) -> Result<String, CfgError> {
        toml::to_string(self).map_err(|e| CfgError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), CfgError> {
        let invalid = |msg: &str| Err(CfgError::Invalid(msg.to_string()));

        if self.max_table_size == 0 {
            return invalid("max_table_size must be non-zero");
        }
        if self.descriptor_fraction == 0 || self.descriptor_fraction > 100 {
            return invalid("descriptor_fraction must be within 1..=100");
        }
        if self.reconciliation_min_interval_ms == 0 {
            return invalid("reconciliation_min_interval_ms must be non-zero");
        }
        if self.wait_timeout_floor_secs == 0 {
            return invalid("wait_timeout_floor_secs must be non-zero");
        }
        if self.wait_timeout_ceiling_secs < self.wait_timeout_floor_secs {
            return invalid(
                "wait_timeout_ceiling_secs must not be below the floor",
            );
        }
        if self.max_events_per_wait == 0 {
            return invalid("max_events_per_wait must be non-zero");
        }
        if self.timeouts.floor_ms == 0 {
            return invalid("timeouts.floor_ms must be non-zero");
        }
        if self.timeouts.floor_ms > MAX_TIMEOUT_SECS * 1000 {
            return Err(CfgError::Invalid(format!(
                "timeouts.floor_ms must not exceed {}",
                MAX_TIMEOUT_SECS * 1000
            )));
        }
        let t = &self.timeouts;
        for (name, secs) in [
            ("icmp_secs", t.icmp_secs),
            ("udp_dns_secs", t.udp_dns_secs),
            ("udp_secs", t.udp_secs),
            ("tcp_init_secs", t.tcp_init_secs),
            ("tcp_idle_secs", t.tcp_idle_secs),
            ("tcp_close_secs", t.tcp_close_secs),
        ] {
            if secs > MAX_TIMEOUT_SECS {
                return Err(CfgError::Invalid(format!(
                    "timeouts.{name} must not exceed {MAX_TIMEOUT_SECS}"
                )));
            }
        }
        Ok(())
    }
}
