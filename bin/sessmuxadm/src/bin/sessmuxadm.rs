// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use anyhow::Context;
use clap::Args;
use clap::Parser;
use sessmux::engine::policy::Load;
use sessmux::engine::policy::TimeoutPolicy;
use sessmux::print::print_timeouts;
use sessmuxadm::Limits;
use sessmuxadm::load_cfg;
use std::path::PathBuf;

/// Administer and inspect the session reactor
#[derive(Debug, Parser)]
enum Command {
    /// Show the descriptor limits and the resulting session capacity
    Limits {
        #[command(flatten)]
        cfg: CfgPath,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the idle timeout of every session kind at a given load
    Timeouts {
        #[command(flatten)]
        cfg: CfgPath,

        /// Number of active sessions
        #[arg(long, default_value_t = 0)]
        active: usize,

        /// Session capacity, the live capacity when omitted
        #[arg(long)]
        max: Option<usize>,
    },

    /// Validate a configuration file and print it with every default
    /// filled in
    CheckConfig {
        /// The TOML file to check
        path: PathBuf,
    },
}

#[derive(Debug, Args)]
struct CfgPath {
    /// Reactor configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cmd = Command::parse();

    match cmd {
        Command::Limits { cfg, json } => {
            let cfg = load_cfg(cfg.config.as_deref())?;
            let limits = Limits::measure(&cfg);
            if json {
                println!("{}", serde_json::to_string_pretty(&limits.to_json())?);
            } else {
                limits.print_into(&mut std::io::stdout())?;
            }
        }

        Command::Timeouts { cfg, active, max } => {
            let cfg = load_cfg(cfg.config.as_deref())?;
            let max =
                max.unwrap_or_else(|| Limits::measure(&cfg).max_sessions);
            let policy = TimeoutPolicy::from(&cfg.timeouts);
            print_timeouts(&policy, Load::new(active, max))?;
        }

        Command::CheckConfig { path } => {
            let cfg = load_cfg(Some(path.as_path()))
                .with_context(|| format!("checking {}", path.display()))?;
            print!("{}", cfg.to_toml_string()?);
        }
    }

    Ok(())
}
