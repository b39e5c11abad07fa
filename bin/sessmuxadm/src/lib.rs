// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Session reactor administration library

use nix::errno::Errno;
use sessmux::cfg::CfgError;
use sessmux::cfg::ReactorCfg;
use sessmux::engine::capacity::DescriptorLimit;
use sessmux::engine::capacity::max_sessions_for;
use sessmux::engine::capacity::probe_descriptor_limit;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use tabwriter::TabWriter;

/// Load the configuration at `path`, or the defaults when there is
/// none.
pub fn load_cfg(path: Option<&Path>) -> Result<ReactorCfg, CfgError> {
    match path {
        Some(path) => ReactorCfg::load(path),
        None => Ok(ReactorCfg::default()),
    }
}

/// The session capacity a reactor started now would use.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub probe: Result<DescriptorLimit, Errno>,
    pub descriptor_fraction: u8,
    pub max_table_size: usize,
    pub max_sessions: usize,
}

impl Limits {
    pub fn measure(cfg: &ReactorCfg) -> Self {
        Self::from_probe(cfg, probe_descriptor_limit())
    }

    pub fn from_probe(
        cfg: &ReactorCfg,
        probe: Result<DescriptorLimit, Errno>,
    ) -> Self {
        let max_sessions = max_sessions_for(
            probe,
            cfg.max_table_size,
            cfg.descriptor_fraction,
        );
        Self {
            probe,
            descriptor_fraction: cfg.descriptor_fraction,
            max_table_size: cfg.max_table_size,
            max_sessions,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let (soft, hard) = match self.probe {
            Ok(l) => (Some(l.soft), Some(l.hard)),
            Err(_) => (None, None),
        };
        json!({
            "soft": soft,
            "hard": hard,
            "descriptor_fraction": self.descriptor_fraction,
            "max_table_size": self.max_table_size,
            "max_sessions": self.max_sessions,
        })
    }

    pub fn print_into(&self, writer: &mut impl Write) -> std::io::Result<()> {
        let mut t = TabWriter::new(writer);
        match self.probe {
            Ok(l) => {
                writeln!(t, "RLIMIT_NOFILE soft\t{}", l.soft)?;
                writeln!(t, "RLIMIT_NOFILE hard\t{}", l.hard)?;
            }
            Err(errno) => {
                writeln!(t, "RLIMIT_NOFILE\terror {}: {}", errno as i32, errno.desc())?
            }
        }
        writeln!(t, "descriptor fraction\t{}%", self.descriptor_fraction)?;
        writeln!(t, "max table size\t{}", self.max_table_size)?;
        writeln!(t, "max sessions\t{}", self.max_sessions)?;
        t.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn limits_fail_open() {
        let cfg = ReactorCfg::default();
        let l = Limits::from_probe(&cfg, Err(Errno::EPERM));
        assert_eq!(l.max_sessions, 409);
        assert_eq!(l.to_json()["soft"], serde_json::Value::Null);

        let mut out = vec![];
        l.print_into(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("error 1"));
        assert!(out.lines().last().unwrap().ends_with("409"));
    }

    #[test]
    fn limits_from_soft() {
        let cfg = ReactorCfg::default();
        let l = Limits::from_probe(
            &cfg,
            Ok(DescriptorLimit { soft: 256, hard: 4096 }),
        );
        assert_eq!(l.max_sessions, 102);
        assert_eq!(l.to_json()["hard"], 4096);
    }

    #[test]
    fn load_default_or_file() {
        assert_eq!(load_cfg(None).unwrap(), ReactorCfg::default());

        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "descriptor_fraction = 25").unwrap();
        assert_eq!(load_cfg(Some(f.path())).unwrap().descriptor_fraction, 25);
    }
}
