// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Print sessions and timeout tables in a human-friendly manner.
//!
//! Shared by sessmuxadm and the integration tests.

use crate::api::SessionDump;
use crate::engine::policy::Load;
use crate::engine::policy::TimeoutKind;
use crate::engine::policy::TimeoutPolicy;
use std::io::Write;
use tabwriter::TabWriter;

/// Print a list of [`SessionDump`]s.
pub fn print_sessions(sessions: &[SessionDump]) -> std::io::Result<()> {
    print_sessions_into(&mut std::io::stdout(), sessions)
}

/// Print a list of [`SessionDump`]s into a given writer.
pub fn print_sessions_into(
    writer: &mut impl Write,
    sessions: &[SessionDump],
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "Sessions: {}", sessions.len())?;
    write_hr(&mut t)?;
    writeln!(t, "ID\tPROTO\tFD\tACTIVE\tIDLE (ms)\tSENT\tRECV\tSTATE")?;

    for s in sessions {
        let fd = match s.fd {
            Some(fd) => fd.to_string(),
            None => "-".to_string(),
        };
        writeln!(
            t,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            s.id,
            s.protocol,
            fd,
            s.active,
            s.idle_ms,
            s.sent,
            s.received,
            s.state,
        )?;
    }
    t.flush()
}

/// Print the timeout of every session kind at the given load.
pub fn print_timeouts(policy: &TimeoutPolicy, load: Load) -> std::io::Result<()> {
    print_timeouts_into(&mut std::io::stdout(), policy, load)
}

/// Print the timeout of every session kind at the given load into a
/// given writer.
pub fn print_timeouts_into(
    writer: &mut impl Write,
    policy: &TimeoutPolicy,
    load: Load,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(
        t,
        "Load: {}/{} ({}% of base)",
        load.active,
        load.max,
        load.scale_pct()
    )?;
    write_hr(&mut t)?;
    writeln!(t, "KIND\tBASE (ms)\tTIMEOUT (ms)")?;

    for kind in TimeoutKind::ALL {
        writeln!(
            t,
            "{}\t{}\t{}",
            kind,
            policy.base(kind).as_millis(),
            policy.timeout_for(kind, load.active, load.max).as_millis(),
        )?;
    }
    t.flush()
}

/// Print a horizontal rule.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::Protocol;

    #[test]
    fn sessions_table() {
        let dumps = vec![SessionDump {
            id: 7,
            protocol: Protocol::Udp,
            fd: None,
            state: "ACTIVE dport=53".to_string(),
            active: true,
            idle_ms: 250,
            sent: 1,
            received: 2,
        }];
        let mut out = vec![];
        print_sessions_into(&mut out, &dumps).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Sessions: 1\n"));
        let row = out.lines().last().unwrap();
        let cols: Vec<_> = row.split_whitespace().collect();
        assert_eq!(&cols[..7], &["7", "UDP", "-", "true", "250", "1", "2"]);
    }

    #[test]
    fn timeouts_table() {
        let mut out = vec![];
        print_timeouts_into(&mut out, &TimeoutPolicy::default(), Load::new(50, 100))
            .unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("50% of base"));
        let udp = out
            .lines()
            .find(|l| l.starts_with("UDP "))
            .unwrap()
            .split_whitespace()
            .collect::<Vec<_>>();
        assert_eq!(udp, vec!["UDP", "300000", "150000"]);
    }
}
