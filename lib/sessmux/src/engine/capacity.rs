// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! How many sessions may a run hold at once?
//!
//! Every session may own a descriptor, so capacity is derived from the
//! process descriptor limit, leaving headroom for the descriptors that
//! aren't sessions (the virtual interface, the notifier, logging).

use crate::provider::LogLevel;
use crate::provider::LogProvider;
use nix::sys::resource::Resource;
use nix::sys::resource::getrlimit;

/// The descriptor limits of this process.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DescriptorLimit {
    pub soft: u64,
    pub hard: u64,
}

/// Query `RLIMIT_NOFILE`.
pub fn probe_descriptor_limit() -> nix::Result<DescriptorLimit> {
    let (soft, hard) = getrlimit(Resource::RLIMIT_NOFILE)?;
    Ok(DescriptorLimit { soft: soft as u64, hard: hard as u64 })
}

/// The session capacity for a given probe result.
///
/// A failed probe yields `hard_ceiling`. Otherwise `fraction_pct`
/// percent of the soft limit, capped at `hard_ceiling` and never less
/// than one.
pub fn max_sessions_for(
    probe: nix::Result<DescriptorLimit>,
    hard_ceiling: usize,
    fraction_pct: u8,
) -> usize {
    let hard_ceiling = hard_ceiling.max(1);
    match probe {
        Ok(limit) => {
            let share = u128::from(limit.soft) * u128::from(fraction_pct) / 100;
            let share = usize::try_from(share).unwrap_or(usize::MAX);
            share.clamp(1, hard_ceiling)
        }
        Err(_) => hard_ceiling,
    }
}

/// Compute the capacity of this run from the live descriptor limit.
pub fn compute_max_sessions(
    hard_ceiling: usize,
    fraction_pct: u8,
    log: &dyn LogProvider,
) -> usize {
    let probe = probe_descriptor_limit();
    let max = max_sessions_for(probe, hard_ceiling, fraction_pct);
    let msg = match probe {
        Ok(limit) => format!(
            "getrlimit soft {} hard {} max sessions {max}",
            limit.soft, limit.hard
        ),
        Err(e) => format!(
            "getrlimit error {}: {}, max sessions {max}",
            e as i32,
            e.desc()
        ),
    };
    log.log(LogLevel::Warn, &msg);
    max
}
