// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Moments.

use core::ops::Add;
use core::time::Duration;
use std::time::Instant;

/// The number of milliseconds in a second.
pub const MILLIS: u64 = 1_000;

/// A moment in time.
///
/// All eviction decisions made in one reconciliation pass share a
/// single `Moment`, so passing it around explicitly (rather than
/// reading the clock at each decision) is what keeps the pass
/// consistent. It also lets tests move time forward.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Moment {
    inner: Instant,
}

impl Add<Duration> for Moment {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Moment { inner: self.inner + rhs }
    }
}

impl Moment {
    /// Compute the delta between `self - earlier` and return as
    /// milliseconds. A negative delta is clamped to zero.
    pub fn delta_as_millis(&self, earlier: Moment) -> u64 {
        let delta = self.since(earlier);
        delta.as_secs() * MILLIS + u64::from(delta.subsec_millis())
    }

    /// The time elapsed from `earlier` to `self`, or zero if `earlier`
    /// is actually later.
    pub fn since(&self, earlier: Moment) -> Duration {
        self.inner.saturating_duration_since(earlier.inner)
    }

    pub fn now() -> Self {
        Self { inner: Instant::now() }
    }
}

impl Default for Moment {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn delta() {
        let t0 = Moment::now();
        let t1 = t0 + Duration::new(2, 250_000_000);
        assert_eq!(t1.delta_as_millis(t0), 2_250);
        assert_eq!(t1.since(t0), Duration::from_millis(2_250));
    }

    #[test]
    fn delta_never_negative() {
        let t0 = Moment::now();
        let t1 = t0 + Duration::from_secs(5);
        assert_eq!(t0.delta_as_millis(t1), 0);
        assert_eq!(t0.since(t1), Duration::ZERO);
    }
}
