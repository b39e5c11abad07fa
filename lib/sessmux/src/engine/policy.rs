// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Idle timeouts and eviction.
//!
//! Every session kind has a base idle timeout which is scaled down
//! linearly as the table fills: at zero load a session gets its full
//! base timeout, at full load it gets the policy floor. Idle sessions
//! are therefore reclaimed faster exactly when room is needed for new
//! ones, but no idle session is ever killed instantly.

use super::session::ProtoState;
use super::session::Session;
use crate::api::DNS_PORT;
use crate::api::TcpState;
use crate::cfg::TimeoutCfg;
use crate::time::Moment;
use core::fmt;
use core::time::Duration;

/// Slack added to a session's remaining time so that the wake up
/// lands just after the session expires rather than just before.
pub const EXPIRY_SLACK: Duration = Duration::from_secs(1);

/// The current occupancy of the table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Load {
    pub active: usize,
    pub max: usize,
}

impl Load {
    pub const fn new(active: usize, max: usize) -> Self {
        Self { active, max }
    }

    /// How much of the base timeout is left at this load, in percent.
    ///
    /// A zero `max` counts as full.
    pub fn scale_pct(&self) -> u64 {
        if self.max == 0 {
            return 0;
        }
        let used = (self.active as u128 * 100 / self.max as u128).min(100);
        100 - used as u64
    }
}

/// The timeout class of a session.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TimeoutKind {
    Icmp,
    /// UDP to the DNS port.
    UdpDns,
    Udp,
    /// TCP still in the handshake.
    TcpInit,
    /// Established TCP.
    TcpIdle,
    /// TCP on its way out.
    TcpClose,
}

impl TimeoutKind {
    pub const ALL: [TimeoutKind; 6] = [
        Self::Icmp,
        Self::UdpDns,
        Self::Udp,
        Self::TcpInit,
        Self::TcpIdle,
        Self::TcpClose,
    ];

    pub fn of(session: &Session) -> Self {
        match session.state() {
            ProtoState::Icmp(_) => Self::Icmp,
            ProtoState::Udp(udp) if udp.dport == DNS_PORT => Self::UdpDns,
            ProtoState::Udp(_) => Self::Udp,
            ProtoState::Tcp(tcp) if tcp.state.is_opening() => Self::TcpInit,
            ProtoState::Tcp(tcp) if tcp.state == TcpState::Established => {
                Self::TcpIdle
            }
            ProtoState::Tcp(_) => Self::TcpClose,
        }
    }
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Icmp => "ICMP",
            Self::UdpDns => "UDP/53",
            Self::Udp => "UDP",
            Self::TcpInit => "TCP-INIT",
            Self::TcpIdle => "TCP-IDLE",
            Self::TcpClose => "TCP-CLOSE",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug)]
pub struct TimeoutPolicy {
    icmp: Duration,
    udp_dns: Duration,
    udp: Duration,
    tcp_init: Duration,
    tcp_idle: Duration,
    tcp_close: Duration,
    floor: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from(&TimeoutCfg::default())
    }
}

impl From<&TimeoutCfg> for TimeoutPolicy {
    fn from(cfg: &TimeoutCfg) -> Self {
        Self {
            icmp: Duration::from_secs(cfg.icmp_secs),
            udp_dns: Duration::from_secs(cfg.udp_dns_secs),
            udp: Duration::from_secs(cfg.udp_secs),
            tcp_init: Duration::from_secs(cfg.tcp_init_secs),
            tcp_idle: Duration::from_secs(cfg.tcp_idle_secs),
            tcp_close: Duration::from_secs(cfg.tcp_close_secs),
            // A zero floor would allow instant eviction.
            floor: Duration::from_millis(cfg.floor_ms.max(1)),
        }
    }
}

impl TimeoutPolicy {
    pub fn base(&self, kind: TimeoutKind) -> Duration {
        match kind {
            TimeoutKind::Icmp => self.icmp,
            TimeoutKind::UdpDns => self.udp_dns,
            TimeoutKind::Udp => self.udp,
            TimeoutKind::TcpInit => self.tcp_init,
            TimeoutKind::TcpIdle => self.tcp_idle,
            TimeoutKind::TcpClose => self.tcp_close,
        }
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    /// The idle timeout for `kind` when `active` of `max` sessions are
    /// in use.
    ///
    /// Non-increasing in `active` and never below the floor.
    pub fn timeout_for(
        &self,
        kind: TimeoutKind,
        active: usize,
        max: usize,
    ) -> Duration {
        let base_ms = self.base(kind).as_millis();
        let pct = u128::from(Load::new(active, max).scale_pct());
        let scaled = base_ms * pct / 100;
        let scaled = u64::try_from(scaled).unwrap_or(u64::MAX);
        Duration::from_millis(scaled).max(self.floor)
    }

    pub fn session_timeout(&self, session: &Session, load: Load) -> Duration {
        self.timeout_for(TimeoutKind::of(session), load.active, load.max)
    }

    /// Has `session` been idle for longer than its timeout?
    pub fn is_idle(&self, session: &Session, load: Load, now: Moment) -> bool {
        now.since(session.last_activity()) > self.session_timeout(session, load)
    }

    /// Should `session` be deleted in this reconciliation pass?
    ///
    /// Stopped ICMP, non-active UDP and closing TCP sessions always
    /// go; everything else goes once it has been idle too long.
    pub fn should_evict(&self, session: &Session, load: Load, now: Moment) -> bool {
        if !session.is_active() {
            return true;
        }
        self.is_idle(session, load, now)
    }

    /// The time left before `session` expires, plus [`EXPIRY_SLACK`].
    ///
    /// `None` for sessions which are already terminal or overdue and
    /// thus don't contribute a wake up deadline.
    pub fn remaining(
        &self,
        session: &Session,
        load: Load,
        now: Moment,
    ) -> Option<Duration> {
        if !session.is_active() {
            return None;
        }
        let idle = now.since(session.last_activity());
        let left = self.session_timeout(session, load).saturating_sub(idle);
        if left.is_zero() {
            return None;
        }
        Some(left.saturating_add(EXPIRY_SLACK))
    }
}

/// The bounds on a computed wait deadline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitBounds {
    pub floor: Duration,
    pub ceiling: Duration,
}

impl WaitBounds {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let floor = floor.max(Duration::from_millis(1));
        Self { floor, ceiling: ceiling.max(floor) }
    }
}

/// A running minimum of the per-session remaining times.
#[derive(Clone, Copy, Debug)]
pub struct NextWake {
    bounds: WaitBounds,
    min: Option<Duration>,
}

impl NextWake {
    pub fn new(bounds: WaitBounds) -> Self {
        Self { bounds, min: None }
    }

    pub fn fold(&mut self, remaining: Duration) {
        self.min = Some(match self.min {
            Some(m) => m.min(remaining),
            None => remaining,
        });
    }

    /// The wait deadline: the smallest remaining time clamped to the
    /// bounds, or the floor when nothing is pending.
    pub fn deadline(&self) -> Duration {
        match self.min {
            Some(m) => m.clamp(self.bounds.floor, self.bounds.ceiling),
            None => self.bounds.floor,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::UdpState;

    #[test]
    fn timeout_monotonic_in_load() {
        let p = TimeoutPolicy::default();
        for kind in TimeoutKind::ALL {
            let mut prev = p.timeout_for(kind, 0, 100);
            assert_eq!(prev, p.base(kind));
            for active in 1..=150 {
                let t = p.timeout_for(kind, active, 100);
                assert!(t <= prev, "{kind} at {active}: {t:?} > {prev:?}");
                assert!(t >= p.floor());
                prev = t;
            }
            assert_eq!(p.timeout_for(kind, 100, 100), p.floor());
        }
    }

    #[test]
    fn zero_capacity_is_full() {
        let p = TimeoutPolicy::default();
        assert_eq!(p.timeout_for(TimeoutKind::Udp, 0, 0), p.floor());
    }

    #[test]
    fn half_load_halves() {
        let p = TimeoutPolicy::default();
        assert_eq!(
            p.timeout_for(TimeoutKind::Udp, 50, 100),
            Duration::from_secs(150)
        );
    }

    #[test]
    fn kinds() {
        let now = Moment::now();
        assert_eq!(TimeoutKind::of(&Session::icmpv6(None, 1, now)), TimeoutKind::Icmp);
        assert_eq!(TimeoutKind::of(&Session::udp(None, 53, now)), TimeoutKind::UdpDns);
        assert_eq!(TimeoutKind::of(&Session::udp(None, 443, now)), TimeoutKind::Udp);
        let tcp = |st| TimeoutKind::of(&Session::tcp(None, 80, st, now));
        assert_eq!(tcp(TcpState::SynRecv), TimeoutKind::TcpInit);
        assert_eq!(tcp(TcpState::Listen), TimeoutKind::TcpInit);
        assert_eq!(tcp(TcpState::Established), TimeoutKind::TcpIdle);
        assert_eq!(tcp(TcpState::FinWait1), TimeoutKind::TcpClose);
    }

    #[test]
    fn evict_terminal_regardless_of_activity() {
        let p = TimeoutPolicy::default();
        let now = Moment::now();
        let load = Load::new(1, 100);

        let mut udp = Session::udp(None, 443, now);
        assert!(!p.should_evict(&udp, load, now));
        udp.udp_mut().unwrap().state = UdpState::Closed;
        assert!(p.should_evict(&udp, load, now));
        assert_eq!(p.remaining(&udp, load, now), None);

        let mut tcp = Session::tcp(None, 80, TcpState::Established, now);
        tcp.tcp_mut().unwrap().state = TcpState::Close;
        assert!(p.should_evict(&tcp, load, now));
    }

    #[test]
    fn remaining_includes_slack() {
        let p = TimeoutPolicy::default();
        let t0 = Moment::now();
        let s = Session::icmp(None, 1, t0);
        let load = Load::new(0, 100);

        let left = p.remaining(&s, load, t0 + Duration::from_secs(2)).unwrap();
        assert_eq!(left, Duration::from_secs(3) + EXPIRY_SLACK);
        assert_eq!(p.remaining(&s, load, t0 + Duration::from_secs(5)), None);
        assert!(!p.should_evict(&s, load, t0 + Duration::from_secs(5)));
        assert!(p.should_evict(&s, load, t0 + Duration::from_millis(5_001)));
    }

    #[test]
    fn huge_base_saturates() {
        let cfg = TimeoutCfg { udp_secs: u64::MAX / 2, ..Default::default() };
        let p = TimeoutPolicy::from(&cfg);
        let t0 = Moment::now();
        let s = Session::udp(None, 443, t0);

        let t = p.timeout_for(TimeoutKind::Udp, 1, 100);
        assert!(t >= p.timeout_for(TimeoutKind::Udp, 2, 100));
        assert!(t > Duration::from_secs(365 * 24 * 3600));
        assert!(p.remaining(&s, Load::new(1, 100), t0).is_some());
        assert!(!p.should_evict(&s, Load::new(1, 100), t0));
    }

    #[test]
    fn next_wake_bounds() {
        let b = WaitBounds::new(Duration::from_secs(1), Duration::from_secs(60));
        let mut w = NextWake::new(b);
        assert_eq!(w.deadline(), Duration::from_secs(1));
        w.fold(Duration::from_secs(300));
        assert_eq!(w.deadline(), Duration::from_secs(60));
        w.fold(Duration::from_secs(7));
        w.fold(Duration::from_secs(9));
        assert_eq!(w.deadline(), Duration::from_secs(7));
        w.fold(Duration::from_millis(10));
        assert_eq!(w.deadline(), Duration::from_secs(1));
    }
}
