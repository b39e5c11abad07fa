// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Timeout policy, capacity and reconciliation scenarios.

use nix::errno::Errno;
use sessmux::engine::capacity::DescriptorLimit;
use sessmux::engine::capacity::max_sessions_for;
use sessmux::engine::reactor::reconcile;
use sessmux_test_utils::*;
use std::time::Duration;

fn bounds() -> WaitBounds {
    WaitBounds::new(Duration::from_secs(1), Duration::from_secs(3600))
}

fn reconcile_at(
    t: &mut SessionTable,
    load: Load,
    now: Moment,
) -> sessmux::engine::reactor::Reconciliation {
    reconcile(
        t,
        &mut RecordingHandler::new(),
        &mut FakeNotifier::default(),
        &TimeoutPolicy::default(),
        load,
        now,
        bounds(),
    )
}

#[test]
fn timeout_monotonic_for_every_capacity() {
    let p = TimeoutPolicy::default();
    for max in [0, 1, 7, 100, 409, 10_000] {
        for kind in TimeoutKind::ALL {
            let mut prev = p.timeout_for(kind, 0, max);
            for active in 0..=max.min(500) + 5 {
                let t = p.timeout_for(kind, active, max);
                assert!(t > Duration::ZERO);
                assert!(t <= prev, "{kind} {active}/{max}");
                prev = t;
            }
        }
    }
}

#[test]
fn capacity_fail_open() {
    for errno in [Errno::EPERM, Errno::EINVAL, Errno::ENOSYS] {
        assert_eq!(max_sessions_for(Err(errno), 409, 40), 409);
    }
    let probe = Ok(DescriptorLimit { soft: 64, hard: 4096 });
    assert_eq!(max_sessions_for(probe, 409, 40), 25);
}

#[test]
fn deadline_lower_bound() {
    let t0 = Moment::now();
    let mut t = new_table();

    // Nothing pending: the floor.
    let rec = reconcile_at(&mut t, Load::new(0, 100), t0);
    assert_eq!(rec.next_wake, Duration::from_secs(1));

    // An ICMP session 4.5s into its 5s timeout: would be 0.5s + slack,
    // which is above the floor.
    t.insert(Session::icmp(None, 1, t0)).unwrap();
    let rec = reconcile_at(&mut t, Load::new(1, 100), t0 + Duration::from_millis(4_500));
    assert_eq!(rec.deleted, 0);
    assert_eq!(rec.next_wake, Duration::from_millis(4_950 - 4_500 + 1_000));

    // A TCP session adds a later deadline, the minimum wins.
    t.insert(Session::tcp(None, 443, TcpState::Established, t0)).unwrap();
    let rec = reconcile_at(&mut t, Load::new(2, 100), t0 + Duration::from_secs(1));
    assert_eq!(rec.next_wake, Duration::from_millis(4_900 - 1_000 + 1_000));

    // Everything idle for ages at full load: all evicted, floor again.
    let rec = reconcile_at(&mut t, Load::new(100, 100), t0 + Duration::from_secs(60));
    assert_eq!(rec.deleted, 2);
    assert_eq!(rec.next_wake, Duration::from_secs(1));
}

#[test]
fn deadline_ceiling() {
    let t0 = Moment::now();
    let mut t = new_table();
    t.insert(Session::tcp(None, 22, TcpState::Established, t0)).unwrap();
    let b = WaitBounds::new(Duration::from_secs(1), Duration::from_secs(600));
    let rec = reconcile(
        &mut t,
        &mut RecordingHandler::new(),
        &mut FakeNotifier::default(),
        &TimeoutPolicy::default(),
        Load::new(1, 1000),
        t0,
        b,
    );
    assert_eq!(rec.next_wake, Duration::from_secs(600));
}

#[test]
fn scenario_new_udp_flow() {
    let t0 = Moment::now();
    let mut t = new_table();
    let (r, w) = pipe_pair();
    t.insert(Session::udp(Some(r), 4500, t0)).unwrap();

    let p = TimeoutPolicy::default();
    let timeout = p.timeout_for(TimeoutKind::Udp, 1, 100);

    let rec = reconcile_at(&mut t, Load::new(1, 100), t0 + timeout);
    assert_eq!(rec.deleted, 0);
    assert!(!peer_closed(&w));

    let rec = reconcile_at(
        &mut t,
        Load::new(1, 100),
        t0 + timeout + Duration::from_millis(1),
    );
    assert_eq!(rec.deleted, 1);
    assert!(t.is_empty());
    assert!(peer_closed(&w));
}

#[test]
fn scenario_tcp_terminal() {
    let t0 = Moment::now();
    let mut t = new_table();
    let (r, w) = pipe_pair();
    let id = t.insert(Session::tcp(Some(r), 443, TcpState::Established, t0)).unwrap();

    let rec = reconcile_at(&mut t, Load::new(1, 100), t0);
    assert_eq!(rec.deleted, 0);

    // Fresh activity doesn't save it once the handler closed the flow.
    let s = t.get_mut(id).unwrap();
    s.tcp_mut().unwrap().state = TcpState::Close;
    s.touch(t0 + Duration::from_secs(1));
    let rec = reconcile_at(&mut t, Load::new(0, 100), t0 + Duration::from_secs(1));
    assert_eq!(rec.deleted, 1);
    assert!(peer_closed(&w));
}

#[test]
fn scenario_capacity_pressure() {
    let t0 = Moment::now();
    let p = TimeoutPolicy::default();
    let light = Load::new(1, 100);
    let heavy = Load::new(95, 100);

    // Two ICMP sessions, idle for 1.5s and 3s.
    let older = Session::icmp(None, 1, t0);
    let newer = Session::icmp(None, 2, t0 + Duration::from_millis(1_500));
    let now = t0 + Duration::from_secs(3);

    for s in [&older, &newer] {
        assert!(!p.should_evict(s, light, now));
        assert!(p.should_evict(s, heavy, now));
        let l = p.remaining(s, light, now);
        let h = p.remaining(s, heavy, now);
        assert!(h.is_none() || h < l);
    }

    let mut t = new_table();
    t.insert(older).unwrap();
    t.insert(newer).unwrap();
    assert_eq!(reconcile_at(&mut t, light, now).deleted, 0);
    assert_eq!(reconcile_at(&mut t, heavy, now).deleted, 2);
}

#[test]
fn handler_vote_evicts() {
    let t0 = Moment::now();
    let mut t = new_table();
    let a = t.insert(Session::udp(None, 53, t0)).unwrap();
    let b = t.insert(Session::udp(None, 53, t0)).unwrap();

    let mut h = RecordingHandler::new();
    h.stats().evict.insert(a);
    let mut n = FakeNotifier::default();
    let rec = reconcile(
        &mut t,
        &mut h,
        &mut n,
        &TimeoutPolicy::default(),
        Load::new(2, 100),
        t0,
        bounds(),
    );
    assert_eq!(rec.deleted, 1);
    assert_eq!(t.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![b]);
    assert_eq!(h.stats().session_checks, 2);
}
