// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The readiness reactor.
//!
//! One run of the reactor is one pass through [`run_reactor`] on a
//! dedicated worker. Every iteration:
//!
//! 1. **Census**: count the active sessions per protocol and let the
//!    TCP handler adjust socket interest.
//!
//! 2. **Reconcile**: at most once per `reconciliation_min_interval`,
//!    delete every session that is terminal or idle past its timeout
//!    and work out when the next session is due to expire.
//!
//! 3. **Wait**: block on the notifier until something is ready or the
//!    deadline passes.
//!
//! 4. **Dispatch**: route each ready event to the control channel, the
//!    virtual interface or the owning session's protocol handler.
//!
//! The table lock is held for steps 1-2 and again for step 4, never
//! across the wait. The individual steps are public so that they can
//! be driven directly.

use super::capacity::compute_max_sessions;
use super::control::ControlReceiver;
use super::error::ReactorError;
use super::handler::SessionHandler;
use super::handler::TunContext;
use super::notify::EpollNotifier;
use super::notify::Event;
use super::notify::Interest;
use super::notify::Notifier;
use super::notify::Token;
use super::notify::is_readable;
use super::policy::Load;
use super::policy::NextWake;
use super::policy::TimeoutPolicy;
use super::policy::WaitBounds;
use super::session::SessionId;
use super::table::SessionTable;
use super::table::Visit;
use crate::api::Protocol;
use crate::cfg::ReactorCfg;
use crate::provider::LogLevel;
use crate::provider::LogProvider;
use crate::service::ServiceHooks;
use crate::time::Moment;
use core::fmt;
use core::time::Duration;
use nix::errno::Errno;
use std::os::fd::AsFd;
use std::os::fd::AsRawFd;
use std::os::fd::BorrowedFd;
use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReactorState {
    Running,
    Stopping,
}

impl fmt::Display for ReactorState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
        };
        write!(f, "{s}")
    }
}

/// Everything a run needs from the outer service.
///
/// The context is moved into the run and dropped exactly once when the
/// run returns.
pub struct RunContext {
    /// The virtual interface. Owned by the service, the reactor only
    /// registers interest in it.
    pub tun: Arc<OwnedFd>,
    pub control: Arc<ControlReceiver>,
    pub hooks: Box<dyn ServiceHooks>,
    pub cfg: ReactorCfg,
    pub log: Arc<dyn LogProvider>,
}

/// The most `check_udp_socket` calls made for one readiness event.
/// Anything still pending is reported again by the next wait.
pub const UDP_CALLS_PER_EVENT: usize = 64;

/// The per-protocol count of active sessions.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Census {
    pub icmp: usize,
    pub udp: usize,
    pub tcp: usize,
    /// A handler asked for the next wait to be short.
    pub recheck: bool,
}

impl Census {
    pub fn active(&self) -> usize {
        self.icmp + self.udp + self.tcp
    }
}

/// The outcome of a reconciliation pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reconciliation {
    pub deleted: usize,
    /// How long the next wait may block.
    pub next_wake: Duration,
    /// Deleted sessions whose socket failed to unregister for a reason
    /// other than never having been registered.
    pub unregister_failed: Vec<(SessionId, Errno)>,
}

/// Whether the reactor should keep going after a dispatch batch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    Stop,
}

/// The long-lived descriptors a dispatch batch may touch.
pub struct Endpoints<'a> {
    pub tun: BorrowedFd<'a>,
    pub control: &'a ControlReceiver,
    pub log: &'a dyn LogProvider,
}

/// Count the active sessions and let the TCP handler update the
/// notifier registration of every TCP session with an open socket.
pub fn census(
    table: &mut SessionTable,
    handler: &mut dyn SessionHandler,
    notifier: &mut dyn Notifier,
) -> Census {
    let mut c = Census::default();

    for (id, session) in table.iter_mut() {
        let active = session.is_active();
        match session.protocol() {
            Protocol::Icmp | Protocol::Icmpv6 => c.icmp += usize::from(active),
            Protocol::Udp => c.udp += usize::from(active),
            Protocol::Tcp => {
                c.tcp += usize::from(active);
                if session.socket().is_some() {
                    c.recheck |= handler.monitor_tcp_session(id, session, notifier);
                }
            }
        }
    }

    c
}

/// Walk the table once, deleting every session that its handler or
/// the timeout policy wants gone, and fold the remaining time of every
/// survivor into the next wait deadline.
///
/// All eviction decisions in a pass share the same `now`.
pub fn reconcile(
    table: &mut SessionTable,
    handler: &mut dyn SessionHandler,
    notifier: &mut dyn Notifier,
    policy: &TimeoutPolicy,
    load: Load,
    now: Moment,
    bounds: WaitBounds,
) -> Reconciliation {
    let mut wake = NextWake::new(bounds);
    let mut unregister_failed = vec![];

    let deleted = table.retain_with(|id, session| {
        let vote = match session.protocol() {
            Protocol::Icmp | Protocol::Icmpv6 => {
                handler.check_icmp_session(id, session, load)
            }
            Protocol::Udp => handler.check_udp_session(id, session, load),
            Protocol::Tcp => handler.check_tcp_session(id, session, load),
        };

        if vote || policy.should_evict(session, load, now) {
            if let Some(fd) = session.socket() {
                match notifier.unregister(fd) {
                    Ok(()) | Err(Errno::ENOENT) => {}
                    Err(errno) => unregister_failed.push((id, errno)),
                }
            }
            return Visit::Delete;
        }

        if let Some(left) = policy.remaining(session, load, now) {
            wake.fold(left);
        }
        Visit::Keep
    });

    Reconciliation { deleted, next_wake: wake.deadline(), unregister_failed }
}

/// Route a batch of ready events.
///
/// A control event stops the batch and the run. Socket events for
/// sessions which no longer exist are ignored. A virtual interface
/// handler error ends the run.
pub fn dispatch(
    events: &[Event],
    ends: &Endpoints<'_>,
    table: &mut SessionTable,
    handler: &mut dyn SessionHandler,
    notifier: &mut dyn Notifier,
    load: Load,
) -> Result<Flow, ReactorError> {
    for ev in events {
        match ev.token {
            Token::Control => {
                ends.log.log(LogLevel::Note, "stop requested");
                if let Err(e) = ends.control.drain_one() {
                    ends.log.log(
                        LogLevel::Warn,
                        &format!("control read error: {e}"),
                    );
                }
                return Ok(Flow::Stop);
            }

            Token::Tun => {
                while is_readable(ends.tun) {
                    let ctx = TunContext {
                        tun: ends.tun,
                        table: &mut *table,
                        notifier: &mut *notifier,
                        load,
                    };
                    handler.check_tun(ctx).map_err(|source| {
                        ReactorError::Tun { fd: ends.tun.as_raw_fd(), source }
                    })?;
                }
            }

            Token::Session(id) => {
                let Some(session) = table.get_mut(id) else {
                    ends.log.log(
                        LogLevel::Debug,
                        &format!("event for unknown session {id}"),
                    );
                    continue;
                };

                match session.protocol() {
                    Protocol::Icmp | Protocol::Icmpv6 => {
                        handler.check_icmp_socket(id, session, ev, notifier);
                    }

                    Protocol::Udp => {
                        let mut calls = 0;
                        while calls < UDP_CALLS_PER_EVENT
                            && !ev.is_error()
                            && ev.is_readable()
                            && session.is_active()
                            && session.socket().is_some_and(is_readable)
                        {
                            handler.check_udp_socket(id, session, ev, notifier);
                            calls += 1;
                        }
                    }

                    Protocol::Tcp => {
                        handler.check_tcp_socket(id, session, ev, notifier);
                    }
                }
            }
        }
    }

    Ok(Flow::Continue)
}

/// Run the reactor on an epoll notifier until it is stopped or fails.
pub fn run_reactor(
    ctx: RunContext,
    table: &Mutex<SessionTable>,
    handler: &mut dyn SessionHandler,
) -> Result<(), ReactorError> {
    run_reactor_with(ctx, table, handler, EpollNotifier::new)
}

/// Run the reactor on the notifier built by `make_notifier`, which is
/// handed the maximum number of events per wait.
///
/// On return the notifier is gone, the hooks are detached, a fatal
/// error has been reported exactly once and `ctx` has been dropped.
/// The table is left as it is: releasing the sessions is up to the
/// caller.
pub fn run_reactor_with<N, F>(
    mut ctx: RunContext,
    table: &Mutex<SessionTable>,
    handler: &mut dyn SessionHandler,
    make_notifier: F,
) -> Result<(), ReactorError>
where
    N: Notifier,
    F: FnOnce(usize) -> nix::Result<N>,
{
    let log = ctx.log.clone();
    let tun_fd = ctx.tun.as_raw_fd();

    if let Err(msg) = ctx.hooks.attach() {
        let err = ReactorError::Attach(msg);
        log.log(LogLevel::Error, &format!("tun {tun_fd}: {err}"));
        ctx.hooks.report_exit(&err);
        return Err(err);
    }

    log.log(LogLevel::Note, &format!("reactor running tun {tun_fd}"));
    let result = drive(&ctx, table, handler, make_notifier);

    if let Err(err) = &result {
        log.log(LogLevel::Error, &format!("tun {tun_fd}: {err}"));
        ctx.hooks.report_exit(err);
    }

    ctx.hooks.detach();
    drop(ctx);
    log.log(LogLevel::Note, &format!("reactor stopped tun {tun_fd}"));
    result
}

fn drive<N, F>(
    ctx: &RunContext,
    table: &Mutex<SessionTable>,
    handler: &mut dyn SessionHandler,
    make_notifier: F,
) -> Result<(), ReactorError>
where
    N: Notifier,
    F: FnOnce(usize) -> nix::Result<N>,
{
    let cfg = &ctx.cfg;
    let max_sessions = compute_max_sessions(
        cfg.max_table_size,
        cfg.descriptor_fraction,
        ctx.log.as_ref(),
    );

    let mut notifier = make_notifier(cfg.max_events_per_wait)
        .map_err(ReactorError::NotifierCreate)?;

    let control = ctx.control.as_fd();
    let tun = ctx.tun.as_fd();

    notifier
        .register(control, Token::Control, Interest::READABLE)
        .map_err(|errno| ReactorError::Register { what: "control", errno })?;

    let result = match notifier.register(tun, Token::Tun, Interest::READABLE) {
        Ok(()) => {
            let mut reactor = Reactor {
                ctx,
                table,
                handler: &mut *handler,
                notifier: &mut notifier,
                max_sessions,
                policy: TimeoutPolicy::from(&cfg.timeouts),
                bounds: WaitBounds::new(
                    cfg.wait_timeout_floor(),
                    cfg.wait_timeout_ceiling(),
                ),
                last_check: None,
                state: ReactorState::Running,
            };
            let result = reactor.run();
            unregister_logged(&mut notifier, tun, "tun", ctx.log.as_ref());
            result
        }
        Err(errno) => Err(ReactorError::Register { what: "tun", errno }),
    };

    unregister_logged(&mut notifier, control, "control", ctx.log.as_ref());
    drop(notifier);
    result
}

struct Reactor<'a, N: Notifier> {
    ctx: &'a RunContext,
    table: &'a Mutex<SessionTable>,
    handler: &'a mut dyn SessionHandler,
    notifier: &'a mut N,
    max_sessions: usize,
    policy: TimeoutPolicy,
    bounds: WaitBounds,
    /// When the last reconciliation pass ran.
    last_check: Option<Moment>,
    state: ReactorState,
}

impl<N: Notifier> Reactor<'_, N> {
    fn run(&mut self) -> Result<(), ReactorError> {
        let mut events = Vec::with_capacity(self.ctx.cfg.max_events_per_wait);

        while self.state == ReactorState::Running {
            let (load, timeout) = self.housekeeping();

            match self.notifier.wait(&mut events, timeout) {
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(ReactorError::Wait(errno)),
                Ok(0) => continue,
                Ok(_) => {}
            }

            let ends = Endpoints {
                tun: self.ctx.tun.as_fd(),
                control: &self.ctx.control,
                log: self.ctx.log.as_ref(),
            };
            let mut table = lock(self.table);
            let flow = dispatch(
                &events,
                &ends,
                &mut table,
                &mut *self.handler,
                &mut *self.notifier,
                load,
            )?;

            if flow == Flow::Stop {
                self.state = ReactorState::Stopping;
            }
        }

        Ok(())
    }

    /// Census and, when due, reconciliation. Returns the load seen by
    /// the census and the timeout for the next wait.
    fn housekeeping(&mut self) -> (Load, Duration) {
        let min_interval = self.ctx.cfg.reconciliation_min_interval();
        let mut table = lock(self.table);

        let census = census(&mut table, &mut *self.handler, &mut *self.notifier);
        let load = Load::new(census.active(), self.max_sessions);

        let now = Moment::now();
        let due = self.last_check.is_none_or(|t| now.since(t) > min_interval);
        let mut deleted = 0;
        let timeout = if due {
            self.last_check = Some(now);
            let rec = reconcile(
                &mut table,
                &mut *self.handler,
                &mut *self.notifier,
                &self.policy,
                load,
                now,
                self.bounds,
            );
            deleted = rec.deleted;
            for (id, errno) in &rec.unregister_failed {
                let what = format!("session {id}");
                log_unregister_error(self.ctx.log.as_ref(), &what, *errno);
            }
            if census.recheck { min_interval } else { rec.next_wake }
        } else {
            min_interval
        };

        self.ctx.log.log(
            LogLevel::Debug,
            &format!(
                "sessions ICMP {} UDP {} TCP {} max {}/{} deleted {} \
                 timeout {}ms recheck {}",
                census.icmp,
                census.udp,
                census.tcp,
                load.active,
                load.max,
                deleted,
                timeout.as_millis(),
                census.recheck || !due,
            ),
        );

        (load, timeout)
    }
}

fn unregister_logged<N: Notifier>(
    notifier: &mut N,
    fd: BorrowedFd<'_>,
    what: &str,
    log: &dyn LogProvider,
) {
    match notifier.unregister(fd) {
        Ok(()) | Err(Errno::ENOENT) => {}
        Err(errno) => log_unregister_error(log, what, errno),
    }
}

fn log_unregister_error(log: &dyn LogProvider, what: &str, errno: Errno) {
    log.log(
        LogLevel::Debug,
        &format!("epoll del {what} error {}: {}", errno as i32, errno.desc()),
    );
}

fn lock(table: &Mutex<SessionTable>) -> MutexGuard<'_, SessionTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::TcpState;
    use crate::api::UdpState;
    use crate::engine::control::control_channel;
    use crate::engine::error::HandlerError;
    use crate::engine::notify::Readiness;
    use crate::engine::session::ProtoState;
    use crate::engine::session::Session;
    use crate::provider::NullLog;

    #[derive(Default)]
    struct NoopNotifier {
        unregistered: usize,
        fail_unregister: Option<Errno>,
    }

    impl Notifier for NoopNotifier {
        fn register(
            &mut self,
            _fd: BorrowedFd<'_>,
            _token: Token,
            _interest: Interest,
        ) -> nix::Result<()> {
            Ok(())
        }

        fn modify(
            &mut self,
            _fd: BorrowedFd<'_>,
            _token: Token,
            _interest: Interest,
        ) -> nix::Result<()> {
            Ok(())
        }

        fn unregister(&mut self, _fd: BorrowedFd<'_>) -> nix::Result<()> {
            self.unregistered += 1;
            match self.fail_unregister {
                Some(errno) => Err(errno),
                None => Ok(()),
            }
        }

        fn wait(
            &mut self,
            events: &mut Vec<Event>,
            _timeout: Duration,
        ) -> nix::Result<usize> {
            events.clear();
            Ok(0)
        }
    }

    /// Votes to evict every UDP session on port 9 and asks for a
    /// recheck on every TCP session.
    #[derive(Default)]
    struct Picky {
        monitored: Vec<SessionId>,
        tcp_socket_events: usize,
    }

    impl SessionHandler for Picky {
        fn check_tun(&mut self, _ctx: TunContext<'_>) -> Result<(), HandlerError> {
            Ok(())
        }

        fn check_udp_session(
            &mut self,
            _id: SessionId,
            session: &mut Session,
            _load: Load,
        ) -> bool {
            matches!(session.state(), ProtoState::Udp(u) if u.dport == 9)
        }

        fn monitor_tcp_session(
            &mut self,
            id: SessionId,
            _session: &mut Session,
            _notifier: &mut dyn Notifier,
        ) -> bool {
            self.monitored.push(id);
            true
        }

        fn check_tcp_socket(
            &mut self,
            _id: SessionId,
            _session: &mut Session,
            _event: &Event,
            _notifier: &mut dyn Notifier,
        ) {
            self.tcp_socket_events += 1;
        }
    }

    fn table() -> SessionTable {
        SessionTable::new(Arc::new(NullLog))
    }

    fn bounds() -> WaitBounds {
        WaitBounds::new(Duration::from_secs(1), Duration::from_secs(3600))
    }

    #[test]
    fn census_counts_active_only() {
        let now = Moment::now();
        let mut t = table();
        let (r, _w) = nix::unistd::pipe().unwrap();
        t.insert(Session::icmp(None, 1, now)).unwrap();
        t.insert(Session::udp(None, 53, now)).unwrap();
        let mut done = Session::udp(None, 53, now);
        done.udp_mut().unwrap().state = UdpState::Finishing;
        t.insert(done).unwrap();
        let tcp = t.insert(Session::tcp(Some(r), 80, TcpState::Established, now));
        t.insert(Session::tcp(None, 80, TcpState::Close, now)).unwrap();

        let mut h = Picky::default();
        let c = census(&mut t, &mut h, &mut NoopNotifier::default());
        assert_eq!((c.icmp, c.udp, c.tcp), (1, 1, 1));
        assert_eq!(c.active(), 3);
        assert!(c.recheck);
        // Only TCP sessions with a socket are monitored.
        assert_eq!(h.monitored, vec![tcp.unwrap()]);
    }

    #[test]
    fn reconcile_merges_handler_vote() {
        let now = Moment::now();
        let mut t = table();
        let keep = t.insert(Session::udp(None, 53, now)).unwrap();
        t.insert(Session::udp(None, 9, now)).unwrap();

        let mut n = NoopNotifier::default();
        let rec = reconcile(
            &mut t,
            &mut Picky::default(),
            &mut n,
            &TimeoutPolicy::default(),
            Load::new(2, 100),
            now,
            bounds(),
        );
        assert_eq!(rec.deleted, 1);
        assert_eq!(t.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![keep]);
        // 15s scaled by 98% plus slack.
        assert_eq!(rec.next_wake, Duration::from_millis(14_700 + 1_000));
        assert_eq!(n.unregistered, 0);
    }

    #[test]
    fn reconcile_unregisters_deleted_sockets() {
        let now = Moment::now();
        let mut t = table();
        let (r, _w) = nix::unistd::pipe().unwrap();
        t.insert(Session::tcp(Some(r), 443, TcpState::Closing, now)).unwrap();

        let mut n = NoopNotifier::default();
        let rec = reconcile(
            &mut t,
            &mut Picky::default(),
            &mut n,
            &TimeoutPolicy::default(),
            Load::new(0, 100),
            now,
            bounds(),
        );
        assert_eq!(rec.deleted, 1);
        assert_eq!(n.unregistered, 1);
        assert!(t.is_empty());
        assert_eq!(rec.next_wake, Duration::from_secs(1));
    }

    #[test]
    fn dispatch_control_preempts() {
        let now = Moment::now();
        let mut t = table();
        let id = t.insert(Session::tcp(None, 80, TcpState::Listen, now)).unwrap();
        let (tx, rx) = control_channel().unwrap();
        tx.signal().unwrap();
        let (tun, _tun_w) = nix::unistd::pipe().unwrap();

        let ends = Endpoints { tun: tun.as_fd(), control: &rx, log: &NullLog };
        let sess = Event::new(Token::Session(id), Readiness::READABLE);
        let ctl = Event::new(Token::Control, Readiness::READABLE);
        let mut h = Picky::default();

        let flow = dispatch(
            &[sess, ctl, sess],
            &ends,
            &mut t,
            &mut h,
            &mut NoopNotifier::default(),
            Load::new(1, 10),
        )
        .unwrap();
        assert_eq!(flow, Flow::Stop);
        assert_eq!(h.tcp_socket_events, 1);
        assert!(!rx.drain_one().unwrap());
    }

    #[test]
    fn dispatch_skips_unknown_session() {
        let mut t = table();
        let (_tx, rx) = control_channel().unwrap();
        let (tun, _tun_w) = nix::unistd::pipe().unwrap();
        let ends = Endpoints { tun: tun.as_fd(), control: &rx, log: &NullLog };
        let ev = Event::new(
            Token::Session(SessionId::new(42)),
            Readiness::READABLE,
        );

        let flow = dispatch(
            &[ev],
            &ends,
            &mut t,
            &mut Picky::default(),
            &mut NoopNotifier::default(),
            Load::new(0, 10),
        )
        .unwrap();
        assert_eq!(flow, Flow::Continue);
    }

    /// Counts UDP socket calls without ever reading.
    #[derive(Default)]
    struct StuckUdp {
        calls: usize,
    }

    impl SessionHandler for StuckUdp {
        fn check_tun(&mut self, _ctx: TunContext<'_>) -> Result<(), HandlerError> {
            Ok(())
        }

        fn check_udp_socket(
            &mut self,
            _id: SessionId,
            _session: &mut Session,
            _event: &Event,
            _notifier: &mut dyn Notifier,
        ) {
            self.calls += 1;
        }
    }

    fn pending_udp(t: &mut SessionTable) -> (SessionId, std::fs::File) {
        use std::io::Write;

        let (r, w) = nix::unistd::pipe().unwrap();
        let mut w = std::fs::File::from(w);
        w.write_all(b"d").unwrap();
        let id = t.insert(Session::udp(Some(r), 4500, Moment::now())).unwrap();
        (id, w)
    }

    #[test]
    fn default_udp_hook_returns() {
        let mut t = table();
        let (id, _w) = pending_udp(&mut t);
        let (_tx, rx) = control_channel().unwrap();
        let (tun, _tun_w) = nix::unistd::pipe().unwrap();
        let ends = Endpoints { tun: tun.as_fd(), control: &rx, log: &NullLog };
        let ev = Event::new(Token::Session(id), Readiness::READABLE);

        // Picky keeps the default UDP socket hook, which reads nothing.
        let flow = dispatch(
            &[ev, Event::new(Token::Control, Readiness::READABLE)],
            &ends,
            &mut t,
            &mut Picky::default(),
            &mut NoopNotifier::default(),
            Load::new(1, 10),
        )
        .unwrap();
        assert_eq!(flow, Flow::Stop);
    }

    #[test]
    fn udp_calls_bounded_per_event() {
        let mut t = table();
        let (id, _w) = pending_udp(&mut t);
        let (_tx, rx) = control_channel().unwrap();
        let (tun, _tun_w) = nix::unistd::pipe().unwrap();
        let ends = Endpoints { tun: tun.as_fd(), control: &rx, log: &NullLog };
        let ev = Event::new(Token::Session(id), Readiness::READABLE);
        let mut h = StuckUdp::default();

        let flow = dispatch(
            &[ev, ev],
            &ends,
            &mut t,
            &mut h,
            &mut NoopNotifier::default(),
            Load::new(1, 10),
        )
        .unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(h.calls, 2 * UDP_CALLS_PER_EVENT);

        // A session that stopped being active is not called again.
        t.get_mut(id).unwrap().udp_mut().unwrap().state = UdpState::Finishing;
        h.calls = 0;
        dispatch(
            &[ev],
            &ends,
            &mut t,
            &mut h,
            &mut NoopNotifier::default(),
            Load::new(0, 10),
        )
        .unwrap();
        assert_eq!(h.calls, 0);
    }

    #[test]
    fn reconcile_reports_unregister_failures() {
        let now = Moment::now();
        let mut t = table();
        let (r1, _w1) = nix::unistd::pipe().unwrap();
        let (r2, _w2) = nix::unistd::pipe().unwrap();
        let a = t.insert(Session::tcp(Some(r1), 443, TcpState::Close, now)).unwrap();
        t.insert(Session::udp(None, 53, now)).unwrap();

        let mut n = NoopNotifier {
            fail_unregister: Some(Errno::EBADF),
            ..Default::default()
        };
        let rec = reconcile(
            &mut t,
            &mut Picky::default(),
            &mut n,
            &TimeoutPolicy::default(),
            Load::new(1, 100),
            now,
            bounds(),
        );
        assert_eq!(rec.deleted, 1);
        assert_eq!(rec.unregister_failed, vec![(a, Errno::EBADF)]);

        // Never having been registered is not worth reporting.
        let b = t.insert(Session::tcp(Some(r2), 443, TcpState::Close, now)).unwrap();
        n.fail_unregister = Some(Errno::ENOENT);
        let rec = reconcile(
            &mut t,
            &mut Picky::default(),
            &mut n,
            &TimeoutPolicy::default(),
            Load::new(1, 100),
            now,
            bounds(),
        );
        assert_eq!(rec.deleted, 1);
        assert!(rec.unregister_failed.is_empty());
        assert!(t.get(b).is_none());
    }
}
