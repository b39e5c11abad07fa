// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A protocol handler driven by single byte "packets".
//!
//! Each byte read from the virtual interface is one packet:
//!
//! * `i`: open an ICMP session without a socket.
//! * `u`: open a UDP session to port 53 backed by a pipe.
//! * `t`: open an established TCP session to port 80 backed by a pipe.
//! * `x`: a packet which fails to decode, ending the run.
//!
//! Anything else is counted and dropped.

use sessmux::api::TcpState;
use sessmux::engine::error::HandlerError;
use sessmux::engine::handler::SessionHandler;
use sessmux::engine::handler::TunContext;
use sessmux::engine::notify::Event;
use sessmux::engine::notify::Interest;
use sessmux::engine::notify::Notifier;
use sessmux::engine::notify::Token;
use sessmux::engine::policy::Load;
use sessmux::engine::session::Session;
use sessmux::engine::session::SessionId;
use sessmux::time::Moment;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::os::fd::BorrowedFd;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

#[derive(Debug, Default)]
pub struct HandlerStats {
    pub tun_packets: usize,
    /// The load handed to the most recent `check_tun`.
    pub last_load: Option<Load>,
    pub created: Vec<SessionId>,
    /// The write ends of the pipes backing created sessions.
    pub peers: Vec<(SessionId, File)>,
    pub session_checks: usize,
    pub monitors: usize,
    pub icmp_socket_events: usize,
    pub udp_bytes: usize,
    pub tcp_socket_events: usize,
    /// Sessions the handler votes to evict at the next reconciliation.
    pub evict: BTreeSet<SessionId>,
    /// Answer to every `monitor_tcp_session`.
    pub recheck: bool,
}

#[derive(Clone, Default)]
pub struct RecordingHandler {
    pub stats: Arc<Mutex<HandlerStats>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> MutexGuard<'_, HandlerStats> {
        self.stats.lock().unwrap()
    }

    /// Take the write end of the pipe backing `id`.
    pub fn take_peer(&self, id: SessionId) -> Option<File> {
        let mut stats = self.stats();
        let pos = stats.peers.iter().position(|(pid, _)| *pid == id)?;
        Some(stats.peers.remove(pos).1)
    }
}

fn read_some(fd: BorrowedFd<'_>, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut f = File::from(fd.try_clone_to_owned()?);
    f.read(buf)
}

impl SessionHandler for RecordingHandler {
    fn check_tun(&mut self, ctx: TunContext<'_>) -> Result<(), HandlerError> {
        let mut b = [0u8; 1];
        let n = read_some(ctx.tun, &mut b).map_err(|e| {
            HandlerError::new("tun read", e.to_string())
        })?;
        if n == 0 {
            return Err(HandlerError::new("tun read", "end of file"));
        }

        let mut stats = self.stats();
        stats.tun_packets += 1;
        stats.last_load = Some(ctx.load);

        let now = Moment::now();
        let (session, peer) = match b[0] {
            b'i' => (Session::icmp(None, 1, now), None),
            b'u' => {
                let (r, w) = crate::pipe_pair();
                (Session::udp(Some(r), 53, now), Some(w))
            }
            b't' => {
                let (r, w) = crate::pipe_pair();
                (Session::tcp(Some(r), 80, TcpState::Established, now), Some(w))
            }
            b'x' => {
                return Err(HandlerError::new(
                    "tun decode",
                    format!("bad packet {:#x}", b[0]),
                ));
            }
            _ => return Ok(()),
        };

        let id = ctx
            .table
            .insert(session)
            .map_err(|e| HandlerError::new("session insert", e.to_string()))?;
        if let Some(fd) = ctx.table.get(id).and_then(Session::socket) {
            ctx.notifier
                .register(fd, Token::Session(id), Interest::READABLE)
                .map_err(|e| HandlerError::from_errno("socket register", e))?;
        }
        stats.created.push(id);
        if let Some(w) = peer {
            stats.peers.push((id, w));
        }
        Ok(())
    }

    fn check_icmp_session(
        &mut self,
        id: SessionId,
        _session: &mut Session,
        _load: Load,
    ) -> bool {
        let mut stats = self.stats();
        stats.session_checks += 1;
        stats.evict.contains(&id)
    }

    fn check_udp_session(
        &mut self,
        id: SessionId,
        _session: &mut Session,
        _load: Load,
    ) -> bool {
        let mut stats = self.stats();
        stats.session_checks += 1;
        stats.evict.contains(&id)
    }

    fn check_tcp_session(
        &mut self,
        id: SessionId,
        _session: &mut Session,
        _load: Load,
    ) -> bool {
        let mut stats = self.stats();
        stats.session_checks += 1;
        stats.evict.contains(&id)
    }

    fn monitor_tcp_session(
        &mut self,
        _id: SessionId,
        _session: &mut Session,
        _notifier: &mut dyn Notifier,
    ) -> bool {
        let mut stats = self.stats();
        stats.monitors += 1;
        stats.recheck
    }

    fn check_icmp_socket(
        &mut self,
        _id: SessionId,
        _session: &mut Session,
        _event: &Event,
        _notifier: &mut dyn Notifier,
    ) {
        self.stats().icmp_socket_events += 1;
    }

    fn check_udp_socket(
        &mut self,
        _id: SessionId,
        session: &mut Session,
        _event: &Event,
        notifier: &mut dyn Notifier,
    ) {
        let Some(fd) = session.socket() else {
            return;
        };
        let mut b = [0u8; 1];
        match read_some(fd, &mut b) {
            Ok(1) => {
                session.touch(Moment::now());
                if let Some(udp) = session.udp_mut() {
                    udp.received += 1;
                }
                self.stats().udp_bytes += 1;
            }
            // The peer went away; give up on the flow.
            _ => {
                let _ = notifier.unregister(fd);
                if let Some(udp) = session.udp_mut() {
                    udp.state = sessmux::api::UdpState::Finishing;
                }
                let _ = session.close_socket();
            }
        }
    }

    fn check_tcp_socket(
        &mut self,
        _id: SessionId,
        _session: &mut Session,
        _event: &Event,
        _notifier: &mut dyn Notifier,
    ) {
        self.stats().tcp_socket_events += 1;
    }
}
