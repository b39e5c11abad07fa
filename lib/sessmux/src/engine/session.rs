// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Session records.
//!
//! A [`Session`] is the reactor's state for one flow bridging the
//! virtual interface and a real socket. Records are created by the
//! protocol handlers when they see a new flow; the reactor only ever
//! counts, expires and deletes them.

use crate::api::Protocol;
use crate::api::SessionDump;
use crate::api::TcpState;
use crate::api::UdpState;
use crate::time::Moment;
use core::fmt;
use nix::errno::Errno;
use std::collections::VecDeque;
use std::os::fd::AsFd;
use std::os::fd::AsRawFd;
use std::os::fd::BorrowedFd;
use std::os::fd::IntoRawFd;
use std::os::fd::OwnedFd;
use std::os::fd::RawFd;

/// A handle on a record in the [`super::table::SessionTable`].
///
/// Ids are handed out in increasing order and never reused within a
/// table, so they double as the readiness token for the session's
/// socket.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct IcmpSession {
    /// The handler has given up on this flow.
    pub stop: bool,
    pub last_activity: Moment,
    /// The ICMP echo identifier.
    pub id: u16,
}

#[derive(Clone, Debug)]
pub struct UdpSession {
    pub state: UdpState,
    pub last_activity: Moment,
    pub dport: u16,
    pub sent: u64,
    pub received: u64,
}

/// A segment buffered by the TCP handler on its way to the socket.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Segment {
    pub seq: u32,
    pub data: Vec<u8>,
    pub psh: bool,
}

#[derive(Clone, Debug)]
pub struct TcpSession {
    pub state: TcpState,
    pub last_activity: Moment,
    pub dport: u16,
    pub sent: u64,
    pub received: u64,
    /// Segments received from the virtual interface but not yet
    /// written to the socket. Owned by the TCP handler.
    pub forward: VecDeque<Segment>,
}

impl TcpSession {
    /// Release everything the TCP handler buffered for this flow.
    pub fn clear_data(&mut self) {
        self.forward.clear();
    }

    pub fn buffered_bytes(&self) -> usize {
        self.forward.iter().map(|s| s.data.len()).sum()
    }
}

/// The protocol specific part of a [`Session`].
#[derive(Clone, Debug)]
pub enum ProtoState {
    Icmp(IcmpSession),
    Udp(UdpSession),
    Tcp(TcpSession),
}

/// One flow.
///
/// The record exclusively owns its socket. The socket is closed
/// exactly once: by [`Session::close_socket`], by [`Session::release`],
/// or when the record is dropped.
#[derive(Debug)]
pub struct Session {
    protocol: Protocol,
    socket: Option<OwnedFd>,
    state: ProtoState,
}

impl Session {
    pub fn icmp(socket: Option<OwnedFd>, id: u16, now: Moment) -> Self {
        Self::new_icmp(Protocol::Icmp, socket, id, now)
    }

    pub fn icmpv6(socket: Option<OwnedFd>, id: u16, now: Moment) -> Self {
        Self::new_icmp(Protocol::Icmpv6, socket, id, now)
    }

    fn new_icmp(
        protocol: Protocol,
        socket: Option<OwnedFd>,
        id: u16,
        now: Moment,
    ) -> Self {
        let state =
            ProtoState::Icmp(IcmpSession { stop: false, last_activity: now, id });
        Self { protocol, socket, state }
    }

    pub fn udp(socket: Option<OwnedFd>, dport: u16, now: Moment) -> Self {
        let state = ProtoState::Udp(UdpSession {
            state: UdpState::Active,
            last_activity: now,
            dport,
            sent: 0,
            received: 0,
        });
        Self { protocol: Protocol::Udp, socket, state }
    }

    pub fn tcp(
        socket: Option<OwnedFd>,
        dport: u16,
        state: TcpState,
        now: Moment,
    ) -> Self {
        let state = ProtoState::Tcp(TcpSession {
            state,
            last_activity: now,
            dport,
            sent: 0,
            received: 0,
            forward: VecDeque::new(),
        });
        Self { protocol: Protocol::Tcp, socket, state }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn state(&self) -> &ProtoState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ProtoState {
        &mut self.state
    }

    pub fn icmp_mut(&mut self) -> Option<&mut IcmpSession> {
        match &mut self.state {
            ProtoState::Icmp(icmp) => Some(icmp),
            _ => None,
        }
    }

    pub fn udp_mut(&mut self) -> Option<&mut UdpSession> {
        match &mut self.state {
            ProtoState::Udp(udp) => Some(udp),
            _ => None,
        }
    }

    pub fn tcp_mut(&mut self) -> Option<&mut TcpSession> {
        match &mut self.state {
            ProtoState::Tcp(tcp) => Some(tcp),
            _ => None,
        }
    }

    pub fn socket(&self) -> Option<BorrowedFd<'_>> {
        self.socket.as_ref().map(|fd| fd.as_fd())
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.socket.as_ref().map(|fd| fd.as_raw_fd())
    }

    /// Hand a freshly opened socket to a record that had none.
    ///
    /// Returns the socket back if the record already owns one.
    pub fn set_socket(&mut self, socket: OwnedFd) -> Result<(), OwnedFd> {
        if self.socket.is_some() {
            return Err(socket);
        }
        self.socket = Some(socket);
        Ok(())
    }

    /// Is this session counted against capacity?
    pub fn is_active(&self) -> bool {
        match &self.state {
            ProtoState::Icmp(icmp) => !icmp.stop,
            ProtoState::Udp(udp) => udp.state.is_active(),
            ProtoState::Tcp(tcp) => !tcp.state.is_terminal(),
        }
    }

    pub fn last_activity(&self) -> Moment {
        match &self.state {
            ProtoState::Icmp(icmp) => icmp.last_activity,
            ProtoState::Udp(udp) => udp.last_activity,
            ProtoState::Tcp(tcp) => tcp.last_activity,
        }
    }

    /// Record activity on the flow.
    pub fn touch(&mut self, now: Moment) {
        match &mut self.state {
            ProtoState::Icmp(icmp) => icmp.last_activity = now,
            ProtoState::Udp(udp) => udp.last_activity = now,
            ProtoState::Tcp(tcp) => tcp.last_activity = now,
        }
    }

    /// Close the socket, if one is open.
    ///
    /// The descriptor is given up even if `close(2)` reports an error,
    /// so calling this twice never closes twice.
    pub fn close_socket(&mut self) -> Result<Option<RawFd>, (RawFd, Errno)> {
        let Some(fd) = self.socket.take() else {
            return Ok(None);
        };
        let raw = fd.into_raw_fd();
        // Safety: `raw` was just released from the `OwnedFd` that was
        // its only owner.
        match Errno::result(unsafe { libc::close(raw) }) {
            Ok(_) => Ok(Some(raw)),
            Err(e) => Err((raw, e)),
        }
    }

    /// Forget the socket without closing it.
    pub(crate) fn disown_socket(&mut self) -> Option<RawFd> {
        self.socket.take().map(IntoRawFd::into_raw_fd)
    }

    /// Give back every resource held by the record: close the socket
    /// and tear down TCP state.
    pub fn release(&mut self) -> Result<Option<RawFd>, (RawFd, Errno)> {
        if let ProtoState::Tcp(tcp) = &mut self.state {
            tcp.clear_data();
        }
        self.close_socket()
    }

    /// A short summary of the protocol state.
    pub fn summary(&self) -> String {
        match &self.state {
            ProtoState::Icmp(icmp) => {
                let s = if icmp.stop { "STOPPED" } else { "ACTIVE" };
                format!("{s} id={}", icmp.id)
            }
            ProtoState::Udp(udp) => format!("{} dport={}", udp.state, udp.dport),
            ProtoState::Tcp(tcp) => format!(
                "{} dport={} buffered={}",
                tcp.state,
                tcp.dport,
                tcp.buffered_bytes()
            ),
        }
    }

    pub fn dump(&self, id: SessionId, now: Moment) -> SessionDump {
        let (sent, received) = match &self.state {
            ProtoState::Icmp(_) => (0, 0),
            ProtoState::Udp(udp) => (udp.sent, udp.received),
            ProtoState::Tcp(tcp) => (tcp.sent, tcp.received),
        };

        SessionDump {
            id: id.get(),
            protocol: self.protocol,
            fd: self.raw_fd(),
            state: self.summary(),
            active: self.is_active(),
            idle_ms: now.delta_as_millis(self.last_activity()),
            sent,
            received,
        }
    }
}
