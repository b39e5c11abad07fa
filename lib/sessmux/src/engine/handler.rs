// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The protocol handler interface.
//!
//! Packet formats and socket relaying live outside of this crate. The
//! reactor drives them through a [`SessionHandler`], calling into it
//! synchronously from the reactor thread with the table lock held. A
//! handler must therefore never block: all socket I/O is expected to
//! be non-blocking, driven by readiness.

use super::error::HandlerError;
use super::notify::Event;
use super::notify::Notifier;
use super::policy::Load;
use super::session::Session;
use super::session::SessionId;
use super::table::SessionTable;
use std::os::fd::BorrowedFd;

/// What a handler gets to work with when servicing the virtual
/// interface.
pub struct TunContext<'a> {
    pub tun: BorrowedFd<'a>,
    /// New sessions are inserted here.
    pub table: &'a mut SessionTable,
    /// Sockets of new sessions are registered here, under
    /// [`super::notify::Token::Session`].
    pub notifier: &'a mut dyn Notifier,
    /// The census of the current iteration.
    pub load: Load,
}

pub trait SessionHandler: Send {
    /// Decode and dispatch one packet from the virtual interface.
    ///
    /// The reactor calls this for as long as the interface has data
    /// immediately available. An error ends the run.
    fn check_tun(&mut self, ctx: TunContext<'_>) -> Result<(), HandlerError>;

    /// Periodic check of an ICMP session. Returning `true` evicts it.
    fn check_icmp_session(
        &mut self,
        _id: SessionId,
        _session: &mut Session,
        _load: Load,
    ) -> bool {
        false
    }

    /// Periodic check of a UDP session. Returning `true` evicts it.
    fn check_udp_session(
        &mut self,
        _id: SessionId,
        _session: &mut Session,
        _load: Load,
    ) -> bool {
        false
    }

    /// Periodic check of a TCP session. Returning `true` evicts it.
    fn check_tcp_session(
        &mut self,
        _id: SessionId,
        _session: &mut Session,
        _load: Load,
    ) -> bool {
        false
    }

    /// Bring the notifier registration of a TCP socket in line with
    /// what the flow needs, e.g. writable interest while data is
    /// queued. Returning `true` asks for the next wait to be short.
    fn monitor_tcp_session(
        &mut self,
        _id: SessionId,
        _session: &mut Session,
        _notifier: &mut dyn Notifier,
    ) -> bool {
        false
    }

    /// Service readiness on an ICMP or ICMPv6 socket.
    fn check_icmp_socket(
        &mut self,
        _id: SessionId,
        _session: &mut Session,
        _event: &Event,
        _notifier: &mut dyn Notifier,
    ) {
    }

    /// Service readiness on a UDP socket. Called repeatedly while the
    /// session is active and its socket has data immediately available,
    /// at most [`super::reactor::UDP_CALLS_PER_EVENT`] times per event.
    fn check_udp_socket(
        &mut self,
        _id: SessionId,
        _session: &mut Session,
        _event: &Event,
        _notifier: &mut dyn Notifier,
    ) {
    }

    /// Service readiness on a TCP socket.
    fn check_tcp_socket(
        &mut self,
        _id: SessionId,
        _session: &mut Session,
        _event: &Event,
        _notifier: &mut dyn Notifier,
    ) {
    }
}
