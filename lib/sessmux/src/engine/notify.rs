// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Readiness notification.
//!
//! The reactor multiplexes the control channel, the virtual interface
//! and every session socket through a [`Notifier`]. Each registered
//! descriptor carries a [`Token`] which comes back with its readiness
//! [`Event`]s, telling the reactor where to route them.

use super::session::SessionId;
use bitflags::bitflags;
use core::time::Duration;
use nix::poll::PollFd;
use nix::poll::PollFlags;
use nix::poll::PollTimeout;
use nix::poll::poll;
use nix::sys::epoll::Epoll;
use nix::sys::epoll::EpollCreateFlags;
use nix::sys::epoll::EpollEvent;
use nix::sys::epoll::EpollFlags;
use nix::sys::epoll::EpollTimeout;
use std::os::fd::BorrowedFd;

bitflags! {
    /// The readiness a registration asks to be told about.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Interest: u8 {
        const READABLE = 0x1;
        const WRITABLE = 0x2;
    }
}

bitflags! {
    /// The readiness reported for a descriptor.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Readiness: u8 {
        const READABLE = 0x1;
        const WRITABLE = 0x2;
        const ERROR = 0x4;
        const HANGUP = 0x8;
    }
}

/// Which descriptor an event belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Token {
    Control,
    Tun,
    Session(SessionId),
}

impl Token {
    const CONTROL: u64 = u64::MAX;
    const TUN: u64 = u64::MAX - 1;

    pub fn to_u64(self) -> u64 {
        match self {
            Self::Control => Self::CONTROL,
            Self::Tun => Self::TUN,
            Self::Session(id) => id.get(),
        }
    }

    pub fn from_u64(raw: u64) -> Self {
        match raw {
            Self::CONTROL => Self::Control,
            Self::TUN => Self::Tun,
            id => Self::Session(SessionId::new(id)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Event {
    pub token: Token,
    pub readiness: Readiness,
}

impl Event {
    pub fn new(token: Token, readiness: Readiness) -> Self {
        Self { token, readiness }
    }

    pub fn is_readable(&self) -> bool {
        self.readiness.contains(Readiness::READABLE)
    }

    pub fn is_writable(&self) -> bool {
        self.readiness.contains(Readiness::WRITABLE)
    }

    pub fn is_error(&self) -> bool {
        self.readiness.contains(Readiness::ERROR)
    }

    pub fn is_hangup(&self) -> bool {
        self.readiness.contains(Readiness::HANGUP)
    }
}

/// A readiness notification facility.
///
/// Registrations are always error sensitive: error and hangup
/// conditions are reported whatever the interest.
pub trait Notifier {
    fn register(
        &mut self,
        fd: BorrowedFd<'_>,
        token: Token,
        interest: Interest,
    ) -> nix::Result<()>;

    fn modify(
        &mut self,
        fd: BorrowedFd<'_>,
        token: Token,
        interest: Interest,
    ) -> nix::Result<()>;

    fn unregister(&mut self, fd: BorrowedFd<'_>) -> nix::Result<()>;

    /// Block for at most `timeout` and replace the contents of
    /// `events` with whatever became ready. Returns the number of
    /// events.
    fn wait(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Duration,
    ) -> nix::Result<usize>;
}

/// A [`Notifier`] backed by `epoll(7)`.
pub struct EpollNotifier {
    epoll: Epoll,
    buf: Vec<EpollEvent>,
}

impl EpollNotifier {
    /// Create a new epoll instance returning at most `max_events`
    /// events per wait.
    pub fn new(max_events: usize) -> nix::Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
        let buf = vec![EpollEvent::empty(); max_events.max(1)];
        Ok(Self { epoll, buf })
    }

    fn event(token: Token, interest: Interest) -> EpollEvent {
        let mut flags = EpollFlags::EPOLLERR;
        if interest.contains(Interest::READABLE) {
            flags |= EpollFlags::EPOLLIN;
        }
        if interest.contains(Interest::WRITABLE) {
            flags |= EpollFlags::EPOLLOUT;
        }
        EpollEvent::new(flags, token.to_u64())
    }
}

fn readiness(flags: EpollFlags) -> Readiness {
    let mut r = Readiness::empty();
    if flags.intersects(EpollFlags::EPOLLIN | EpollFlags::EPOLLPRI) {
        r |= Readiness::READABLE;
    }
    if flags.contains(EpollFlags::EPOLLOUT) {
        r |= Readiness::WRITABLE;
    }
    if flags.contains(EpollFlags::EPOLLERR) {
        r |= Readiness::ERROR;
    }
    if flags.intersects(EpollFlags::EPOLLHUP | EpollFlags::EPOLLRDHUP) {
        r |= Readiness::HANGUP;
    }
    r
}

impl Notifier for EpollNotifier {
    fn register(
        &mut self,
        fd: BorrowedFd<'_>,
        token: Token,
        interest: Interest,
    ) -> nix::Result<()> {
        self.epoll.add(fd, Self::event(token, interest))
    }

    fn modify(
        &mut self,
        fd: BorrowedFd<'_>,
        token: Token,
        interest: Interest,
    ) -> nix::Result<()> {
        self.epoll.modify(fd, &mut Self::event(token, interest))
    }

    fn unregister(&mut self, fd: BorrowedFd<'_>) -> nix::Result<()> {
        self.epoll.delete(fd)
    }

    fn wait(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Duration,
    ) -> nix::Result<usize> {
        events.clear();
        let timeout =
            EpollTimeout::try_from(timeout).unwrap_or(EpollTimeout::MAX);
        let n = self.epoll.wait(&mut self.buf, timeout)?;
        events.extend(self.buf[..n].iter().map(|ev| {
            Event::new(Token::from_u64(ev.data()), readiness(ev.events()))
        }));
        Ok(n)
    }
}

/// Is data immediately available on `fd`?
///
/// Any error, including an error condition on the descriptor itself,
/// answers no.
pub fn is_readable(fd: BorrowedFd<'_>) -> bool {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::ZERO) {
        Ok(n) if n > 0 => fds[0].revents().is_some_and(|r| {
            r.contains(PollFlags::POLLIN) && !r.contains(PollFlags::POLLERR)
        }),
        _ => false,
    }
}
