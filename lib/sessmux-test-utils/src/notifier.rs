// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A scripted notifier.

use nix::errno::Errno;
use sessmux::engine::notify::Event;
use sessmux::engine::notify::Interest;
use sessmux::engine::notify::Notifier;
use sessmux::engine::notify::Readiness;
use sessmux::engine::notify::Token;
use std::collections::VecDeque;
use std::os::fd::AsRawFd;
use std::os::fd::BorrowedFd;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct NotifierLog {
    pub registered: Vec<(RawFd, Token, Interest)>,
    pub modified: Vec<(RawFd, Token, Interest)>,
    pub unregistered: Vec<RawFd>,
    /// The timeout of every wait, in order.
    pub waits: Vec<Duration>,
    /// What successive waits return. Once this runs dry every wait
    /// returns a control event, which stops the reactor.
    pub script: VecDeque<Result<Vec<Event>, Errno>>,
    /// Registering this token fails with this errno.
    pub fail_register: Option<(Token, Errno)>,
    /// Every unregister fails with this errno, after being recorded.
    pub fail_unregister: Option<Errno>,
}

impl NotifierLog {
    pub fn tokens_registered(&self) -> Vec<Token> {
        self.registered.iter().map(|(_, t, _)| *t).collect()
    }
}

/// A [`Notifier`] which records every call and replays scripted wait
/// results. Clones share the same log.
#[derive(Clone, Default)]
pub struct FakeNotifier {
    pub log: Arc<Mutex<NotifierLog>>,
}

impl FakeNotifier {
    pub fn new(script: Vec<Result<Vec<Event>, Errno>>) -> Self {
        let log = NotifierLog { script: script.into(), ..Default::default() };
        Self { log: Arc::new(Mutex::new(log)) }
    }

    pub fn fail_register(self, token: Token, errno: Errno) -> Self {
        self.log.lock().unwrap().fail_register = Some((token, errno));
        self
    }

    pub fn fail_unregister(self, errno: Errno) -> Self {
        self.log.lock().unwrap().fail_unregister = Some(errno);
        self
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.log.lock().unwrap().waits.clone()
    }
}

impl Notifier for FakeNotifier {
    fn register(
        &mut self,
        fd: BorrowedFd<'_>,
        token: Token,
        interest: Interest,
    ) -> nix::Result<()> {
        let mut log = self.log.lock().unwrap();
        if let Some((t, errno)) = log.fail_register {
            if t == token {
                return Err(errno);
            }
        }
        log.registered.push((fd.as_raw_fd(), token, interest));
        Ok(())
    }

    fn modify(
        &mut self,
        fd: BorrowedFd<'_>,
        token: Token,
        interest: Interest,
    ) -> nix::Result<()> {
        self.log.lock().unwrap().modified.push((fd.as_raw_fd(), token, interest));
        Ok(())
    }

    fn unregister(&mut self, fd: BorrowedFd<'_>) -> nix::Result<()> {
        let mut log = self.log.lock().unwrap();
        log.unregistered.push(fd.as_raw_fd());
        match log.fail_unregister {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }

    fn wait(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Duration,
    ) -> nix::Result<usize> {
        let mut log = self.log.lock().unwrap();
        log.waits.push(timeout);
        events.clear();
        match log.script.pop_front() {
            Some(Ok(evs)) => events.extend(evs),
            Some(Err(errno)) => return Err(errno),
            None => {
                events.push(Event::new(Token::Control, Readiness::READABLE))
            }
        }
        Ok(events.len())
    }
}
