// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The control channel: a pipe used only to tell the reactor to stop.

use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use std::fs::File;
use std::io;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::os::fd::AsFd;
use std::os::fd::BorrowedFd;
use std::sync::Arc;

/// Create a connected stop signal and receiver.
pub fn control_channel() -> nix::Result<(StopSignal, ControlReceiver)> {
    let (r, w) = pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC)?;
    let signal = StopSignal { pipe: Arc::new(File::from(w)) };
    let receiver = ControlReceiver { pipe: File::from(r) };
    Ok((signal, receiver))
}

/// The sending half of the control channel.
#[derive(Clone, Debug)]
pub struct StopSignal {
    pipe: Arc<File>,
}

impl StopSignal {
    /// Ask the reactor to stop.
    ///
    /// A full pipe already holds a pending request, so it counts as
    /// success.
    pub fn signal(&self) -> io::Result<()> {
        match (&*self.pipe).write(&[1]) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// The receiving half of the control channel, registered with the
/// reactor's notifier.
#[derive(Debug)]
pub struct ControlReceiver {
    pipe: File,
}

impl ControlReceiver {
    /// Consume one stop request. Returns `false` if none was pending.
    pub fn drain_one(&self) -> io::Result<bool> {
        let mut b = [0u8; 1];
        match (&self.pipe).read(&mut b) {
            Ok(n) => Ok(n == 1),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl AsFd for ControlReceiver {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.pipe.as_fd()
    }
}
