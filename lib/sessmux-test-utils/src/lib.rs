// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Common routines for integration tests.

// This type of pedantry is more trouble than it's worth here.
#![allow(dead_code)]

pub mod handler;
pub mod hooks;
pub mod notifier;

pub use handler::HandlerStats;
pub use handler::RecordingHandler;
pub use hooks::HookLog;
pub use hooks::RecordingHooks;
pub use notifier::FakeNotifier;
pub use notifier::NotifierLog;

// Let's make our lives easier and pub use a bunch of stuff.
pub use sessmux::api::Protocol;
pub use sessmux::api::TcpState;
pub use sessmux::api::UdpState;
pub use sessmux::cfg::ReactorCfg;
pub use sessmux::engine::notify::Event;
pub use sessmux::engine::notify::Readiness;
pub use sessmux::engine::notify::Token;
pub use sessmux::engine::policy::Load;
pub use sessmux::engine::policy::TimeoutKind;
pub use sessmux::engine::policy::TimeoutPolicy;
pub use sessmux::engine::policy::WaitBounds;
pub use sessmux::engine::session::Session;
pub use sessmux::engine::session::SessionId;
pub use sessmux::engine::table::SessionTable;
pub use sessmux::provider::LogLevel;
pub use sessmux::provider::LogProvider;
pub use sessmux::provider::NullLog;
pub use sessmux::time::Moment;

use std::fs::File;
use std::io::ErrorKind;
use std::io::Write;
use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

/// A pipe whose read end stands in for a session socket.
///
/// The test keeps the write end to make the socket readable and to
/// observe when the session closes it.
pub fn pipe_pair() -> (OwnedFd, File) {
    let (r, w) = nix::unistd::pipe().unwrap();
    (r, File::from(w))
}

/// Has the read end of this pipe been closed?
///
/// Writes one byte as a side effect when it hasn't.
pub fn peer_closed(w: &File) -> bool {
    match (&*w).write(&[0]) {
        Ok(_) => false,
        Err(e) if e.kind() == ErrorKind::BrokenPipe => true,
        Err(e) => panic!("unexpected pipe error: {e}"),
    }
}

/// A table which logs nowhere.
pub fn new_table() -> SessionTable {
    SessionTable::new(Arc::new(NullLog))
}

/// Poll `cond` until it holds or five seconds pass.
pub fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// A log provider which keeps every message.
#[derive(Clone, Default)]
pub struct CaptureLog {
    pub msgs: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl CaptureLog {
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.msgs
            .lock()
            .unwrap()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.msgs.lock().unwrap().iter().filter(|(l, _)| *l == level).count()
    }
}

impl LogProvider for CaptureLog {
    fn log(&self, level: LogLevel, msg: &str) {
        self.msgs.lock().unwrap().push((level, msg.to_string()));
    }
}
