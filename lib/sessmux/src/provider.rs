// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Providers allow the reactor to run inside different embeddings by
//! letting the embedder plug in core services. Today that is only
//! logging: a mobile VPN service wants its platform logger, a test
//! wants `println!`, and a standalone daemon wants a real structured
//! logger. If a service doesn't have at least two obvious
//! implementations it probably doesn't need to be a provider.

use core::fmt;
use core::fmt::Display;
use slog::Drain;
use std::sync::Arc;

/// A logging provider provides the means to log messages to some
/// destination based on the context in which the reactor is running.
///
/// Logging levels are provided by [`LogLevel`]. These levels will map
/// to the underlying provider with varying degrees of success.
pub trait LogProvider: Send + Sync {
    /// Log a message at the specified level.
    fn log(&self, level: LogLevel, msg: &str);
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum LogLevel {
    Debug,
    Note,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_s = match self {
            Self::Debug => "[DEBUG]",
            Self::Note => "[NOTE]",
            Self::Warn => "[WARN]",
            Self::Error => "[ERROR]",
        };
        write!(f, "{level_s}")
    }
}

#[derive(Clone, Copy)]
pub struct PrintlnLog;

impl LogProvider for PrintlnLog {
    fn log(&self, level: LogLevel, msg: &str) {
        println!("{level} {msg}");
    }
}

/// Discard everything.
#[derive(Clone, Copy)]
pub struct NullLog;

impl LogProvider for NullLog {
    fn log(&self, _level: LogLevel, _msg: &str) {}
}

/// Log through an `slog` logger.
pub struct SlogLog {
    log: slog::Logger,
}

impl SlogLog {
    pub fn new(log: slog::Logger) -> Self {
        Self { log }
    }

    /// A terminal logger on stderr, filtered by `RUST_LOG`, with
    /// records shipped off the reactor thread by an async drain.
    pub fn stderr() -> Self {
        let decorator = slog_term::TermDecorator::new().stderr().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_envlogger::new(drain).ignore_res();
        let drain = slog_async::Async::new(drain).build().fuse();
        Self::new(slog::Logger::root(drain, slog::o!("component" => "sessmux")))
    }
}

impl LogProvider for SlogLog {
    fn log(&self, level: LogLevel, msg: &str) {
        match level {
            LogLevel::Debug => slog::debug!(self.log, "{}", msg),
            LogLevel::Note => slog::info!(self.log, "{}", msg),
            LogLevel::Warn => slog::warn!(self.log, "{}", msg),
            LogLevel::Error => slog::error!(self.log, "{}", msg),
        }
    }
}

/// The set of all embedding-specific providers required by a run.
#[derive(Clone)]
pub struct Providers {
    pub log: Arc<dyn LogProvider>,
}

impl Providers {
    pub fn new(log: Arc<dyn LogProvider>) -> Self {
        Self { log }
    }
}

impl Default for Providers {
    fn default() -> Self {
        Self { log: Arc::new(PrintlnLog) }
    }
}
