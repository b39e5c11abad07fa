// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Errors raised by the session engine.
//!
//! Only conditions which end a run are represented by
//! [`ReactorError`]. Per-session socket trouble is the business of the
//! protocol handler that owns the session and never surfaces here.

use super::session::SessionId;
use nix::errno::Errno;
use std::os::fd::RawFd;
use thiserror::Error;

/// Errors related to managing the session table.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Another record already owns this descriptor.
    #[error("descriptor {fd} already owned by session {owner}")]
    DescriptorInUse { fd: RawFd, owner: SessionId },
}

/// A fatal error from a protocol handler while servicing the virtual
/// interface.
#[derive(Debug, Error, Eq, PartialEq)]
#[error("{op} error{}: {msg}", fmt_errno(.errno))]
pub struct HandlerError {
    /// The operation which failed, e.g. `"tun read"`.
    pub op: &'static str,
    pub errno: Option<Errno>,
    pub msg: String,
}

impl HandlerError {
    pub fn new(op: &'static str, msg: impl Into<String>) -> Self {
        Self { op, errno: None, msg: msg.into() }
    }

    pub fn from_errno(op: &'static str, errno: Errno) -> Self {
        Self { op, errno: Some(errno), msg: errno.desc().to_string() }
    }
}

/// A run-terminating reactor error.
///
/// Each of these is reported exactly once to the outer service before
/// the reactor returns it.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("runtime attach failed: {0}")]
    Attach(String),

    #[error("epoll create error {}: {}", *.0 as i32, .0.desc())]
    NotifierCreate(Errno),

    #[error("epoll add {what} error {}: {}", *.errno as i32, .errno.desc())]
    Register { what: &'static str, errno: Errno },

    #[error("epoll wait error {}: {}", *.0 as i32, .0.desc())]
    Wait(Errno),

    #[error("tun {fd} dispatch failed: {source}")]
    Tun {
        fd: RawFd,
        #[source]
        source: HandlerError,
    },
}

impl ReactorError {
    /// The numeric cause, if there is one.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Self::Attach(_) => None,
            Self::NotifierCreate(e) | Self::Wait(e) => Some(*e),
            Self::Register { errno, .. } => Some(*errno),
            Self::Tun { source, .. } => source.errno,
        }
    }

    /// The name of the operation that failed.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Attach(_) => "attach",
            Self::NotifierCreate(_) => "epoll create",
            Self::Register { .. } => "epoll add",
            Self::Wait(_) => "epoll wait",
            Self::Tun { source, .. } => source.op,
        }
    }
}

fn fmt_errno(errno: &Option<Errno>) -> String {
    match errno {
        Some(e) => format!(" {}", *e as i32),
        None => String::new(),
    }
}
