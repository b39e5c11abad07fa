// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The session reactor of a userspace packet firewall.
//!
//! Raw IP packets arrive on a virtual interface and are mapped to
//! per-flow sessions by protocol handlers. This crate owns those
//! sessions: it keeps them in a [`engine::table::SessionTable`],
//! multiplexes the virtual interface and every session socket through
//! a readiness [`engine::notify::Notifier`], reclaims idle sessions
//! faster as the table fills up, and shuts down cleanly when told to
//! stop or when the interface fails.

#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub use sessmux_api as api;

pub mod cfg;
pub mod engine;
#[cfg(feature = "std")]
pub mod print;
pub mod provider;
pub mod service;
pub mod time;
