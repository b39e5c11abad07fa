// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The session engine: records, the table that owns them, the
//! policies applied to them and the reactor that drives it all.

pub mod capacity;
pub mod control;
pub mod error;
pub mod handler;
pub mod notify;
pub mod policy;
pub mod reactor;
pub mod session;
pub mod table;

pub use error::HandlerError;
pub use error::ReactorError;
pub use error::SessionError;
