// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// The well known DNS port; UDP flows to it get a shorter timeout.
pub const DNS_PORT: u16 = 53;

/// The state of a relayed UDP session.
///
/// Only `Active` sessions are counted against capacity. Every other
/// state means the UDP handler has logically closed the flow and the
/// record is waiting to be reclaimed.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum UdpState {
    Active,
    Finishing,
    Closed,
    Blocked,
}

impl UdpState {
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl Display for UdpState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            UdpState::Active => "ACTIVE",
            UdpState::Finishing => "FINISHING",
            UdpState::Closed => "CLOSED",
            UdpState::Blocked => "BLOCKED",
        };
        write!(f, "{s}")
    }
}
