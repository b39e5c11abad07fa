// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// The state of a relayed TCP session, as tracked by the TCP handler.
///
/// `Closing` and `Close` are not wire states: `Closing` means the
/// handler has started tearing the session down and `Close` means it is
/// finished with it. Both are terminal as far as the reactor is
/// concerned.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TcpState {
    Listen,
    SynSent,
    SynRecv,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    LastAck,
    TimeWait,
    Closing,
    Close,
}

impl TcpState {
    /// The handler is done with this session.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closing | Self::Close)
    }

    /// Still in the three-way handshake.
    pub const fn is_opening(&self) -> bool {
        matches!(self, Self::Listen | Self::SynSent | Self::SynRecv)
    }
}

impl Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            TcpState::Listen => "LISTEN",
            TcpState::SynSent => "SYN_SENT",
            TcpState::SynRecv => "SYN_RECV",
            TcpState::Established => "ESTABLISHED",
            TcpState::FinWait1 => "FIN_WAIT_1",
            TcpState::FinWait2 => "FIN_WAIT_2",
            TcpState::CloseWait => "CLOSE_WAIT",
            TcpState::LastAck => "LAST_ACK",
            TcpState::TimeWait => "TIME_WAIT",
            TcpState::Closing => "CLOSING",
            TcpState::Close => "CLOSE",
        };
        write!(f, "{s}")
    }
}
