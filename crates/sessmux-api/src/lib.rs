// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Types shared between the session reactor, its admin tooling and
//! tests.

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

use alloc::string::String;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

pub mod tcp;
pub mod udp;

pub use tcp::*;
pub use udp::*;

/// The transport protocol of a session.
///
/// The discriminants are the IP protocol numbers.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum Protocol {
    Icmp = 1,
    Tcp = 6,
    Udp = 17,
    Icmpv6 = 58,
}

impl Protocol {
    pub const fn number(&self) -> u8 {
        *self as u8
    }

    pub const fn is_icmp(&self) -> bool {
        matches!(self, Self::Icmp | Self::Icmpv6)
    }
}

impl TryFrom<u8> for Protocol {
    type Error = String;

    fn try_from(num: u8) -> core::result::Result<Self, Self::Error> {
        match num {
            1 => Ok(Self::Icmp),
            6 => Ok(Self::Tcp),
            17 => Ok(Self::Udp),
            58 => Ok(Self::Icmpv6),
            _ => Err(format!("unsupported protocol number: {num}")),
        }
    }
}

impl core::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "icmp" => Ok(Self::Icmp),
            "icmpv6" | "icmp6" => Ok(Self::Icmpv6),
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            _ => Err(format!("invalid protocol: {s}")),
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Icmp => "ICMP",
            Self::Icmpv6 => "ICMPv6",
            Self::Udp => "UDP",
            Self::Tcp => "TCP",
        };
        write!(f, "{s}")
    }
}

/// An external view of one session record.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SessionDump {
    pub id: u64,
    pub protocol: Protocol,
    /// The session's descriptor, if it has one open.
    pub fd: Option<i32>,
    /// Protocol specific state summary.
    pub state: String,
    pub active: bool,
    pub idle_ms: u64,
    pub sent: u64,
    pub received: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn protocol_numbers() {
        for p in [Protocol::Icmp, Protocol::Icmpv6, Protocol::Udp, Protocol::Tcp]
        {
            assert_eq!(Protocol::try_from(p.number()), Ok(p));
        }
        assert!(Protocol::try_from(47).is_err());
        assert!(Protocol::Icmpv6.is_icmp());
        assert!(!Protocol::Udp.is_icmp());
    }

    #[test]
    fn protocol_parse() {
        assert_eq!("icmp6".parse::<Protocol>(), Ok(Protocol::Icmpv6));
        assert_eq!("TCP".parse::<Protocol>(), Ok(Protocol::Tcp));
        assert!("sctp".parse::<Protocol>().is_err());
    }

    #[test]
    fn dump_serializes() {
        let dump = SessionDump {
            id: 7,
            protocol: Protocol::Udp,
            fd: Some(12),
            state: "ACTIVE".into(),
            active: true,
            idle_ms: 1500,
            sent: 10,
            received: 20,
        };
        let json = serde_json::to_string(&dump).unwrap();
        let back: SessionDump = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dump);
    }
}
