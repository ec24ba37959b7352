//! Primitive types shared by the `peergrid` tracker and peer crates.
//!
//! This crate contains the types that appear on both sides of the wire
//! protocol and therefore cannot live in either the tracker or the peer
//! crate:
//!
//! - [`PeerAddress`]: a reachable `ip:port` socket endpoint, copied by value
//!   wherever it is needed.
//! - Piece arithmetic: the fixed piece size and the ceiling-division helpers
//!   that uploader and downloader must agree on to derive identical piece
//!   counts from a file size.
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed piece size (512 KiB) shared by uploader and downloader.
///
/// It is not negotiated on the wire. Both sides derive the piece count from
/// the file size with [`piece_count`], with the final piece truncated to the
/// remainder.
pub const PIECE_SIZE: u64 = 512 * 1024;

/// Number of pieces for a file of `size` bytes: `ceil(size / piece_size)`.
#[must_use]
pub fn piece_count(size: u64, piece_size: u64) -> u64 {
    size.div_ceil(piece_size)
}

/// Size in bytes of piece `index` of a file of `size` bytes.
///
/// All pieces have exactly `piece_size` bytes except the last one, which
/// holds the remainder. Returns `None` for an out-of-range index.
#[must_use]
pub fn piece_len(size: u64, piece_size: u64, index: u64) -> Option<u64> {
    let total = piece_count(size, piece_size);
    if index >= total {
        return None;
    }
    if index == total - 1 {
        Some(size - index * piece_size)
    } else {
        Some(piece_size)
    }
}

/// Error returned when a `ip:port` string cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseAddressError {
    #[error("Missing ':' separator in address: {raw}")]
    MissingSeparator { raw: String },

    #[error("Invalid IP address: {raw}")]
    InvalidIp { raw: String },

    #[error("Invalid port number: {raw}")]
    InvalidPort { raw: String },
}

/// A reachable socket endpoint, identified by IP address and port.
///
/// The address has no ownership semantics; it is copied by value wherever it
/// is needed. An "absent" address is encoded on the wire as `0.0.0.0`, which
/// is what [`PeerAddress::unspecified`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerAddress {
    #[must_use]
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// The placeholder address used when a seeder's IP is unknown.
    #[must_use]
    pub fn unspecified(port: u16) -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
        }
    }

    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self {
            ip: addr.ip(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for PeerAddress {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip_raw, port_raw) = s.rsplit_once(':').ok_or_else(|| ParseAddressError::MissingSeparator {
            raw: s.to_string(),
        })?;

        let ip = ip_raw.parse::<IpAddr>().map_err(|_| ParseAddressError::InvalidIp {
            raw: ip_raw.to_string(),
        })?;

        let port = port_raw.parse::<u16>().map_err(|_| ParseAddressError::InvalidPort {
            raw: port_raw.to_string(),
        })?;

        Ok(Self { ip, port })
    }
}
