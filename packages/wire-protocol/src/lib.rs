//! The wire protocol spoken between `peergrid` peers and trackers.
//!
//! Everything that crosses a socket is defined here so that both sides agree
//! on a single implementation:
//!
//! - [`framing`]: the 8-byte big-endian length-prefixed frames used for
//!   manifest transfer, piece transfer and replication envelopes, plus the
//!   newline-terminated command lines.
//! - [`command`]: the client command set, decoded once at the protocol
//!   boundary into a tagged variant instead of repeated ad hoc token-count
//!   checks.
//! - [`manifest`]: the pipe-delimited [`manifest::FileManifest`]
//!   serialization. Field order and delimiter characters are part of the
//!   compatibility surface.
//! - [`sync`]: the `SYNC` replication envelope trackers exchange to converge
//!   their metadata.
pub mod command;
pub mod framing;
pub mod manifest;
pub mod sync;

use peergrid_primitives::ParseAddressError;

/// Errors raised while decoding wire input.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: u64, max: u64 },

    #[error("Malformed manifest: {reason}")]
    MalformedManifest { reason: String },

    #[error("Malformed replication envelope: {reason}")]
    MalformedEnvelope { reason: String },

    #[error("Invalid address in wire message: {source}")]
    InvalidAddress {
        #[from]
        source: ParseAddressError,
    },

    #[error("Connection closed by the remote end")]
    ConnectionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
