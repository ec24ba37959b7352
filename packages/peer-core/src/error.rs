//! Peer-side errors.
use std::path::PathBuf;

use peergrid_wire_protocol::ProtocolError;

/// Errors ending a download attempt. Integrity faults are fatal to the
/// attempt and leave no partial file behind; the session stays usable.
#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    /// The tracker answered the `download_file` command with a failure line
    /// instead of a `file_data` payload.
    #[error("tracker rejected the download: {reply}")]
    TrackerRejected { reply: String },

    #[error("failed to create destination file {path}: {source}")]
    CreateDestination {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No seeder produced a valid copy of this piece; the partial file has
    /// been deleted.
    #[error("piece {index} corrupted or missing")]
    PieceFailed { index: u64 },

    /// A seeder framed a piece with the wrong length.
    #[error("piece {index} length mismatch: expected {expected} bytes, got {got}")]
    PieceLengthMismatch { index: u64, expected: u64, got: u64 },

    /// Every piece verified individually but the reassembled file did not;
    /// the destination file has been deleted.
    #[error("full file hash mismatch")]
    FullHashMismatch,

    #[error(transparent)]
    Tracker(#[from] TrackerClientError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the tracker client session, including failover exhaustion.
#[derive(thiserror::Error, Debug)]
pub enum TrackerClientError {
    #[error("failed to connect to any tracker")]
    AllTrackersUnreachable,

    #[error("the tracker connection was lost")]
    ConnectionLost,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
