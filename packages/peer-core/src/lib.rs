//! A library with the peer-side functionality of peergrid.
//!
//! A peer plays two roles at once:
//!
//! - **Client**: the [`tracker_client::TrackerSession`] keeps a command
//!   session with the tracker cluster, failing over to a sibling tracker and
//!   replaying its login when the active connection drops. Uploads announce
//!   a manifest built by [`hashing::build_manifest`]; downloads fetch the
//!   manifest back and hand it to the [`download::TransferEngine`], which
//!   pulls pieces from the live seeders in parallel and verifies every one
//!   against its digest before writing it.
//! - **Seeder**: the [`serve::PieceServer`] answers `get_piece` requests for
//!   files this peer shares, streaming each piece as one length-prefixed
//!   frame.
//!
//! Both roles share the bounded worker pool, so a peer serving pieces while
//! downloading never exceeds its concurrency budget. Finished and running
//! downloads are tracked in the [`history::DownloadHistory`] behind the
//! `show_downloads` report.
pub mod download;
pub mod error;
pub mod hashing;
pub mod history;
pub mod serve;
pub mod tracker_client;
