//! The core `peergrid-tracker-core` crate contains the generic tracker logic
//! which is independent of the delivery layer.
//!
//! A peergrid tracker is the metadata authority of the overlay: it knows who
//! is logged in and from which address, which groups exist and who belongs
//! to them, and which files are shared with which piece hashes and seeders.
//! It never touches file content; peers exchange pieces directly and only
//! report the outcome back here.
//!
//! ```text
//!      peer sessions  |
//! sibling replication |-> registries (users / groups / files)
//! ```
//!
//! # Sessions
//!
//! Every inbound connection is classified by its first line
//! ([`session::serve_connection`]): a client handshake opens a command loop,
//! a `SYNC_SIZE` announcement delivers one replication envelope. Client
//! commands are decoded once at the protocol boundary and dispatched through
//! [`handler::CommandHandler`], which produces the reply line and the
//! mutation to replicate.
//!
//! # Replication
//!
//! Trackers are symmetric replicas. Each successful mutation is fanned out
//! fire-and-forget to every sibling ([`replication::Replicator`]) and
//! applied there through the same handlers, so re-delivery degrades into a
//! logged no-op rather than divergence. There is no persistence: a tracker
//! that restarts rebuilds its view from future traffic, and clients fail
//! over to the next tracker in their list.
//!
//! # Registries
//!
//! The [`state::TrackerState`] aggregate owns the three in-memory
//! registries. All locking is internal (`parking_lot`), so handlers and
//! sessions share the state by `Arc` without coordination.
pub mod error;
pub mod handler;
pub mod registry;
pub mod replication;
pub mod session;
pub mod state;
pub mod test_helpers;
