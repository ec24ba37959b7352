//! A group-based peer-to-peer file distribution overlay with replicated
//! trackers.
//!
//! The system has two kinds of nodes, built from the workspace packages and
//! wired together here:
//!
//! - **Trackers** (`peergrid-tracker`) hold the authoritative state: users,
//!   groups and file manifests. Every mutating command is replicated to the
//!   sibling trackers, so a peer can fail over to any of them.
//! - **Peers** (`peergrid-peer`) run an interactive console against the
//!   tracker cluster and a piece server for the files they share. Files are
//!   exchanged directly between peers in fixed-size, hash-verified pieces;
//!   the trackers never see file contents.
//!
//! This crate contains only the binary plumbing: configuration, logging
//! setup and the peer console. The protocol and the two cores live in the
//! `packages/` workspace members.
pub mod bootstrap;
pub mod config;
pub mod console;
