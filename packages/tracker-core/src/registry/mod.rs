//! In-memory registries holding the replicated tracker metadata.
//!
//! Three registries back the command handlers: users and their live
//! sessions, groups with their membership and join-request flow, and file
//! manifests with their seeder sets. All three are plain in-memory maps
//! behind `parking_lot` locks; durability comes from replication across
//! sibling trackers, not from persistence.
pub mod file;
pub mod group;
pub mod user;

pub use file::InMemoryFileRegistry;
pub use group::{InMemoryGroupRegistry, LeaveOutcome};
pub use user::InMemoryUserRegistry;
