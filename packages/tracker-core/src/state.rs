//! The aggregate of every in-memory registry a tracker owns.
use crate::registry::{InMemoryFileRegistry, InMemoryGroupRegistry, InMemoryUserRegistry};

/// All replicated tracker metadata, shared across sessions by `Arc`.
#[derive(Debug, Default)]
pub struct TrackerState {
    pub users: InMemoryUserRegistry,
    pub groups: InMemoryGroupRegistry,
    pub files: InMemoryFileRegistry,
}

impl TrackerState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
