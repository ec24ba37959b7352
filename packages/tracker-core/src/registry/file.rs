//! The file registry: one manifest per shared file, keyed by group.
//!
//! The registry stores manifests exactly as uploaded and mutates them only
//! through the seeder-set operations, which keep the manifest's `seeders`
//! and `seeder_paths` maps in lockstep. A file whose seeder set empties is
//! removed; its name becomes available for a fresh upload.
use std::collections::BTreeMap;

use parking_lot::RwLock;
use peergrid_primitives::PeerAddress;
use peergrid_wire_protocol::manifest::FileManifest;

use crate::error::FileError;

/// Manifests behind a single `RwLock`, keyed by `(group, file name)`.
#[derive(Debug, Default)]
pub struct InMemoryFileRegistry {
    groups: RwLock<BTreeMap<String, BTreeMap<String, FileManifest>>>,
}

impl InMemoryFileRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly uploaded manifest.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::AlreadyExists`] when the group already has a
    /// file with that name.
    pub fn add(&self, manifest: FileManifest) -> Result<(), FileError> {
        let mut groups = self.groups.write();
        let files = groups.entry(manifest.group.clone()).or_default();

        if files.contains_key(&manifest.name) {
            return Err(FileError::AlreadyExists {
                file: manifest.name.clone(),
                group: manifest.group.clone(),
            });
        }

        files.insert(manifest.name.clone(), manifest);

        Ok(())
    }

    #[must_use]
    pub fn exists(&self, group: &str, file: &str) -> bool {
        self.groups
            .read()
            .get(group)
            .is_some_and(|files| files.contains_key(file))
    }

    #[must_use]
    pub fn get(&self, group: &str, file: &str) -> Option<FileManifest> {
        self.groups.read().get(group).and_then(|files| files.get(file)).cloned()
    }

    /// File names registered in the group, live or not.
    #[must_use]
    pub fn list(&self, group: &str) -> Vec<String> {
        self.groups
            .read()
            .get(group)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Adds (or refreshes) a seeder for an existing file.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::NotFound`] when the file is not registered.
    pub fn add_seeder(&self, group: &str, file: &str, user: &str, address: PeerAddress, path: &str) -> Result<(), FileError> {
        let mut groups = self.groups.write();

        let manifest = groups
            .get_mut(group)
            .and_then(|files| files.get_mut(file))
            .ok_or_else(|| FileError::NotFound {
                file: file.to_string(),
                group: group.to_string(),
            })?;

        manifest.add_seeder(user, address, path);

        Ok(())
    }

    /// Removes a seeder; deletes the file when the seeder set empties.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::NotFound`] when the file is not registered, or
    /// [`FileError::NotASeeder`] when `user` was not seeding it.
    pub fn remove_seeder(&self, group: &str, file: &str, user: &str) -> Result<(), FileError> {
        let mut groups = self.groups.write();

        let Some(files) = groups.get_mut(group) else {
            return Err(FileError::NotFound {
                file: file.to_string(),
                group: group.to_string(),
            });
        };

        let Some(manifest) = files.get_mut(file) else {
            return Err(FileError::NotFound {
                file: file.to_string(),
                group: group.to_string(),
            });
        };

        if !manifest.remove_seeder(user) {
            return Err(FileError::NotASeeder {
                file: file.to_string(),
                group: group.to_string(),
            });
        }

        if !manifest.has_seeders() {
            files.remove(file);
        }

        Ok(())
    }
}
