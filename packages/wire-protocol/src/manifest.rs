//! The serialized description of a shared file exchanged between peer and
//! tracker.
//!
//! The wire layout is pipe-delimited and its field order is part of the
//! compatibility surface:
//!
//! ```text
//! name|path|owner|group|size|piece_size|full_hash|h1,h2,...|user:ip:port;...|user:path;...
//! ```
//!
//! An absent seeder IP is encoded as `0.0.0.0`. Any reimplementation must
//! match this layout exactly for interop with unmodified peers.
use std::collections::BTreeMap;

use peergrid_primitives::{piece_count, PeerAddress};

use crate::ProtocolError;

/// Describes one shared file: identity, content hashes and the set of peers
/// currently offering it.
///
/// The manifest is immutable except through [`FileManifest::add_seeder`] and
/// [`FileManifest::remove_seeder`], which keep the `seeders` and
/// `seeder_paths` maps in lockstep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileManifest {
    /// File name, unique within its group.
    pub name: String,
    /// Canonical path on the current owner's machine.
    pub path: String,
    /// The seeder whose `path` is the canonical one.
    pub owner: String,
    pub group: String,
    /// File size in bytes.
    pub size: u64,
    /// Piece size in bytes, fixed at 512 KiB; carried on the wire anyway so
    /// both sides can cross-check.
    pub piece_size: u64,
    /// Hex digest over the whole file.
    pub full_hash: String,
    /// Ordered per-piece hex digests; `len == ceil(size / piece_size)`.
    pub piece_hashes: Vec<String>,
    /// Peers currently offering this file.
    pub seeders: BTreeMap<String, PeerAddress>,
    /// The local path each seeder serves the file from.
    pub seeder_paths: BTreeMap<String, String>,
}

impl FileManifest {
    #[must_use]
    pub fn piece_count(&self) -> u64 {
        piece_count(self.size, self.piece_size)
    }

    /// Registers `user` as a seeder serving the file from `path`, keeping
    /// both maps in lockstep.
    pub fn add_seeder(&mut self, user: &str, addr: PeerAddress, path: &str) {
        self.seeders.insert(user.to_string(), addr);
        self.seeder_paths.insert(user.to_string(), path.to_string());
    }

    /// Removes `user` from the seeder set.
    ///
    /// When the removed seeder was the canonical owner and other seeders
    /// remain, ownership is re-designated to one of them and the canonical
    /// path follows. Returns `false` if `user` was not a seeder.
    pub fn remove_seeder(&mut self, user: &str) -> bool {
        if self.seeders.remove(user).is_none() {
            return false;
        }
        self.seeder_paths.remove(user);

        if self.owner == user {
            if let Some((next_owner, next_path)) = self.seeder_paths.iter().next() {
                self.owner = next_owner.clone();
                self.path = next_path.clone();
            }
        }

        true
    }

    #[must_use]
    pub fn has_seeders(&self) -> bool {
        !self.seeders.is_empty()
    }

    /// Serializes the manifest into its pipe-delimited wire form.
    #[must_use]
    pub fn to_wire_string(&self) -> String {
        let piece_hashes = self.piece_hashes.join(",");

        let seeders = self
            .seeders
            .iter()
            .map(|(user, addr)| format!("{user}:{}:{}", addr.ip, addr.port))
            .collect::<Vec<_>>()
            .join(";");

        let seeder_paths = self
            .seeder_paths
            .iter()
            .map(|(user, path)| format!("{user}:{path}"))
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}|{}|{}|{}|{}|{}|{}|{piece_hashes}|{seeders}|{seeder_paths}",
            self.name, self.path, self.owner, self.group, self.size, self.piece_size, self.full_hash
        )
    }

    /// Parses a manifest from its pipe-delimited wire form.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedManifest`] when a field is missing
    /// or a number or address does not parse.
    pub fn from_wire_string(raw: &str) -> Result<Self, ProtocolError> {
        let fields: Vec<&str> = raw.split('|').collect();

        if fields.len() != 10 {
            return Err(ProtocolError::MalformedManifest {
                reason: format!("expected 10 pipe-delimited fields, got {}", fields.len()),
            });
        }

        let size = fields[4].parse::<u64>().map_err(|_| ProtocolError::MalformedManifest {
            reason: format!("invalid size: {}", fields[4]),
        })?;

        let piece_size = fields[5].parse::<u64>().map_err(|_| ProtocolError::MalformedManifest {
            reason: format!("invalid piece size: {}", fields[5]),
        })?;

        if piece_size == 0 {
            return Err(ProtocolError::MalformedManifest {
                reason: "piece size must be non-zero".to_string(),
            });
        }

        let piece_hashes: Vec<String> = fields[7]
            .split(',')
            .filter(|hash| !hash.is_empty())
            .map(ToString::to_string)
            .collect();

        let expected_pieces = piece_count(size, piece_size);
        if piece_hashes.len() as u64 != expected_pieces {
            return Err(ProtocolError::MalformedManifest {
                reason: format!("expected {expected_pieces} piece hashes, got {}", piece_hashes.len()),
            });
        }

        let mut seeders = BTreeMap::new();
        for entry in fields[8].split(';').filter(|entry| !entry.is_empty()) {
            let (user, addr_raw) = entry.split_once(':').ok_or_else(|| ProtocolError::MalformedManifest {
                reason: format!("invalid seeder entry: {entry}"),
            })?;
            let addr = addr_raw.parse::<PeerAddress>()?;
            seeders.insert(user.to_string(), addr);
        }

        let mut seeder_paths = BTreeMap::new();
        for entry in fields[9].split(';').filter(|entry| !entry.is_empty()) {
            let (user, path) = entry.split_once(':').ok_or_else(|| ProtocolError::MalformedManifest {
                reason: format!("invalid seeder path entry: {entry}"),
            })?;
            seeder_paths.insert(user.to_string(), path.to_string());
        }

        Ok(Self {
            name: fields[0].to_string(),
            path: fields[1].to_string(),
            owner: fields[2].to_string(),
            group: fields[3].to_string(),
            size,
            piece_size,
            full_hash: fields[6].to_string(),
            piece_hashes,
            seeders,
            seeder_paths,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::net::{IpAddr, Ipv4Addr};

    use peergrid_primitives::{PeerAddress, PIECE_SIZE};

    use crate::manifest::FileManifest;

    fn sample_manifest() -> FileManifest {
        let mut seeders = BTreeMap::new();
        seeders.insert(
            "alice".to_string(),
            PeerAddress::new(IpAddr::V4(Ipv4Addr::new(126, 0, 0, 1)), 6881),
        );
        seeders.insert(
            "bob".to_string(),
            PeerAddress::new(IpAddr::V4(Ipv4Addr::new(126, 0, 0, 2)), 6882),
        );

        let mut seeder_paths = BTreeMap::new();
        seeder_paths.insert("alice".to_string(), "/home/alice/report.pdf".to_string());
        seeder_paths.insert("bob".to_string(), "/downloads/report.pdf".to_string());

        FileManifest {
            name: "report.pdf".to_string(),
            path: "/home/alice/report.pdf".to_string(),
            owner: "alice".to_string(),
            group: "g1".to_string(),
            size: 2 * PIECE_SIZE + 100,
            piece_size: PIECE_SIZE,
            full_hash: "f".repeat(64),
            piece_hashes: vec!["a".repeat(64), "b".repeat(64), "c".repeat(64)],
            seeders,
            seeder_paths,
        }
    }

    mod the_wire_form {
        use peergrid_primitives::PeerAddress;

        use super::sample_manifest;
        use crate::manifest::FileManifest;

        #[test]
        fn it_should_round_trip_a_manifest_with_seeders_and_pieces() {
            let manifest = sample_manifest();

            let parsed = FileManifest::from_wire_string(&manifest.to_wire_string()).unwrap();

            assert_eq!(parsed, manifest);
        }

        #[test]
        fn it_should_round_trip_a_manifest_with_no_seeders_and_no_pieces() {
            let mut manifest = sample_manifest();
            manifest.piece_hashes.clear();
            manifest.seeders.clear();
            manifest.seeder_paths.clear();
            manifest.size = 0;

            let parsed = FileManifest::from_wire_string(&manifest.to_wire_string()).unwrap();

            assert_eq!(parsed, manifest);
        }

        #[test]
        fn it_should_keep_the_documented_field_order() {
            let manifest = sample_manifest();

            let wire = manifest.to_wire_string();
            let fields: Vec<&str> = wire.split('|').collect();

            assert_eq!(fields[0], "report.pdf");
            assert_eq!(fields[1], "/home/alice/report.pdf");
            assert_eq!(fields[2], "alice");
            assert_eq!(fields[3], "g1");
            assert_eq!(fields[4], manifest.size.to_string());
            assert_eq!(fields[5], manifest.piece_size.to_string());
            assert_eq!(fields[6], manifest.full_hash);
            assert_eq!(fields[8], "alice:126.0.0.1:6881;bob:126.0.0.2:6882");
        }

        #[test]
        fn it_should_encode_an_absent_seeder_ip_as_all_zeros() {
            let mut manifest = sample_manifest();
            manifest.seeders.insert("carol".to_string(), PeerAddress::unspecified(7000));
            manifest.seeder_paths.insert("carol".to_string(), "/tmp/r".to_string());

            let wire = manifest.to_wire_string();

            assert!(wire.contains("carol:0.0.0.0:7000"));
        }

        #[test]
        fn it_should_reject_a_manifest_with_missing_fields() {
            assert!(FileManifest::from_wire_string("only|four|fields|here").is_err());
        }

        #[test]
        fn it_should_reject_a_manifest_with_a_bad_size() {
            let raw = "f|p|o|g|not-a-number|524288|hash|||";

            assert!(FileManifest::from_wire_string(raw).is_err());
        }

        // A zero piece size would make every later piece-count division
        // blow up, so it never gets past parsing.
        #[test]
        fn it_should_reject_a_zero_piece_size() {
            let raw = "f|p|o|g|100|0|hash|aa||";

            assert!(FileManifest::from_wire_string(raw).is_err());
        }

        #[test]
        fn it_should_reject_a_piece_hash_count_that_does_not_cover_the_size() {
            let mut manifest = sample_manifest();
            manifest.piece_hashes.pop();

            assert!(FileManifest::from_wire_string(&manifest.to_wire_string()).is_err());
        }
    }

    mod the_seeder_set {
        use std::net::{IpAddr, Ipv4Addr};

        use peergrid_primitives::PeerAddress;

        use super::sample_manifest;

        #[test]
        fn adding_a_seeder_should_keep_both_maps_in_lockstep() {
            let mut manifest = sample_manifest();

            manifest.add_seeder(
                "carol",
                PeerAddress::new(IpAddr::V4(Ipv4Addr::new(126, 0, 0, 3)), 6883),
                "/tmp/report.pdf",
            );

            assert!(manifest.seeders.contains_key("carol"));
            assert_eq!(manifest.seeder_paths.get("carol").unwrap(), "/tmp/report.pdf");
        }

        #[test]
        fn removing_the_owner_should_redesignate_ownership_to_a_remaining_seeder() {
            let mut manifest = sample_manifest();

            assert!(manifest.remove_seeder("alice"));

            assert_eq!(manifest.owner, "bob");
            assert_eq!(manifest.path, "/downloads/report.pdf");
            assert!(!manifest.seeders.contains_key("alice"));
            assert!(!manifest.seeder_paths.contains_key("alice"));
        }

        #[test]
        fn removing_a_non_owner_should_leave_the_canonical_path_alone() {
            let mut manifest = sample_manifest();

            assert!(manifest.remove_seeder("bob"));

            assert_eq!(manifest.owner, "alice");
            assert_eq!(manifest.path, "/home/alice/report.pdf");
        }

        #[test]
        fn removing_an_unknown_seeder_should_be_a_no_op() {
            let mut manifest = sample_manifest();

            assert!(!manifest.remove_seeder("mallory"));
            assert_eq!(manifest.seeders.len(), 2);
        }
    }
}
