//! Some generic test helpers functions.

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    use peergrid_primitives::{PeerAddress, PIECE_SIZE};
    use peergrid_wire_protocol::manifest::FileManifest;

    use crate::handler::CommandHandler;
    use crate::state::TrackerState;

    #[must_use]
    pub fn peer_address(last_octet: u8, port: u16) -> PeerAddress {
        PeerAddress::new(IpAddr::V4(Ipv4Addr::new(126, 0, 0, last_octet)), port)
    }

    /// A three-piece manifest with its owner as the only seeder.
    #[must_use]
    pub fn sample_manifest(name: &str, group: &str, owner: &str) -> FileManifest {
        let path = format!("/home/{owner}/{name}");

        let mut manifest = FileManifest {
            name: name.to_string(),
            path: path.clone(),
            owner: owner.to_string(),
            group: group.to_string(),
            size: 2 * PIECE_SIZE + 100,
            piece_size: PIECE_SIZE,
            full_hash: "f".repeat(64),
            piece_hashes: vec!["a".repeat(64), "b".repeat(64), "c".repeat(64)],
            seeders: BTreeMap::new(),
            seeder_paths: BTreeMap::new(),
        };
        manifest.add_seeder(owner, peer_address(1, 6881), &path);

        manifest
    }

    /// Fresh state with `user` registered and logged in from `126.0.0.1:6881`.
    ///
    /// # Panics
    ///
    /// Will panic if registration or login fails on a fresh state.
    #[must_use]
    pub fn logged_in_handler(user: &str) -> (Arc<TrackerState>, CommandHandler) {
        let state = Arc::new(TrackerState::new());
        state.users.register(user, "secret").expect("fresh state");
        state
            .users
            .login(user, "secret", peer_address(1, 6881))
            .expect("fresh state");

        let handler = CommandHandler::new(&state);

        (state, handler)
    }
}
