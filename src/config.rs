//! TOML configuration for the two binaries.
//!
//! Addresses appear in the file as `ip:port` strings:
//!
//! ```toml
//! bind_address = "0.0.0.0:7500"
//! siblings = ["127.0.0.1:7501", "127.0.0.1:7502"]
//! ```
//!
//! Both binaries run with built-in defaults when no config file is given.
use std::path::Path;

use peergrid_primitives::PeerAddress;
use serde::{Deserialize, Serialize};

/// Default port a tracker binds its command endpoint to.
pub const DEFAULT_TRACKER_PORT: u16 = 7500;

/// Default port a peer binds its piece server to.
pub const DEFAULT_PEER_PORT: u16 = 7000;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
}

/// Configuration of one tracker instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrackerConfig {
    /// Address the command endpoint listens on.
    #[serde(with = "address_string")]
    pub bind_address: PeerAddress,

    /// The other trackers of the cluster, targets of replication fan-out.
    #[serde(with = "address_list")]
    pub siblings: Vec<PeerAddress>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            bind_address: PeerAddress::unspecified(DEFAULT_TRACKER_PORT),
            siblings: Vec::new(),
        }
    }
}

impl TrackerConfig {
    /// Loads the config from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load(path)
    }
}

/// Configuration of one peer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PeerConfig {
    /// Address the piece server listens on; also announced to the tracker
    /// in the handshake.
    #[serde(with = "address_string")]
    pub listen_address: PeerAddress,

    /// The tracker cluster, tried in order.
    #[serde(with = "address_list")]
    pub trackers: Vec<PeerAddress>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            listen_address: PeerAddress::unspecified(DEFAULT_PEER_PORT),
            trackers: vec![PeerAddress::new(
                std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                DEFAULT_TRACKER_PORT,
            )],
        }
    }
}

impl PeerConfig {
    /// Loads the config from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load(path)
    }
}

fn load<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

mod address_string {
    use peergrid_primitives::PeerAddress;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(addr: &PeerAddress, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PeerAddress, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

mod address_list {
    use peergrid_primitives::PeerAddress;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(addrs: &[PeerAddress], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(addrs.len()))?;
        for addr in addrs {
            seq.serialize_element(&addr.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<PeerAddress>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|addr| addr.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}
