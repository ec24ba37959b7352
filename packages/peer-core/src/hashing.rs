//! Content addressing: SHA-256 digests over pieces and whole files.
//!
//! Files are hashed with a streamed, piece-sized read buffer so a large
//! file never has to fit in memory. Digests are lower-case hex throughout;
//! they travel inside manifests and are compared as strings.
use std::collections::BTreeMap;
use std::path::Path;

use peergrid_primitives::{PeerAddress, PIECE_SIZE};
use peergrid_wire_protocol::manifest::FileManifest;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// SHA-256 of one in-memory piece, as lower-case hex.
#[must_use]
pub fn hash_piece(data: &[u8]) -> String {
    hex_digest(Sha256::digest(data).as_slice())
}

/// SHA-256 over the whole file, streamed with a piece-sized buffer.
///
/// # Errors
///
/// Returns the underlying IO error.
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; usize::try_from(PIECE_SIZE).unwrap_or(512 * 1024)];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex_digest(hasher.finalize().as_slice()))
}

/// Per-piece SHA-256 digests in piece order. The final piece covers the
/// remainder only.
///
/// # Errors
///
/// Returns the underlying IO error.
pub async fn piece_hashes(path: &Path) -> std::io::Result<Vec<String>> {
    let mut file = File::open(path).await?;
    let mut hashes = Vec::new();
    let mut buffer = vec![0u8; usize::try_from(PIECE_SIZE).unwrap_or(512 * 1024)];

    loop {
        // A piece may arrive over several short reads.
        let mut filled = 0;
        while filled < buffer.len() {
            let read = file.read(&mut buffer[filled..]).await?;
            if read == 0 {
                break;
            }
            filled += read;
        }

        if filled == 0 {
            break;
        }

        hashes.push(hash_piece(&buffer[..filled]));

        if filled < buffer.len() {
            break;
        }
    }

    Ok(hashes)
}

/// Builds the manifest announced at upload: hashes the file and registers
/// `owner`, serving from `path`, as the only seeder.
///
/// # Errors
///
/// Returns the underlying IO error.
pub async fn build_manifest(
    path: &Path,
    group: &str,
    owner: &str,
    listen: PeerAddress,
) -> std::io::Result<FileManifest> {
    let metadata = tokio::fs::metadata(path).await?;
    let size = metadata.len();

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let canonical = path.to_string_lossy().into_owned();

    let full_hash = hash_file(path).await?;
    let piece_hashes = piece_hashes(path).await?;

    let mut seeders = BTreeMap::new();
    seeders.insert(owner.to_string(), listen);
    let mut seeder_paths = BTreeMap::new();
    seeder_paths.insert(owner.to_string(), canonical.clone());

    Ok(FileManifest {
        name,
        path: canonical,
        owner: owner.to_string(),
        group: group.to_string(),
        size,
        piece_size: PIECE_SIZE,
        full_hash,
        piece_hashes,
        seeders,
        seeder_paths,
    })
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
