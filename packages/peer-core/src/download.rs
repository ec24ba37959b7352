//! The download engine: piece-parallel file reconstruction.
//!
//! A download fans every piece out to the worker pool in a random order and
//! reassembles the file in place with offset writes. Each piece worker
//! rotates over the seeder set starting at `piece_index % seeder_count`, so
//! concurrent workers naturally spread load across seeders; a seeder that
//! times out, disconnects or serves bytes with the wrong digest is skipped
//! and the next one is tried, at most one full pass per piece. Integrity is
//! enforced twice: per piece against the manifest's piece digest before the
//! write, and over the reassembled file against the full digest. Any
//! failure deletes the partial file; a download never leaves corrupt bytes
//! on disk.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use peergrid_primitives::{piece_len, PeerAddress};
use peergrid_wire_protocol::framing::{read_frame_with_limit, write_line};
use peergrid_wire_protocol::manifest::FileManifest;
use peergrid_worker_pool::WorkerPool;
use rand::seq::SliceRandom;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::DownloadError;
use crate::hashing::{hash_file, hash_piece};
use crate::history::DownloadTask;

/// Deadline for connecting to one seeder.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Submissions between pacing pauses.
pub const PACING_INTERVAL: usize = 100;

/// Pause inserted every [`PACING_INTERVAL`] submissions so a huge download
/// does not monopolize the accept queues of its seeders.
pub const PACING_PAUSE: Duration = Duration::from_millis(50);

/// One seeder a piece can be fetched from: contact address plus the path
/// that seeder serves the file under.
#[derive(Debug, Clone)]
struct PieceSource {
    address: PeerAddress,
    path: String,
}

/// Shared, read-only context for every piece worker of one download.
#[derive(Debug)]
struct DownloadContext {
    sources: Vec<PieceSource>,
    piece_hashes: Vec<String>,
    piece_size: u64,
    total_size: u64,
    destination: PathBuf,
}

/// Downloads files piece-parallel through a bounded worker pool.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    pool: WorkerPool,
}

impl TransferEngine {
    #[must_use]
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    /// Reconstructs the file described by `manifest` at `destination`.
    ///
    /// On success the file on disk matches the manifest's full digest and
    /// the caller is expected to report itself as a new seeder. On any
    /// failure the partial file is deleted and `task` is marked failed.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::PieceFailed`] for the lowest-indexed piece
    /// no seeder could produce, [`DownloadError::FullHashMismatch`] when
    /// the reassembled file fails verification, or the IO error from
    /// preparing the destination.
    pub async fn download(
        &self,
        manifest: &FileManifest,
        destination: &Path,
        task: &Arc<DownloadTask>,
    ) -> Result<(), DownloadError> {
        preallocate(destination, manifest.size).await?;

        let piece_count = manifest.piece_count();

        let context = Arc::new(DownloadContext {
            sources: manifest
                .seeders
                .iter()
                .filter_map(|(user, address)| {
                    manifest.seeder_paths.get(user).map(|path| PieceSource {
                        address: *address,
                        path: path.clone(),
                    })
                })
                .collect(),
            piece_hashes: manifest.piece_hashes.clone(),
            piece_size: manifest.piece_size,
            total_size: manifest.size,
            destination: destination.to_path_buf(),
        });

        let results: Arc<Mutex<HashMap<u64, bool>>> = Arc::new(Mutex::new(HashMap::new()));
        let file_lock = Arc::new(tokio::sync::Mutex::new(()));

        let mut order: Vec<u64> = (0..piece_count).collect();
        order.shuffle(&mut rand::rng());

        for (submitted, index) in order.into_iter().enumerate() {
            if submitted > 0 && submitted % PACING_INTERVAL == 0 {
                tokio::time::sleep(PACING_PAUSE).await;
            }

            let context = context.clone();
            let results = results.clone();
            let file_lock = file_lock.clone();
            let task = task.clone();

            self.pool
                .spawn(async move {
                    let fetched = fetch_piece(&context, index, &file_lock).await;
                    if fetched {
                        task.piece_completed();
                    }
                    results.lock().insert(index, fetched);
                })
                .await;
        }

        self.pool.drain().await;

        // Report the lowest failed index, scanned after all workers are done.
        let first_failure = {
            let results = results.lock();
            (0..piece_count).find(|index| !results.get(index).copied().unwrap_or(false))
        };

        if let Some(index) = first_failure {
            discard(destination).await;
            task.mark_failed();
            return Err(DownloadError::PieceFailed { index });
        }

        if hash_file(destination).await? != manifest.full_hash {
            discard(destination).await;
            task.mark_failed();
            return Err(DownloadError::FullHashMismatch);
        }

        Ok(())
    }
}

async fn preallocate(destination: &Path, size: u64) -> Result<(), DownloadError> {
    let map_err = |source: std::io::Error| DownloadError::CreateDestination {
        path: destination.to_path_buf(),
        source,
    };

    let file = tokio::fs::File::create(destination).await.map_err(map_err)?;
    file.set_len(size).await.map_err(map_err)?;

    Ok(())
}

async fn discard(destination: &Path) {
    if let Err(err) = tokio::fs::remove_file(destination).await {
        tracing::error!(destination = %destination.display(), %err, tag = "ERROR", "failed to delete partial download");
    }
}

/// Fetches, verifies and writes one piece, rotating over the seeder set.
/// Returns `false` when no seeder produced a valid copy.
async fn fetch_piece(context: &DownloadContext, index: u64, file_lock: &tokio::sync::Mutex<()>) -> bool {
    let seeder_count = context.sources.len();
    if seeder_count == 0 {
        return false;
    }

    let Some(expected_len) = piece_len(context.total_size, context.piece_size, index) else {
        return false;
    };
    let Some(expected_hash) = context.piece_hashes.get(usize::try_from(index).unwrap_or(usize::MAX)) else {
        return false;
    };

    let start = usize::try_from(index).unwrap_or(0) % seeder_count;

    for attempt in 0..seeder_count {
        let source = &context.sources[(start + attempt) % seeder_count];

        let piece = match fetch_from_seeder(source, index, expected_len).await {
            Ok(piece) => piece,
            Err(err) => {
                tracing::debug!(seeder = %source.address, piece = index, %err, "seeder attempt failed");
                continue;
            }
        };

        if hash_piece(&piece) != *expected_hash {
            tracing::warn!(seeder = %source.address, piece = index, tag = "FAILED", "piece digest mismatch, trying next seeder");
            continue;
        }

        match write_piece(&context.destination, index, context.piece_size, &piece, file_lock).await {
            Ok(()) => return true,
            Err(err) => {
                tracing::error!(piece = index, %err, tag = "ERROR", "failed to write verified piece");
                return false;
            }
        }
    }

    false
}

async fn fetch_from_seeder(source: &PieceSource, index: u64, expected_len: u64) -> Result<Vec<u8>, DownloadError> {
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(source.address.socket_addr()))
        .await
        .map_err(|_elapsed| {
            std::io::Error::new(std::io::ErrorKind::TimedOut, "seeder connect timed out")
        })??;

    let (mut read_half, mut writer) = stream.into_split();

    write_line(&mut writer, &format!("get_piece {} {index}", source.path)).await?;

    let piece = read_frame_with_limit(&mut read_half, expected_len).await?;

    if piece.len() as u64 != expected_len {
        return Err(DownloadError::PieceLengthMismatch {
            index,
            expected: expected_len,
            got: piece.len() as u64,
        });
    }

    Ok(piece)
}

async fn write_piece(
    destination: &Path,
    index: u64,
    piece_size: u64,
    piece: &[u8],
    file_lock: &tokio::sync::Mutex<()>,
) -> Result<(), DownloadError> {
    let _guard = file_lock.lock().await;

    let mut file = tokio::fs::OpenOptions::new().write(true).open(destination).await?;
    file.seek(std::io::SeekFrom::Start(index * piece_size)).await?;
    file.write_all(piece).await?;
    file.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {

    mod the_transfer_engine {
        use std::collections::BTreeMap;
        use std::sync::Arc;

        use peergrid_primitives::PIECE_SIZE;
        use peergrid_wire_protocol::manifest::FileManifest;
        use peergrid_worker_pool::WorkerPool;

        use crate::download::TransferEngine;
        use crate::error::DownloadError;
        use crate::history::{DownloadStatus, DownloadTask};

        #[tokio::test]
        async fn a_download_with_no_seeders_should_fail_and_leave_no_file_behind() {
            let manifest = FileManifest {
                name: "report.pdf".to_string(),
                path: "/nowhere/report.pdf".to_string(),
                owner: "alice".to_string(),
                group: "g1".to_string(),
                size: PIECE_SIZE + 10,
                piece_size: PIECE_SIZE,
                full_hash: "f".repeat(64),
                piece_hashes: vec!["a".repeat(64), "b".repeat(64)],
                seeders: BTreeMap::new(),
                seeder_paths: BTreeMap::new(),
            };

            let dir = tempfile::tempdir().unwrap();
            let destination = dir.path().join("report.pdf");
            let task = Arc::new(DownloadTask::new("g1", "report.pdf", manifest.piece_count()));

            let engine = TransferEngine::new(WorkerPool::new(2));
            let result = engine.download(&manifest, &destination, &task).await;

            assert!(matches!(result, Err(DownloadError::PieceFailed { index: 0 })));
            assert_eq!(task.status(), DownloadStatus::Failed);
            assert!(!destination.exists(), "partial file must be deleted");
        }
    }
}
