//! The piece server every peer runs next to its client session.
//!
//! A request is one line, `get_piece <path> <index>`, answered with a single
//! length-prefixed frame holding the raw piece bytes, streamed from disk in
//! bounded chunks. Malformed requests, unknown paths and out-of-range
//! indices are answered by closing the connection; the downloader treats a
//! short read as a failed attempt and rotates to the next seeder. Requests
//! for the same path are serialized with a per-path lock so an upload in
//! progress is never read half-written.
use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::Arc;

use parking_lot::Mutex;
use peergrid_primitives::{piece_count, piece_len};
use peergrid_wire_protocol::framing::FRAME_CHUNK_SIZE;
use peergrid_wire_protocol::ProtocolError;
use peergrid_worker_pool::WorkerPool;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Serves verified pieces of local files to other peers.
///
/// One instance is shared by every connection handler; it only holds the
/// per-path locks, the files themselves stay on disk.
#[derive(Debug, Default)]
pub struct PieceServer {
    path_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PieceServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.path_locks.lock();

        // Only in-flight paths stay tracked; an entry held by nobody but
        // the map itself is dead.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Accept loop for the piece server. Each connection is one request and is
/// handled on the shared worker pool.
///
/// # Errors
///
/// Returns the IO error of the accept loop itself. Per-connection errors are
/// logged and do not stop the server.
pub async fn run_piece_server(
    listener: TcpListener,
    server: Arc<PieceServer>,
    pool: WorkerPool,
) -> std::io::Result<()> {
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "piece server listening");

    loop {
        let (stream, remote) = listener.accept().await?;
        let server = server.clone();

        pool.spawn(async move {
            if let Err(err) = serve_request(stream, &server).await {
                tracing::debug!(%remote, %err, "piece request ended with an error");
            }
        })
        .await;
    }
}

/// Handles one `get_piece` request. Invalid requests return `Ok(())` after
/// dropping the connection without a reply.
async fn serve_request(stream: TcpStream, server: &PieceServer) -> Result<(), ProtocolError> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(());
    }

    let Some((path, index)) = parse_request(line.trim_end()) else {
        tracing::warn!(request = %line.trim_end(), tag = "FAILED", "malformed piece request");
        return Ok(());
    };

    let lock = server.lock_for(&path);
    let guard = lock.lock().await;

    let Ok(metadata) = tokio::fs::metadata(&path).await else {
        tracing::warn!(%path, tag = "FAILED", "piece requested for an unknown path");
        return Ok(());
    };

    let size = metadata.len();
    let Some(len) = piece_len(size, peergrid_primitives::PIECE_SIZE, index) else {
        tracing::warn!(
            %path,
            piece = index,
            pieces = piece_count(size, peergrid_primitives::PIECE_SIZE),
            tag = "FAILED",
            "piece index out of range"
        );
        return Ok(());
    };

    let mut file = tokio::fs::File::open(&path).await?;
    file.seek(SeekFrom::Start(index * peergrid_primitives::PIECE_SIZE)).await?;

    writer.write_u64(len).await?;

    // Stream the body without loading the whole piece.
    let mut remaining = len;
    let mut buffer = vec![0u8; FRAME_CHUNK_SIZE];
    while remaining > 0 {
        let want = usize::try_from(remaining.min(FRAME_CHUNK_SIZE as u64))
            .expect("chunk size fits in usize");
        let read = file.read(&mut buffer[..want]).await?;
        if read == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
        writer.write_all(&buffer[..read]).await?;
        remaining -= read as u64;
    }

    writer.flush().await?;
    drop(guard);

    tracing::debug!(%path, piece = index, bytes = len, "piece served");

    Ok(())
}

fn parse_request(line: &str) -> Option<(String, u64)> {
    let rest = line.strip_prefix("get_piece ")?;
    let (path, index_raw) = rest.rsplit_once(' ')?;
    let index = index_raw.parse::<u64>().ok()?;

    if path.is_empty() {
        return None;
    }

    Some((path.to_string(), index))
}
