//! The peer binary: a piece server plus the interactive console.
use std::process::ExitCode;
use std::sync::Arc;

use peergrid::bootstrap;
use peergrid::config::PeerConfig;
use peergrid::console::{Console, ConsoleOutput};
use peergrid_peer_core::error::TrackerClientError;
use peergrid_peer_core::serve::{run_piece_server, PieceServer};
use peergrid_peer_core::tracker_client::TrackerSession;
use peergrid_worker_pool::WorkerPool;
use tokio::io::AsyncBufReadExt;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> ExitCode {
    bootstrap::init_logging();

    let config = match bootstrap::config_path_from_args() {
        Some(path) => match PeerConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(%err, tag = "ERROR", "invalid configuration");
                return ExitCode::FAILURE;
            }
        },
        None => PeerConfig::default(),
    };

    let listener = match TcpListener::bind(config.listen_address.socket_addr()).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(address = %config.listen_address, %err, tag = "ERROR", "could not bind the piece server");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        address = %config.listen_address,
        trackers = config.trackers.len(),
        "peer starting"
    );

    // One pool per process: inbound piece requests and outbound piece
    // downloads draw from the same slots.
    let pool = WorkerPool::with_hardware_capacity();

    tokio::spawn(run_piece_server(listener, Arc::new(PieceServer::new()), pool.clone()));

    let session = TrackerSession::new(config.trackers.clone(), config.listen_address);
    let mut console = Console::new(session, pool, config.listen_address);

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::error!(%err, tag = "ERROR", "could not read from stdin");
                return ExitCode::FAILURE;
            }
        };

        match console.handle_line(&line).await {
            Ok(ConsoleOutput::Reply(reply)) => {
                if !reply.is_empty() {
                    println!("{reply}");
                }
            }
            Ok(ConsoleOutput::Quit) => break,
            Err(TrackerClientError::AllTrackersUnreachable) => {
                println!("Failed to connect to any tracker. Please try again.");
            }
            Err(err) => {
                tracing::error!(%err, tag = "ERROR", "tracker session failed");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
