//! The tracker binary: binds the command endpoint and serves forever.
use std::process::ExitCode;
use std::sync::Arc;

use peergrid::bootstrap;
use peergrid::config::TrackerConfig;
use peergrid_tracker_core::handler::CommandHandler;
use peergrid_tracker_core::replication::Replicator;
use peergrid_tracker_core::session::run_tracker;
use peergrid_tracker_core::state::TrackerState;
use peergrid_worker_pool::WorkerPool;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> ExitCode {
    bootstrap::init_logging();

    let config = match bootstrap::config_path_from_args() {
        Some(path) => match TrackerConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(%err, tag = "ERROR", "invalid configuration");
                return ExitCode::FAILURE;
            }
        },
        None => TrackerConfig::default(),
    };

    let listener = match TcpListener::bind(config.bind_address.socket_addr()).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(address = %config.bind_address, %err, tag = "ERROR", "could not bind the command endpoint");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        address = %config.bind_address,
        siblings = config.siblings.len(),
        "tracker starting"
    );

    let state = Arc::new(TrackerState::new());
    let handler = Arc::new(CommandHandler::new(&state));
    let replicator = Arc::new(Replicator::new(config.siblings.clone()));
    let pool = WorkerPool::with_hardware_capacity();

    tokio::select! {
        result = run_tracker(listener, handler, replicator, pool) => {
            if let Err(err) = result {
                tracing::error!(%err, tag = "ERROR", "tracker stopped on an accept error");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    ExitCode::SUCCESS
}
