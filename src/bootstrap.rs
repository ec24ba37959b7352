//! Process setup shared by the two binaries.
use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, `info` otherwise.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves the optional config file path from the command line: the first
/// argument if present, `None` for built-in defaults.
#[must_use]
pub fn config_path_from_args() -> Option<std::path::PathBuf> {
    std::env::args().nth(1).map(std::path::PathBuf::from)
}
