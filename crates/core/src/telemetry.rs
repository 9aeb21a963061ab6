use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is unset: our crates at `info`, sqlx query logs muted.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Initialise the global tracing subscriber for a binary.
///
/// `RUST_LOG` wins over `default_filter`.
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();
}
