use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging with tracing
///
/// This function sets up the tracing subscriber with the following configuration:
/// - Reads filter from RUST_LOG environment variable if available
/// - Falls back to "vivaflow=debug,warn" if RUST_LOG is not set
/// - Uses a formatted output layer
///
/// # Example
///
/// ```no_run
/// use vivaflow_lib::utils::logging::init_logging;
///
/// init_logging();
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vivaflow=debug,warn"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    tracing::info!("VivaFlow logging initialized");
}
