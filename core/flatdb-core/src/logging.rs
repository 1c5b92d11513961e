//! Logging setup for applications and tests embedding flatdb.
//!
//! Statements run inside `tracing` spans (`execute_with_params`,
//! `query_with_params`, `commit_locked`, `open`), so enabling span close
//! events yields per-statement timings.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt, fmt::format::FmtSpan};

/// Filter directive used when `RUST_LOG` is not set.
pub fn default_directive(level: &str) -> String {
    format!("warn,flatdb_core={level}")
}

/// Initialize logging at `info` for flatdb and `warn` for everything else.
///
/// # Environment Variables
/// - `RUST_LOG` - overrides the filter entirely
///
/// # Example
/// ```rust
/// flatdb_core::logging::init();
/// ```
pub fn init() {
    init_with_level("info")
}

/// Initialize logging with flatdb events at `level`.
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Debug-level logging routed through the test harness writer.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new(default_directive("debug")))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
