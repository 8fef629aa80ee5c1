//! # Logging
//!
//! Structured logging for the ingest pipeline, built on `tracing` rather
//! than the base crate's `log`/`env_logger` pair: this crate is a
//! long-running service with many concurrent tasks (one per broker session,
//! one per worker, one per live `MessageGroup`), and per-span context is
//! worth more here than it was for the base crate's CLI tool.

use tracing_subscriber::{fmt, EnvFilter};

/// Output shape for [`init_logging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for local development.
    Pretty,
    /// One JSON object per line, for production log aggregation.
    Json,
}

/// Initializes the global tracing subscriber.
///
/// Honors `RUST_LOG` (defaulting to `info`) the same way the base crate's
/// `env_logger`-backed `init_logger` honors `RUST_LOG`. Call this exactly
/// once, at process start.
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt().with_env_filter(filter).with_target(true);

    match format {
        LogFormat::Pretty => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}
