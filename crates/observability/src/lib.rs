//! Tracing/logging setup shared by replaykit binaries.

/// Initialize process-wide tracing with JSON output and an `info` default
/// filter.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env(), tracing::DEFAULT_FILTER);
}

/// Tracing configuration (format, filters).
pub mod tracing;

pub use crate::tracing::LogFormat;
