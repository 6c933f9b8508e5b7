//! Tracing and logging setup shared by every binary.

/// Initialize process-wide tracing/logging.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filters, formatting).
pub mod tracing;
