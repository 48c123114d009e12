//! Process-wide logging setup shared by binaries, tests and benchmarks.

pub mod subscriber;

pub use subscriber::{LOG_FORMAT_VAR, LogFormat};

/// Initialize process-wide logging.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    subscriber::init(LogFormat::from_env());
}
