//! Log output for command-line hosts of the bridge.
//!
//! Logs go to stderr so stdout stays free for command output. The level can be
//! changed once after startup, when it is only known from loaded configuration.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

static LEVEL_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

const FALLBACK_LEVEL: &str = "warn";

/// Filter for `level`, or for `warn` when `level` is not a valid directive.
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL))
}

/// Install a stderr subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init_stderr_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(level));
    let (filter, handle) = reload::Layer::new(filter);
    let _ = LEVEL_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

/// Replace the active level. Returns `false` when no subscriber was installed.
pub fn set_log_level(level: &str) -> bool {
    LEVEL_HANDLE
        .get()
        .is_some_and(|handle| handle.modify(|f| *f = level_filter(level)).is_ok())
}
