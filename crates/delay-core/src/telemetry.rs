//! Log output for `delayctl` and `delayd`.
//!
//! Both binaries reserve stdout for their payload: exported CSV, JSON
//! summaries, or one prediction per line. Every log line therefore goes to
//! stderr, as plain text or as newline-delimited JSON.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter from `RUST_LOG`, or `level` for every target when it is unset or
/// unparsable.
pub fn log_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the stderr subscriber. Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let json_layer = json.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
    });
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(log_filter(level))
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .ok();
}
