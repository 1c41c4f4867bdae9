//! Tracing subscriber setup
//!
//! `RUST_LOG` always wins when set, e.g. `RUST_LOG=ltesync::tracker=debug`
//! or `RUST_LOG=ltesync=debug,ltesync::sync::correlator=trace`.

use once_cell::sync::Lazy;
use tracing_subscriber::{fmt, EnvFilter};

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Subscriber for unit and integration tests, installed once per process
///
/// Output goes through the test writer so it only shows for failing tests
/// (or with `--nocapture`). Defaults to warnings.
pub fn init_test_tracing() {
    static TRACING: Lazy<()> = Lazy::new(|| {
        let _ = fmt()
            .with_env_filter(filter_or("ltesync=warn"))
            .with_target(true)
            .with_line_number(true)
            .with_test_writer()
            .try_init();
    });
    Lazy::force(&TRACING);
}

/// Subscriber for the binaries
///
/// `verbosity` counts `-v` flags: 0 is info, 1 debug, 2 and more trace.
pub fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "ltesync=info",
        1 => "ltesync=debug",
        _ => "ltesync=trace",
    };
    fmt()
        .with_env_filter(filter_or(default))
        .with_target(true)
        .with_thread_ids(true)
        .init();
}
