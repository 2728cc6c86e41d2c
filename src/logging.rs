//! `tracing` subscriber setup.
//!
//! The filter comes from `RUST_LOG` when set, otherwise from
//! `app.log_level`. Output is human-readable text or one JSON object per
//! line, per `app.log_format`. Initialisation happens at most once per
//! process; later calls are no-ops.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

static LOGGER_INIT: Once = Once::new();

pub fn init_logging(app: &AppConfig) {
    let level = app.log_level.clone();
    let json = app.log_format == "json";

    LOGGER_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr);

        // try_init: a test harness may already own the global subscriber.
        let _ = if json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
    });
}
