//! Tracing initialization with a runtime-reloadable log level, grounded on
//! the teacher's `octofhir_server::observability` module.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> = OnceLock::new();

pub fn init_tracing(level: &str) {
    let base_filter =
        std::env::var("RUST_LOG").ok().and_then(|_| EnvFilter::try_from_default_env().ok()).unwrap_or_else(|| EnvFilter::new(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry().with(reload_layer).with(fmt::layer()).try_init();
}

/// Applies a new log level at runtime, e.g. in response to a config reload.
pub fn apply_logging_level(level: &str) {
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        let _ = handle.modify(|f| *f = EnvFilter::new(level));
    }
}
