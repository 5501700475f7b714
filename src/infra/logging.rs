//! Structured logging setup

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Pick the filter directive. `RUST_LOG` wins; `DEBUG=true` is a shorthand
/// for debug level; otherwise info.
pub fn filter_directive(rust_log: Option<&str>, debug: Option<&str>) -> String {
    if let Some(directive) = rust_log.filter(|d| !d.is_empty()) {
        return directive.to_string();
    }
    match debug {
        Some(v) if v.trim().eq_ignore_ascii_case("true") => "debug".to_string(),
        _ => "info".to_string(),
    }
}

/// Initialize the global tracing subscriber
pub fn init() {
    let rust_log = std::env::var("RUST_LOG").ok();
    let debug = std::env::var("DEBUG").ok();
    let filter = EnvFilter::try_new(filter_directive(rust_log.as_deref(), debug.as_deref()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();
}
