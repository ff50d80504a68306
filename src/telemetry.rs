//! Tracing and panic-report setup for binaries.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! binary's job. `init()` wires an env-filtered fmt layer plus the
//! `tracing-error` span-trace layer and miette's pretty panic hook.

use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. Call once at process start.
///
/// Filtering follows `RUST_LOG` when set, defaulting to `info` for this
/// crate and `warn` elsewhere.
pub fn init() {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,turnloom=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();

    // Pretty panic reports.
    miette::set_panic_hook();
}
