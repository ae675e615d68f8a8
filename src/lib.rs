// src/lib.rs
// Public library surface for the bot binaries and integration tests.

pub mod clock;
pub mod config;
pub mod engine;
pub mod feeds;
pub mod metrics;
pub mod notify;
pub mod scheduler;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::engine::{Engine, EngineError, EngineOptions, Monitor, PollOutcome, PollReport};
pub use crate::notify::{Notification, Notifier};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global tracing subscriber.
///
/// Filter comes from `RUST_LOG` (default `glow_content_monitor=info,warn`);
/// `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("glow_content_monitor=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}
