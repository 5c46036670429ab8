//! Tracing subscriber setup for embedding processes.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a global JSON tracing subscriber.
///
/// The filter comes from the `CROSSDOCK_LOG` environment variable,
/// defaulting to `info`. Calling this twice is a no-op: the second
/// installation fails quietly so embedding tests can call it freely.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("CROSSDOCK_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .try_init();
}
