//! Tracing subscriber bootstrap.
//!
//! Libraries in this workspace only emit `tracing` events; binaries and test
//! harnesses call [`init_tracing`] once to install a subscriber.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "sheetstock=info,warn";

/// Output format for the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Read `SHEETSTOCK_LOG_FORMAT` ("json" selects JSON output).
    pub fn from_env() -> Self {
        match std::env::var("SHEETSTOCK_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber.
///
/// Returns `false` when a global subscriber was already set, which is not
/// an error: embedding applications and test harnesses often install their
/// own first.
pub fn init_tracing(format: LogFormat) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    match result {
        Ok(()) => {
            tracing::debug!(?format, "tracing subscriber installed");
            true
        }
        Err(_) => false,
    }
}
