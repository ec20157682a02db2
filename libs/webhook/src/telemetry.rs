use clap::ValueEnum;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global tracing subscriber.
///
/// `log_filter` takes `tracing_subscriber::filter::EnvFilter` directives, e.g.
/// `"info,kadmit_webhook=debug"`.
pub fn init(log_filter: &str, log_format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(log_filter)
        .map_err(|e| Error::Telemetry(format!("invalid log filter {log_filter:?}: {e}")))?;
    let registry = Registry::default().with(filter);

    match log_format {
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    }
    .map_err(|e| Error::Telemetry(e.to_string()))
}
