use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

/// Install the global tracing subscriber, writing to stderr
///
/// `RUST_LOG` takes precedence over the configured level. Calling this more
/// than once is harmless; later calls keep the first subscriber.
pub fn init(config: &LoggingConfig) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .pretty()
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_ansi(false)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .or_else(|e| {
            if e.to_string().contains("a global default trace dispatcher has already been set") {
                Ok(())
            } else {
                Err(format!("Failed to initialize tracing: {}", e))
            }
        })
}
