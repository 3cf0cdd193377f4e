use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_log::log::SetLoggerError;
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset or unparseable. sqlx logs every statement
/// at `info`, which drowns out the SMTP traffic.
const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("Couldn't set global tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),

    #[error("Couldn't forward log records to tracing: {0}")]
    Log(#[from] SetLoggerError),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Installs the global subscriber and routes `log` records through it.
///
/// Output is plain text unless built with `tracing_json`; `tracing_noansi`
/// turns off colours for plain text.
pub fn setup_tracing() -> Result<(), TracingError> {
    LogTracer::init()?;

    if cfg!(feature = "tracing_json") {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter())
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_ansi(!cfg!(feature = "tracing_noansi"))
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
