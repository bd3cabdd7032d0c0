//! Values and utilities related to logging configuration

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, Registry};

const LOG_LEVEL_ENV_VAR: &str = "PRESENCE_LOG_LEVEL";
#[cfg(feature = "file-logging")]
const LOG_DIRECTORY_ENV_VAR: &str = "PRESENCE_LOG_DIR";
#[cfg(feature = "file-logging")]
const DEFAULT_LOG_DIRECTORY: &str = "./log";

/// Installs the global subscriber for one of the binaries
///
/// `component` names the rolling log files when the `file-logging` feature is on, so the
/// relay and the probe can share a log directory. The returned guard must be held for the
/// lifetime of the process or buffered file output is lost.
pub fn configure_tracing(component: &str) -> anyhow::Result<Option<WorkerGuard>> {
    let mut _guard: Option<WorkerGuard> = None;
    let subscriber = Registry::default();

    #[cfg(feature = "stream-logging")]
    let subscriber = {
        let layer = fmt::layer()
            .event_format(tracing_subscriber::fmt::format().compact())
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);
        subscriber.with(layer)
    };

    #[cfg(feature = "file-logging")]
    let subscriber = {
        let directory = std::env::var(LOG_DIRECTORY_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_LOG_DIRECTORY.to_owned());
        let file_appender = tracing_appender::rolling::hourly(directory, component);
        let (file_writer, worker_guard) = tracing_appender::non_blocking(file_appender);
        _guard = Some(worker_guard);
        let layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(file_writer);
        subscriber.with(layer)
    };

    let default_level_filter = if cfg!(debug_assertions) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level_filter.into())
        .with_env_var(LOG_LEVEL_ENV_VAR)
        .from_env_lossy();

    let subscriber = subscriber.with(env_filter);

    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!(event = "logging_configured", component);
    Ok(_guard)
}
