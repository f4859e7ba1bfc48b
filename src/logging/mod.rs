/*!
 * Logging Module
 * Centralized logging configuration and utilities
 */
pub mod middleware;

use std::io;
use tracing::Subscriber;
use tracing_appender::{
    non_blocking,
    non_blocking::{NonBlocking, WorkerGuard},
    rolling,
};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, registry::LookupSpan,
    util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::config::CONFIG;

/// Directory the rolling log files are written to
const LOG_DIR: &str = "logs";

/// Default filter directives when neither `RUST_LOG` nor `LOG_LEVEL` is set.
fn default_directives(level: &str) -> String {
    format!("folio_api={},tower_http=debug,axum=debug,sqlx=warn", level)
}

/// JSON error-only layer, built per subscriber stack.
fn error_layer<S>(writer: NonBlocking) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_writer(writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(LevelFilter::ERROR)
}

/// Initialize the logging system.
///
/// The returned guards flush the non-blocking writers when dropped, so the
/// caller keeps them alive for the whole process.
pub fn init() -> Vec<WorkerGuard> {
    let is_production = CONFIG.is_production();

    std::fs::create_dir_all(LOG_DIR).ok();

    // All logs
    let (file_writer, file_guard) = non_blocking(rolling::daily(LOG_DIR, "app.log"));
    // Errors only
    let (error_writer, error_guard) = non_blocking(rolling::daily(LOG_DIR, "error.log"));
    let (console_writer, console_guard) = non_blocking(io::stdout());

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if is_production {
            "info".to_string()
        } else {
            "debug".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&log_level)));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if is_production {
        // JSON format for production
        let file_layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        let console_layer = fmt::layer()
            .json()
            .with_writer(console_writer)
            .with_target(false);

        subscriber
            .with(file_layer)
            .with(error_layer(error_writer))
            .with(console_layer)
            .init();
    } else {
        // Pretty format for development
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_target(true)
            .pretty()
            .with_thread_ids(false)
            .with_thread_names(false);

        subscriber
            .with(file_layer)
            .with(error_layer(error_writer))
            .with(console_layer)
            .init();
    }

    tracing::info!("Logging initialized for {} environment", CONFIG.environment);

    vec![file_guard, error_guard, console_guard]
}
