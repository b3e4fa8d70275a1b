use chrono::{NaiveDateTime, Utc};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Current wall-clock time in UTC without an offset, the form stored in the database.
pub fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Install the global tracing subscriber.
///
/// With `log_dir` set, events go to a daily rolling file and the returned
/// guard must be held for the lifetime of the process. Otherwise events go
/// to stdout with ANSI colours. `RUST_LOG` takes precedence over `log_level`.
pub fn init_tracing(log_dir: Option<&str>, log_file: &str, log_level: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if let Some(log_dir) = log_dir {
        let file_appender = tracing_appender::rolling::daily(log_dir, log_file);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_ansi(false),
            )
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_line_number(true).with_ansi(true))
            .init();
        None
    }
}

