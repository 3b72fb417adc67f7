//! Process logging.
//!
//! `init_with_level` installs a stderr logger that tags each record with the
//! emitting thread, so ingress replay and the processing loop can be told
//! apart: `[  12.034s  WARN directory-source] message`. Builds with the
//! `tracing` feature can use `init_tracing` instead.

use std::io::Write;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

struct ThreadTaggedLogger {
    max: LevelFilter,
    epoch: Instant,
}

fn format_line(elapsed: Duration, level: Level, thread: Option<&str>, msg: &std::fmt::Arguments) -> String {
    format!(
        "[{:9.3}s {:>5} {}] {}",
        elapsed.as_secs_f64(),
        level,
        thread.unwrap_or("-"),
        msg
    )
}

impl Log for ThreadTaggedLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let current = std::thread::current();
        let line = format_line(self.epoch.elapsed(), record.level(), current.name(), record.args());
        // One write per record keeps lines from concurrent threads whole.
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<ThreadTaggedLogger> = OnceLock::new();

/// Install the stderr logger at `level`.
///
/// Only the first call installs; later calls leave the logger and its level
/// untouched.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| ThreadTaggedLogger {
        max: level,
        epoch: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Install a `tracing` fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` applies to every target.
/// Span close events are emitted so per-cycle timings show up.
#[cfg(feature = "tracing")]
pub fn init_tracing(level: LevelFilter, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_thread_names(true);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
