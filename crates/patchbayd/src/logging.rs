//! Tracing setup for the daemon.
//!
//! Two layers share one filter: a standard console layer, and a file layer
//! writing `patchbay.log` in the line shape the `get_logs` command parses.

use std::{
    fs::{self, OpenOptions},
    path::Path,
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::Local;
use patchbay_api::LOG_FILENAME;
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    EnvFilter,
    fmt::{
        self, FmtContext, FormatEvent, FormatFields,
        format::Writer,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Formats one event per line as
/// `2026-02-14 09:30:12 - INFO :: main : message`.
struct LogFileFormat;

impl<S, N> FormatEvent<S, N> for LogFileFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let current = std::thread::current();
        let thread = current.name().unwrap_or("unnamed");
        write!(
            writer,
            "{timestamp} - {} :: {thread} : ",
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the console and file tracing layers. `RUST_LOG` controls the
/// filter and defaults to `info`.
pub fn init(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let path = log_dir.join(LOG_FILENAME);
    let file = Arc::new(
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?,
    );

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(
            fmt::layer()
                .event_format(LogFileFormat)
                .with_ansi(false)
                .with_writer(move || Arc::clone(&file)),
        )
        .try_init()
        .context("installing the tracing subscriber")?;
    Ok(())
}
