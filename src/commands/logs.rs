use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::Path;

use anyhow::{Context, Result};
use crossterm::style::{Color, Stylize, style};

use r4r_logs::{DiagnosticKind, LogLevel, LogRecord, LogSink, StreamFilter, TimeWindow};

use crate::cli::LogsArgs;
use crate::commands::AppContext;
use crate::viewer::{self, Target};

pub(crate) async fn run(ctx: &AppContext, args: LogsArgs) -> Result<()> {
    let service = ctx.find_service(&args.service).await?;
    if args.tui {
        return viewer::run(ctx, Target::Service(service)).await;
    }

    let level = args.level.as_deref().and_then(parse_level);
    let filter = StreamFilter::new()
        .with_level(level.clone())
        .with_search(args.search.as_deref());
    let hours = args.hours.unwrap_or(ctx.config.logs.window_hours).max(1);
    let window = TimeWindow::trailing_hours(hours)
        .with_context(|| format!("History window of {hours}h is out of range"))?;
    let manager = ctx.stream_manager().await?;
    let resource_ids = vec![service.id.clone()];

    let export = match &args.export {
        Some(path) => Some(create_export(path)?),
        None => None,
    };
    let mut sink = PrintSink::new(io::stdout().is_terminal(), export);

    if args.follow {
        eprintln!("Following logs for {} (Ctrl+C to stop)", service.name);
        let mut subscription = manager.subscribe(resource_ids, filter);
        let feed = subscription.open(window)?;

        let interrupted = tokio::select! {
            result = feed.drain_into(&mut sink) => {
                result.context("Log stream failed")?;
                false
            }
            _ = tokio::signal::ctrl_c() => true,
        };
        if interrupted {
            let _ = subscription.stop().await;
            eprintln!("Log streaming stopped");
        }
    } else {
        let records = manager
            .fetcher()
            .fetch(&resource_ids, window, level, ctx.config.logs.page_size)
            .await
            .context("Failed to fetch logs")?;
        let selected = select_records(records, &filter, args.lines);

        if selected.is_empty() {
            eprintln!("No logs found in the last {hours}h for {}", service.name);
        }
        for record in selected {
            sink.on_record(record);
        }
    }

    let written = sink.finish()?;
    if let Some(path) = &args.export {
        eprintln!("Exported {written} records to {}", path.display());
    }
    Ok(())
}

/// Parse `--level`; unknown names are ignored with a warning
fn parse_level(value: &str) -> Option<LogLevel> {
    match LogLevel::parse(value) {
        LogLevel::Other(_) => {
            eprintln!("Invalid log level '{value}', showing all levels");
            None
        }
        level => Some(level),
    }
}

/// Apply the filter and keep the newest `lines` records, oldest first
///
/// History pages usually arrive newest first, so records are ordered by
/// timestamp before trimming. Equal timestamps keep their backend order.
fn select_records(records: Vec<LogRecord>, filter: &StreamFilter, lines: usize) -> Vec<LogRecord> {
    let mut matched: Vec<LogRecord> = records.into_iter().filter(|r| filter.matches(r)).collect();
    matched.sort_by_key(|r| r.timestamp());
    let skip = matched.len().saturating_sub(lines);
    matched.drain(..skip);
    matched
}

fn create_export(path: &Path) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn level_color(level: &LogLevel) -> Color {
    match level {
        LogLevel::Debug => Color::DarkGrey,
        LogLevel::Info => Color::Green,
        LogLevel::Warn => Color::Yellow,
        LogLevel::Error => Color::Red,
        LogLevel::Fatal => Color::Magenta,
        LogLevel::Other(_) => Color::Reset,
    }
}

/// Prints records to stdout and optionally copies them to a file
struct PrintSink<W: Write> {
    color: bool,
    export: Option<W>,
    written: usize,
    error: Option<io::Error>,
}

impl<W: Write> PrintSink<W> {
    fn new(color: bool, export: Option<W>) -> Self {
        Self {
            color,
            export,
            written: 0,
            error: None,
        }
    }

    fn write_export(&mut self, line: &str) {
        if self.error.is_some() {
            return;
        }
        if let Some(export) = &mut self.export {
            match writeln!(export, "{line}") {
                Ok(()) => self.written += 1,
                Err(err) => self.error = Some(err),
            }
        }
    }

    /// Flush the export file; returns how many records it received
    fn finish(mut self) -> Result<usize> {
        if let Some(err) = self.error.take() {
            return Err(err).context("Failed to write export file");
        }
        if let Some(export) = &mut self.export {
            export.flush().context("Failed to write export file")?;
        }
        Ok(self.written)
    }
}

impl<W: Write> LogSink for PrintSink<W> {
    fn on_record(&mut self, record: LogRecord) {
        let line = record.export_line();
        if self.color {
            println!("{}", style(&line).with(level_color(record.level())));
        } else {
            println!("{line}");
        }
        self.write_export(&line);
    }

    fn on_diagnostic(&mut self, kind: DiagnosticKind, message: &str) {
        eprintln!("[{}] {message}", kind.as_str());
    }
}
