//! Logging setup.
//!
//! Console output goes to stderr and can be silenced while the progress frame
//! is being redrawn. Warnings and errors are also written to
//! `<output>/fsd_errors_<timestamp>.log`, which is only created once the first
//! line arrives.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Local;
use console::style;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{filter_fn, Targets};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CRATE_TARGET: &str = "fancaps_downloader";

#[derive(Error, Debug)]
pub(crate) enum LoggerError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Logging error: {0}")]
    Init(String),
}

pub(crate) type LoggerResult<T> = Result<T, LoggerError>;

/// Warning and error counts for the exit summary.
#[derive(Debug, Default)]
pub(crate) struct LogStats {
    warnings: AtomicUsize,
    errors: AtomicUsize,
}

impl LogStats {
    pub(crate) fn warnings(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }

    pub(crate) fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.warnings() == 0 && self.errors() == 0
    }
}

struct StatsLayer(Arc<LogStats>);

impl<S: Subscriber> Layer<S> for StatsLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level == Level::ERROR {
            self.0.errors.fetch_add(1, Ordering::Relaxed);
        } else if level == Level::WARN {
            self.0.warnings.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A log file that does not exist until something is written to it.
struct LazyFile {
    path: PathBuf,
    file: Option<File>,
}

impl LazyFile {
    fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    fn open(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("log file unavailable"))
    }
}

impl Write for LazyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.open()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Turns console logging off and back on.
#[derive(Clone, Default)]
pub(crate) struct ConsoleSwitch(Arc<AtomicBool>);

impl ConsoleSwitch {
    fn is_muted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Mutes the console until the returned guard is dropped.
    pub(crate) fn mute(&self) -> MutedConsole {
        self.0.store(true, Ordering::Relaxed);
        MutedConsole(self.clone())
    }
}

pub(crate) struct MutedConsole(ConsoleSwitch);

impl Drop for MutedConsole {
    fn drop(&mut self) {
        (self.0).0.store(false, Ordering::Relaxed);
    }
}

pub(crate) struct LoggerOptions<'a> {
    pub(crate) level: &'a str,
    pub(crate) debug: bool,
    /// Directory receiving the error log, `None` disables it.
    pub(crate) log_dir: Option<&'a Path>,
}

pub(crate) fn log_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("fsd_errors_{}.log", Local::now().format("%Y-%m-%d_%H-%M-%S")))
}

pub(crate) struct Logger {
    stats: Arc<LogStats>,
    console: ConsoleSwitch,
    log_path: Option<PathBuf>,
    guard: Option<WorkerGuard>,
}

impl Logger {
    /// Installs the global subscriber.
    pub(crate) fn init(options: LoggerOptions<'_>) -> LoggerResult<Self> {
        let stats = Arc::new(LogStats::default());
        let console = ConsoleSwitch::default();

        let level = if options.debug { "debug" } else { options.level };
        let console_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .map_err(|e| LoggerError::Filter(e.to_string()))?;
        let switch = console.clone();
        let console_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(options.debug)
            .compact()
            .with_filter(console_filter)
            .with_filter(filter_fn(move |_| !switch.is_muted()));

        let stats_layer = StatsLayer(stats.clone())
            .with_filter(Targets::new().with_target(CRATE_TARGET, Level::WARN));

        let (file_layer, log_path, guard) = match options.log_dir {
            Some(dir) => {
                let path = log_file_path(dir);
                let (writer, guard) = tracing_appender::non_blocking(LazyFile::new(path.clone()));
                let layer = fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(LevelFilter::WARN);
                (Some(layer), Some(path), Some(guard))
            }
            None => (None, None, None),
        };

        tracing_subscriber::registry()
            .with(console_layer)
            .with(stats_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| LoggerError::Init(e.to_string()))?;

        Ok(Self {
            stats,
            console,
            log_path,
            guard,
        })
    }

    pub(crate) fn console(&self) -> ConsoleSwitch {
        self.console.clone()
    }

    /// Flushes the log file and prints the exit summary.
    pub(crate) fn finish(mut self) {
        drop(self.guard.take());
        let path = self.log_path.as_deref().filter(|path| path.exists());
        let summary = exit_summary(&self.stats, path);
        if self.stats.is_clean() {
            println!("{}", style(summary).green());
        } else {
            println!("{}", style(summary).yellow());
        }
    }
}

pub(crate) fn exit_summary(stats: &LogStats, log_path: Option<&Path>) -> String {
    if stats.is_clean() {
        return "Success".to_string();
    }
    let mut summary = format!(
        "Finished with {} warning(s) and {} error(s)",
        stats.warnings(),
        stats.errors()
    );
    if let Some(path) = log_path {
        summary.push_str(&format!("\nDetails were written to {}", path.display()));
    }
    summary
}

#[cfg(test)]
mod tests {
    use tracing::{error, info, warn};

    use super::*;

    #[test]
    fn test_stats_count_warnings_and_errors() {
        let stats = Arc::new(LogStats::default());
        let subscriber = tracing_subscriber::registry().with(
            StatsLayer(stats.clone()).with_filter(Targets::new().with_target(CRATE_TARGET, Level::WARN)),
        );

        tracing::subscriber::with_default(subscriber, || {
            info!("ignored");
            warn!("first");
            warn!("second");
            error!("broken");
            warn!(target: "hyper", "not ours");
        });

        assert_eq!(stats.warnings(), 2);
        assert_eq!(stats.errors(), 1);
        assert!(!stats.is_clean());
    }

    #[test]
    fn test_lazy_file_created_on_first_write() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("out").join("errors.log");
        let mut file = LazyFile::new(path.clone());

        file.flush().unwrap();
        assert!(!path.exists());

        file.write_all(b"WARN something\n").unwrap();
        file.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "WARN something\n");
    }

    #[test]
    fn test_exit_summary() {
        let stats = LogStats::default();
        assert_eq!(exit_summary(&stats, None), "Success");

        stats.errors.fetch_add(1, Ordering::Relaxed);
        let summary = exit_summary(&stats, Some(Path::new("out/fsd_errors.log")));
        assert!(summary.starts_with("Finished with 0 warning(s) and 1 error(s)"));
        assert!(summary.contains("out/fsd_errors.log"));
    }

    #[test]
    fn test_console_switch() {
        let switch = ConsoleSwitch::default();
        {
            let _muted = switch.mute();
            assert!(switch.is_muted());
        }
        assert!(!switch.is_muted());
    }

    #[test]
    fn test_log_file_name() {
        let path = log_file_path(Path::new("out"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("fsd_errors_"));
        assert!(name.ends_with(".log"));
    }
}
