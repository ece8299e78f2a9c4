//! Command line flags and the settings they resolve to.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::config::AppConfig;
use crate::fancaps::downloader::DownloadOptions;
use crate::fancaps::format::OutputFormat;
use crate::fancaps::io::parent_exists;
use crate::fancaps::Category;

#[derive(Error, Debug, PartialEq)]
pub(crate) enum CliError {
    #[error("Search query cannot be empty")]
    EmptyQuery,

    #[error("--parallel-downloads must be at least 1")]
    NoParallelism,

    #[error("The parent of output directory {0} does not exist")]
    MissingParent(PathBuf),
}

pub(crate) type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum CategoryArg {
    Anime,
    Tv,
    Movies,
    All,
}

impl CategoryArg {
    fn categories(self) -> &'static [Category] {
        match self {
            CategoryArg::Anime => &[Category::Anime],
            CategoryArg::Tv => &[Category::Tv],
            CategoryArg::Movies => &[Category::Movie],
            CategoryArg::All => &Category::ALL,
        }
    }
}

/// Parses `500ms`, `1s`, `1.5s`, `2m` or `1h`. A bare `0` is also accepted.
pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if value == "0" {
        return Ok(Duration::ZERO);
    }

    let split = value
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| format!("missing unit in `{}` (use ms, s, m or h)", value))?;
    let (number, unit) = value.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration `{}`", value))?;

    let seconds = match unit {
        "ms" => number / 1000.0,
        "s" => number,
        "m" => number * 60.0,
        "h" => number * 3600.0,
        _ => return Err(format!("unknown unit `{}` in `{}`", unit, value)),
    };
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid duration `{}`: {}", value, e))
}

#[derive(Debug, Parser)]
#[command(name = "fancaps-downloader", version)]
#[command(about = "Search fancaps.net and download the screencaps of movies, TV series and anime")]
pub(crate) struct Cli {
    /// Search query, may be given more than once. Prompted for when absent.
    #[arg(short, long = "query", value_name = "QUERY")]
    pub(crate) queries: Vec<String>,

    /// Categories to search. Prompted for when absent.
    #[arg(short, long, value_enum, value_delimiter = ',')]
    pub(crate) categories: Vec<CategoryArg>,

    /// Root directory for downloaded images. Its parent must exist.
    #[arg(short, long, value_name = "DIR")]
    pub(crate) output_dir: Option<PathBuf>,

    /// Maximum number of simultaneous downloads.
    #[arg(short = 'p', long, value_name = "N")]
    pub(crate) parallel_downloads: Option<usize>,

    /// Minimum delay around each download.
    #[arg(long, value_name = "DUR", value_parser = parse_duration)]
    pub(crate) min_delay: Option<Duration>,

    /// Maximum random delay added around each download.
    #[arg(long, value_name = "DUR", value_parser = parse_duration)]
    pub(crate) random_delay: Option<Duration>,

    /// Episode range applied to every TV series and anime, e.g. `1-12`.
    #[arg(long, value_name = "SPEC")]
    pub(crate) episodes: Option<String>,

    /// Select every discovered title.
    #[arg(short, long, default_value_t = false)]
    pub(crate) yes: bool,

    /// Run discovery requests one after another.
    #[arg(long, default_value_t = false)]
    pub(crate) no_async: bool,

    /// Print what would be downloaded instead of downloading it.
    #[arg(long, default_value_t = false)]
    pub(crate) dry_run: bool,

    /// Dry run output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Txt)]
    pub(crate) format: OutputFormat,

    /// Do not write the error log file.
    #[arg(long, default_value_t = false)]
    pub(crate) no_log: bool,

    /// Debug output on the console.
    #[arg(short, long, default_value_t = false)]
    pub(crate) debug: bool,

    /// Configuration file.
    #[arg(long, value_name = "FILE", default_value = "config.toml")]
    pub(crate) config: PathBuf,
}

/// Everything the pipeline needs, with flags taking precedence over the config file.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) queries: Vec<String>,
    pub(crate) categories: Option<Vec<Category>>,
    pub(crate) output_dir: PathBuf,
    pub(crate) download: DownloadOptions,
    pub(crate) episodes: Option<String>,
    pub(crate) select_all: bool,
    pub(crate) parallel_discovery: bool,
    pub(crate) dry_run: bool,
    pub(crate) format: OutputFormat,
    pub(crate) write_log: bool,
    pub(crate) debug: bool,
    pub(crate) log_level: String,
    pub(crate) user_agent: String,
    pub(crate) request_timeout: Duration,
}

impl Cli {
    fn selected_categories(&self) -> Option<Vec<Category>> {
        if self.categories.is_empty() {
            return None;
        }
        let mut categories: Vec<Category> = self
            .categories
            .iter()
            .flat_map(|arg| arg.categories().iter().copied())
            .collect();
        categories.sort();
        categories.dedup();
        Some(categories)
    }

    pub(crate) fn resolve(&self, config: &AppConfig) -> CliResult<Settings> {
        if self.queries.iter().any(|query| query.trim().is_empty()) {
            return Err(CliError::EmptyQuery);
        }

        let concurrency = self
            .parallel_downloads
            .unwrap_or(config.pools.max_download_concurrency);
        if concurrency == 0 {
            return Err(CliError::NoParallelism);
        }

        let output_dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.paths.output_directory));
        if !self.dry_run && !parent_exists(&output_dir) {
            return Err(CliError::MissingParent(output_dir));
        }

        Ok(Settings {
            queries: self.queries.iter().map(|q| q.trim().to_string()).collect(),
            categories: self.selected_categories(),
            output_dir,
            download: DownloadOptions {
                concurrency,
                min_delay: self.min_delay.unwrap_or_else(|| config.min_delay()),
                random_delay: self.random_delay.unwrap_or_else(|| config.random_delay()),
            },
            episodes: self.episodes.clone(),
            select_all: self.yes,
            parallel_discovery: !self.no_async && config.scraper.parallel_discovery,
            dry_run: self.dry_run,
            format: self.format,
            write_log: !self.no_log && !self.dry_run && config.logging.log_to_file,
            debug: self.debug,
            log_level: config.logging.log_level.clone(),
            user_agent: config.scraper.user_agent.clone(),
            request_timeout: config.request_timeout(),
        })
    }
}
