use std::sync::Arc;

use anyhow::Error;
use console::{style, Term};
use tracing::{error, info, trace};

use crate::cli::Settings;
use crate::fancaps::collector::{build_client, HttpPageFetcher};
use crate::fancaps::downloader::{download_all, DownloadError, DownloadSummary, HttpImageFetcher};
use crate::fancaps::format::format_titles;
use crate::fancaps::io::OutputLayout;
use crate::fancaps::menu::{self, MenuError};
use crate::fancaps::progress::{format_duration, spinner, ProgressReporter};
use crate::fancaps::search::validate_queries;
use crate::fancaps::{episode_scraper, image_scraper, title_scraper, Catalog};
use crate::logger::ConsoleSwitch;

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

/// Exit code of a run stopped by the site's rate limiting.
pub(crate) const EXIT_RATE_LIMITED: i32 = 2;

/// Walks through search, selection, discovery and download.
pub(crate) struct Program {
    settings: Settings,
    console: ConsoleSwitch,
}

impl Program {
    pub(crate) fn new(settings: Settings, console: ConsoleSwitch) -> Self {
        Self { settings, console }
    }

    /// Runs the downloader program.
    pub(crate) async fn run(&self) -> Result<(), Error> {
        Term::stdout().set_title("fancaps downloader");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Authors: {}", AUTHORS);

        let settings = &self.settings;
        let parallel = settings.parallel_discovery;
        let client = build_client(&settings.user_agent, settings.request_timeout)?;
        let fetcher = HttpPageFetcher::new(client.clone());

        let categories = match &settings.categories {
            Some(categories) => categories.clone(),
            None => menu::prompt_categories()?,
        };
        let search_urls = if settings.queries.is_empty() {
            menu::prompt_queries(&fetcher, &categories).await?
        } else {
            validate_queries(&fetcher, &settings.queries, &categories, parallel).await?
        };

        let progress = spinner("Searching titles");
        let titles = title_scraper::discover(&fetcher, &search_urls, parallel).await;
        progress.finish_and_clear();
        let titles = titles?;

        let mut titles = if settings.select_all {
            info!("Selecting all {} titles", titles.len());
            titles
        } else {
            menu::select_titles(titles)?
        };

        let progress = spinner("Collecting episodes");
        let found = episode_scraper::discover_all(&fetcher, &mut titles, parallel).await;
        progress.finish_and_clear();
        found?;

        match &settings.episodes {
            Some(spec) => menu::apply_episode_spec(&mut titles, spec),
            None if settings.select_all => {}
            None => menu::prompt_episode_ranges(&mut titles)?,
        }

        let catalog = Catalog::new(titles);
        let progress = spinner("Collecting image links");
        let found = image_scraper::discover_all(&fetcher, &catalog, parallel).await;
        progress.finish_and_clear();
        found?;

        if settings.dry_run {
            catalog.freeze();
            println!("{}", format_titles(catalog.titles(), settings.format)?);
            return Ok(());
        }

        let layout = OutputLayout::new(&settings.output_dir);
        layout.ensure_root()?;

        let term = Term::stdout();
        let reporter = if term.is_term() {
            ProgressReporter::stdout()
        } else {
            ProgressReporter::hidden()
        };

        let summary = {
            let _muted = self.console.mute();
            download_all(
                Arc::new(catalog),
                &layout,
                Arc::new(HttpImageFetcher::new(client)),
                Arc::new(reporter),
                settings.download.clone(),
            )
            .await?
        };

        println!("{}", style(download_report(&summary)).bold());
        Ok(())
    }
}

pub(crate) fn download_report(summary: &DownloadSummary) -> String {
    let stats = summary.stats;
    format!(
        "Downloaded {}, skipped {}, failed {} of {} images in {}",
        stats.downloaded,
        stats.skipped,
        stats.failed,
        stats.total,
        format_duration(summary.elapsed)
    )
}

/// True when the user backed out of a selection menu.
fn is_aborted(err: &Error) -> bool {
    matches!(err.downcast_ref::<MenuError>(), Some(MenuError::NothingSelected(_)))
}

fn is_rate_limited(err: &Error) -> bool {
    matches!(err.downcast_ref::<DownloadError>(), Some(DownloadError::RateLimited { .. }))
}

fn exit_code(err: &Error) -> i32 {
    if is_rate_limited(err) {
        EXIT_RATE_LIMITED
    } else {
        1
    }
}

/// Reports how the run ended and returns the process exit code.
pub(crate) fn report_outcome(result: Result<(), Error>) -> i32 {
    let err = match result {
        Ok(()) => return 0,
        Err(err) => err,
    };

    if is_aborted(&err) {
        println!("{}", style(format!("{}, nothing to download", err)).yellow());
    } else {
        error!("{:#}", err);
        if is_rate_limited(&err) {
            eprintln!(
                "{}",
                style("fancaps.net is limiting requests. Wait a while, then retry with a lower --parallel-downloads or a longer --min-delay.").yellow()
            );
        }
    }
    exit_code(&err)
}
