//! Bounded-concurrency image downloads with jittered pacing.
//!
//! Every image URL of the catalog becomes at most one transfer. Files that are
//! already on disk are counted as skipped without taking a permit, so a
//! restarted run only fetches what is missing. A rate limit answer from the
//! server stops the whole run, everything else is counted as a failure.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::StreamExt;
use rand::Rng;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::fancaps::io::{image_file_name, OutputLayout};
use crate::fancaps::progress::ProgressReporter;
use crate::fancaps::types::ImageStats;
use crate::fancaps::{Catalog, ImageOutcome, ItemKey};

#[derive(Error, Debug)]
pub(crate) enum DownloadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Rate limited by the server (status {status}) while fetching {url}")]
    RateLimited { url: String, status: u16 },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("Download pool was closed")]
    PoolClosed,

    #[error("Download task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub(crate) type DownloadResult<T> = Result<T, DownloadError>;

/// Transfers one image to disk.
#[async_trait]
pub(crate) trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str, path: &Path) -> DownloadResult<()>;
}

/// Streams images over HTTP into a `.part` file and renames it once complete.
pub(crate) struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_image(&self, url: &str, path: &Path) -> DownloadResult<()> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            return Err(DownloadError::RateLimited {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let part = part_path(path);
        let mut file = File::create(&part).await?;
        let mut stream = response.bytes_stream();
        let written = async {
            while let Some(chunk) = stream.next().await {
                file.write_all(&chunk?).await?;
            }
            file.flush().await?;
            Ok::<_, DownloadError>(())
        }
        .await;

        drop(file);
        if let Err(err) = written {
            let _ = fs::remove_file(&part).await;
            return Err(err);
        }

        fs::rename(&part, path).await?;
        Ok(())
    }
}

/// Temporary name a transfer is written under until it completes.
pub(crate) fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Knobs of a download run.
#[derive(Debug, Clone)]
pub(crate) struct DownloadOptions {
    /// Size of the permit pool.
    pub(crate) concurrency: usize,
    pub(crate) min_delay: Duration,
    /// Upper bound of the random part of each delay.
    pub(crate) random_delay: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            min_delay: Duration::from_millis(1000),
            random_delay: Duration::from_millis(5000),
        }
    }
}

/// Counters of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DownloadSummary {
    pub(crate) stats: ImageStats,
    pub(crate) elapsed: Duration,
}

/// Pause before and after each transfer: half the minimum delay plus up to
/// half the random delay.
pub(crate) fn jitter(min_delay: Duration, random_delay: Duration) -> Duration {
    let spread = u64::try_from((random_delay / 2).as_millis()).unwrap_or(u64::MAX);
    let extra = if spread == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=spread)
    };
    min_delay / 2 + Duration::from_millis(extra)
}

/// Everything a transfer task needs, shared across tasks.
#[derive(Clone)]
struct TransferContext {
    catalog: Arc<Catalog>,
    fetcher: Arc<dyn ImageFetcher>,
    progress: Arc<ProgressReporter>,
    options: DownloadOptions,
}

impl TransferContext {
    fn finish(&self, key: ItemKey, outcome: ImageOutcome) {
        if self.catalog.record(key, outcome) {
            if let Some(item) = self.catalog.item(key) {
                debug!("Finished {}", item.display_name());
            }
        }
        self.progress.render(&self.catalog);
    }

    async fn transfer(
        self,
        key: ItemKey,
        url: String,
        path: PathBuf,
        permit: OwnedSemaphorePermit,
    ) -> DownloadResult<()> {
        sleep(jitter(self.options.min_delay, self.options.random_delay)).await;

        let result = self.fetcher.fetch_image(&url, &path).await;
        let outcome = match &result {
            Ok(()) => ImageOutcome::Downloaded,
            Err(DownloadError::RateLimited { .. }) => {
                self.finish(key, ImageOutcome::Failed);
                return result;
            }
            Err(err) => {
                warn!("Failed to download {}: {}", url, err);
                ImageOutcome::Failed
            }
        };

        sleep(jitter(self.options.min_delay, self.options.random_delay)).await;
        self.finish(key, outcome);
        drop(permit);
        Ok(())
    }
}

/// Downloads every image of the catalog into `layout`.
///
/// Image sets are frozen first. A rate limit error aborts every transfer still
/// in flight and is returned, files written so far stay on disk.
pub(crate) async fn download_all(
    catalog: Arc<Catalog>,
    layout: &OutputLayout,
    fetcher: Arc<dyn ImageFetcher>,
    progress: Arc<ProgressReporter>,
    options: DownloadOptions,
) -> DownloadResult<DownloadSummary> {
    catalog.freeze();
    let started = catalog.counters().start();
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let context = TransferContext {
        catalog: catalog.clone(),
        fetcher,
        progress: progress.clone(),
        options,
    };

    info!(
        "Downloading {} images with {} parallel transfers",
        catalog.counters().stats().total,
        semaphore.available_permits()
    );
    progress.render(&catalog);

    // Dropping the set aborts whatever is still running.
    let mut tasks: JoinSet<DownloadResult<()>> = JoinSet::new();

    for key in catalog.item_keys() {
        let (Some(item), Some(dir)) = (catalog.item(key), layout.item_dir(&catalog, key)) else {
            continue;
        };
        let urls = item.images().urls();
        if urls.is_empty() {
            continue;
        }

        item.images().start();
        if let Some(title) = catalog.title(key.title) {
            title.images.start();
        }
        if let Err(err) = fs::create_dir_all(&dir).await {
            warn!("Failed to create {}: {}", dir.display(), err);
            for _ in &urls {
                context.finish(key, ImageOutcome::Failed);
            }
            continue;
        }

        for url in urls {
            let Some(name) = image_file_name(&url) else {
                warn!("{}", DownloadError::InvalidUrl(url.clone()));
                context.finish(key, ImageOutcome::Failed);
                continue;
            };
            let path = dir.join(name);

            match fs::try_exists(&path).await {
                Ok(true) => {
                    context.finish(key, ImageOutcome::Skipped);
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!("Failed to check {}: {}", path.display(), err);
                    context.finish(key, ImageOutcome::Failed);
                    continue;
                }
            }

            let permit = loop {
                tokio::select! {
                    biased;
                    Some(joined) = tasks.join_next() => joined??,
                    permit = semaphore.clone().acquire_owned() => {
                        break permit.map_err(|_| DownloadError::PoolClosed)?;
                    }
                }
            };
            tasks.spawn(context.clone().transfer(key, url, path, permit));
        }
    }

    while let Some(joined) = tasks.join_next().await {
        joined??;
    }

    let summary = DownloadSummary {
        stats: catalog.counters().stats(),
        elapsed: Instant::now().saturating_duration_since(started),
    };
    info!(
        "Downloaded {}, skipped {}, failed {} of {} images",
        summary.stats.downloaded, summary.stats.skipped, summary.stats.failed, summary.stats.total
    );
    Ok(summary)
}
