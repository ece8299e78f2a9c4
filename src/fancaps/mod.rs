//! Scraping and downloading for the fancaps.net catalog.

pub(crate) mod collector;
pub(crate) mod downloader;
pub(crate) mod episode_scraper;
pub(crate) mod format;
pub(crate) mod image_scraper;
pub(crate) mod io;
pub(crate) mod menu;
pub(crate) mod progress;
pub(crate) mod search;
pub(crate) mod selector;
pub(crate) mod sequence;
pub(crate) mod title_scraper;
pub(crate) mod types;

/// Root of the catalog site. Also sent as `Referer` with every request.
pub(crate) const BASE_URL: &str = "https://fancaps.net";

/// The only host page requests may go to.
pub(crate) const ALLOWED_DOMAIN: &str = "fancaps.net";

/// Browser identity the site answers to.
pub(crate) const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/41.0.2228.0 Safari/537.36";

pub(crate) use types::{Catalog, Category, Episode, ImageOutcome, ItemKey, Title, TitleId};
