//! Data model shared by the scrapers, the downloader and the progress display.
//!
//! A run owns its titles through a [Catalog]. Episodes point back at their title
//! with a [TitleId] index instead of a second owning reference, and every image
//! counter lives behind its own lock so downloads, discovery and rendering can
//! touch the same item from different tasks.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Instant;

use parking_lot::RwLock;
use url::Url;

/// Name given to an episode whose heading could not be parsed.
pub(crate) const EPISODE_NAME_NOT_FOUND: &str = "EPISODE TITLE NOT FOUND";

/// Category of a catalog title.
///
/// The declaration order is the order used everywhere titles are sorted or grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Category {
    Anime,
    Tv,
    Movie,
}

impl Category {
    /// Every category, in display order.
    pub(crate) const ALL: [Category; 3] = [Category::Anime, Category::Tv, Category::Movie];

    /// Human readable name of the category.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Category::Anime => "Anime",
            Category::Tv => "TV Series",
            Category::Movie => "Movies",
        }
    }

    /// Classifies a title link by the catalog section found in its path.
    pub(crate) fn from_url(url: &Url) -> Option<Self> {
        let path = url.path();
        if path.contains("/movies/") {
            Some(Category::Movie)
        } else if path.contains("/tv/") {
            Some(Category::Tv)
        } else if path.contains("/anime/") {
            Some(Category::Anime)
        } else {
            None
        }
    }

    /// Whether titles of this category are split into episodes.
    pub(crate) fn has_episodes(&self) -> bool {
        !matches!(self, Category::Movie)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of processing one image URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageOutcome {
    Downloaded,
    Skipped,
    Failed,
}

/// Point-in-time copy of an image counter group.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImageStats {
    pub(crate) downloaded: u32,
    pub(crate) skipped: u32,
    pub(crate) failed: u32,
    pub(crate) total: u32,
}

impl ImageStats {
    /// Number of images that were downloaded, skipped or failed.
    pub(crate) fn processed(&self) -> u32 {
        self.downloaded + self.skipped + self.failed
    }

    pub(crate) fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.processed())
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.processed() == self.total
    }

    /// Completed share in `0.0..=1.0`. An empty set counts as complete.
    pub(crate) fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            f64::from(self.processed()) / f64::from(self.total)
        }
    }
}

#[derive(Debug, Default)]
struct ImageSetState {
    urls: Vec<String>,
    seen: HashSet<String>,
    stats: ImageStats,
    done: bool,
    frozen: bool,
    started: Option<Instant>,
}

impl ImageSetState {
    fn try_mark_done(&mut self) -> bool {
        if !self.done && self.stats.is_complete() {
            self.done = true;
            return true;
        }
        false
    }
}

/// Discovered image URLs and processing counters of one title or episode.
///
/// Writers are serialized by a single lock, readers may run concurrently.
/// `processed <= total` always holds, `total` stops growing once the set is
/// frozen and the done flag is set exactly once.
#[derive(Debug, Default)]
pub(crate) struct ImageSet {
    state: RwLock<ImageSetState>,
}

impl ImageSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a discovered URL and grows the total. Rejected once frozen or
    /// when the set already holds the URL.
    pub(crate) fn push_url(&self, url: impl Into<String>) -> bool {
        let mut state = self.state.write();
        let url = url.into();
        if state.frozen || !state.seen.insert(url.clone()) {
            return false;
        }
        state.urls.push(url);
        state.stats.total += 1;
        true
    }

    /// Grows the total without storing a URL, for aggregate sets.
    pub(crate) fn grow_total(&self, amount: u32) -> bool {
        let mut state = self.state.write();
        if state.frozen {
            return false;
        }
        state.stats.total += amount;
        true
    }

    /// Stops discovery for this set. An empty set is done as soon as it is frozen.
    pub(crate) fn freeze(&self) {
        let mut state = self.state.write();
        state.frozen = true;
        state.try_mark_done();
    }

    /// Stamps the download start time once and returns it.
    pub(crate) fn start(&self) -> Instant {
        *self.state.write().started.get_or_insert_with(Instant::now)
    }

    pub(crate) fn started_at(&self) -> Option<Instant> {
        self.state.read().started
    }

    /// Counts one processed image. Calls past the total are ignored and return
    /// `false`, so the counters can never overshoot.
    pub(crate) fn record(&self, outcome: ImageOutcome) -> bool {
        let mut state = self.state.write();
        if state.stats.processed() >= state.stats.total {
            return false;
        }
        match outcome {
            ImageOutcome::Downloaded => state.stats.downloaded += 1,
            ImageOutcome::Skipped => state.stats.skipped += 1,
            ImageOutcome::Failed => state.stats.failed += 1,
        }
        true
    }

    /// Sets the done flag if every image is processed. Returns whether it flipped now.
    pub(crate) fn mark_done(&self) -> bool {
        self.state.write().try_mark_done()
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state.read().done
    }

    pub(crate) fn stats(&self) -> ImageStats {
        self.state.read().stats
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.state.read().urls.clone()
    }
}

/// Aggregate counters across every image set of a run.
#[derive(Debug, Default)]
pub(crate) struct RunCounters {
    inner: ImageSet,
}

impl RunCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn grow_total(&self, amount: u32) {
        self.inner.grow_total(amount);
    }

    pub(crate) fn freeze(&self) {
        self.inner.freeze();
    }

    pub(crate) fn start(&self) -> Instant {
        self.inner.start()
    }

    pub(crate) fn started_at(&self) -> Option<Instant> {
        self.inner.started_at()
    }

    pub(crate) fn record(&self, outcome: ImageOutcome) -> bool {
        self.inner.record(outcome)
    }

    pub(crate) fn mark_done(&self) -> bool {
        self.inner.mark_done()
    }

    pub(crate) fn stats(&self) -> ImageStats {
        self.inner.stats()
    }

    pub(crate) fn is_done(&self) -> bool {
        self.inner.is_done()
    }
}

/// Anything that owns an [ImageSet] and shows up as a line in the progress display.
pub(crate) trait ImageContainer: Sync {
    fn display_name(&self) -> &str;

    fn images(&self) -> &ImageSet;

    fn started_at(&self) -> Option<Instant> {
        self.images().started_at()
    }

    fn mark_done(&self) -> bool {
        self.images().mark_done()
    }
}

/// Index of a title inside its [Catalog].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct TitleId(pub(crate) usize);

/// A movie, TV series or anime entry in the catalog.
#[derive(Debug)]
pub(crate) struct Title {
    pub(crate) name: String,
    pub(crate) url: Url,
    pub(crate) category: Category,
    pub(crate) episodes: Vec<Episode>,
    /// Image URLs for movies, aggregate counters of the episodes otherwise.
    pub(crate) images: ImageSet,
}

impl Title {
    pub(crate) fn new(name: impl Into<String>, url: Url, category: Category) -> Self {
        Self {
            name: name.into(),
            url,
            category,
            episodes: Vec::new(),
            images: ImageSet::new(),
        }
    }
}

impl ImageContainer for Title {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn images(&self) -> &ImageSet {
        &self.images
    }
}

/// A sub-unit of a TV or anime title with its own gallery.
#[derive(Debug)]
pub(crate) struct Episode {
    pub(crate) name: String,
    pub(crate) url: Url,
    pub(crate) title: TitleId,
    pub(crate) images: ImageSet,
}

impl Episode {
    pub(crate) fn new(name: impl Into<String>, url: Url, title: TitleId) -> Self {
        Self {
            name: name.into(),
            url,
            title,
            images: ImageSet::new(),
        }
    }
}

impl ImageContainer for Episode {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn images(&self) -> &ImageSet {
        &self.images
    }
}

/// Addresses either a movie title or one episode of a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ItemKey {
    pub(crate) title: TitleId,
    pub(crate) episode: Option<usize>,
}

impl ItemKey {
    pub(crate) fn title(title: TitleId) -> Self {
        Self { title, episode: None }
    }

    pub(crate) fn episode(title: TitleId, episode: usize) -> Self {
        Self { title, episode: Some(episode) }
    }
}

/// Owns every title of a run together with the run-wide counters.
#[derive(Debug, Default)]
pub(crate) struct Catalog {
    titles: Vec<Title>,
    counters: RunCounters,
}

impl Catalog {
    pub(crate) fn new(titles: Vec<Title>) -> Self {
        Self {
            titles,
            counters: RunCounters::new(),
        }
    }

    pub(crate) fn titles(&self) -> &[Title] {
        &self.titles
    }

    pub(crate) fn title(&self, id: TitleId) -> Option<&Title> {
        self.titles.get(id.0)
    }

    pub(crate) fn counters(&self) -> &RunCounters {
        &self.counters
    }

    pub(crate) fn item(&self, key: ItemKey) -> Option<&dyn ImageContainer> {
        let title = self.title(key.title)?;
        match key.episode {
            Some(index) => title.episodes.get(index).map(|e| e as &dyn ImageContainer),
            None => Some(title as &dyn ImageContainer),
        }
    }

    /// Every item that owns image URLs: movie titles and the episodes of other titles.
    pub(crate) fn item_keys(&self) -> Vec<ItemKey> {
        let mut keys = Vec::new();
        for (index, title) in self.titles.iter().enumerate() {
            let id = TitleId(index);
            if title.category.has_episodes() {
                keys.extend((0..title.episodes.len()).map(|e| ItemKey::episode(id, e)));
            } else {
                keys.push(ItemKey::title(id));
            }
        }
        keys
    }

    /// Stores a discovered image URL and grows the title and run totals with it.
    pub(crate) fn add_image(&self, key: ItemKey, url: impl Into<String>) -> bool {
        let Some(title) = self.title(key.title) else {
            return false;
        };
        match key.episode {
            Some(index) => {
                let Some(episode) = title.episodes.get(index) else {
                    return false;
                };
                if !episode.images.push_url(url) {
                    return false;
                }
                title.images.grow_total(1);
            }
            None => {
                if !title.images.push_url(url) {
                    return false;
                }
            }
        }
        self.counters.grow_total(1);
        true
    }

    /// Counts one processed image on the item, its title and the run.
    ///
    /// Returns `true` when the item itself became fully processed.
    pub(crate) fn record(&self, key: ItemKey, outcome: ImageOutcome) -> bool {
        let Some(title) = self.title(key.title) else {
            return false;
        };
        let completed = match key.episode {
            Some(index) => {
                let Some(episode) = title.episodes.get(index) else {
                    return false;
                };
                episode.images.record(outcome);
                title.images.record(outcome);
                title.mark_done();
                episode.mark_done()
            }
            None => {
                title.images.record(outcome);
                title.mark_done()
            }
        };
        self.counters.record(outcome);
        self.counters.mark_done();
        completed
    }

    /// Freezes every image set before downloading starts.
    pub(crate) fn freeze(&self) {
        for title in &self.titles {
            for episode in &title.episodes {
                episode.images.freeze();
            }
            title.images.freeze();
        }
        self.counters.freeze();
    }
}

/// Number of titles found per category, in category order.
pub(crate) fn category_stats(titles: &[Title]) -> BTreeMap<Category, usize> {
    let mut stats = BTreeMap::new();
    for title in titles {
        *stats.entry(title.category).or_insert(0) += 1;
    }
    stats
}
