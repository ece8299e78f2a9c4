//! Page fetching and traversal shared by every scraper.
//!
//! A scraper supplies a pure extraction function over a parsed document. The
//! collector fetches the page, runs the extraction, follows the "next page"
//! link it returns and stops on anything it already saw.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::Client;
use scraper::{ElementRef, Html};
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

use crate::fancaps::{ALLOWED_DOMAIN, BASE_URL};

#[derive(Error, Debug)]
pub(crate) enum ScrapeError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("Refusing to visit {0}: not on fancaps.net")]
    DisallowedDomain(String),

    #[error("Unknown category for title link: {0}")]
    UnknownCategory(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Search query cannot be empty")]
    EmptyQuery,

    #[error("No titles found for query `{0}`")]
    NoResults(String),
}

pub(crate) type ScrapeResult<T> = Result<T, ScrapeError>;

/// Builds the HTTP client used for both page and image requests.
pub(crate) fn build_client(user_agent: &str, timeout: Duration) -> reqwest::Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(REFERER, HeaderValue::from_static(BASE_URL));

    Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(timeout)
        .gzip(true)
        .build()
}

/// Something that can turn a URL into HTML.
#[async_trait]
pub(crate) trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &Url) -> ScrapeResult<String>;
}

/// Fetches catalog pages over HTTP. Hosts outside the catalog domain are refused.
pub(crate) struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, url: &Url) -> ScrapeResult<String> {
        if !is_allowed(url) {
            return Err(ScrapeError::DisallowedDomain(url.to_string()));
        }

        debug!("Visiting {}", url);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

fn is_allowed(url: &Url) -> bool {
    match url.host_str() {
        Some(host) => host == ALLOWED_DOMAIN || host.ends_with(&format!(".{}", ALLOWED_DOMAIN)),
        None => false,
    }
}

/// What an extraction function found on a single page.
#[derive(Debug)]
pub(crate) struct PageVisit<T> {
    pub(crate) items: Vec<T>,
    pub(crate) next: Option<Url>,
}

impl<T> PageVisit<T> {
    pub(crate) fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Walks a paginated listing starting at `start`, collecting items in page order.
///
/// Traversal ends when a page has no next link, or the link points back at the
/// current page or at any page already visited.
pub(crate) async fn paginate<T, F>(
    fetcher: &dyn PageFetcher,
    start: Url,
    extract: F,
) -> ScrapeResult<Vec<T>>
where
    T: Send,
    F: Fn(&Html, &Url) -> ScrapeResult<PageVisit<T>> + Send + Sync,
{
    let mut visited = HashSet::new();
    let mut items = Vec::new();
    let mut current = canonical(start);

    loop {
        visited.insert(current.clone());
        let body = fetcher.fetch_page(&current).await?;

        // Html is not Send, it must be gone before the next await.
        let visit = {
            let document = Html::parse_document(&body);
            extract(&document, &current)?
        };
        trace!("{} yielded {} items", current, visit.items.len());
        items.extend(visit.items);

        match visit.next.map(canonical) {
            Some(next) if !visited.contains(&next) => current = next,
            _ => break,
        }
    }

    Ok(items)
}

/// Runs `f` for every item, concurrently or one after another, and returns
/// the outputs in input order once all of them finished.
pub(crate) async fn fetch_all<I, F, Fut>(items: I, parallel: bool, mut f: F) -> Vec<Fut::Output>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future,
{
    if parallel {
        return join_all(items.into_iter().map(f)).await;
    }

    let mut outputs = Vec::new();
    for item in items {
        outputs.push(f(item).await);
    }
    outputs
}

/// Resolves `href` against `base`. Placeholder links (`#`, empty) resolve to nothing.
pub(crate) fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href == "#" {
        return None;
    }
    base.join(href).ok().map(canonical)
}

/// Absolute URL without its fragment. Identity of titles, episodes and pages.
pub(crate) fn canonical(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

/// Whitespace-trimmed text content of an element.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;

    /// Serves canned pages and remembers every request.
    #[derive(Default)]
    pub(crate) struct StaticPages {
        pages: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl StaticPages {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with(mut self, url: &str, body: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), body.into());
            self
        }

        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for StaticPages {
        async fn fetch_page(&self, url: &Url) -> ScrapeResult<String> {
            self.requests.lock().push(url.to_string());
            self.pages.get(url.as_str()).cloned().ok_or_else(|| ScrapeError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use scraper::Selector;

    use super::testing::StaticPages;
    use super::*;

    fn numbers_and_next(document: &Html, page: &Url) -> ScrapeResult<PageVisit<String>> {
        let items = Selector::parse("li").unwrap();
        let next = Selector::parse("a.next[href]").unwrap();
        Ok(PageVisit {
            items: document.select(&items).map(element_text).collect(),
            next: document
                .select(&next)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| resolve_link(page, href)),
        })
    }

    #[tokio::test]
    async fn test_paginate_follows_next_links_in_order() {
        let pages = StaticPages::new()
            .with("https://fancaps.net/list?page=1", r#"<ul><li>1</li><li>2</li></ul><a class="next" href="?page=2">Next</a>"#)
            .with("https://fancaps.net/list?page=2", r#"<ul><li>3</li></ul><a class="next" href="/list?page=3#top">Next</a>"#)
            .with("https://fancaps.net/list?page=3", r##"<ul><li>4</li></ul><a class="next" href="#">Next</a>"##);

        let start = Url::parse("https://fancaps.net/list?page=1").unwrap();
        let items = paginate(&pages, start, numbers_and_next).await.unwrap();

        assert_eq!(items, vec!["1", "2", "3", "4"]);
        assert_eq!(pages.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_paginate_stops_on_cycle() {
        let pages = StaticPages::new()
            .with("https://fancaps.net/a", r#"<li>a</li><a class="next" href="/b">Next</a>"#)
            .with("https://fancaps.net/b", r#"<li>b</li><a class="next" href="/a">Next</a>"#);

        let start = Url::parse("https://fancaps.net/a").unwrap();
        let items = paginate(&pages, start, numbers_and_next).await.unwrap();

        assert_eq!(items, vec!["a", "b"]);
        assert_eq!(pages.requests(), vec!["https://fancaps.net/a", "https://fancaps.net/b"]);
    }

    #[tokio::test]
    async fn test_paginate_propagates_fetch_errors() {
        let pages = StaticPages::new();
        let start = Url::parse("https://fancaps.net/missing").unwrap();
        let result = paginate(&pages, start, numbers_and_next).await;
        assert!(matches!(result, Err(ScrapeError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_input_order() {
        for parallel in [true, false] {
            let outputs = fetch_all(vec![3u64, 1, 2], parallel, |n| async move {
                tokio::time::sleep(Duration::from_millis(n * 5)).await;
                n * 10
            })
            .await;
            assert_eq!(outputs, vec![30, 10, 20]);
        }
    }

    #[tokio::test]
    async fn test_http_fetcher_refuses_foreign_hosts() {
        let client = build_client("test", Duration::from_secs(1)).unwrap();
        let fetcher = HttpPageFetcher::new(client);
        let url = Url::parse("https://example.com/page").unwrap();
        assert!(matches!(
            fetcher.fetch_page(&url).await,
            Err(ScrapeError::DisallowedDomain(_))
        ));
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://fancaps.net/tv/showimages.php?1").unwrap();
        assert_eq!(resolve_link(&base, "#"), None);
        assert_eq!(resolve_link(&base, "  "), None);
        assert_eq!(
            resolve_link(&base, "/tv/episodeimages.php?2#frag").unwrap().as_str(),
            "https://fancaps.net/tv/episodeimages.php?2"
        );
        assert!(is_allowed(&Url::parse("https://cdni.fancaps.net/x.jpg").unwrap()));
        assert!(!is_allowed(&Url::parse("https://notfancaps.net/").unwrap()));
    }
}
