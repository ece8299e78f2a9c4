//! Search URLs for the catalog and a check that a query finds anything.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::fancaps::collector::{fetch_all, PageFetcher, ScrapeError, ScrapeResult};
use crate::fancaps::{Category, BASE_URL};

static RESULT_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.single_post_content > table h4 > a").unwrap());

/// Builds the search page URL for `query`, limited to `categories`.
pub(crate) fn search_url(query: &str, categories: &[Category]) -> ScrapeResult<Url> {
    let mut url = Url::parse(BASE_URL)?.join("/search.php")?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("q", query);
        for category in Category::ALL {
            if !categories.contains(&category) {
                continue;
            }
            match category {
                Category::Movie => pairs.append_pair("MoviesCB", "Movies"),
                Category::Tv => pairs.append_pair("TVCB", "TV"),
                Category::Anime => pairs.append_pair("animeCB", "Anime"),
            };
        }
        pairs.append_pair("submit", "Submit Query");
    }
    Ok(url)
}

/// Whether the search page at `url` lists at least one title.
pub(crate) async fn has_results(fetcher: &dyn PageFetcher, url: &Url) -> ScrapeResult<bool> {
    let body = fetcher.fetch_page(url).await?;
    let document = Html::parse_document(&body);
    Ok(document.select(&RESULT_TITLE).next().is_some())
}

/// Turns a single query into a validated search URL.
pub(crate) async fn validate_query(
    fetcher: &dyn PageFetcher,
    query: &str,
    categories: &[Category],
) -> ScrapeResult<Url> {
    // The site answers an empty query with its whole catalog.
    if query.trim().is_empty() {
        return Err(ScrapeError::EmptyQuery);
    }

    let url = search_url(query, categories)?;
    if !has_results(fetcher, &url).await? {
        return Err(ScrapeError::NoResults(query.to_string()));
    }

    debug!("Query `{}` resolved to {}", query, url);
    Ok(url)
}

/// Validates every query, concurrently unless `parallel` is off.
///
/// The first failing query, in input order, fails the whole batch.
pub(crate) async fn validate_queries(
    fetcher: &dyn PageFetcher,
    queries: &[String],
    categories: &[Category],
    parallel: bool,
) -> ScrapeResult<Vec<Url>> {
    if queries.iter().any(|q| q.trim().is_empty()) {
        return Err(ScrapeError::EmptyQuery);
    }

    let results = fetch_all(queries, parallel, |query| {
        validate_query(fetcher, query, categories)
    })
    .await;

    let urls = results.into_iter().collect::<ScrapeResult<Vec<_>>>()?;
    info!("Validated {} search queries", urls.len());
    Ok(urls)
}
