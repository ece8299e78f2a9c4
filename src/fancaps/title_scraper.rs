//! Collects titles from search result pages.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::fancaps::collector::{
    element_text, fetch_all, paginate, resolve_link, PageFetcher, PageVisit, ScrapeError, ScrapeResult,
};
use crate::fancaps::{Category, Title};

static TITLE_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("h4 > a").unwrap());
static SEASON: Lazy<Regex> = Lazy::new(|| Regex::new(r" Season (\d+)").unwrap());

/// Scrapes every search URL and returns the unique titles, sorted.
///
/// Titles are unique by canonical URL, the first search that found a title wins.
/// The order is category, then base name ignoring case and any " Season N",
/// then season number.
pub(crate) async fn discover(
    fetcher: &dyn PageFetcher,
    search_urls: &[Url],
    parallel: bool,
) -> ScrapeResult<Vec<Title>> {
    let pages = fetch_all(search_urls, parallel, |url| {
        paginate(fetcher, url.clone(), extract_titles)
    })
    .await;

    let mut seen = HashSet::new();
    let mut titles = Vec::new();
    for page in pages {
        for title in page? {
            if seen.insert(title.url.clone()) {
                titles.push(title);
            }
        }
    }

    sort_titles(&mut titles);

    info!("Found {} titles across {} searches", titles.len(), search_urls.len());
    for title in &titles {
        debug!("{} -> {}", title.name, title.url);
    }

    Ok(titles)
}

fn extract_titles(document: &Html, page: &Url) -> ScrapeResult<PageVisit<Title>> {
    let mut titles = Vec::new();
    for anchor in document.select(&TITLE_LINK) {
        let Some(url) = anchor.value().attr("href").and_then(|href| resolve_link(page, href)) else {
            continue;
        };
        let category =
            Category::from_url(&url).ok_or_else(|| ScrapeError::UnknownCategory(url.to_string()))?;
        titles.push(Title::new(element_text(anchor), url, category));
    }
    Ok(PageVisit::last(titles))
}

/// Title name without its season marker, lowercased.
fn base_name(name: &str) -> String {
    SEASON.replace_all(name, "").to_lowercase()
}

fn season_number(name: &str) -> Option<u32> {
    SEASON.captures(name).and_then(|c| c[1].parse().ok())
}

pub(crate) fn sort_titles(titles: &mut [Title]) {
    titles.sort_by_cached_key(|title| {
        (
            title.category,
            base_name(&title.name),
            season_number(&title.name).unwrap_or(0),
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fancaps::collector::testing::StaticPages;

    fn search_page(links: &[(&str, &str)]) -> String {
        let items: String = links
            .iter()
            .map(|(href, name)| format!(r#"<h4><a href="{}">{}</a></h4>"#, href, name))
            .collect();
        format!(r#"<div class="single_post_content"><table><tr><td>{}</td></tr></table></div>"#, items)
    }

    fn names(titles: &[Title]) -> Vec<&str> {
        titles.iter().map(|t| t.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_titles_are_deduplicated_across_searches() {
        let first = "https://fancaps.net/search.php?q=one";
        let second = "https://fancaps.net/search.php?q=two";
        let pages = StaticPages::new()
            .with(first, search_page(&[
                ("/anime/showimages.php?1-Naruto", "Naruto"),
                ("/movies/MovieImages.php?name=Up", "Up"),
            ]))
            .with(second, search_page(&[
                ("/anime/showimages.php?1-Naruto#top", "Naruto (again)"),
                ("/tv/showimages.php?2-Seinfeld", "Seinfeld"),
            ]));

        let urls = vec![Url::parse(first).unwrap(), Url::parse(second).unwrap()];
        for parallel in [true, false] {
            let titles = discover(&pages, &urls, parallel).await.unwrap();
            assert_eq!(names(&titles), vec!["Naruto", "Seinfeld", "Up"]);
            assert_eq!(titles[0].category, Category::Anime);
            assert_eq!(titles[1].category, Category::Tv);
            assert_eq!(titles[2].category, Category::Movie);
        }
    }

    #[tokio::test]
    async fn test_unknown_category_is_fatal() {
        let search = "https://fancaps.net/search.php?q=odd";
        let pages = StaticPages::new().with(search, search_page(&[("/music/1", "Song")]));
        let urls = vec![Url::parse(search).unwrap()];
        let result = discover(&pages, &urls, true).await;
        assert!(matches!(result, Err(ScrapeError::UnknownCategory(_))));
    }

    #[test]
    fn test_seasons_sort_numerically() {
        let url = |n: u32| Url::parse(&format!("https://fancaps.net/tv/showimages.php?{}", n)).unwrap();
        let mut titles = vec![
            Title::new("X Season 10", url(1), Category::Tv),
            Title::new("x Season 2", url(2), Category::Tv),
            Title::new("X Season 9", url(3), Category::Tv),
            Title::new("X", url(4), Category::Tv),
            Title::new("Anime X", url(5), Category::Anime),
        ];
        sort_titles(&mut titles);
        assert_eq!(
            names(&titles),
            vec!["Anime X", "X", "x Season 2", "X Season 9", "X Season 10"]
        );
    }
}
