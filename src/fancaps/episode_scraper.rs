//! Collects the episode list of TV and anime titles.
//!
//! The two catalog sections lay their listings out differently, so each
//! category maps to its own set of extraction rules.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::fancaps::collector::{
    element_text, fetch_all, paginate, resolve_link, PageFetcher, PageVisit, ScrapeResult,
};
use crate::fancaps::types::EPISODE_NAME_NOT_FOUND;
use crate::fancaps::{Category, Episode, Title, TitleId};

static TV_EPISODE: Lazy<Selector> = Lazy::new(|| Selector::parse("h3 > a[href]").unwrap());
static TV_PAGER: Lazy<Selector> = Lazy::new(|| Selector::parse("ul.pager > li > a[href]").unwrap());
static ANIME_EPISODE: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href] > h3").unwrap());
static ANIME_NEXT: Lazy<Selector> = Lazy::new(|| Selector::parse("a[title='Next Page']").unwrap());

static EPISODE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"Images From (.+?)\s*$").unwrap());
static NEXT_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)next").unwrap());

/// Heading text and link of one episode, as found on a listing page.
type EpisodeLink = (String, Url);

/// How to read the episode listing of one category.
#[derive(Clone, Copy)]
pub(crate) struct EpisodeRules {
    extract: fn(&Html, &Url) -> ScrapeResult<PageVisit<EpisodeLink>>,
    /// Anime episode names repeat across shows, so they carry the title name.
    qualify_with_title: bool,
}

/// Rules for `category`. Movies have no episodes and get none.
pub(crate) fn rules_for(category: Category) -> Option<EpisodeRules> {
    match category {
        Category::Tv => Some(EpisodeRules {
            extract: extract_tv,
            qualify_with_title: false,
        }),
        Category::Anime => Some(EpisodeRules {
            extract: extract_anime,
            qualify_with_title: true,
        }),
        Category::Movie => None,
    }
}

fn extract_tv(document: &Html, page: &Url) -> ScrapeResult<PageVisit<EpisodeLink>> {
    let items = document
        .select(&TV_EPISODE)
        .filter_map(|anchor| {
            let url = resolve_link(page, anchor.value().attr("href")?)?;
            Some((element_text(anchor), url))
        })
        .collect();

    let next = document
        .select(&TV_PAGER)
        .filter(|anchor| NEXT_TEXT.is_match(&element_text(*anchor)))
        .find_map(|anchor| resolve_link(page, anchor.value().attr("href")?));

    Ok(PageVisit { items, next })
}

fn extract_anime(document: &Html, page: &Url) -> ScrapeResult<PageVisit<EpisodeLink>> {
    let items = document
        .select(&ANIME_EPISODE)
        .filter_map(|heading| {
            let anchor = heading.parent().and_then(ElementRef::wrap)?;
            let url = resolve_link(page, anchor.value().attr("href")?)?;
            Some((element_text(heading), url))
        })
        .collect();

    let next = document
        .select(&ANIME_NEXT)
        .find_map(|anchor| resolve_link(page, anchor.value().attr("href")?));

    Ok(PageVisit { items, next })
}

/// Episode name from a listing heading, or the not-found marker.
pub(crate) fn episode_name(heading: &str) -> String {
    EPISODE_NAME
        .captures(heading)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| EPISODE_NAME_NOT_FOUND.to_string())
}

/// Walks every listing page of `title` and returns its episodes in page order.
pub(crate) async fn discover_episodes(
    fetcher: &dyn PageFetcher,
    title: &Title,
    id: TitleId,
) -> ScrapeResult<Vec<Episode>> {
    let Some(rules) = rules_for(title.category) else {
        return Ok(Vec::new());
    };

    let links = paginate(fetcher, title.url.clone(), rules.extract).await?;
    let episodes = links
        .into_iter()
        .map(|(heading, url)| {
            let mut name = episode_name(&heading);
            if rules.qualify_with_title {
                name = format!("{} of {}", name, title.name);
            }
            Episode::new(name, url, id)
        })
        .collect::<Vec<_>>();

    debug!("{} has {} episodes", title.name, episodes.len());
    Ok(episodes)
}

/// Fills in the episodes of every TV and anime title, one task per title.
pub(crate) async fn discover_all(
    fetcher: &dyn PageFetcher,
    titles: &mut [Title],
    parallel: bool,
) -> ScrapeResult<()> {
    let found = fetch_all(titles.iter().enumerate(), parallel, |(index, title)| {
        discover_episodes(fetcher, title, TitleId(index))
    })
    .await;

    let found = found.into_iter().collect::<ScrapeResult<Vec<_>>>()?;
    let mut total = 0;
    for (title, episodes) in titles.iter_mut().zip(found) {
        total += episodes.len();
        title.episodes = episodes;
    }

    info!("Found {} episodes", total);
    for title in titles.iter() {
        debug!("{} [{}] -> {}", title.name, title.category, title.url);
        for episode in &title.episodes {
            debug!("    {} -> {}", episode.name, episode.url);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fancaps::collector::testing::StaticPages;

    const TV_FIRST: &str = r##"
        <h3><a href="/tv/episodeimages.php?1">Images From Pilot</a></h3>
        <h3><a href="/tv/episodeimages.php?2">Images From Episode 2 </a></h3>
        <ul class="pager">
            <li><a href="#">Previous</a></li>
            <li><a href="/tv/showimages.php?1&amp;page=2">Next &raquo;</a></li>
        </ul>"##;
    const TV_SECOND: &str = r##"
        <h3><a href="/tv/episodeimages.php?3">Images From Episode 3</a></h3>
        <ul class="pager">
            <li><a href="/tv/showimages.php?1">Previous</a></li>
            <li><a href="#">Next</a></li>
        </ul>"##;

    const ANIME_FIRST: &str = r#"
        <a href="/anime/episodeimages.php?10"><h3>Images From Episode 1</h3></a>
        <a href="/anime/episodeimages.php?11"><h3>Something Else</h3></a>
        <a title="Next Page" href="/anime/showimages.php?5&amp;page=2">Next</a>"#;
    const ANIME_SECOND: &str = r#"
        <a href="/anime/episodeimages.php?12"><h3>Images From Episode 3</h3></a>
        <a title="Next Page" href="/anime/showimages.php?5&amp;page=2">Next</a>"#;

    #[test]
    fn test_episode_name() {
        assert_eq!(episode_name("Images From Episode 12-13  "), "Episode 12-13");
        assert_eq!(episode_name("Gallery"), EPISODE_NAME_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tv_episodes_follow_pager() {
        let pages = StaticPages::new()
            .with("https://fancaps.net/tv/showimages.php?1", TV_FIRST)
            .with("https://fancaps.net/tv/showimages.php?1&page=2", TV_SECOND);
        let title = Title::new(
            "Show",
            Url::parse("https://fancaps.net/tv/showimages.php?1").unwrap(),
            Category::Tv,
        );

        let episodes = discover_episodes(&pages, &title, TitleId(3)).await.unwrap();
        let names: Vec<_> = episodes.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Pilot", "Episode 2", "Episode 3"]);
        assert_eq!(episodes[2].url.as_str(), "https://fancaps.net/tv/episodeimages.php?3");
        assert!(episodes.iter().all(|e| e.title == TitleId(3)));
        assert_eq!(pages.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_anime_episodes_stop_at_self_link() {
        let pages = StaticPages::new()
            .with("https://fancaps.net/anime/showimages.php?5", ANIME_FIRST)
            .with("https://fancaps.net/anime/showimages.php?5&page=2", ANIME_SECOND);
        let title = Title::new(
            "Naruto",
            Url::parse("https://fancaps.net/anime/showimages.php?5").unwrap(),
            Category::Anime,
        );

        let episodes = discover_episodes(&pages, &title, TitleId(0)).await.unwrap();
        let names: Vec<_> = episodes.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Episode 1 of Naruto",
                "EPISODE TITLE NOT FOUND of Naruto",
                "Episode 3 of Naruto"
            ]
        );
        assert_eq!(pages.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_movies_are_never_fetched() {
        let pages = StaticPages::new();
        let mut titles = vec![Title::new(
            "Up",
            Url::parse("https://fancaps.net/movies/MovieImages.php?name=Up").unwrap(),
            Category::Movie,
        )];
        discover_all(&pages, &mut titles, true).await.unwrap();
        assert!(titles[0].episodes.is_empty());
        assert!(pages.requests().is_empty());
    }
}
