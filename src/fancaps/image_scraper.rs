//! Collects the image URLs of every movie and episode gallery.

use std::path::Path;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::fancaps::collector::{
    element_text, fetch_all, paginate, resolve_link, PageFetcher, PageVisit, ScrapeResult,
};
use crate::fancaps::{Catalog, Category, ItemKey};

static GALLERY_IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.row img.imageFade").unwrap());
static PAGINATION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.pagination > li > a[href]").unwrap());

const NEXT_ARROW: &str = "»";

/// Where the full size files of a category live.
pub(crate) fn cdn_base(category: Category) -> &'static str {
    match category {
        Category::Anime => "https://cdni.fancaps.net/file/fancaps-animeimages/",
        Category::Tv => "https://cdni.fancaps.net/file/fancaps-tvimages/",
        Category::Movie => "https://cdni.fancaps.net/file/fancaps-movieimages/",
    }
}

/// Full size URL for a gallery thumbnail `src`.
fn full_size_url(category: Category, src: &str) -> Option<String> {
    let path = src.split(['?', '#']).next()?;
    let file = Path::new(path).file_name()?.to_str()?;
    Some(format!("{}{}", cdn_base(category), file))
}

fn in_top_images(image: ElementRef<'_>) -> bool {
    image.ancestors().filter_map(ElementRef::wrap).any(|ancestor| {
        ancestor.value().name() == "div" && ancestor.value().classes().any(|c| c == "topImages")
    })
}

fn extract_images(category: Category, document: &Html, page: &Url) -> ScrapeResult<PageVisit<String>> {
    let items = document
        .select(&GALLERY_IMAGE)
        .filter(|image| !in_top_images(*image))
        .filter_map(|image| full_size_url(category, image.value().attr("src")?))
        .collect();

    let next = document
        .select(&PAGINATION)
        .filter(|anchor| element_text(*anchor) == NEXT_ARROW)
        .find_map(|anchor| resolve_link(page, anchor.value().attr("href")?));

    Ok(PageVisit { items, next })
}

/// Gallery page and category of a catalog item.
fn gallery(catalog: &Catalog, key: ItemKey) -> Option<(Url, Category)> {
    let title = catalog.title(key.title)?;
    let url = match key.episode {
        Some(index) => title.episodes.get(index)?.url.clone(),
        None => title.url.clone(),
    };
    Some((url, title.category))
}

/// Walks the gallery of a single item and stores every image URL it finds.
pub(crate) async fn discover_item_images(
    fetcher: &dyn PageFetcher,
    catalog: &Catalog,
    key: ItemKey,
) -> ScrapeResult<usize> {
    let Some((url, category)) = gallery(catalog, key) else {
        return Ok(0);
    };

    let images = paginate(fetcher, url.clone(), |document, page| {
        extract_images(category, document, page)
    })
    .await?;

    let count = images
        .into_iter()
        .filter(|image| catalog.add_image(key, image.as_str()))
        .count();
    debug!("{} images at {}", count, url);
    Ok(count)
}

/// Fills the image sets of every movie and episode in the catalog.
pub(crate) async fn discover_all(
    fetcher: &dyn PageFetcher,
    catalog: &Catalog,
    parallel: bool,
) -> ScrapeResult<usize> {
    let keys = catalog.item_keys();
    let found = fetch_all(keys, parallel, |key| discover_item_images(fetcher, catalog, key)).await;

    let mut total = 0;
    for count in found {
        total += count?;
    }
    info!("Found {} images", total);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fancaps::collector::testing::StaticPages;
    use crate::fancaps::{Episode, Title, TitleId};

    const GALLERY_FIRST: &str = r##"
        <div class="row"><div class="topImages">
            <img class="imageFade" src="https://cdni.fancaps.net/thumbs/top.jpg">
        </div></div>
        <div class="row">
            <img class="imageFade" src="https://cdni.fancaps.net/thumbs/100.jpg">
            <img class="imageFade" src="/thumbs/101.jpg?v=2">
            <img class="other" src="/thumbs/ignored.jpg">
        </div>
        <ul class="pagination">
            <li><a href="#">&laquo;</a></li>
            <li><a href="?1&amp;page=2">2</a></li>
            <li><a href="?1&amp;page=2">&raquo;</a></li>
        </ul>"##;
    const GALLERY_SECOND: &str = r#"
        <div class="row"><img class="imageFade" src="/thumbs/102.jpg"></div>
        <ul class="pagination"><li><a href="?1">&laquo;</a></li></ul>"#;

    #[test]
    fn test_full_size_url() {
        assert_eq!(
            full_size_url(Category::Movie, "https://x/thumbs/a/5.jpg").as_deref(),
            Some("https://cdni.fancaps.net/file/fancaps-movieimages/5.jpg")
        );
        assert_eq!(full_size_url(Category::Tv, ""), None);
    }

    #[tokio::test]
    async fn test_episode_gallery_feeds_catalog_totals() {
        let episode_url = "https://fancaps.net/anime/episodeimages.php?1";
        let pages = StaticPages::new()
            .with(episode_url, GALLERY_FIRST)
            .with("https://fancaps.net/anime/episodeimages.php?1&page=2", GALLERY_SECOND);

        let mut title = Title::new(
            "Naruto",
            Url::parse("https://fancaps.net/anime/showimages.php?9").unwrap(),
            Category::Anime,
        );
        title
            .episodes
            .push(Episode::new("Episode 1 of Naruto", Url::parse(episode_url).unwrap(), TitleId(0)));
        let catalog = Catalog::new(vec![title]);

        let total = discover_all(&pages, &catalog, true).await.unwrap();
        assert_eq!(total, 3);

        let title = &catalog.titles()[0];
        assert_eq!(
            title.episodes[0].images.urls(),
            vec![
                "https://cdni.fancaps.net/file/fancaps-animeimages/100.jpg",
                "https://cdni.fancaps.net/file/fancaps-animeimages/101.jpg",
                "https://cdni.fancaps.net/file/fancaps-animeimages/102.jpg",
            ]
        );
        assert_eq!(title.images.stats().total, 3);
        assert_eq!(catalog.counters().stats().total, 3);
    }

    #[tokio::test]
    async fn test_movie_gallery_without_pagination() {
        let movie_url = "https://fancaps.net/movies/MovieImages.php?name=Up";
        let pages = StaticPages::new().with(
            movie_url,
            r#"<div class="row"><img class="imageFade" src="/t/7.jpg"></div>"#,
        );
        let catalog = Catalog::new(vec![Title::new("Up", Url::parse(movie_url).unwrap(), Category::Movie)]);

        discover_all(&pages, &catalog, false).await.unwrap();
        assert_eq!(
            catalog.titles()[0].images.urls(),
            vec!["https://cdni.fancaps.net/file/fancaps-movieimages/7.jpg"]
        );
        assert_eq!(pages.requests(), vec![movie_url]);
    }
}
