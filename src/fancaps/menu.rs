//! Interactive prompts for categories, queries, titles and episode ranges.

use std::collections::BTreeMap;

use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, MultiSelect};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::fancaps::collector::{PageFetcher, ScrapeError};
use crate::fancaps::search::validate_query;
use crate::fancaps::selector::{self, last_episode_number, range_limit, retain_selected, Selection};
use crate::fancaps::types::category_stats;
use crate::fancaps::{Category, Title};

#[derive(Error, Debug)]
pub(crate) enum MenuError {
    #[error("UI interaction error: {0}")]
    Dialoguer(#[from] dialoguer::Error),

    #[error("No {0} selected")]
    NothingSelected(&'static str),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),
}

pub(crate) type MenuResult<T> = Result<T, MenuError>;

/// Asks which catalog sections to search. Everything is checked by default.
pub(crate) fn prompt_categories() -> MenuResult<Vec<Category>> {
    let names: Vec<_> = Category::ALL.iter().map(Category::name).collect();
    let chosen = MultiSelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Select categories to search (space to toggle, enter to confirm)")
        .items(&names)
        .defaults(&[true; 3])
        .interact()?;

    if chosen.is_empty() {
        return Err(MenuError::NothingSelected("categories"));
    }
    Ok(chosen.into_iter().map(|i| Category::ALL[i]).collect())
}

/// Reads queries until the user is done, keeping only those that find titles.
pub(crate) async fn prompt_queries(
    fetcher: &dyn PageFetcher,
    categories: &[Category],
) -> MenuResult<Vec<Url>> {
    let theme = ColorfulTheme::default();
    let mut urls = Vec::new();

    loop {
        if !urls.is_empty()
            && !Confirm::with_theme(&theme)
                .with_prompt("Enter another query?")
                .default(false)
                .interact()?
        {
            break;
        }

        println!(
            "{}",
            style("Type the name of a movie, TV series or anime. Part of a title works too.").dim()
        );
        let query: String = Input::with_theme(&theme)
            .with_prompt("Search query")
            .allow_empty(true)
            .interact_text()?;

        match validate_query(fetcher, &query, categories).await {
            Ok(url) => {
                println!("{}", style(format!("Found titles for query `{}`", query.trim())).green());
                urls.push(url);
            }
            Err(err @ (ScrapeError::EmptyQuery | ScrapeError::NoResults(_))) => {
                println!("{}", style(err.to_string()).red());
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(urls)
}

/// One line per category, e.g. `Anime: 3`.
pub(crate) fn category_summary(stats: &BTreeMap<Category, usize>) -> String {
    stats
        .iter()
        .map(|(category, count)| format!("{}: {}", category, count))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Menu labels, grouped under their category.
pub(crate) fn title_labels(titles: &[Title]) -> Vec<String> {
    titles
        .iter()
        .map(|title| format!("[{}] {}", title.category, title.name))
        .collect()
}

/// Keeps the titles at `indices`, in their original order.
pub(crate) fn keep_titles(titles: Vec<Title>, indices: &[usize]) -> Vec<Title> {
    titles
        .into_iter()
        .enumerate()
        .filter(|(index, _)| indices.contains(index))
        .map(|(_, title)| title)
        .collect()
}

/// Lets the user pick which discovered titles to download.
pub(crate) fn select_titles(titles: Vec<Title>) -> MenuResult<Vec<Title>> {
    println!("{}", style("Found titles").bold());
    println!("{}", category_summary(&category_stats(&titles)));

    let chosen = MultiSelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Select titles (space to toggle, enter to confirm)")
        .items(&title_labels(&titles))
        .max_length(20)
        .interact()?;

    if chosen.is_empty() {
        return Err(MenuError::NothingSelected("titles"));
    }
    let titles = keep_titles(titles, &chosen);
    info!("Selected {} titles", titles.len());
    Ok(titles)
}

/// Help shown above the episode range prompt of `title`.
pub(crate) fn episode_help(title: &Title) -> String {
    let last = last_episode_number(&title.episodes)
        .map_or_else(|| title.episodes.len().to_string(), |n| n.to_string());
    [
        format!("Episodes of \"{}\" to download (e.g. 1-10, 1-, -{}, 1-9:2)", title.name, last),
        format!("Default: all (1-{}). Leave empty for the default.", last),
        "Ranges may overlap: \"1-5:2, 7, 6-10\" selects 1, 3, 5, 6, 7, 8, 9 and 10.".to_string(),
    ]
    .join("\n")
}

fn report_warnings(title: &Title, selection: &Selection) {
    for warning in &selection.warnings {
        warn!("{}: {}", title.name, warning);
    }
}

/// Prompts for an episode range for every TV and anime title.
pub(crate) fn prompt_episode_ranges(titles: &mut [Title]) -> MenuResult<()> {
    let theme = ColorfulTheme::default();

    for title in titles.iter_mut().filter(|t| t.category.has_episodes() && !t.episodes.is_empty()) {
        let selection = loop {
            println!("{}", style(episode_help(title)).dim());
            let spec: String = Input::with_theme(&theme)
                .with_prompt(format!("Episode range for {}", title.name))
                .allow_empty(true)
                .interact_text()?;

            match selector::select_by_spec(&title.episodes, &spec) {
                Ok(selection) => break selection,
                Err(err) => println!(
                    "{}",
                    style(format!("{} (valid range is 1-{}), try again", err, range_limit(&title.episodes))).red()
                ),
            }
        };

        report_warnings(title, &selection);
        retain_selected(&mut title.episodes, &selection);
    }

    Ok(())
}

/// Applies the same range to every TV and anime title without prompting.
///
/// A range that does not parse for a title keeps all of its episodes.
pub(crate) fn apply_episode_spec(titles: &mut [Title], spec: &str) {
    for title in titles.iter_mut().filter(|t| t.category.has_episodes()) {
        match selector::select_by_spec(&title.episodes, spec) {
            Ok(selection) => {
                report_warnings(title, &selection);
                retain_selected(&mut title.episodes, &selection);
            }
            Err(err) => {
                warn!("{}: {}, skipping its episodes", title.name, err);
                title.episodes.clear();
            }
        }
    }
}
