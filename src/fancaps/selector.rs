//! Maps requested episode numbers onto a discovered episode list.
//!
//! Listing positions and episode numbers drift apart as soon as a show has
//! specials or double episodes, so numbers are matched against the
//! "Episode ..." part of each name instead of by index.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::fancaps::sequence::{self, SequenceResult};
use crate::fancaps::Episode;

static EPISODE_NUMBERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bEpisode\s+(\d[\d\s\-&,]*)").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Non-fatal problem found while resolving a requested number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SelectionWarning {
    NotFound { number: u32, from: usize, to: usize },
    Duplicate { number: u32, episode: String },
}

impl fmt::Display for SelectionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionWarning::NotFound { number, from, to } => {
                write!(f, "couldn't find episode {} in [{}-{}], skipping", number, from, to)
            }
            SelectionWarning::Duplicate { number, episode } => {
                write!(f, "episode {} already selected as \"{}\", skipping", number, episode)
            }
        }
    }
}

/// Positions of the chosen episodes, in listing order.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Selection {
    pub(crate) indices: Vec<usize>,
    pub(crate) warnings: Vec<SelectionWarning>,
}

impl Selection {
    pub(crate) fn all(count: usize) -> Self {
        Self {
            indices: (0..count).collect(),
            warnings: Vec::new(),
        }
    }
}

/// Episode numbers carried by a name, e.g. `Episode 12-13 of X` carries 12 and 13.
pub(crate) fn episode_numbers(name: &str) -> Vec<u32> {
    let Some(captures) = EPISODE_NUMBERS.captures(name) else {
        return Vec::new();
    };
    NUMBER
        .find_iter(&captures[1])
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// Highest number carried by the last episode, used as the upper bound hint.
pub(crate) fn last_episode_number(episodes: &[Episode]) -> Option<u32> {
    episodes
        .last()
        .and_then(|episode| episode_numbers(&episode.name).into_iter().max())
}

/// Largest number a range may reach for this list.
pub(crate) fn range_limit(episodes: &[Episode]) -> u32 {
    let count = u32::try_from(episodes.len()).unwrap_or(u32::MAX);
    last_episode_number(episodes).map_or(count, |last| last.max(count))
}

/// Resolves each number by scanning forward from the last match.
///
/// `numbers` must be ascending. The scan cursor never moves backwards, so a
/// list whose numbering restarts resolves to the first hit after the cursor.
pub(crate) fn select(episodes: &[Episode], numbers: &[u32]) -> Selection {
    let mut selection = Selection::default();
    let mut cursor = 0;

    for &number in numbers {
        let found = episodes
            .iter()
            .enumerate()
            .skip(cursor)
            .find(|(_, episode)| episode_numbers(&episode.name).contains(&number));

        match found {
            Some((index, episode)) if selection.indices.contains(&index) => {
                selection.warnings.push(SelectionWarning::Duplicate {
                    number,
                    episode: episode.name.clone(),
                });
            }
            Some((index, _)) => {
                selection.indices.push(index);
                cursor = index;
            }
            None => selection.warnings.push(SelectionWarning::NotFound {
                number,
                from: cursor,
                to: episodes.len(),
            }),
        }
    }

    selection
}

/// Parses `spec` and selects from `episodes`. A blank spec keeps everything.
pub(crate) fn select_by_spec(episodes: &[Episode], spec: &str) -> SequenceResult<Selection> {
    if spec.trim().is_empty() {
        return Ok(Selection::all(episodes.len()));
    }
    let numbers = sequence::parse(spec, range_limit(episodes))?;
    Ok(select(episodes, &numbers))
}

/// Keeps only the selected episodes, preserving listing order.
pub(crate) fn retain_selected(episodes: &mut Vec<Episode>, selection: &Selection) {
    let mut index = 0;
    episodes.retain(|_| {
        let keep = selection.indices.contains(&index);
        index += 1;
        keep
    });
}
