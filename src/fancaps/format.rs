//! Dry-run listings of the selected titles, their episodes and image URLs.

use std::fmt::Write as _;

use clap::ValueEnum;
use serde::Serialize;
use thiserror::Error;

use crate::fancaps::Title;

const TITLE_SPACING: &str = "  ";
const EPISODE_SPACING: &str = "    ";

#[derive(Error, Debug)]
pub(crate) enum FormatError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Write error: {0}")]
    Write(#[from] std::fmt::Error),
}

pub(crate) type FormatResult<T> = Result<T, FormatError>;

/// Output formats for a dry run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Indented plain text.
    #[default]
    Txt,
    /// Pretty printed JSON array.
    Json,
    /// YAML document with the title count and the titles.
    Yaml,
    /// One CSV row per image URL.
    Csv,
}

const CSV_HEADER: [&str; 6] = [
    "Title Name",
    "Category",
    "Title Link",
    "Episode Name",
    "Episode Link",
    "Image URL",
];

#[derive(Serialize)]
struct JsonEpisode {
    name: String,
    link: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Serialize)]
struct YamlListing {
    total: usize,
    titles: Vec<JsonTitle>,
}

#[derive(Serialize)]
struct JsonTitle {
    name: String,
    category: String,
    link: String,
    episodes: Vec<JsonEpisode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

impl From<&Title> for JsonTitle {
    fn from(title: &Title) -> Self {
        Self {
            name: title.name.clone(),
            category: title.category.to_string(),
            link: title.url.to_string(),
            episodes: title
                .episodes
                .iter()
                .map(|episode| JsonEpisode {
                    name: episode.name.clone(),
                    link: episode.url.to_string(),
                    images: episode.images.urls(),
                })
                .collect(),
            images: title.images.urls(),
        }
    }
}

fn write_images(out: &mut String, prefix: &str, images: &[String]) -> FormatResult<()> {
    if images.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}images:", prefix)?;
    for image in images {
        writeln!(out, "{}{}{}", prefix, TITLE_SPACING, image)?;
    }
    Ok(())
}

fn format_txt(titles: &[Title]) -> FormatResult<String> {
    let mut out = String::new();
    writeln!(out, "total: {}", titles.len())?;
    writeln!(out, "titles:")?;
    for title in titles {
        writeln!(out, "{}{} [{}]: {}", TITLE_SPACING, title.name, title.category, title.url)?;
        write_images(&mut out, TITLE_SPACING, &title.images.urls())?;

        writeln!(out, "{}episodes:", TITLE_SPACING)?;
        for episode in &title.episodes {
            writeln!(out, "{}{}: {}", EPISODE_SPACING, episode.name, episode.url)?;
            write_images(&mut out, EPISODE_SPACING, &episode.images.urls())?;
        }
    }
    Ok(out)
}

fn format_json(titles: &[Title]) -> FormatResult<String> {
    let titles: Vec<JsonTitle> = titles.iter().map(JsonTitle::from).collect();
    Ok(serde_json::to_string_pretty(&titles)?)
}

fn format_yaml(titles: &[Title]) -> FormatResult<String> {
    let listing = YamlListing {
        total: titles.len(),
        titles: titles.iter().map(JsonTitle::from).collect(),
    };
    Ok(serde_yaml::to_string(&listing)?)
}

fn format_csv(titles: &[Title]) -> FormatResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for title in titles {
        let category = title.category.to_string();
        let link = title.url.to_string();
        if title.category.has_episodes() {
            for episode in &title.episodes {
                let episode_link = episode.url.to_string();
                for image in episode.images.urls() {
                    writer.write_record([
                        title.name.as_str(),
                        category.as_str(),
                        link.as_str(),
                        episode.name.as_str(),
                        episode_link.as_str(),
                        image.as_str(),
                    ])?;
                }
            }
        } else {
            for image in title.images.urls() {
                writer.write_record([title.name.as_str(), category.as_str(), link.as_str(), "", "", image.as_str()])?;
            }
        }
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Renders `titles` in the requested format.
pub(crate) fn format_titles(titles: &[Title], format: OutputFormat) -> FormatResult<String> {
    match format {
        OutputFormat::Txt => format_txt(titles),
        OutputFormat::Json => format_json(titles),
        OutputFormat::Yaml => format_yaml(titles),
        OutputFormat::Csv => format_csv(titles),
    }
}
