//! On-disk layout of downloaded images.
//!
//! Movies land in `<root>/<title>/`, episodes in `<root>/<title>/<episode>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::fancaps::{Catalog, ItemKey};

/// Replaces characters that are unsafe in a path component.
pub(crate) fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '\\' | '/' | '?' | ':' | '*' | '<' | '>' | '"' | '|' | ' ' => '_',
            _ => c,
        })
        .collect()
}

/// File name an image URL is stored under.
pub(crate) fn image_file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Whether the parent of `dir` exists, so only the last component would be created.
pub(crate) fn parent_exists(dir: &Path) -> bool {
    match dir.parent() {
        Some(parent) if parent.as_os_str().is_empty() => true,
        Some(parent) => parent.is_dir(),
        None => true,
    }
}

/// Directory tree rooted at the output directory.
#[derive(Debug, Clone)]
pub(crate) struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the output root. Its parent has to exist already.
    pub(crate) fn ensure_root(&self) -> Result<()> {
        if !parent_exists(&self.root) {
            return Err(anyhow!(
                "Couldn't find the parent directories of {}",
                self.root.display()
            ));
        }
        if !self.root.is_dir() {
            fs::create_dir(&self.root)
                .with_context(|| format!("Failed to create output directory {}", self.root.display()))?;
            info!("Created output directory {}", self.root.display());
        }
        Ok(())
    }

    pub(crate) fn title_dir(&self, title: &str) -> PathBuf {
        self.root.join(sanitize(title))
    }

    pub(crate) fn episode_dir(&self, title: &str, episode: &str) -> PathBuf {
        self.title_dir(title).join(sanitize(episode))
    }

    /// Directory that receives the images of a catalog item.
    pub(crate) fn item_dir(&self, catalog: &Catalog, key: ItemKey) -> Option<PathBuf> {
        let title = catalog.title(key.title)?;
        match key.episode {
            Some(index) => {
                let episode = title.episodes.get(index)?;
                Some(self.episode_dir(&title.name, &episode.name))
            }
            None => Some(self.title_dir(&title.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::fancaps::{Category, Episode, Title, TitleId};

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("file:with*invalid<chars>\"test|.jpg"), "file_with_invalid_chars__test_.jpg");
        assert_eq!(sanitize(" Fate/Zero Season 2 "), "Fate_Zero_Season_2");
        assert_eq!(sanitize("a\\b?"), "a_b_");
    }

    #[test]
    fn test_image_file_name() {
        assert_eq!(image_file_name("https://cdn/x/123.jpg"), Some("123.jpg"));
        assert_eq!(image_file_name("https://cdn/x/123.jpg?v=1"), Some("123.jpg"));
        assert_eq!(image_file_name("https://cdn/x/"), None);
    }

    #[test]
    fn test_ensure_root_requires_parent() {
        let temp = tempfile::tempdir().unwrap();

        let layout = OutputLayout::new(temp.path().join("out"));
        layout.ensure_root().unwrap();
        assert!(layout.root().is_dir());
        layout.ensure_root().unwrap();

        let nested = OutputLayout::new(temp.path().join("missing").join("out"));
        assert!(nested.ensure_root().is_err());
    }

    #[test]
    fn test_item_dirs() {
        let mut title = Title::new(
            "Show: Part 1",
            Url::parse("https://fancaps.net/tv/showimages.php?1").unwrap(),
            Category::Tv,
        );
        title.episodes.push(Episode::new(
            "Episode 1",
            Url::parse("https://fancaps.net/tv/episodeimages.php?1").unwrap(),
            TitleId(0),
        ));
        let catalog = Catalog::new(vec![title]);
        let layout = OutputLayout::new("/out");

        assert_eq!(
            layout.item_dir(&catalog, ItemKey::episode(TitleId(0), 0)),
            Some(PathBuf::from("/out/Show__Part_1/Episode_1"))
        );
        assert_eq!(
            layout.item_dir(&catalog, ItemKey::title(TitleId(0))),
            Some(PathBuf::from("/out/Show__Part_1"))
        );
        assert_eq!(layout.item_dir(&catalog, ItemKey::title(TitleId(4))), None);
    }
}
