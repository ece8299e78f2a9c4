//! Live download progress, one line per title and episode plus a run total.
//!
//! Every frame is drawn in full: the cursor moves up over the previous frame
//! and each line is overwritten in place. Finished items keep their slot as a
//! blank line so the frame height never shrinks.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use tracing::warn;

use crate::fancaps::types::{ImageContainer, ImageStats};
use crate::fancaps::Catalog;

const BAR_WIDTH: usize = 40;
const FALLBACK_WIDTH: usize = 80;
const TITLE_INDENT: usize = 1;
const EPISODE_INDENT: usize = 3;

/// Truncates display names that do not fit their column.
pub(crate) trait Shorten {
    fn shorten(&self, max: usize, delimiter: &str) -> String;
}

impl Shorten for str {
    fn shorten(&self, max: usize, delimiter: &str) -> String {
        if self.chars().count() <= max {
            return self.to_string();
        }
        let keep = max.saturating_sub(delimiter.chars().count());
        let mut short: String = self.chars().take(keep).collect();
        short.push_str(delimiter);
        short.chars().take(max).collect()
    }
}

/// Whole-second duration such as `45s`, `3m5s` or `1h2m3s`.
pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn digits(n: u32) -> usize {
    n.max(1).ilog10() as usize + 1
}

fn elapsed(start: Option<Instant>, now: Instant) -> Duration {
    start.map_or(Duration::ZERO, |start| now.saturating_duration_since(start))
}

/// Estimate for a set with `stats`, falling back to the run rate before its
/// first download.
fn eta(
    stats: ImageStats,
    started: Option<Instant>,
    run: ImageStats,
    run_started: Option<Instant>,
    now: Instant,
) -> String {
    if stats.downloaded == 0 {
        if run.downloaded == 0 || run_started.is_none() {
            return "(0s/--)".to_string();
        }
        let per_image = elapsed(run_started, now).div_f64(f64::from(run.downloaded));
        let remaining = per_image.mul_f64(f64::from(stats.remaining()));
        return format!("(0s/{})", format_duration(remaining));
    }

    let spent = elapsed(started, now);
    let remaining = spent.div_f64(f64::from(stats.downloaded)).mul_f64(f64::from(stats.remaining()));
    format!("({}/{})", format_duration(spent), format_duration(remaining))
}

fn bar(stats: ImageStats) -> String {
    let filled = ((stats.fraction() * BAR_WIDTH as f64) as usize).min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

/// One rendered line before styling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FrameLine {
    pub(crate) text: String,
    pub(crate) complete: bool,
}

struct FrameContext {
    width: usize,
    ratio_width: usize,
    run: ImageStats,
    run_started: Option<Instant>,
    now: Instant,
}

impl FrameContext {
    fn line(&self, name: &str, indent: usize, stats: ImageStats, started: Option<Instant>) -> FrameLine {
        let right = format!(
            "ETA {} {:>ratio$} {} {:>4}",
            eta(stats, started, self.run, self.run_started, self.now),
            format!("({}/{})", stats.processed(), stats.total),
            bar(stats),
            format!("{}%", (stats.fraction() * 100.0).floor() as u32),
            ratio = self.ratio_width,
        );

        let name_width = self.width.saturating_sub(right.chars().count() + 1);
        let left = format!("{}{}", " ".repeat(indent), name);
        let left = left.shorten(name_width, "...");
        let padding = name_width.saturating_sub(left.chars().count());

        FrameLine {
            text: format!("{}{} {}", left, " ".repeat(padding), right),
            complete: stats.is_complete(),
        }
    }

    fn blank(&self) -> FrameLine {
        FrameLine {
            text: " ".repeat(self.width),
            complete: true,
        }
    }

    fn item<C: ImageContainer>(&self, item: &C, indent: usize) -> FrameLine {
        if item.images().is_done() {
            self.blank()
        } else {
            self.line(item.display_name(), indent, item.images().stats(), item.started_at())
        }
    }
}

/// Lays out one frame of the display for a terminal `width` columns wide.
pub(crate) fn render_frame(catalog: &Catalog, width: usize, now: Instant) -> Vec<FrameLine> {
    let counters = catalog.counters();
    let run = counters.stats();
    let context = FrameContext {
        width,
        ratio_width: 2 * digits(run.total) + 3,
        run,
        run_started: counters.started_at(),
        now,
    };

    let mut lines = Vec::new();
    for title in catalog.titles() {
        lines.push(context.item(title, TITLE_INDENT));
        for episode in &title.episodes {
            lines.push(context.item(episode, EPISODE_INDENT));
        }
    }

    lines.push(FrameLine {
        text: " ".repeat(width),
        complete: true,
    });
    let line = context.line("Total:", 0, run, context.run_started);
    lines.push(line);
    lines
}

/// Tracks how many lines the last frame took so the next one can overwrite it.
#[derive(Debug, Default)]
struct Redraw {
    printed: usize,
}

impl Redraw {
    /// Text that moves the cursor back over the previous frame and draws `lines`.
    fn next(&mut self, lines: &[FrameLine]) -> String {
        let mut frame = String::new();
        if self.printed > 0 {
            let _ = write!(frame, "\x1b[{}A", self.printed);
        }
        for line in lines {
            let styled = if line.complete {
                style(&line.text).green()
            } else {
                style(&line.text).cyan()
            };
            let _ = writeln!(frame, "{}", styled);
        }
        self.printed = lines.len();
        frame
    }
}

/// Redraws the progress frame in place on the terminal.
pub(crate) struct ProgressReporter {
    term: Option<Term>,
    redraw: Mutex<Redraw>,
}

impl ProgressReporter {
    pub(crate) fn stdout() -> Self {
        Self {
            term: Some(Term::stdout()),
            redraw: Mutex::default(),
        }
    }

    /// A reporter that draws nothing.
    pub(crate) fn hidden() -> Self {
        Self {
            term: None,
            redraw: Mutex::default(),
        }
    }

    pub(crate) fn render(&self, catalog: &Catalog) {
        let Some(term) = &self.term else {
            return;
        };

        let width = term
            .size_checked()
            .map_or(FALLBACK_WIDTH, |(_, columns)| usize::from(columns));

        // Held for the whole frame so concurrent redraws never interleave.
        let mut redraw = self.redraw.lock();
        let lines = render_frame(catalog, width, Instant::now());
        if let Err(err) = term.write_str(&redraw.next(&lines)) {
            warn!("Failed to draw progress: {}", err);
        }
    }
}

/// Spinner shown while pages are being discovered.
pub(crate) fn spinner(message: &str) -> ProgressBar {
    let progress = ProgressBar::new_spinner();
    match ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]") {
        Ok(progress_style) => progress.set_style(progress_style),
        Err(err) => warn!("Spinner template error: {}. Using default spinner.", err),
    }
    progress.set_message(message.to_string());
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::fancaps::{Category, Episode, ImageOutcome, ItemKey, Title, TitleId};

    fn movie_catalog(name: &str, images: usize) -> Catalog {
        let url = Url::parse("https://fancaps.net/movies/MovieImages.php?name=x").unwrap();
        let catalog = Catalog::new(vec![Title::new(name, url, Category::Movie)]);
        for i in 0..images {
            catalog.add_image(ItemKey::title(TitleId(0)), format!("https://cdn/{}.jpg", i));
        }
        catalog.freeze();
        catalog
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(185)), "3m5s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h2m3s");
        assert_eq!(format_duration(Duration::from_millis(999)), "0s");
    }

    #[test]
    fn test_shorten() {
        assert_eq!("short".shorten(10, "..."), "short");
        assert_eq!("a long title name".shorten(10, "..."), "a long ...");
        assert_eq!("abcdef".shorten(2, "..."), "..");
    }

    #[test]
    fn test_frame_layout() {
        let catalog = movie_catalog("Up", 4);
        let key = ItemKey::title(TitleId(0));
        catalog.record(key, ImageOutcome::Downloaded);
        catalog.record(key, ImageOutcome::Skipped);

        let lines = render_frame(&catalog, 100, Instant::now());
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|line| line.text.chars().count() == 100));

        let item = &lines[0].text;
        assert!(item.starts_with(" Up "));
        assert!(item.contains("(2/4)"));
        assert!(item.contains(&format!("[{}{}]", "#".repeat(20), "-".repeat(20))));
        assert!(item.ends_with(" 50%"));
        assert!(!lines[0].complete);

        assert!(lines[1].text.trim().is_empty());
        assert!(lines[2].text.starts_with("Total:"));
        assert!(lines[2].text.contains("(2/4)"));
    }

    #[test]
    fn test_done_items_keep_a_blank_slot() {
        let mut title = Title::new(
            "Show",
            Url::parse("https://fancaps.net/tv/showimages.php?1").unwrap(),
            Category::Tv,
        );
        for i in 0..2 {
            let url = Url::parse(&format!("https://fancaps.net/tv/episodeimages.php?{}", i)).unwrap();
            title.episodes.push(Episode::new(format!("Episode {}", i + 1), url, TitleId(0)));
        }
        let catalog = Catalog::new(vec![title]);
        let first = ItemKey::episode(TitleId(0), 0);
        let second = ItemKey::episode(TitleId(0), 1);
        catalog.add_image(first, "https://cdn/1.jpg");
        catalog.add_image(second, "https://cdn/2.jpg");
        catalog.freeze();
        catalog.record(first, ImageOutcome::Downloaded);

        let lines = render_frame(&catalog, 90, Instant::now());
        assert_eq!(lines.len(), 5);
        assert!(lines[0].text.starts_with(" Show"));
        assert!(lines[1].text.trim().is_empty());
        assert!(lines[2].text.starts_with("   Episode 2"));
        assert!(lines[2].text.contains("(0/1)"));
        assert!(lines[4].text.contains("(1/2)"));
    }

    #[test]
    fn test_long_names_are_shortened_to_fit() {
        let catalog = movie_catalog(&"x".repeat(200), 10);
        let lines = render_frame(&catalog, 80, Instant::now());
        assert_eq!(lines[0].text.chars().count(), 80);
        assert!(lines[0].text.contains("..."));
        // Ratio column is padded to twice the digits of the run total plus three.
        assert!(lines[0].text.contains(" (0/10) "));
        assert!(lines[0].text.contains("  (0/10)"));
    }

    #[test]
    fn test_eta_uses_run_rate_before_first_download() {
        let now = Instant::now();
        let start = now - Duration::from_secs(10);
        let run = ImageStats { downloaded: 5, skipped: 0, failed: 0, total: 20 };
        let idle = ImageStats { total: 4, ..Default::default() };
        assert_eq!(eta(idle, None, run, Some(start), now), "(0s/8s)");

        let busy = ImageStats { downloaded: 2, skipped: 0, failed: 0, total: 6 };
        assert_eq!(eta(busy, Some(start), run, Some(start), now), "(10s/20s)");
        assert_eq!(eta(idle, None, ImageStats::default(), None, now), "(0s/--)");
    }

    #[test]
    fn test_hidden_reporter_draws_nothing() {
        let reporter = ProgressReporter::hidden();
        assert!(reporter.term.is_none());
        reporter.render(&movie_catalog("Up", 1));
        assert_eq!(reporter.redraw.lock().printed, 0);
    }

    #[test]
    fn test_redraw_moves_up_over_previous_frame() {
        console::set_colors_enabled(false);
        let catalog = movie_catalog("Up", 2);
        let mut redraw = Redraw::default();

        let first = redraw.next(&render_frame(&catalog, 60, Instant::now()));
        assert!(!first.contains('\x1b'));
        assert_eq!(first.lines().count(), 3);
        assert_eq!(redraw.printed, 3);

        catalog.record(ItemKey::title(TitleId(0)), ImageOutcome::Downloaded);
        let second = redraw.next(&render_frame(&catalog, 60, Instant::now()));
        assert!(second.starts_with("\x1b[3A"));
        assert!(second.contains("(1/2)"));
        assert_eq!(redraw.printed, 3);

        let empty = redraw.next(&[]);
        assert_eq!(empty, "\x1b[3A");
        assert_eq!(redraw.printed, 0);
        assert_eq!(redraw.next(&[]), "");
    }
}
