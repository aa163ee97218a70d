//! Progress UI for download runs.
//!
//! Two granularities: an overall bar counting galleries and a per-gallery
//! bar counting assets. Both are suppressed when quiet, and the overall
//! bar is hidden for single-gallery runs where it carries no information.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Progress reporter for one run.
#[derive(Debug, Clone)]
pub struct Progress {
    multi: MultiProgress,
    quiet: bool,
}

impl Progress {
    /// Creates a reporter; `quiet` suppresses all bars.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            quiet,
        }
    }

    /// The overall galleries bar. Hidden for quiet runs and for runs of a
    /// single gallery.
    #[must_use]
    pub fn overall(&self, total: usize) -> ProgressBar {
        if self.quiet || total <= 1 {
            return ProgressBar::hidden();
        }
        let bar = self.multi.add(ProgressBar::new(total as u64));
        bar.set_style(bar_style());
        bar.set_message("Overall");
        bar
    }

    /// A per-gallery assets bar labeled with the gallery title.
    #[must_use]
    pub fn gallery(&self, title: &str, total: usize) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }
        let bar = self.multi.add(ProgressBar::new(total as u64));
        bar.set_style(bar_style());
        bar.set_message(title.to_string());
        bar
    }

    /// Prints a line above the bars (falls back to stderr when hidden).
    pub fn println(&self, message: &str) {
        if self.quiet {
            return;
        }
        let _ = self.multi.println(message);
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}
