//! Terminal progress bar fed by batch and run observers

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::downloader::{DownloadProgress, ProgressObserver};
use crate::materializer::{RunObserver, RunState};

/// indicatif bar showing settled segments of the current instance
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// Bar drawn to stderr
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    /// Bar that never draws
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden()))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .expect("hardcoded template is valid")
                .progress_chars("#>-"),
        );
        Self { bar }
    }

    /// Remove the bar from the terminal
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    /// Current position (settled segments)
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Current length (segments in the instance)
    pub fn length(&self) -> Option<u64> {
        self.bar.length()
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for BarProgress {
    fn on_progress(&self, progress: &DownloadProgress) {
        self.bar.set_length(progress.total);
        self.bar.set_position(progress.settled());
        if progress.failed > 0 {
            self.bar.set_message(format!("{} failed", progress.failed));
        }
    }
}

impl RunObserver for BarProgress {
    fn on_state(&self, state: &RunState) {
        if let RunState::Fetching { .. } = state {
            self.bar.reset();
        }
        self.bar.set_message(state.to_string());
    }
}
