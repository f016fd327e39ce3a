use indicatif::{ProgressBar, ProgressStyle};
use trakt_stream::{ProgressCallback, ProgressInfo};

/// Terminal progress bar fed by a [`trakt_stream::ProgressTracker`].
pub struct BarCallback {
    bar: ProgressBar,
}

impl BarCallback {
    pub fn new() -> Self {
        let bar = ProgressBar::hidden();
        let style = ProgressStyle::with_template("{msg:12} [{bar:40}] {pos}/{len} ({eta})")
            .map(|style| style.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }
}

impl Default for BarCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCallback for BarCallback {
    fn on_start(&self, stage: &str, total: Option<usize>) {
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_message(stage.to_string());
        self.bar.set_length(total.unwrap_or(0) as u64);
        self.bar.set_position(0);
    }

    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_position(info.completed as u64);
    }

    fn on_complete(&self, info: &ProgressInfo) {
        self.bar.set_position(info.completed as u64);
        self.bar.finish_and_clear();
    }

    fn on_error(&self, _error: &str) {
        self.bar.abandon();
    }
}
