//! Terminal progress bars fed by the download progress callback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use sarfetch_core::FileProgress;
use sarfetch_core::download::ProgressFn;

const BAR_TEMPLATE: &str =
    "{msg:30!} [{bar:30}] {bytes:>10}/{total_bytes:<10} {bytes_per_sec:>12} {eta:>4}";
const SPINNER_TEMPLATE: &str = "{spinner} {msg:30!} {bytes:>10} {bytes_per_sec:>12}";

/// One bar per file, keyed by URL.
pub(crate) struct ProgressDisplay {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressDisplay {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        })
    }

    /// Returns a callback that updates this display.
    pub(crate) fn callback(self: &Arc<Self>) -> ProgressFn {
        let display = Arc::clone(self);
        Arc::new(move |progress: &FileProgress| display.update(progress))
    }

    fn update(&self, progress: &FileProgress) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        let bar = bars
            .entry(progress.url.clone())
            .or_insert_with(|| self.add_bar(progress));
        bar.set_position(progress.downloaded);
        if progress.total == Some(progress.downloaded) {
            bar.finish();
        }
    }

    fn add_bar(&self, progress: &FileProgress) -> ProgressBar {
        let bar = match progress.total {
            Some(total) => ProgressBar::new(total).with_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .map(|style| style.progress_chars("=> "))
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            ),
            None => ProgressBar::new_spinner().with_style(
                ProgressStyle::with_template(SPINNER_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            ),
        };
        let bar = self.multi.add(bar);
        bar.set_message(progress.name.clone());
        bar
    }

    /// Stops every bar that has not completed.
    pub(crate) fn finish(&self) {
        let Ok(bars) = self.bars.lock() else {
            return;
        };
        for bar in bars.values().filter(|bar| !bar.is_finished()) {
            bar.abandon();
        }
    }
}
