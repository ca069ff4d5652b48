//! indicatif-backed progress reporting for downloads and long commands.

use crate::traits::ProgressSink;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// One progress bar per in-flight download under a shared `MultiProgress`.
pub struct DownloadProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl DownloadProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for DownloadProgress {
    fn start(&self, name: &str, total: Option<u64>) {
        let pb = self.multi.add(ProgressBar::new(total.unwrap_or(0)));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━━╸"),
        );
        pb.set_message(format!("Downloading {}", name));
        self.bars.lock().unwrap().insert(name.to_string(), pb);
    }

    fn advance(&self, name: &str, bytes: u64) {
        if let Some(pb) = self.bars.lock().unwrap().get(name) {
            pb.inc(bytes);
        }
    }

    fn finish(&self, name: &str) {
        if let Some(pb) = self.bars.lock().unwrap().remove(name) {
            pb.finish_and_clear();
        }
    }
}

/// Steadily ticking spinner for operations without a known length.
pub fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
