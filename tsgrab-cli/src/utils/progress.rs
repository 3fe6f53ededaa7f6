use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tsgrab_engine::PipelineEvent;

use super::format_bytes;

fn segment_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} segments ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Segment progress bar fed by pipeline events.
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
    bytes: Arc<AtomicU64>,
    disabled: bool,
}

impl ProgressManager {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(segment_style());
        Self {
            bar,
            bytes: Arc::new(AtomicU64::new(0)),
            disabled: false,
        }
    }

    pub fn new_disabled() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            bytes: Arc::new(AtomicU64::new(0)),
            disabled: true,
        }
    }

    pub fn handle_event(&self, event: PipelineEvent) {
        if self.disabled {
            return;
        }

        match event {
            PipelineEvent::Started { total } => {
                self.bar.set_length(total as u64);
                self.bar.set_message("Downloading segments");
                self.bar.enable_steady_tick(Duration::from_millis(500));
            }
            PipelineEvent::SegmentSkipped { .. } => {
                self.bar.inc(1);
            }
            PipelineEvent::SegmentStored { bytes, .. } => {
                let total = self.bytes.fetch_add(bytes as u64, Ordering::Relaxed) + bytes as u64;
                self.bar
                    .set_message(format!("Downloading segments, {}", format_bytes(total)));
                self.bar.inc(1);
            }
            PipelineEvent::SegmentFailed { index, error } => {
                self.bar.println(format!("segment #{index} failed: {error}"));
                self.bar.inc(1);
            }
        }
    }

    pub fn finish(&self) {
        if !self.disabled {
            self.bar.finish_with_message(format!(
                "Finished, {}",
                format_bytes(self.bytes.load(Ordering::Relaxed))
            ));
        }
    }
}
