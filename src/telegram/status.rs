//! Renders pipeline events into the text of one editable status message.

use crate::core::utils::{format_media_caption, format_size_mb};
use crate::download::events::PipelineEvent;
use crate::download::ladder::QualityCandidate;

const PROGRESS_BAR_WIDTH: usize = 10;

/// Tracks what the status message currently says.
#[derive(Debug, Default)]
pub struct StatusView {
    title: Option<String>,
    candidate: Option<QualityCandidate>,
    last_text: Option<String>,
}

impl StatusView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an event and returns the new text when it differs from the current one.
    pub fn apply(&mut self, event: &PipelineEvent) -> Option<String> {
        let text = self.render(event)?;
        if self.last_text.as_deref() == Some(text.as_str()) {
            return None;
        }
        self.last_text = Some(text.clone());
        Some(text)
    }

    fn header(&self) -> String {
        match &self.title {
            Some(title) => format!("🎬 {}\n\n", title),
            None => String::new(),
        }
    }

    fn render(&mut self, event: &PipelineEvent) -> Option<String> {
        let body = match event {
            PipelineEvent::Probed(probe) => {
                if probe.title.is_some() {
                    self.title = Some(format_media_caption(probe.title.as_deref(), probe.duration_secs));
                }
                "🔎 Picking a quality…".to_string()
            }
            PipelineEvent::AttemptStarted { candidate, .. } => {
                self.candidate = Some(*candidate);
                format!("⏬ Downloading {}…", candidate)
            }
            PipelineEvent::Downloading {
                percent, total_bytes, ..
            } => {
                let quality = self.candidate.map(|c| c.to_string()).unwrap_or_default();
                let mut line = format!("⏬ {} {} {}%", quality, progress_bar(*percent), percent);
                if let Some(total) = total_bytes {
                    line.push_str(&format!(" of {}", format_size_mb(*total)));
                }
                line
            }
            PipelineEvent::AttemptFailed { candidate, reason, .. } => {
                format!("↘️ {} didn't work out ({}), trying a lower quality…", candidate, reason)
            }
            PipelineEvent::Uploading { attempt, size_bytes } => {
                if *attempt > 1 {
                    format!("📤 Uploading {} (try {})…", format_size_mb(*size_bytes), attempt)
                } else {
                    format!("📤 Uploading {}…", format_size_mb(*size_bytes))
                }
            }
            // the final reply replaces the status message
            PipelineEvent::Delivered { .. } => return None,
        };
        Some(format!("{}{}", self.header(), body))
    }
}

fn progress_bar(percent: u8) -> String {
    let filled = (percent.min(100) as usize * PROGRESS_BAR_WIDTH) / 100;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(PROGRESS_BAR_WIDTH - filled))
}
