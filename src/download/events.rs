//! Progress events emitted while a request moves through the pipeline.

use crate::download::ladder::QualityCandidate;
use crate::download::source::ProbeResult;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Probe finished (possibly empty)
    Probed(ProbeResult),
    AttemptStarted {
        attempt: u32,
        candidate: QualityCandidate,
    },
    /// Throttled transfer progress of the current attempt
    Downloading {
        attempt: u32,
        percent: u8,
        downloaded_bytes: Option<u64>,
        total_bytes: Option<u64>,
        speed_bytes_sec: Option<f64>,
    },
    AttemptFailed {
        attempt: u32,
        candidate: QualityCandidate,
        reason: String,
    },
    Uploading {
        attempt: u32,
        size_bytes: u64,
    },
    Delivered {
        attempts_used: u32,
    },
}

/// Optional receiver of pipeline events. Sending never blocks or fails the pipeline.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Creates a sink together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            // receiver gone means nobody is watching anymore
            let _ = tx.send(event);
        }
    }
}
