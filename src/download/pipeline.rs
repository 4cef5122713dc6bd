//! Unified media pipeline orchestrator.
//!
//! Source-agnostic: works with any `MediaSource` and any `Destination`.
//! The pipeline handles:
//!   probe (best-effort) → build ladder → fallback over the ladder → deliver → report
//!
//! One call of [`MediaPipeline::run`] serves one request. Nothing in here reads
//! process-wide configuration; [`PipelineConfig::from_env`] snapshots it once.

use crate::core::config;
use crate::core::metrics;
use crate::core::retry::RetryConfig;
use crate::core::utils::{format_media_caption, format_size_mb};
use crate::download::delivery::{DeliveryMetadata, DeliveryOutcome, DeliveryUploader, Destination};
use crate::download::error::{AttemptFailure, DeliveryFailure};
use crate::download::events::{EventSink, PipelineEvent};
use crate::download::executor::RetrievalExecutor;
use crate::download::fallback::{FallbackController, FallbackError};
use crate::download::janitor::Janitor;
use crate::download::ladder::{build_ladder, LadderDefaults, QualityCandidate};
use crate::download::prober::probe_metadata;
use crate::download::request::MediaRequest;
use crate::download::source::MediaSource;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const MIN_STALE_SCRATCH_AGE: Duration = Duration::from_secs(60 * 60);
const STALE_SCRATCH_MARGIN: Duration = Duration::from_secs(10 * 60);

/// Everything the pipeline needs to know, passed in explicitly.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub scratch_dir: PathBuf,
    pub probe_timeout: Duration,
    pub attempt_timeout: Duration,
    /// Wall-clock budget for probe + every attempt + every upload
    pub request_budget: Duration,
    pub ladder_defaults: LadderDefaults,
    pub delivery_retry: RetryConfig,
    pub upload_timeout: Duration,
}

impl PipelineConfig {
    /// Built-in defaults with the given scratch directory.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            probe_timeout: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(240),
            request_budget: Duration::from_secs(900),
            ladder_defaults: LadderDefaults::default(),
            delivery_retry: RetryConfig::new().max_attempts(3),
            upload_timeout: Duration::from_secs(300),
        }
    }

    /// Snapshot of the environment-driven settings in `core::config`.
    pub fn from_env() -> Self {
        let scratch_dir = shellexpand::tilde(config::TEMP_FILES_DIR.as_str()).into_owned();
        Self {
            scratch_dir: PathBuf::from(scratch_dir),
            probe_timeout: config::download::probe_timeout(),
            attempt_timeout: config::download::attempt_timeout(),
            request_budget: config::download::request_budget(),
            ladder_defaults: LadderDefaults {
                video_tier: *config::download::DEFAULT_VIDEO_TIER,
                ..LadderDefaults::default()
            },
            delivery_retry: RetryConfig::delivery(),
            upload_timeout: config::delivery::upload_timeout(),
        }
    }

    /// Age after which a scratch file cannot belong to a running request anymore.
    ///
    /// Every file of a request is younger than its budget, so sweeping only past
    /// the budget (never under an hour) leaves in-flight artifacts alone.
    pub fn stale_scratch_age(&self) -> Duration {
        self.request_budget.max(MIN_STALE_SCRATCH_AGE) + STALE_SCRATCH_MARGIN
    }
}

/// What the caller gets back after a successful delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub request_id: Uuid,
    pub title: Option<String>,
    pub duration_secs: Option<u64>,
    pub candidate: QualityCandidate,
    pub size_bytes: u64,
    pub retrieval_attempts: u32,
    pub delivery_attempts: u32,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn caption(&self) -> String {
        format_media_caption(self.title.as_deref(), self.duration_secs)
    }

    /// One-line summary for the chat: caption, delivered quality and size.
    pub fn summary(&self) -> String {
        let mut text = format!(
            "✅ {} · {} · {}",
            self.caption(),
            self.candidate,
            format_size_mb(self.size_bytes)
        );
        if self.retrieval_attempts > 1 {
            text.push_str(&format!(" (fell back {} time(s))", self.retrieval_attempts - 1));
        }
        text
    }
}

/// Errors that reach the caller. Everything else is handled inside the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Every candidate on the ladder failed
    #[error("no quality level could be retrieved after {attempts} attempt(s): {last}")]
    LadderExhausted { last: AttemptFailure, attempts: u32 },

    #[error("delivery failed after {attempts_used} attempt(s): {failure}")]
    Delivery {
        failure: DeliveryFailure,
        attempts_used: u32,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("request exceeded its {}s budget", .0.as_secs())]
    BudgetExceeded(Duration),
}

impl PipelineError {
    /// Label for metrics.
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::LadderExhausted { .. } => "ladder_exhausted",
            PipelineError::Delivery {
                failure: DeliveryFailure::ConfigurationMismatch { .. },
                ..
            } => "configuration_mismatch",
            PipelineError::Delivery { .. } => "delivery_failed",
            PipelineError::Cancelled => "cancelled",
            PipelineError::BudgetExceeded(_) => "budget_exceeded",
        }
    }

    /// Actionable message for the user.
    ///
    /// Separates "the source had nothing small enough" from "the channel
    /// rejected the upload", and "try again later" from "pick something smaller".
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::LadderExhausted {
                last: AttemptFailure::QuotaExceeded { ceiling, .. },
                ..
            } => format!(
                "❌ Even the lowest quality of this media is larger than {}.\n\nTry a shorter clip.",
                format_size_mb(*ceiling)
            ),
            PipelineError::LadderExhausted {
                last: AttemptFailure::SourceUnavailable(reason),
                ..
            } => format!(
                "❌ This media can't be downloaded: {}.\n\nIt may be private, removed or blocked in this region.",
                reason
            ),
            PipelineError::LadderExhausted {
                last: AttemptFailure::Transient(reason),
                ..
            } => format!("❌ The source is not responding ({}).\n\nTry again in a minute.", reason),
            PipelineError::Delivery {
                failure: DeliveryFailure::ConfigurationMismatch { size, .. },
                ..
            } => format!(
                "❌ The file was downloaded ({}) but Telegram rejected it as too large.\n\nTry a lower quality or a shorter clip.",
                format_size_mb(*size)
            ),
            PipelineError::Delivery {
                failure: DeliveryFailure::Permanent(reason),
                ..
            } => format!("❌ Telegram rejected the upload: {}.", reason),
            PipelineError::Delivery {
                failure: DeliveryFailure::RetriesExhausted(_),
                attempts_used,
            } => format!(
                "❌ Uploading to Telegram failed {} time(s).\n\nTry again later.",
                attempts_used
            ),
            PipelineError::Delivery {
                failure: DeliveryFailure::Cancelled,
                ..
            }
            | PipelineError::Cancelled => "⏹ Download cancelled.".to_string(),
            PipelineError::BudgetExceeded(_) => {
                "⏱ This took too long and was stopped.\n\nTry again later or ask for a lower quality.".to_string()
            }
        }
    }

    /// True when retrying the same request later is the right advice.
    pub fn is_temporary(&self) -> bool {
        match self {
            PipelineError::LadderExhausted {
                last: AttemptFailure::Transient(_),
                ..
            } => true,
            PipelineError::Delivery { failure, .. } => failure.is_temporary(),
            PipelineError::BudgetExceeded(_) => true,
            _ => false,
        }
    }
}

impl From<FallbackError> for PipelineError {
    fn from(err: FallbackError) -> Self {
        match err {
            FallbackError::Exhausted { last, history } => PipelineError::LadderExhausted {
                last,
                attempts: history.len() as u32,
            },
            FallbackError::Cancelled { .. } => PipelineError::Cancelled,
        }
    }
}

/// One parameterized pipeline for every source type.
pub struct MediaPipeline {
    config: PipelineConfig,
    executor: RetrievalExecutor,
    uploader: DeliveryUploader,
}

impl MediaPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let janitor = Janitor::new(config.scratch_dir.clone());
        let executor = RetrievalExecutor::new(janitor, config.attempt_timeout);
        let uploader = DeliveryUploader::new(config.delivery_retry.clone(), config.upload_timeout);
        Self {
            config,
            executor,
            uploader,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn janitor(&self) -> &Janitor {
        self.executor.janitor()
    }

    /// Runs one request end to end within the configured budget.
    ///
    /// Exceeding the budget drops the in-flight stage, which kills child
    /// processes and releases scratch files on the way out.
    pub async fn run(
        &self,
        source: &dyn MediaSource,
        destination: &dyn Destination,
        request: &MediaRequest,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        let id = request.short_id();
        log::info!(
            "[{}] {} request for {} via {} (tier {:?}, ceiling {})",
            id,
            request.kind(),
            request.url(),
            source.name(),
            request.requested_tier(),
            format_size_mb(request.ceiling_bytes())
        );

        let budget = self.config.request_budget;
        let result = match tokio::time::timeout(budget, self.run_stages(source, destination, request, cancel, events))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                log::warn!("[{}] request budget of {}s exceeded", id, budget.as_secs());
                Err(PipelineError::BudgetExceeded(budget))
            }
        };

        let elapsed = started.elapsed();
        match &result {
            Ok(report) => {
                metrics::record_pipeline("delivered", elapsed.as_secs_f64());
                log::info!("[{}] delivered in {:.1}s: {}", id, elapsed.as_secs_f64(), report.summary());
            }
            Err(e) => {
                metrics::record_pipeline(e.category(), elapsed.as_secs_f64());
                metrics::record_error(e.category(), "pipeline");
                log::warn!("[{}] failed after {:.1}s: {}", id, elapsed.as_secs_f64(), e);
            }
        }

        result.map(|report| PipelineReport { elapsed, ..report })
    }

    async fn run_stages(
        &self,
        source: &dyn MediaSource,
        destination: &dyn Destination,
        request: &MediaRequest,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> Result<PipelineReport, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // ── Step 1: Probe ──
        let probe = probe_metadata(source, request.url(), self.config.probe_timeout).await;
        events.emit(PipelineEvent::Probed(probe.clone()));

        // ── Step 2: Ladder ──
        let ladder = build_ladder(request, &probe, &self.config.ladder_defaults);

        // ── Step 3: Fallback over the ladder ──
        let retrieved = FallbackController::new(&self.executor)
            .run(source, request, &ladder, cancel, events)
            .await?;

        metrics::record_artifact_size(retrieved.artifact.size_bytes());
        let candidate = retrieved.candidate;
        let size_bytes = retrieved.artifact.size_bytes();
        let retrieval_attempts = retrieved.attempts();

        // ── Step 4: Deliver ──
        let metadata = DeliveryMetadata {
            kind: request.kind(),
            title: probe.title.clone(),
            duration_secs: probe.duration_secs,
            caption: format_media_caption(probe.title.as_deref(), probe.duration_secs),
        };
        let outcome = self
            .uploader
            .deliver(destination, retrieved.artifact, &metadata, cancel, events)
            .await;

        match outcome {
            DeliveryOutcome::Delivered { attempts_used } => Ok(PipelineReport {
                request_id: request.id(),
                title: probe.title,
                duration_secs: probe.duration_secs,
                candidate,
                size_bytes,
                retrieval_attempts,
                delivery_attempts: attempts_used,
                elapsed: Duration::ZERO,
            }),
            DeliveryOutcome::Failed {
                failure: DeliveryFailure::Cancelled,
                ..
            } => Err(PipelineError::Cancelled),
            DeliveryOutcome::Failed {
                failure,
                attempts_used,
            } => Err(PipelineError::Delivery {
                failure,
                attempts_used,
            }),
        }
    }
}
