//! Retrieval executor: exactly one download attempt for one ladder candidate.

use crate::core::metrics;
use crate::download::error::AttemptFailure;
use crate::download::janitor::{DownloadArtifact, Janitor};
use crate::download::ladder::QualityCandidate;
use crate::download::request::MediaRequest;
use crate::download::source::{FetchRequest, MediaSource, SourceProgress};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Result of one retrieval attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(DownloadArtifact),
    QuotaExceeded { ceiling: u64, actual: Option<u64> },
    SourceUnavailable(String),
    TransientError(String),
}

impl AttemptOutcome {
    /// Metric label for the outcome.
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success(_) => "success",
            AttemptOutcome::QuotaExceeded { .. } => "quota_exceeded",
            AttemptOutcome::SourceUnavailable(_) => "source_unavailable",
            AttemptOutcome::TransientError(_) => "transient",
        }
    }

    /// Splits into the artifact or the failure classification.
    pub fn into_result(self) -> Result<DownloadArtifact, AttemptFailure> {
        match self {
            AttemptOutcome::Success(artifact) => Ok(artifact),
            AttemptOutcome::QuotaExceeded { ceiling, actual } => Err(AttemptFailure::QuotaExceeded { ceiling, actual }),
            AttemptOutcome::SourceUnavailable(reason) => Err(AttemptFailure::SourceUnavailable(reason)),
            AttemptOutcome::TransientError(reason) => Err(AttemptFailure::Transient(reason)),
        }
    }
}

impl From<AttemptFailure> for AttemptOutcome {
    fn from(failure: AttemptFailure) -> Self {
        match failure {
            AttemptFailure::QuotaExceeded { ceiling, actual } => AttemptOutcome::QuotaExceeded { ceiling, actual },
            AttemptFailure::SourceUnavailable(reason) => AttemptOutcome::SourceUnavailable(reason),
            AttemptFailure::Transient(reason) => AttemptOutcome::TransientError(reason),
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success(artifact) => write!(f, "success ({} B)", artifact.size_bytes()),
            AttemptOutcome::QuotaExceeded {
                ceiling,
                actual: Some(actual),
            } => write!(f, "quota exceeded ({} B > {} B)", actual, ceiling),
            AttemptOutcome::QuotaExceeded { ceiling, actual: None } => write!(f, "quota exceeded (> {} B)", ceiling),
            AttemptOutcome::SourceUnavailable(reason) => write!(f, "source unavailable: {}", reason),
            AttemptOutcome::TransientError(reason) => write!(f, "transient error: {}", reason),
        }
    }
}

/// Runs single fetch attempts into scratch files it owns.
#[derive(Debug, Clone)]
pub struct RetrievalExecutor {
    janitor: Janitor,
    attempt_timeout: Duration,
}

impl RetrievalExecutor {
    pub fn new(janitor: Janitor, attempt_timeout: Duration) -> Self {
        Self {
            janitor,
            attempt_timeout,
        }
    }

    pub fn janitor(&self) -> &Janitor {
        &self.janitor
    }

    /// Downloads `candidate` once.
    ///
    /// The scratch guard is held across the whole attempt. Only a file that
    /// exists, is non-empty and fits the ceiling leaves this function, inside
    /// the returned artifact; every other path drops the guard and removes it.
    pub async fn execute(
        &self,
        source: &dyn MediaSource,
        request: &MediaRequest,
        candidate: QualityCandidate,
        attempt: u32,
        progress_tx: mpsc::UnboundedSender<SourceProgress>,
    ) -> AttemptOutcome {
        let outcome = self.run_attempt(source, request, candidate, attempt, progress_tx).await;
        metrics::record_attempt(&candidate.label(), outcome.label());
        outcome
    }

    async fn run_attempt(
        &self,
        source: &dyn MediaSource,
        request: &MediaRequest,
        candidate: QualityCandidate,
        attempt: u32,
        progress_tx: mpsc::UnboundedSender<SourceProgress>,
    ) -> AttemptOutcome {
        let id = request.short_id();
        let ceiling = request.ceiling_bytes();

        let scratch = match self.janitor.allocate(request, attempt) {
            Ok(scratch) => scratch,
            Err(e) => {
                log::error!("[{}] failed to allocate scratch file: {}", id, e);
                return AttemptOutcome::TransientError(format!("scratch allocation failed: {}", e));
            }
        };

        let fetch_request = FetchRequest {
            url: request.url().clone(),
            candidate,
            ceiling_bytes: ceiling,
            output_path: scratch.path().to_path_buf(),
        };

        log::info!(
            "[{}] attempt {} via {}: {} (ceiling {} B)",
            id,
            attempt,
            source.name(),
            candidate,
            ceiling
        );

        let fetched = match tokio::time::timeout(self.attempt_timeout, source.fetch(&fetch_request, progress_tx)).await {
            Ok(Ok(path)) => path,
            Ok(Err(failure)) => return failure.into(),
            Err(_) => {
                return AttemptOutcome::TransientError(format!(
                    "attempt timed out after {}s",
                    self.attempt_timeout.as_secs()
                ))
            }
        };

        // Trust the disk, not the source: the reported path may carry another extension
        let path = if fetched.is_file() && scratch.owns(&fetched) {
            fetched
        } else {
            match scratch.locate_output() {
                Some(path) => path,
                None => {
                    log::warn!("[{}] {} reported success but produced no file", id, source.name());
                    return AttemptOutcome::SourceUnavailable("no output file was produced".to_string());
                }
            }
        };

        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) => return AttemptOutcome::TransientError(format!("cannot stat {}: {}", path.display(), e)),
        };

        if size == 0 {
            return AttemptOutcome::TransientError("downloaded file is empty".to_string());
        }

        if size > ceiling {
            log::info!("[{}] {} produced {} B, over the {} B ceiling", id, candidate, size, ceiling);
            return AttemptOutcome::QuotaExceeded {
                ceiling,
                actual: Some(size),
            };
        }

        AttemptOutcome::Success(scratch.into_artifact(path, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AppError;
    use crate::download::ladder::Tier;
    use crate::download::request::MediaKind;
    use crate::download::source::ProbeResult;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use url::Url;

    /// Writes `bytes` bytes (under another extension when `ext` is set), or fails.
    struct FixedSource {
        bytes: usize,
        ext: Option<&'static str>,
        failure: Option<AttemptFailure>,
        hang: bool,
    }

    #[async_trait]
    impl MediaSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        fn supports_url(&self, _url: &Url) -> bool {
            true
        }

        async fn probe(&self, _url: &Url) -> Result<ProbeResult, AppError> {
            Ok(ProbeResult::default())
        }

        async fn fetch(
            &self,
            request: &FetchRequest,
            _progress_tx: mpsc::UnboundedSender<SourceProgress>,
        ) -> Result<PathBuf, AttemptFailure> {
            let path = match self.ext {
                Some(ext) => request.output_path.with_extension(ext),
                None => request.output_path.clone(),
            };
            std::fs::write(&path, vec![0u8; self.bytes]).unwrap();
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            match &self.failure {
                Some(f) => Err(f.clone()),
                None => Ok(request.output_path.clone()),
            }
        }
    }

    fn source(bytes: usize) -> FixedSource {
        FixedSource {
            bytes,
            ext: None,
            failure: None,
            hang: false,
        }
    }

    fn request(ceiling: u64) -> MediaRequest {
        MediaRequest::new(
            Url::parse("https://www.instagram.com/reel/abc/").unwrap(),
            MediaKind::Video,
            Some(480),
            ceiling,
        )
    }

    fn candidate() -> QualityCandidate {
        QualityCandidate::new(MediaKind::Video, Tier::Level(480))
    }

    #[tokio::test]
    async fn test_success_transfers_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let executor = RetrievalExecutor::new(Janitor::new(dir.path()), Duration::from_secs(5));
        let req = request(100);
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = executor.execute(&source(40), &req, candidate(), 1, tx).await;
        let artifact = outcome.into_result().unwrap();
        assert_eq!(artifact.size_bytes(), 40);
        assert!(artifact.path().exists());

        drop(artifact);
        assert!(executor.janitor().leftovers(&req).is_empty());
    }

    #[tokio::test]
    async fn test_oversized_file_is_quota_exceeded_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let executor = RetrievalExecutor::new(Janitor::new(dir.path()), Duration::from_secs(5));
        let req = request(100);
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = executor.execute(&source(101), &req, candidate(), 1, tx).await;
        assert!(matches!(
            outcome,
            AttemptOutcome::QuotaExceeded {
                ceiling: 100,
                actual: Some(101)
            }
        ));
        assert!(executor.janitor().leftovers(&req).is_empty());
    }

    #[tokio::test]
    async fn test_failure_cleans_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let executor = RetrievalExecutor::new(Janitor::new(dir.path()), Duration::from_secs(5));
        let req = request(100);
        let (tx, _rx) = mpsc::unbounded_channel();
        let failing = FixedSource {
            bytes: 10,
            ext: Some("mp4.part"),
            failure: Some(AttemptFailure::SourceUnavailable("removed".into())),
            hang: false,
        };

        let outcome = executor.execute(&failing, &req, candidate(), 1, tx).await;
        assert_eq!(outcome.label(), "source_unavailable");
        assert!(executor.janitor().leftovers(&req).is_empty());
    }

    #[tokio::test]
    async fn test_other_extension_is_located() {
        let dir = tempfile::tempdir().unwrap();
        let executor = RetrievalExecutor::new(Janitor::new(dir.path()), Duration::from_secs(5));
        let req = request(100);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mkv = FixedSource {
            bytes: 10,
            ext: Some("mkv"),
            failure: None,
            hang: false,
        };

        let artifact = executor.execute(&mkv, &req, candidate(), 1, tx).await.into_result().unwrap();
        assert!(artifact.path().to_string_lossy().ends_with(".mkv"));
    }

    #[tokio::test]
    async fn test_empty_file_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let executor = RetrievalExecutor::new(Janitor::new(dir.path()), Duration::from_secs(5));
        let req = request(100);
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = executor.execute(&source(0), &req, candidate(), 1, tx).await;
        assert_eq!(outcome.label(), "transient");
        assert!(executor.janitor().leftovers(&req).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transient_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let executor = RetrievalExecutor::new(Janitor::new(dir.path()), Duration::from_secs(2));
        let req = request(100);
        let (tx, _rx) = mpsc::unbounded_channel();
        let hanging = FixedSource {
            bytes: 10,
            ext: None,
            failure: None,
            hang: true,
        };

        let outcome = executor.execute(&hanging, &req, candidate(), 1, tx).await;
        assert!(matches!(outcome, AttemptOutcome::TransientError(ref r) if r.contains("timed out")));
        assert!(executor.janitor().leftovers(&req).is_empty());
    }
}
