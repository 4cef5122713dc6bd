//! Delivery uploader: pushes a finished artifact to a destination channel.
//!
//! Transient channel errors are retried with bounded exponential backoff
//! through [`crate::core::retry`]; size rejections and permanent errors stop
//! immediately. Whatever happens, the artifact is released before returning.

use crate::core::metrics;
use crate::core::retry::{self, RetryConfig};
use crate::download::error::{ChannelError, DeliveryFailure};
use crate::download::events::{EventSink, PipelineEvent};
use crate::download::janitor::DownloadArtifact;
use crate::download::request::MediaKind;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What the destination shows next to the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryMetadata {
    pub kind: MediaKind,
    pub title: Option<String>,
    pub duration_secs: Option<u64>,
    pub caption: String,
}

/// A channel that accepts finished files.
#[async_trait]
pub trait Destination: Send + Sync {
    fn name(&self) -> &str;

    /// Hard payload limit of the channel in bytes.
    fn max_payload_bytes(&self) -> u64;

    /// Sends the artifact once. Implementations must read the file from the
    /// start on every call.
    async fn send(&self, artifact: &DownloadArtifact, metadata: &DeliveryMetadata) -> Result<(), ChannelError>;
}

/// Terminal result of delivering one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts_used: u32 },
    Failed { failure: DeliveryFailure, attempts_used: u32 },
}

/// Uploads artifacts with bounded retries.
#[derive(Debug, Clone)]
pub struct DeliveryUploader {
    retry: RetryConfig,
    upload_timeout: Duration,
}

impl DeliveryUploader {
    pub fn new(retry: RetryConfig, upload_timeout: Duration) -> Self {
        Self { retry, upload_timeout }
    }

    /// Delivers `artifact` and then releases it.
    pub async fn deliver(
        &self,
        destination: &dyn Destination,
        artifact: DownloadArtifact,
        metadata: &DeliveryMetadata,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> DeliveryOutcome {
        let outcome = self.deliver_inner(destination, &artifact, metadata, cancel, events).await;
        let removed = artifact.release();
        log::debug!("Released delivered artifact ({} file(s) removed)", removed);
        outcome
    }

    async fn deliver_inner(
        &self,
        destination: &dyn Destination,
        artifact: &DownloadArtifact,
        metadata: &DeliveryMetadata,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> DeliveryOutcome {
        let size = artifact.size_bytes();
        let limit = destination.max_payload_bytes();
        if size > limit {
            log::error!(
                "Artifact {} ({} B) exceeds {} limit of {} B before upload",
                artifact.file_name(),
                size,
                destination.name(),
                limit
            );
            metrics::record_delivery_attempt("too_large");
            return DeliveryOutcome::Failed {
                failure: DeliveryFailure::ConfigurationMismatch {
                    size,
                    reason: format!("channel limit is {} bytes", limit),
                },
                attempts_used: 0,
            };
        }

        let result = retry::retry(&self.retry, |attempt| async move {
            if cancel.is_cancelled() {
                return Err(ChannelError::Cancelled);
            }
            log::info!(
                "Uploading {} ({} B) to {}, attempt {}/{}",
                artifact.file_name(),
                size,
                destination.name(),
                attempt,
                self.retry.total_attempts()
            );
            events.emit(PipelineEvent::Uploading {
                attempt,
                size_bytes: size,
            });
            let sent = match tokio::time::timeout(self.upload_timeout, destination.send(artifact, metadata)).await {
                Ok(result) => result,
                Err(_) => Err(ChannelError::transient(format!(
                    "upload timed out after {}s",
                    self.upload_timeout.as_secs()
                ))),
            };
            match &sent {
                Ok(()) => metrics::record_delivery_attempt("delivered"),
                Err(e) => metrics::record_delivery_attempt(e.category()),
            }
            sent
        })
        .await;

        // a try that saw the cancellation never reached the destination
        let attempts_used = match &result.result {
            Err(gave_up) if matches!(gave_up.last_error, ChannelError::Cancelled) => result.attempts - 1,
            _ => result.attempts,
        };
        match result.result {
            Ok(()) => {
                log::info!(
                    "Delivered {} to {} in {} attempt(s)",
                    artifact.file_name(),
                    destination.name(),
                    attempts_used
                );
                events.emit(PipelineEvent::Delivered { attempts_used });
                DeliveryOutcome::Delivered { attempts_used }
            }
            Err(err) => {
                let failure = match err.into_last_error() {
                    ChannelError::TooLarge(reason) => DeliveryFailure::ConfigurationMismatch { size, reason },
                    ChannelError::Permanent(reason) => DeliveryFailure::Permanent(reason),
                    ChannelError::Cancelled => DeliveryFailure::Cancelled,
                    ChannelError::Transient { message, .. } => DeliveryFailure::RetriesExhausted(message),
                };
                log::error!(
                    "Delivery of {} to {} failed after {} attempt(s): {}",
                    artifact.file_name(),
                    destination.name(),
                    attempts_used,
                    failure
                );
                metrics::record_error(failure.category(), "delivery");
                DeliveryOutcome::Failed {
                    failure,
                    attempts_used,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::janitor::Janitor;
    use crate::download::request::MediaRequest;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use url::Url;

    struct ScriptedDestination {
        limit: u64,
        script: Mutex<Vec<Result<(), ChannelError>>>,
        calls: AtomicU32,
    }

    impl ScriptedDestination {
        fn new(limit: u64, script: Vec<Result<(), ChannelError>>) -> Self {
            Self {
                limit,
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Destination for ScriptedDestination {
        fn name(&self) -> &str {
            "scripted"
        }

        fn max_payload_bytes(&self) -> u64 {
            self.limit
        }

        async fn send(&self, artifact: &DownloadArtifact, _metadata: &DeliveryMetadata) -> Result<(), ChannelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(artifact.path().exists(), "artifact deleted before upload finished");
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(())
            } else {
                script.remove(0)
            }
        }
    }

    fn artifact(dir: &std::path::Path, bytes: usize) -> (Janitor, MediaRequest, DownloadArtifact) {
        let janitor = Janitor::new(dir);
        let request = MediaRequest::new(
            Url::parse("https://youtu.be/abc").unwrap(),
            MediaKind::Video,
            None,
            1_000,
        );
        let scratch = janitor.allocate(&request, 1).unwrap();
        std::fs::write(scratch.path(), vec![1u8; bytes]).unwrap();
        let path = scratch.path().to_path_buf();
        let artifact = scratch.into_artifact(path, bytes as u64);
        (janitor, request, artifact)
    }

    fn metadata() -> DeliveryMetadata {
        DeliveryMetadata {
            kind: MediaKind::Video,
            title: Some("t".into()),
            duration_secs: None,
            caption: "t".into(),
        }
    }

    fn uploader() -> DeliveryUploader {
        DeliveryUploader::new(
            RetryConfig::new()
                .max_attempts(3)
                .initial_delay(Duration::from_millis(100))
                .no_jitter(),
            Duration::from_secs(10),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (janitor, request, artifact) = artifact(dir.path(), 10);
        let destination = ScriptedDestination::new(
            100,
            vec![Err(ChannelError::transient("timeout")), Err(ChannelError::transient("reset"))],
        );

        let outcome = uploader()
            .deliver(&destination, artifact, &metadata(), &CancellationToken::new(), &EventSink::disabled())
            .await;
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts_used: 3 });
        assert!(janitor.leftovers(&request).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let (janitor, request, artifact) = artifact(dir.path(), 10);
        let destination = ScriptedDestination::new(100, (0..10).map(|_| Err(ChannelError::transient("down"))).collect());

        let outcome = uploader()
            .deliver(&destination, artifact, &metadata(), &CancellationToken::new(), &EventSink::disabled())
            .await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Failed {
                failure: DeliveryFailure::RetriesExhausted("down".into()),
                attempts_used: 3
            }
        );
        assert_eq!(destination.calls.load(Ordering::SeqCst), 3);
        assert!(janitor.leftovers(&request).is_empty());
    }

    #[tokio::test]
    async fn test_size_rejection_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (_janitor, _request, artifact) = artifact(dir.path(), 10);
        let destination = ScriptedDestination::new(100, vec![Err(ChannelError::TooLarge("413".into()))]);

        let outcome = uploader()
            .deliver(&destination, artifact, &metadata(), &CancellationToken::new(), &EventSink::disabled())
            .await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Failed {
                failure: DeliveryFailure::ConfigurationMismatch {
                    size: 10,
                    reason: "413".into()
                },
                attempts_used: 1
            }
        );
        assert_eq!(destination.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_over_advertised_limit_never_sends() {
        let dir = tempfile::tempdir().unwrap();
        let (janitor, request, artifact) = artifact(dir.path(), 200);
        let destination = ScriptedDestination::new(100, vec![]);

        let outcome = uploader()
            .deliver(&destination, artifact, &metadata(), &CancellationToken::new(), &EventSink::disabled())
            .await;
        assert!(matches!(
            outcome,
            DeliveryOutcome::Failed {
                failure: DeliveryFailure::ConfigurationMismatch { .. },
                attempts_used: 0
            }
        ));
        assert_eq!(destination.calls.load(Ordering::SeqCst), 0);
        assert!(janitor.leftovers(&request).is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_send() {
        let dir = tempfile::tempdir().unwrap();
        let (_janitor, _request, artifact) = artifact(dir.path(), 10);
        let destination = ScriptedDestination::new(100, vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = uploader()
            .deliver(&destination, artifact, &metadata(), &cancel, &EventSink::disabled())
            .await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Failed {
                failure: DeliveryFailure::Cancelled,
                attempts_used: 0
            }
        );
        assert_eq!(destination.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_backoff_counts_only_real_sends() {
        let dir = tempfile::tempdir().unwrap();
        let (janitor, request, artifact) = artifact(dir.path(), 10);
        let destination = ScriptedDestination::new(100, vec![Err(ChannelError::transient("reset"))]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            // fires inside the 100ms backoff after the first send
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = uploader()
            .deliver(&destination, artifact, &metadata(), &cancel, &EventSink::disabled())
            .await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Failed {
                failure: DeliveryFailure::Cancelled,
                attempts_used: 1
            }
        );
        assert_eq!(destination.calls.load(Ordering::SeqCst), 1);
        assert!(janitor.leftovers(&request).is_empty());
    }
}
