//! Integration tests for core modules (retry, metrics, ceiling policy, ladder)
//!
//! Run with: cargo test --test core_modules_test

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Retry Module Tests
// ============================================================================

mod retry_tests {
    use super::*;
    use mediadrop::core::retry::{retry, RetryConfig, Retryable};

    #[derive(Debug, Clone)]
    struct TestError {
        retryable: bool,
        retry_after: Option<Duration>,
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }

        fn retry_after(&self) -> Option<Duration> {
            self.retry_after
        }
    }

    fn transient() -> TestError {
        TestError {
            retryable: true,
            retry_after: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_numbers_are_passed_in_order() {
        let config = RetryConfig::new().max_attempts(3).no_jitter();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let result = retry(&config, |attempt| {
            let seen = seen_clone.clone();
            async move {
                seen.lock().unwrap().push(attempt);
                Err::<(), _>(transient())
            }
        })
        .await;

        assert!(result.is_exhausted());
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_never_decreases() {
        let config = RetryConfig::new()
            .max_attempts(5)
            .initial_delay(Duration::from_secs(2))
            .max_delay(Duration::from_secs(60));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry(&config, |_| {
            let counter = counter_clone.clone();
            async move {
                // a short server hint in the middle must not shrink the backoff
                let hint = if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                    Some(Duration::from_millis(100))
                } else {
                    None
                };
                Err::<(), _>(TestError {
                    retryable: true,
                    retry_after: hint,
                })
            }
        })
        .await;

        assert_eq!(result.attempts, 5);
        assert_eq!(result.delays.len(), 4);
        assert!(result.delays.windows(2).all(|w| w[0] <= w[1]), "{:?}", result.delays);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let config = RetryConfig::quick().max_retries(5);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry(&config, |_| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError {
                    retryable: false,
                    retry_after: None,
                })
            }
        })
        .await;

        assert!(result.is_exhausted());
        assert_eq!(result.attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_config_delay_calculation() {
        let config = RetryConfig::new()
            .initial_delay(Duration::from_secs(1))
            .backoff_multiplier(2.0)
            .max_delay(Duration::from_secs(10))
            .no_jitter();

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(8));
        // 16, capped at 10
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(10));
    }

    #[test]
    fn test_delivery_preset_is_small_and_doubling() {
        let delivery = RetryConfig::delivery();
        assert!(delivery.total_attempts() >= 1);
        assert!(delivery.total_attempts() <= 10);
        assert_eq!(delivery.factor(), 2.0);
    }
}

// ============================================================================
// Metrics Module Tests
// ============================================================================

mod metrics_tests {
    use mediadrop::core::metrics;

    #[test]
    fn test_pipeline_metrics_are_exported() {
        metrics::init_metrics();
        metrics::record_pipeline("delivered", 12.5);
        metrics::record_artifact_size(10 * 1024 * 1024);
        metrics::record_error("ladder_exhausted", "pipeline");

        let text = metrics::gather_metrics();
        assert!(text.contains("mediadrop_pipeline_duration_seconds"));
        assert!(text.contains("mediadrop_artifact_size_bytes"));
        assert!(text.contains("outcome=\"delivered\""));
    }
}

// ============================================================================
// Ceiling Policy Tests
// ============================================================================

mod ceiling_tests {
    use mediadrop::download::request::{CeilingPolicy, MediaKind, MediaRequest};
    use url::Url;

    const LIMIT: u64 = 50 * 1024 * 1024;

    #[test]
    fn test_higher_tiers_get_larger_ceilings() {
        let policy = CeilingPolicy::default();
        let tiers = [None, Some(144), Some(360), Some(480), Some(720), Some(1024), Some(2160)];
        let ceilings: Vec<u64> = tiers
            .iter()
            .map(|t| policy.ceiling_for(MediaKind::Video, *t, LIMIT))
            .collect();

        assert!(ceilings.windows(2).all(|w| w[0] <= w[1]), "{:?}", ceilings);
        assert!(ceilings.iter().all(|c| *c <= LIMIT));
        assert_eq!(policy.ceiling_for(MediaKind::Video, Some(1024), LIMIT), LIMIT);
    }

    #[test]
    fn test_audio_gets_full_limit() {
        let request = MediaRequest::for_channel(
            Url::parse("https://youtu.be/abc").unwrap(),
            MediaKind::Audio,
            Some(320),
            LIMIT,
            &CeilingPolicy::default(),
        );
        assert_eq!(request.ceiling_bytes(), LIMIT);
    }

    #[test]
    fn test_huge_local_api_limit_does_not_overflow() {
        let two_gb = 2 * 1024 * 1024 * 1024;
        let ceiling = CeilingPolicy::default().ceiling_for(MediaKind::Video, Some(720), two_gb);
        assert_eq!(ceiling, two_gb / 100 * 85);
    }
}

// ============================================================================
// Ladder Tests
// ============================================================================

mod ladder_tests {
    use mediadrop::download::ladder::{build_ladder, LadderDefaults, Tier};
    use mediadrop::download::request::{MediaKind, MediaRequest};
    use mediadrop::download::source::ProbeResult;
    use url::Url;

    #[test]
    fn test_ladder_shape_for_common_requests() {
        let url = Url::parse("https://www.facebook.com/watch/?v=1").unwrap();
        let defaults = LadderDefaults::default();

        for kind in [MediaKind::Video, MediaKind::Audio] {
            for tier in [None, Some(1), Some(96), Some(360), Some(1080), Some(4320)] {
                for estimate in [None, Some(1), Some(80 * 1024 * 1024), Some(u64::MAX)] {
                    let request = MediaRequest::new(url.clone(), kind, tier, 30 * 1024 * 1024);
                    let probe = ProbeResult {
                        estimated_size: estimate,
                        ..ProbeResult::default()
                    };
                    let ladder = build_ladder(&request, &probe, &defaults);

                    assert!(ladder.is_well_formed(), "{:?} {:?} {:?}: {}", kind, tier, estimate, ladder);
                    assert_eq!(ladder.as_slice().last().map(|c| c.tier), Some(Tier::Lowest));
                    assert!(ladder.iter().all(|c| c.kind == kind));
                }
            }
        }
    }
}
