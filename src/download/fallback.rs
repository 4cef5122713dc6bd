//! Fallback controller: walks the quality ladder until one candidate succeeds.
//!
//! The walk is an explicit state machine over [`AttemptOutcome`]. Each
//! candidate is tried at most once, in ladder order, so the number of steps is
//! bounded by the ladder length.

use crate::download::error::AttemptFailure;
use crate::download::events::{EventSink, PipelineEvent};
use crate::download::executor::{AttemptOutcome, RetrievalExecutor};
use crate::download::janitor::DownloadArtifact;
use crate::download::ladder::{QualityCandidate, QualityLadder};
use crate::download::progress::ProgressThrottle;
use crate::download::request::MediaRequest;
use crate::download::source::{MediaSource, SourceProgress};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One finished attempt, kept for logs and the final report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub candidate: QualityCandidate,
    /// `None` for the successful attempt
    pub failure: Option<AttemptFailure>,
}

/// Controller state: what is left to try and what went wrong last.
#[derive(Debug)]
pub struct FallbackState {
    remaining: VecDeque<QualityCandidate>,
    last_error: Option<AttemptFailure>,
    history: Vec<AttemptRecord>,
}

/// What the controller does after recording an outcome.
#[derive(Debug)]
pub enum Transition {
    /// Try the next candidate
    Continue,
    /// Stop: artifact in hand
    Done(DownloadArtifact),
    /// Stop: nothing left to try
    Exhausted(AttemptFailure),
}

impl FallbackState {
    pub fn new(ladder: &QualityLadder) -> Self {
        Self {
            remaining: ladder.iter().copied().collect(),
            last_error: None,
            history: Vec::with_capacity(ladder.len()),
        }
    }

    /// Removes and returns the next candidate. A popped candidate never comes back.
    pub fn next_candidate(&mut self) -> Option<QualityCandidate> {
        self.remaining.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    pub fn last_error(&self) -> Option<&AttemptFailure> {
        self.last_error.as_ref()
    }

    pub fn history(&self) -> &[AttemptRecord] {
        &self.history
    }

    /// Records the outcome for `candidate` and decides what happens next.
    pub fn record(&mut self, candidate: QualityCandidate, outcome: AttemptOutcome) -> Transition {
        match outcome.into_result() {
            Ok(artifact) => {
                self.history.push(AttemptRecord {
                    candidate,
                    failure: None,
                });
                Transition::Done(artifact)
            }
            Err(failure) => {
                self.history.push(AttemptRecord {
                    candidate,
                    failure: Some(failure.clone()),
                });
                // Most recent classification wins
                self.last_error = Some(failure);
                if self.remaining.is_empty() {
                    Transition::Exhausted(self.exhausted_error())
                } else {
                    Transition::Continue
                }
            }
        }
    }

    fn exhausted_error(&self) -> AttemptFailure {
        self.last_error
            .clone()
            .unwrap_or_else(|| AttemptFailure::SourceUnavailable("no quality candidates to try".to_string()))
    }

    fn into_history(self) -> Vec<AttemptRecord> {
        self.history
    }
}

/// Artifact produced by the ladder walk plus how it got there.
#[derive(Debug)]
pub struct Retrieved {
    pub artifact: DownloadArtifact,
    pub candidate: QualityCandidate,
    pub history: Vec<AttemptRecord>,
}

impl Retrieved {
    pub fn attempts(&self) -> u32 {
        self.history.len() as u32
    }
}

/// Why the ladder walk stopped without an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallbackError {
    #[error("all {} quality levels failed, last: {last}", .history.len())]
    Exhausted {
        last: AttemptFailure,
        history: Vec<AttemptRecord>,
    },

    #[error("cancelled after {} attempt(s)", .history.len())]
    Cancelled { history: Vec<AttemptRecord> },
}

/// Drives the executor along a ladder.
pub struct FallbackController<'a> {
    executor: &'a RetrievalExecutor,
}

impl<'a> FallbackController<'a> {
    pub fn new(executor: &'a RetrievalExecutor) -> Self {
        Self { executor }
    }

    /// Tries candidates in order until one succeeds, the ladder runs out or
    /// `cancel` fires. Cancellation is checked between attempts.
    pub async fn run(
        &self,
        source: &dyn MediaSource,
        request: &MediaRequest,
        ladder: &QualityLadder,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> Result<Retrieved, FallbackError> {
        let id = request.short_id();
        let mut state = FallbackState::new(ladder);
        let mut attempt: u32 = 0;

        log::info!("[{}] ladder: {}", id, ladder);

        loop {
            if cancel.is_cancelled() {
                log::info!("[{}] cancelled before attempt {}", id, attempt + 1);
                return Err(FallbackError::Cancelled {
                    history: state.into_history(),
                });
            }

            let Some(candidate) = state.next_candidate() else {
                let last = state.exhausted_error();
                return Err(FallbackError::Exhausted {
                    last,
                    history: state.into_history(),
                });
            };
            attempt += 1;
            events.emit(PipelineEvent::AttemptStarted { attempt, candidate });

            let outcome = self.attempt(source, request, candidate, attempt, events).await;
            log::info!("[{}] attempt {} ({}): {}", id, attempt, candidate, outcome);

            match state.record(candidate, outcome) {
                Transition::Done(artifact) => {
                    return Ok(Retrieved {
                        artifact,
                        candidate,
                        history: state.into_history(),
                    });
                }
                Transition::Continue => {
                    let reason = state.last_error().map(|f| f.reason()).unwrap_or_default();
                    events.emit(PipelineEvent::AttemptFailed {
                        attempt,
                        candidate,
                        reason,
                    });
                }
                Transition::Exhausted(last) => {
                    events.emit(PipelineEvent::AttemptFailed {
                        attempt,
                        candidate,
                        reason: last.reason(),
                    });
                    log::warn!("[{}] ladder exhausted after {} attempt(s): {}", id, attempt, last);
                    return Err(FallbackError::Exhausted {
                        last,
                        history: state.into_history(),
                    });
                }
            }
        }
    }

    /// Runs one attempt while turning its raw progress into throttled `Downloading` events.
    async fn attempt(
        &self,
        source: &dyn MediaSource,
        request: &MediaRequest,
        candidate: QualityCandidate,
        attempt: u32,
        events: &EventSink,
    ) -> AttemptOutcome {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<SourceProgress>();
        let mut throttle = ProgressThrottle::default();
        let mut forward = |progress: SourceProgress| {
            if throttle.should_emit(progress.percent) {
                events.emit(PipelineEvent::Downloading {
                    attempt,
                    percent: progress.percent,
                    downloaded_bytes: progress.downloaded_bytes,
                    total_bytes: progress.total_bytes,
                    speed_bytes_sec: progress.speed_bytes_sec,
                });
            }
        };

        let execute = self.executor.execute(source, request, candidate, attempt, progress_tx);
        tokio::pin!(execute);
        let outcome = loop {
            tokio::select! {
                outcome = &mut execute => break outcome,
                Some(progress) = progress_rx.recv() => forward(progress),
            }
        };
        // whatever was sent right before the attempt finished
        while let Ok(progress) = progress_rx.try_recv() {
            forward(progress);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::ladder::{build_ladder, LadderDefaults, Tier};
    use crate::download::request::MediaKind;
    use crate::download::source::ProbeResult;
    use url::Url;

    fn ladder() -> QualityLadder {
        let request = MediaRequest::new(
            Url::parse("https://www.facebook.com/watch/?v=1").unwrap(),
            MediaKind::Video,
            Some(480),
            1000,
        );
        build_ladder(&request, &ProbeResult::default(), &LadderDefaults::default())
    }

    #[test]
    fn test_state_never_revisits() {
        let ladder = ladder();
        let mut state = FallbackState::new(&ladder);
        let mut seen = Vec::new();
        while let Some(candidate) = state.next_candidate() {
            assert!(!seen.contains(&candidate));
            seen.push(candidate);
        }
        assert_eq!(seen.len(), ladder.len());
    }

    #[test]
    fn test_last_error_is_most_recent() {
        let ladder = ladder();
        let mut state = FallbackState::new(&ladder);
        let outcomes = [
            AttemptOutcome::QuotaExceeded {
                ceiling: 1000,
                actual: Some(2000),
            },
            AttemptOutcome::TransientError("reset".into()),
            AttemptOutcome::SourceUnavailable("format missing".into()),
        ];
        for outcome in outcomes {
            let candidate = state.next_candidate().unwrap();
            assert!(matches!(state.record(candidate, outcome), Transition::Continue));
        }
        assert_eq!(
            state.last_error(),
            Some(&AttemptFailure::SourceUnavailable("format missing".into()))
        );

        // drain to the sentinel
        let mut last_transition = None;
        while let Some(candidate) = state.next_candidate() {
            last_transition = Some(state.record(candidate, AttemptOutcome::TransientError("timeout".into())));
        }
        match last_transition {
            Some(Transition::Exhausted(AttemptFailure::Transient(reason))) => assert_eq!(reason, "timeout"),
            other => panic!("unexpected transition: {:?}", other),
        }
        assert_eq!(state.history().len(), ladder.len());
        assert_eq!(state.history().last().unwrap().candidate.tier, Tier::Lowest);
    }
}
