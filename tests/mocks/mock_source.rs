//! Scripted media source
//!
//! Answers each quality candidate with a pre-recorded behaviour and records
//! which candidates were asked for, in order.

#![allow(dead_code)]

use async_trait::async_trait;
use mediadrop::core::error::AppError;
use mediadrop::download::error::AttemptFailure;
use mediadrop::download::ladder::QualityCandidate;
use mediadrop::download::source::{FetchRequest, MediaSource, ProbeResult, SourceProgress};
use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// What the probe does
#[derive(Debug, Clone)]
pub enum ProbeScript {
    Answer(ProbeResult),
    Fail,
    Hang,
}

/// What one fetch does
#[derive(Debug, Clone)]
pub enum FetchScript {
    /// Produces a file of this many bytes (sparse, nothing is really written)
    Produce(u64),
    /// Fails without touching the disk
    Fail(AttemptFailure),
    /// Leaves a `.part` fragment behind, then fails
    FailWithPartial(AttemptFailure),
    /// Never finishes
    Hang,
}

pub struct ScriptedSource {
    probe: ProbeScript,
    fetches: HashMap<String, FetchScript>,
    otherwise: FetchScript,
    calls: Mutex<Vec<QualityCandidate>>,
    outputs: Mutex<Vec<PathBuf>>,
}

impl ScriptedSource {
    /// Every candidate fails as unavailable until scripted otherwise.
    pub fn new() -> Self {
        Self {
            probe: ProbeScript::Answer(ProbeResult::default()),
            fetches: HashMap::new(),
            otherwise: FetchScript::Fail(AttemptFailure::SourceUnavailable("not scripted".to_string())),
            calls: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_probe(mut self, probe: ProbeScript) -> Self {
        self.probe = probe;
        self
    }

    /// Scripts the candidate with this label ("720p", "192k", "lowest").
    pub fn on(mut self, label: &str, script: FetchScript) -> Self {
        self.fetches.insert(label.to_string(), script);
        self
    }

    pub fn otherwise(mut self, script: FetchScript) -> Self {
        self.otherwise = script;
        self
    }

    /// Candidates fetched so far, in order.
    pub fn calls(&self) -> Vec<QualityCandidate> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_labels(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.label()).collect()
    }

    /// Paths the source was told to write to.
    pub fn outputs(&self) -> Vec<PathBuf> {
        self.outputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn supports_url(&self, _url: &Url) -> bool {
        true
    }

    async fn probe(&self, _url: &Url) -> Result<ProbeResult, AppError> {
        match &self.probe {
            ProbeScript::Answer(probe) => Ok(probe.clone()),
            ProbeScript::Fail => Err(AppError::Download("probe failed".to_string())),
            ProbeScript::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Ok(ProbeResult::default())
            }
        }
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        progress_tx: mpsc::UnboundedSender<SourceProgress>,
    ) -> Result<PathBuf, AttemptFailure> {
        self.calls.lock().unwrap().push(request.candidate);
        self.outputs.lock().unwrap().push(request.output_path.clone());

        let script = self
            .fetches
            .get(&request.candidate.label())
            .unwrap_or(&self.otherwise)
            .clone();

        match script {
            FetchScript::Produce(bytes) => {
                for percent in [0u8, 50, 100] {
                    let _ = progress_tx.send(SourceProgress {
                        percent,
                        downloaded_bytes: Some(bytes * percent as u64 / 100),
                        total_bytes: Some(bytes),
                        ..SourceProgress::default()
                    });
                }
                let file = File::create(&request.output_path).map_err(|e| AttemptFailure::Transient(e.to_string()))?;
                file.set_len(bytes).map_err(|e| AttemptFailure::Transient(e.to_string()))?;
                Ok(request.output_path.clone())
            }
            FetchScript::Fail(failure) => Err(failure),
            FetchScript::FailWithPartial(failure) => {
                let mut partial = request.output_path.clone().into_os_string();
                partial.push(".part");
                let file = File::create(PathBuf::from(partial)).map_err(|e| AttemptFailure::Transient(e.to_string()))?;
                file.set_len(1024).map_err(|e| AttemptFailure::Transient(e.to_string()))?;
                Err(failure)
            }
            FetchScript::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(AttemptFailure::Transient("woke up".to_string()))
            }
        }
    }
}
