//! Scripted destination channel
//!
//! Pops one scripted result per send and records what it was handed.

#![allow(dead_code)]

use async_trait::async_trait;
use mediadrop::download::delivery::{DeliveryMetadata, Destination};
use mediadrop::download::error::ChannelError;
use mediadrop::download::janitor::DownloadArtifact;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

/// What a send saw on disk at the moment it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFile {
    pub path: PathBuf,
    pub size_on_disk: u64,
    pub caption: String,
}

pub struct ScriptedDestination {
    limit: u64,
    script: Mutex<VecDeque<Result<(), ChannelError>>>,
    sent: Mutex<Vec<SentFile>>,
}

impl ScriptedDestination {
    /// Accepts everything up to `limit` bytes.
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Results for the first sends; once used up every send succeeds.
    pub fn with_script(self, script: Vec<Result<(), ChannelError>>) -> Self {
        *self.script.lock().unwrap() = script.into();
        self
    }

    pub fn sent(&self) -> Vec<SentFile> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Destination for ScriptedDestination {
    fn name(&self) -> &str {
        "scripted-channel"
    }

    fn max_payload_bytes(&self) -> u64 {
        self.limit
    }

    async fn send(&self, artifact: &DownloadArtifact, metadata: &DeliveryMetadata) -> Result<(), ChannelError> {
        let size_on_disk = std::fs::metadata(artifact.path())
            .map(|m| m.len())
            .map_err(|e| ChannelError::Permanent(format!("artifact missing during upload: {}", e)))?;
        self.sent.lock().unwrap().push(SentFile {
            path: artifact.path().to_path_buf(),
            size_on_disk,
            caption: metadata.caption.clone(),
        });
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
