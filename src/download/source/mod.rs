//! Media source abstraction layer.
//!
//! Provides the `MediaSource` trait that every backend implements and a
//! `SourceRegistry` for URL-based routing. The pipeline only ever talks to
//! `dyn MediaSource`, so adding a platform means adding an adapter, not a
//! new control flow.
//!
//! Built-in backend:
//! - `YtDlpSource`: YouTube, Facebook, Instagram, TikTok and generic pages via yt-dlp

pub mod ytdlp;

use crate::core::error::AppError;
use crate::download::error::AttemptFailure;
use crate::download::ladder::QualityCandidate;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

pub use ytdlp::YtDlpSource;

/// Best-effort metadata gathered before downloading. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    pub title: Option<String>,
    pub duration_secs: Option<u64>,
    /// Approximate size of the best format in bytes, overhead included
    pub estimated_size: Option<u64>,
}

impl ProbeResult {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.duration_secs.is_none() && self.estimated_size.is_none()
    }
}

/// Progress information emitted during a fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceProgress {
    /// Download progress percentage (0-100)
    pub percent: u8,
    /// Download speed in bytes per second
    pub speed_bytes_sec: Option<f64>,
    /// Estimated time remaining in seconds
    pub eta_seconds: Option<u64>,
    /// Bytes downloaded so far
    pub downloaded_bytes: Option<u64>,
    /// Total bytes expected
    pub total_bytes: Option<u64>,
}

/// Parameters for exactly one fetch attempt.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub candidate: QualityCandidate,
    /// Byte ceiling; sources that can abort early should do so
    pub ceiling_bytes: u64,
    /// Where the artifact is expected to land. Sources may pick a different
    /// extension but must keep the file stem so the scratch guard can find it.
    pub output_path: PathBuf,
}

/// Trait for media source implementations.
///
/// `probe` is allowed to fail; the caller treats any error as "no hint".
/// `fetch` performs one download and classifies its failure. It never retries.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Human-readable name of this source (e.g., "yt-dlp:youtube")
    fn name(&self) -> &str;

    /// Whether this source can handle the given URL.
    fn supports_url(&self, url: &Url) -> bool;

    /// Title, duration and approximate size without downloading.
    async fn probe(&self, url: &Url) -> Result<ProbeResult, AppError>;

    /// Downloads one candidate and returns the path of the produced file.
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress_tx: mpsc::UnboundedSender<SourceProgress>,
    ) -> Result<PathBuf, AttemptFailure>;
}

/// Platforms exposed as chat commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    YouTube,
    Facebook,
    Instagram,
    TikTok,
    /// Any other page yt-dlp has an extractor for
    Generic,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::YouTube,
        Platform::Facebook,
        Platform::Instagram,
        Platform::TikTok,
        Platform::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
            Platform::Generic => "generic",
        }
    }

    /// Hosts this platform serves media from. Empty for `Generic`.
    pub fn domains(&self) -> &'static [&'static str] {
        match self {
            Platform::YouTube => &["youtube.com", "youtu.be", "youtube-nocookie.com"],
            Platform::Facebook => &["facebook.com", "fb.watch", "fb.com"],
            Platform::Instagram => &["instagram.com", "instagr.am"],
            Platform::TikTok => &["tiktok.com"],
            Platform::Generic => &[],
        }
    }

    /// Whether the URL's host is one of this platform's domains (subdomains included).
    pub fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        self.domains()
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
    }

    /// Platform owning the URL's host, `Generic` when none does.
    pub fn detect(url: &Url) -> Platform {
        Platform::ALL
            .iter()
            .copied()
            .find(|p| *p != Platform::Generic && p.matches(url))
            .unwrap_or(Platform::Generic)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry that routes URLs to the appropriate media source.
///
/// Sources are tried in order; the first source that claims to support
/// the URL is used, so platform adapters go before the generic one.
pub struct SourceRegistry {
    sources: Vec<(Platform, Arc<dyn MediaSource>)>,
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    /// Register a source for a platform. Sources are tried in insertion order.
    pub fn register(&mut self, platform: Platform, source: Arc<dyn MediaSource>) {
        self.sources.push((platform, source));
    }

    /// Find the first source that supports the given URL.
    pub fn resolve(&self, url: &Url) -> Option<Arc<dyn MediaSource>> {
        self.sources
            .iter()
            .find(|(_, s)| s.supports_url(url))
            .map(|(_, s)| Arc::clone(s))
    }

    /// The source registered for a platform.
    pub fn for_platform(&self, platform: Platform) -> Option<Arc<dyn MediaSource>> {
        self.sources
            .iter()
            .find(|(p, _)| *p == platform)
            .map(|(_, s)| Arc::clone(s))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// One yt-dlp adapter per platform, generic last.
    pub fn default_registry() -> Self {
        let mut registry = Self::new();
        for platform in Platform::ALL {
            registry.register(platform, Arc::new(YtDlpSource::new(platform)));
        }
        registry
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::default_registry()
    }
}
