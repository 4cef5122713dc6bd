//! Media requests and the tier → byte-ceiling policy.

use std::fmt;
use url::Url;
use uuid::Uuid;

/// What the user asked for: a video, or audio extracted to MP3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// Container of the delivered file.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Audio => "mp3",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Maps the requested tier to a share of the delivery channel's hard limit.
///
/// One table for every platform. Higher requested tiers get a larger ceiling;
/// the ceiling never exceeds the channel limit.
#[derive(Debug, Clone, PartialEq)]
pub struct CeilingPolicy {
    /// `(minimum tier, percent of channel limit)`, sorted by tier descending
    video_steps: Vec<(u32, u64)>,
    /// Share for video requests below every step or without an explicit tier
    video_default_percent: u64,
    audio_percent: u64,
}

impl Default for CeilingPolicy {
    fn default() -> Self {
        Self {
            video_steps: vec![(1024, 100), (720, 85), (480, 70)],
            video_default_percent: 60,
            audio_percent: 100,
        }
    }
}

impl CeilingPolicy {
    /// Percent of the channel limit granted to a request.
    pub fn percent_for(&self, kind: MediaKind, requested_tier: Option<u32>) -> u64 {
        match kind {
            MediaKind::Audio => self.audio_percent,
            MediaKind::Video => requested_tier
                .and_then(|tier| {
                    self.video_steps
                        .iter()
                        .find(|(min_tier, _)| tier >= *min_tier)
                        .map(|(_, percent)| *percent)
                })
                .unwrap_or(self.video_default_percent),
        }
    }

    /// Byte ceiling for a request against a channel with the given hard limit.
    pub fn ceiling_for(&self, kind: MediaKind, requested_tier: Option<u32>, channel_limit: u64) -> u64 {
        let percent = self.percent_for(kind, requested_tier).min(100);
        // u128 keeps 2 GB * 100 from overflowing on exotic limits
        ((channel_limit as u128 * percent as u128) / 100) as u64
    }
}

/// One incoming media command. Immutable once created.
#[derive(Debug, Clone)]
pub struct MediaRequest {
    id: Uuid,
    url: Url,
    kind: MediaKind,
    requested_tier: Option<u32>,
    ceiling_bytes: u64,
}

impl MediaRequest {
    /// Creates a request with an explicit byte ceiling.
    pub fn new(url: Url, kind: MediaKind, requested_tier: Option<u32>, ceiling_bytes: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            kind,
            requested_tier,
            ceiling_bytes,
        }
    }

    /// Creates a request whose ceiling is derived from the channel limit through `policy`.
    pub fn for_channel(
        url: Url,
        kind: MediaKind,
        requested_tier: Option<u32>,
        channel_limit: u64,
        policy: &CeilingPolicy,
    ) -> Self {
        let ceiling = policy.ceiling_for(kind, requested_tier, channel_limit);
        Self::new(url, kind, requested_tier, ceiling)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Short id used in log lines and scratch file names.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..12].to_string()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn requested_tier(&self) -> Option<u32> {
        self.requested_tier
    }

    pub fn ceiling_bytes(&self) -> u64 {
        self.ceiling_bytes
    }
}
