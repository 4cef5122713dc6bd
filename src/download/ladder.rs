//! Quality ladder: the ordered list of tiers a request walks through.
//!
//! Building a ladder is a pure function of the request and the (possibly empty)
//! probe result. Every ladder is non-empty, strictly decreasing and ends in the
//! [`Tier::Lowest`] sentinel, so walking it always terminates.

use crate::download::request::{MediaKind, MediaRequest};
use crate::download::source::ProbeResult;
use std::fmt;

/// Reference video tiers (vertical resolution), highest first.
pub const VIDEO_REFERENCE_TIERS: [u32; 6] = [1024, 720, 480, 360, 240, 144];

/// Reference audio tiers (kbps), highest first.
pub const AUDIO_REFERENCE_TIERS: [u32; 4] = [320, 192, 128, 96];

/// Upper bound on ladder length: an off-reference explicit tier, every reference tier and the sentinel.
pub const MAX_LADDER_LEN: usize = VIDEO_REFERENCE_TIERS.len() + 2;

/// A discrete quality level.
///
/// Variant order matters: the derived `Ord` puts `Lowest` below every `Level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// Whatever the source can produce, smallest first
    Lowest,
    /// Height in pixels for video, bitrate in kbps for audio
    Level(u32),
}

impl Tier {
    pub fn level(&self) -> Option<u32> {
        match self {
            Tier::Level(v) => Some(*v),
            Tier::Lowest => None,
        }
    }
}

/// Container/codec hint handed to the source adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormatConstraint {
    /// H.264 + AAC in MP4, playable inline by Telegram clients
    H264Mp4,
    /// MP3 audio extraction
    Mp3,
    /// Any container; remuxed to the request's container where possible
    AnyContainer,
}

/// One rung of the ladder.
///
/// Ordered by tier first, so sorting a ladder descending gives highest quality first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualityCandidate {
    pub tier: Tier,
    pub kind: MediaKind,
    pub format: FormatConstraint,
}

impl QualityCandidate {
    pub fn new(kind: MediaKind, tier: Tier) -> Self {
        let format = match (kind, tier) {
            (MediaKind::Audio, _) => FormatConstraint::Mp3,
            (MediaKind::Video, Tier::Level(_)) => FormatConstraint::H264Mp4,
            (MediaKind::Video, Tier::Lowest) => FormatConstraint::AnyContainer,
        };
        Self { tier, kind, format }
    }

    pub fn is_sentinel(&self) -> bool {
        self.tier == Tier::Lowest
    }

    /// Metric/log label: `720p`, `192k`, `lowest`.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QualityCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.tier, self.kind) {
            (Tier::Lowest, _) => f.write_str("lowest"),
            (Tier::Level(v), MediaKind::Video) => write!(f, "{}p", v),
            (Tier::Level(v), MediaKind::Audio) => write!(f, "{}k", v),
        }
    }
}

/// Ordered, finite, strictly decreasing sequence of candidates ending in the sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityLadder {
    candidates: Vec<QualityCandidate>,
}

impl QualityLadder {
    fn from_tiers(kind: MediaKind, tiers: Vec<Tier>) -> Self {
        let candidates: Vec<QualityCandidate> = tiers.into_iter().map(|t| QualityCandidate::new(kind, t)).collect();
        let ladder = Self { candidates };
        debug_assert!(ladder.is_well_formed(), "malformed ladder: {:?}", ladder);
        ladder
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn first(&self) -> Option<&QualityCandidate> {
        self.candidates.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QualityCandidate> {
        self.candidates.iter()
    }

    pub fn as_slice(&self) -> &[QualityCandidate] {
        &self.candidates
    }

    /// Non-empty, strictly decreasing, bounded, terminated by the sentinel.
    pub fn is_well_formed(&self) -> bool {
        !self.candidates.is_empty()
            && self.candidates.len() <= MAX_LADDER_LEN
            && self.candidates.windows(2).all(|w| w[0].tier > w[1].tier)
            && self.candidates.last().map(|c| c.is_sentinel()).unwrap_or(false)
    }
}

impl fmt::Display for QualityLadder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.candidates.iter().map(|c| c.label()).collect();
        f.write_str(&labels.join(" → "))
    }
}

impl<'a> IntoIterator for &'a QualityLadder {
    type Item = &'a QualityCandidate;
    type IntoIter = std::slice::Iter<'a, QualityCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

/// Starting tiers used when the user did not ask for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LadderDefaults {
    pub video_tier: u32,
    pub audio_tier: u32,
}

impl Default for LadderDefaults {
    fn default() -> Self {
        Self {
            video_tier: 360,
            audio_tier: 192,
        }
    }
}

fn reference_tiers(kind: MediaKind) -> &'static [u32] {
    match kind {
        MediaKind::Video => &VIDEO_REFERENCE_TIERS,
        MediaKind::Audio => &AUDIO_REFERENCE_TIERS,
    }
}

/// How many rungs to skip below the default when the probe says the default is too big.
///
/// Within the ceiling: none. Up to twice the ceiling: one. Beyond that: two.
fn conservative_steps(estimated_size: Option<u64>, ceiling: u64) -> usize {
    match estimated_size {
        Some(size) if size > ceiling.saturating_mul(2) => 2,
        Some(size) if size > ceiling => 1,
        _ => 0,
    }
}

/// The starting tier followed by every lower reference tier and the sentinel.
fn descend_from(kind: MediaKind, start: u32) -> Vec<Tier> {
    let mut tiers = vec![Tier::Level(start)];
    tiers.extend(
        reference_tiers(kind)
            .iter()
            .copied()
            .filter(|t| *t < start)
            .map(Tier::Level),
    );
    tiers.push(Tier::Lowest);
    tiers
}

/// Builds the ladder for a request.
///
/// An explicit tier is honoured as the first rung. Without one the ladder starts at
/// the default tier, shifted down one or two rungs when the probe's size estimate
/// exceeds the ceiling.
pub fn build_ladder(request: &MediaRequest, probe: &ProbeResult, defaults: &LadderDefaults) -> QualityLadder {
    let kind = request.kind();

    let tiers = match request.requested_tier().filter(|t| *t > 0) {
        Some(explicit) => descend_from(kind, explicit),
        None => {
            let default = match kind {
                MediaKind::Video => defaults.video_tier,
                MediaKind::Audio => defaults.audio_tier,
            };
            let full = descend_from(kind, default.max(1));
            let skip = conservative_steps(probe.estimated_size, request.ceiling_bytes()).min(full.len() - 1);
            if skip > 0 {
                log::info!(
                    "[{}] probe estimate {:?} B exceeds ceiling {} B, starting {} step(s) below default",
                    request.short_id(),
                    probe.estimated_size,
                    request.ceiling_bytes(),
                    skip
                );
            }
            full.into_iter().skip(skip).collect()
        }
    };

    QualityLadder::from_tiers(kind, tiers)
}
