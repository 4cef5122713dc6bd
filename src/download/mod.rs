//! Media acquisition and delivery
//!
//! A request flows through:
//! - `prober`: best-effort metadata (title, duration, size estimate)
//! - `ladder`: ordered quality candidates ending in a "lowest" sentinel
//! - `fallback` + `executor`: one size-capped attempt per candidate
//! - `delivery`: bounded-retry upload of the first artifact that fits
//!
//! `janitor` owns every scratch file along the way.

pub mod delivery;
pub mod error;
pub mod events;
pub mod executor;
pub mod fallback;
pub mod janitor;
pub mod ladder;
pub mod pipeline;
pub mod prober;
pub mod progress;
pub mod request;
pub mod source;
pub mod ytdlp_errors;

// Re-exports for convenience
pub use delivery::{DeliveryMetadata, DeliveryOutcome, DeliveryUploader, Destination};
pub use error::{AttemptFailure, ChannelError, DeliveryFailure};
pub use events::{EventSink, PipelineEvent};
pub use executor::{AttemptOutcome, RetrievalExecutor};
pub use fallback::{FallbackController, FallbackError};
pub use janitor::{DownloadArtifact, Janitor};
pub use ladder::{build_ladder, QualityCandidate, QualityLadder, Tier};
pub use pipeline::{MediaPipeline, PipelineConfig, PipelineError, PipelineReport};
pub use request::{CeilingPolicy, MediaKind, MediaRequest};
pub use source::{MediaSource, Platform, SourceRegistry, YtDlpSource};
