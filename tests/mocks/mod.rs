//! Mock implementations for pipeline testing
//!
//! Scripted stand-ins for the source and destination seams, so the whole
//! pipeline runs against a temp directory without network or yt-dlp.

pub mod mock_destination;
pub mod mock_source;

pub use mock_destination::{ScriptedDestination, SentFile};
pub use mock_source::{FetchScript, ProbeScript, ScriptedSource};
