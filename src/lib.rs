//! mediadrop - size-budgeted media downloads for a Telegram utility bot
//!
//! Fetches a video or audio track from YouTube, Facebook, Instagram or TikTok
//! through yt-dlp, steps down a quality ladder until the file fits the chat's
//! upload limit, and delivers it with bounded retries.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, metrics and retry helpers
//! - `download`: the acquisition pipeline (probe, ladder, fallback, delivery)
//! - `telegram`: bot commands and the Telegram delivery channel

pub mod core;
pub mod download;
pub mod telegram;

// Re-export commonly used types for convenience
pub use core::{config, AppError};
pub use download::{MediaPipeline, MediaRequest, PipelineConfig, PipelineError, PipelineReport};
