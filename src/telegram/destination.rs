//! Telegram as a delivery channel.
//!
//! Each `send` opens the artifact from disk again, so a retried upload always
//! starts from the first byte.

use crate::core::config;
use crate::download::delivery::{DeliveryMetadata, Destination};
use crate::download::error::ChannelError;
use crate::download::janitor::DownloadArtifact;
use crate::download::request::MediaKind;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use teloxide::RequestError;

/// Telegram caption limit in characters
const CAPTION_MAX_CHARS: usize = 1024;

/// Sends finished media into one chat.
#[derive(Clone)]
pub struct TelegramDestination {
    bot: Bot,
    chat_id: ChatId,
    max_payload: u64,
}

impl TelegramDestination {
    /// Destination with the upload limit of the configured Bot API server.
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self::with_limit(bot, chat_id, config::validation::max_upload_bytes())
    }

    pub fn with_limit(bot: Bot, chat_id: ChatId, max_payload: u64) -> Self {
        Self {
            bot,
            chat_id,
            max_payload,
        }
    }
}

#[async_trait]
impl Destination for TelegramDestination {
    fn name(&self) -> &str {
        "telegram"
    }

    fn max_payload_bytes(&self) -> u64 {
        self.max_payload
    }

    async fn send(&self, artifact: &DownloadArtifact, metadata: &DeliveryMetadata) -> Result<(), ChannelError> {
        let input = InputFile::file(artifact.path().to_path_buf());
        let caption = crate::core::utils::truncate_chars(&metadata.caption, CAPTION_MAX_CHARS);
        let duration = metadata.duration_secs.and_then(|d| u32::try_from(d).ok());

        let sent = match metadata.kind {
            MediaKind::Video => {
                let mut request = self
                    .bot
                    .send_video(self.chat_id, input)
                    .caption(caption)
                    .supports_streaming(true);
                if let Some(d) = duration {
                    request = request.duration(d);
                }
                request.await
            }
            MediaKind::Audio => {
                let mut request = self.bot.send_audio(self.chat_id, input).caption(caption);
                if let Some(title) = metadata.title.as_deref() {
                    request = request.title(title.to_string());
                }
                if let Some(d) = duration {
                    request = request.duration(d);
                }
                request.await
            }
        };

        sent.map(|_| ()).map_err(|e| classify_request_error(&e))
    }
}

/// Maps a Bot API failure onto the delivery error classes.
///
/// Size rejections come back as plain API errors, so they are recognised by text.
pub fn classify_request_error(err: &RequestError) -> ChannelError {
    match err {
        RequestError::RetryAfter(secs) => ChannelError::Transient {
            message: format!("rate limited by Telegram for {}s", secs.seconds()),
            retry_after: Some(secs.duration()),
        },
        RequestError::Network(e) => ChannelError::transient(format!("network error: {}", e)),
        RequestError::Io(e) => ChannelError::transient(format!("I/O error: {}", e)),
        RequestError::Api(api) => {
            let text = api.to_string();
            if is_too_large(&text) {
                ChannelError::TooLarge(text)
            } else if is_server_side(&text) {
                ChannelError::transient(text)
            } else {
                ChannelError::Permanent(text)
            }
        }
        other => ChannelError::Permanent(other.to_string()),
    }
}

fn is_too_large(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("too large") || lower.contains("too big") || lower.contains("413")
}

fn is_server_side(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("internal server error") || lower.contains("bad gateway") || lower.contains("gateway timeout")
}
