//! Bot initialization and command definitions
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation
//! - Parsing of `<url> [quality]` command arguments

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use url::Url;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::download::request::MediaKind;
use crate::download::source::Platform;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "I fetch media that fits into this chat:")]
pub enum Command {
    #[command(description = "show this help")]
    Start,
    #[command(description = "show this help")]
    Help,
    #[command(description = "video from YouTube: /youtube <url> [quality]")]
    Youtube(String),
    #[command(description = "video from Facebook: /facebook <url> [quality]")]
    Facebook(String),
    #[command(description = "video from Instagram: /instagram <url> [quality]")]
    Instagram(String),
    #[command(description = "video from TikTok: /tiktok <url> [quality]")]
    Tiktok(String),
    #[command(description = "MP3 from any of the above: /audio <url> [kbps]")]
    Audio(String),
    #[command(description = "stop the download running in this chat")]
    Cancel,
}

impl Command {
    /// Platform and media kind for download commands, `None` for the rest.
    ///
    /// `/audio` has no fixed platform: it is detected from the URL.
    pub fn media_target(&self) -> Option<(Option<Platform>, MediaKind, &str)> {
        match self {
            Command::Youtube(args) => Some((Some(Platform::YouTube), MediaKind::Video, args)),
            Command::Facebook(args) => Some((Some(Platform::Facebook), MediaKind::Video, args)),
            Command::Instagram(args) => Some((Some(Platform::Instagram), MediaKind::Video, args)),
            Command::Tiktok(args) => Some((Some(Platform::TikTok), MediaKind::Video, args)),
            Command::Audio(args) => Some((None, MediaKind::Audio, args)),
            Command::Start | Command::Help | Command::Cancel => None,
        }
    }
}

/// Parsed arguments of a download command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaArgs {
    pub url: Url,
    pub platform: Platform,
    pub tier: Option<u32>,
}

/// Parses `<url> [quality]` and checks the URL belongs to `platform`.
///
/// Quality accepts `720`, `720p` or `192k`. With no platform given the URL must
/// belong to one of the supported platforms.
pub fn parse_media_args(args: &str, platform: Option<Platform>) -> AppResult<MediaArgs> {
    let mut parts = args.split_whitespace();
    let raw_url = parts
        .next()
        .ok_or_else(|| AppError::Validation("send a link after the command".to_string()))?;

    if raw_url.len() > config::validation::MAX_URL_LENGTH {
        return Err(AppError::Validation(format!(
            "link is too long ({} characters, max {})",
            raw_url.len(),
            config::validation::MAX_URL_LENGTH
        )));
    }

    let url = Url::parse(raw_url).map_err(|_| AppError::Validation(format!("'{}' is not a valid link", raw_url)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AppError::Validation("only http and https links are supported".to_string()));
    }

    let platform = match platform {
        Some(p) if p.matches(&url) => p,
        Some(p) => {
            return Err(AppError::Validation(format!("this is not a {} link", p)));
        }
        None => match Platform::detect(&url) {
            Platform::Generic => {
                return Err(AppError::Validation(
                    "only YouTube, Facebook, Instagram and TikTok links are supported".to_string(),
                ))
            }
            detected => detected,
        },
    };

    let tier = parts.next().map(parse_tier).transpose()?;
    if parts.next().is_some() {
        return Err(AppError::Validation("expected: <url> [quality]".to_string()));
    }

    Ok(MediaArgs { url, platform, tier })
}

fn parse_tier(raw: &str) -> AppResult<u32> {
    let digits = raw.trim_end_matches(['p', 'P', 'k', 'K']);
    match digits.parse::<u32>() {
        Ok(tier) if tier > 0 => Ok(tier),
        _ => Err(AppError::Validation(format!("'{}' is not a quality like 720p or 192k", raw))),
    }
}

/// Creates a Bot instance with custom or default API URL
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Failed to create bot (invalid URL, client setup)
pub fn create_bot() -> anyhow::Result<Bot> {
    // Uploads of large files can take a while; the delivery layer enforces its own timeout
    let client = teloxide::net::default_reqwest_settings()
        .timeout(config::delivery::upload_timeout() + std::time::Duration::from_secs(30))
        .build()?;
    let bot = Bot::with_client(config::BOT_TOKEN.as_str(), client);

    match config::bot_api::local_url() {
        Some(bot_api_url) => {
            log::info!("Using custom Bot API URL: {}", bot_api_url);
            let url = Url::parse(&bot_api_url).map_err(|e| anyhow::anyhow!("Invalid BOT_API_URL: {}", e))?;
            Ok(bot.set_api_url(url))
        }
        None => Ok(bot),
    }
}

/// Sets up bot commands in Telegram UI
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(Command::bot_commands()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_descriptions() {
        let descriptions = Command::descriptions().to_string();
        assert!(descriptions.contains("fits into this chat"));
        for name in ["/youtube", "/facebook", "/instagram", "/tiktok", "/audio", "/cancel"] {
            assert!(descriptions.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse("/youtube https://youtu.be/abc 720p", "mediadrop_bot").unwrap(),
            Command::Youtube("https://youtu.be/abc 720p".to_string())
        );
        assert_eq!(Command::parse("/cancel", "mediadrop_bot").unwrap(), Command::Cancel);
    }

    #[test]
    fn test_media_args_with_quality() {
        let args = parse_media_args("https://www.youtube.com/watch?v=abc 720p", Some(Platform::YouTube)).unwrap();
        assert_eq!(args.platform, Platform::YouTube);
        assert_eq!(args.tier, Some(720));

        let args = parse_media_args("https://vm.tiktok.com/ZM123/", Some(Platform::TikTok)).unwrap();
        assert_eq!(args.tier, None);
    }

    #[test]
    fn test_media_args_rejects_wrong_platform() {
        let err = parse_media_args("https://www.tiktok.com/@u/video/1", Some(Platform::YouTube)).unwrap_err();
        assert!(err.to_string().contains("not a youtube link"));
    }

    #[test]
    fn test_audio_detects_platform() {
        let args = parse_media_args("https://www.instagram.com/reel/xyz/ 128k", None).unwrap();
        assert_eq!(args.platform, Platform::Instagram);
        assert_eq!(args.tier, Some(128));

        assert!(parse_media_args("https://example.com/video.mp4", None).is_err());
    }

    #[test]
    fn test_media_args_validation() {
        assert!(parse_media_args("", Some(Platform::YouTube)).is_err());
        assert!(parse_media_args("not a url", Some(Platform::YouTube)).is_err());
        assert!(parse_media_args("ftp://youtube.com/x", Some(Platform::YouTube)).is_err());
        assert!(parse_media_args("https://youtu.be/abc 0p", Some(Platform::YouTube)).is_err());
        assert!(parse_media_args("https://youtu.be/abc best", Some(Platform::YouTube)).is_err());
        assert!(parse_media_args("https://youtu.be/abc 720 extra", Some(Platform::YouTube)).is_err());

        let long = format!("https://youtu.be/{}", "a".repeat(config::validation::MAX_URL_LENGTH));
        assert!(parse_media_args(&long, Some(Platform::YouTube)).is_err());
    }
}
