use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Configuration constants for the bot
/// Cached yt-dlp binary path
/// Read once at startup from YTDL_BIN environment variable or defaults to "yt-dlp"
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// Scratch directory for in-flight download artifacts
/// Read from TEMP_FILES_DIR environment variable
/// Defaults to /tmp, supports tilde (~) expansion
pub static TEMP_FILES_DIR: Lazy<String> =
    Lazy::new(|| env::var("TEMP_FILES_DIR").unwrap_or_else(|_| "/tmp".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: app.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "app.log".to_string()));

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Download configuration
pub mod download {
    use super::{env_parse, Duration, Lazy};

    /// Timeout for the metadata probe (in seconds)
    /// Read from PROBE_TIMEOUT_SECS. Default: 8
    pub static PROBE_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| env_parse("PROBE_TIMEOUT_SECS", 8));

    /// Timeout for a single retrieval attempt (in seconds)
    /// Read from ATTEMPT_TIMEOUT_SECS. Default: 240 (4 minutes)
    pub static ATTEMPT_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| env_parse("ATTEMPT_TIMEOUT_SECS", 240));

    /// Wall-clock budget for a whole request: probe + every ladder attempt + every upload retry
    /// Read from REQUEST_BUDGET_SECS. Default: 900 (15 minutes)
    pub static REQUEST_BUDGET_SECS: Lazy<u64> = Lazy::new(|| env_parse("REQUEST_BUDGET_SECS", 900));

    /// Starting video tier when the user does not request one
    /// Read from DEFAULT_VIDEO_TIER. Default: 360
    pub static DEFAULT_VIDEO_TIER: Lazy<u32> = Lazy::new(|| env_parse("DEFAULT_VIDEO_TIER", 360));

    pub fn probe_timeout() -> Duration {
        Duration::from_secs(*PROBE_TIMEOUT_SECS)
    }

    pub fn attempt_timeout() -> Duration {
        Duration::from_secs(*ATTEMPT_TIMEOUT_SECS)
    }

    pub fn request_budget() -> Duration {
        Duration::from_secs(*REQUEST_BUDGET_SECS)
    }
}

/// Delivery (upload) retry configuration
pub mod delivery {
    use super::{env_parse, Duration, Lazy};

    /// Total upload attempts per artifact, first one included
    /// Read from DELIVERY_MAX_ATTEMPTS. Default: 3
    pub static MAX_ATTEMPTS: Lazy<u32> = Lazy::new(|| env_parse("DELIVERY_MAX_ATTEMPTS", 3));

    /// Delay before the first retry (in milliseconds), doubled on every retry
    pub const BASE_DELAY_MS: u64 = 2_000;

    /// Upper bound for a single backoff delay (in seconds)
    pub const MAX_DELAY_SECS: u64 = 30;

    /// Base for exponential backoff calculation
    pub const EXPONENTIAL_BACKOFF_BASE: f64 = 2.0;

    /// Timeout for one upload attempt (in seconds)
    /// Read from UPLOAD_TIMEOUT_SECS. Default: 300
    pub static UPLOAD_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| env_parse("UPLOAD_TIMEOUT_SECS", 300));

    pub fn base_delay() -> Duration {
        Duration::from_millis(BASE_DELAY_MS)
    }

    pub fn max_delay() -> Duration {
        Duration::from_secs(MAX_DELAY_SECS)
    }

    pub fn upload_timeout() -> Duration {
        Duration::from_secs(*UPLOAD_TIMEOUT_SECS)
    }
}

/// Validation configuration
pub mod validation {
    /// Maximum upload size for the public Telegram Bot API (50 MB)
    pub const MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024;

    /// Maximum upload size for a local Bot API server (2 GB)
    pub const LOCAL_API_MAX_FILE_SIZE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

    /// Maximum URL length accepted from chat commands
    pub const MAX_URL_LENGTH: usize = 2048;

    /// Hard payload limit of the delivery channel.
    ///
    /// If BOT_API_URL is set and not pointing to api.telegram.org, a local Bot API
    /// server is assumed and the larger limit applies.
    pub fn max_upload_bytes() -> u64 {
        match super::bot_api::local_url() {
            Some(url) => {
                log::debug!("Local Bot API server detected ({}), using 2 GB upload limit", url);
                LOCAL_API_MAX_FILE_SIZE_BYTES
            }
            None => MAX_FILE_SIZE_BYTES,
        }
    }
}

/// Bot API server configuration utilities
pub mod bot_api {
    /// Returns the Bot API URL if a local server is configured.
    pub fn local_url() -> Option<String> {
        std::env::var("BOT_API_URL")
            .ok()
            .filter(|url| !url.is_empty() && !url.contains("api.telegram.org"))
    }
}
