//! yt-dlp error analysis
//!
//! Maps yt-dlp's stderr onto the attempt failure taxonomy the fallback
//! controller understands.

use crate::download::error::AttemptFailure;

/// yt-dlp error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YtDlpErrorType {
    /// `--max-filesize` aborted the download
    SizeLimit,
    /// Private, removed or otherwise gone
    VideoUnavailable,
    /// Account/cookies needed to see the media
    LoginRequired,
    /// Blocked in the server's region
    GeoBlocked,
    /// No format matches the selector for this tier
    FormatUnavailable,
    /// No extractor for this URL
    UnsupportedUrl,
    /// Platform flagged the request as automated
    BotDetection,
    /// HTTP 429 or similar throttling
    RateLimited,
    /// Timeouts, resets, DNS, 5xx
    NetworkError,
    /// Unknown error
    Unknown,
}

/// Analyzes yt-dlp stderr and determines the error type.
pub fn analyze_ytdlp_error(stderr: &str) -> YtDlpErrorType {
    let stderr_lower = stderr.to_lowercase();

    if is_size_limit_line(&stderr_lower) {
        return YtDlpErrorType::SizeLimit;
    }

    if stderr_lower.contains("requested format is not available")
        || stderr_lower.contains("no video formats found")
        || stderr_lower.contains("format not available")
    {
        return YtDlpErrorType::FormatUnavailable;
    }

    if stderr_lower.contains("unsupported url") || stderr_lower.contains("no suitable extractor") {
        return YtDlpErrorType::UnsupportedUrl;
    }

    if stderr_lower.contains("not available in your country")
        || stderr_lower.contains("geo restricted")
        || stderr_lower.contains("geo-restricted")
        || stderr_lower.contains("blocked it in your country")
    {
        return YtDlpErrorType::GeoBlocked;
    }

    // Checked before login: this message also asks to sign in
    if stderr_lower.contains("sign in to confirm you're not a bot") || stderr_lower.contains("bot detection") {
        return YtDlpErrorType::BotDetection;
    }

    if stderr_lower.contains("login required")
        || stderr_lower.contains("requires login")
        || stderr_lower.contains("log in to")
        || stderr_lower.contains("sign in to confirm your age")
        || stderr_lower.contains("use --cookies")
    {
        return YtDlpErrorType::LoginRequired;
    }

    if stderr_lower.contains("private video")
        || stderr_lower.contains("video unavailable")
        || stderr_lower.contains("this video is not available")
        || stderr_lower.contains("video is private")
        || stderr_lower.contains("has been removed")
        || stderr_lower.contains("does not exist")
        || stderr_lower.contains("http error 404")
        || stderr_lower.contains("http error 410")
        || stderr_lower.contains("http error 403")
        || stderr_lower.contains("this content isn't available")
    {
        return YtDlpErrorType::VideoUnavailable;
    }

    if stderr_lower.contains("http error 429") || stderr_lower.contains("too many requests") {
        return YtDlpErrorType::RateLimited;
    }

    if stderr_lower.contains("timed out")
        || stderr_lower.contains("timeout")
        || stderr_lower.contains("connection reset")
        || stderr_lower.contains("connection refused")
        || stderr_lower.contains("connection aborted")
        || stderr_lower.contains("temporary failure in name resolution")
        || stderr_lower.contains("network is unreachable")
        || stderr_lower.contains("http error 5")
        || stderr_lower.contains("incompleteread")
    {
        return YtDlpErrorType::NetworkError;
    }

    YtDlpErrorType::Unknown
}

/// True for yt-dlp's "File is larger than max-filesize" notice, which it prints
/// on stdout and exits 0 after.
pub fn is_size_limit_line(line: &str) -> bool {
    let line = line.to_lowercase();
    line.contains("larger than max-filesize") || line.contains("max-filesize exceeded")
}

/// Short human-readable reason for the error type.
pub fn describe(error_type: YtDlpErrorType) -> &'static str {
    match error_type {
        YtDlpErrorType::SizeLimit => "file is larger than the allowed size",
        YtDlpErrorType::VideoUnavailable => "media is private, removed or unavailable",
        YtDlpErrorType::LoginRequired => "media requires login",
        YtDlpErrorType::GeoBlocked => "media is blocked in this region",
        YtDlpErrorType::FormatUnavailable => "requested quality is not available",
        YtDlpErrorType::UnsupportedUrl => "link is not supported",
        YtDlpErrorType::BotDetection => "platform blocked the request",
        YtDlpErrorType::RateLimited => "platform is rate limiting requests",
        YtDlpErrorType::NetworkError => "network error while downloading",
        YtDlpErrorType::Unknown => "download failed",
    }
}

/// Last `ERROR:` line of stderr, or its last non-empty line.
pub fn last_error_line(stderr: &str) -> Option<&str> {
    let all: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    all.iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| all.last())
        .copied()
}

/// Classifies a failed yt-dlp run.
///
/// Unknown errors are treated as source-unavailable with the last stderr line as
/// reason, so the ladder keeps descending instead of stalling.
pub fn classify_failure(stderr: &str, ceiling_bytes: u64) -> AttemptFailure {
    let error_type = analyze_ytdlp_error(stderr);
    match error_type {
        YtDlpErrorType::SizeLimit => AttemptFailure::QuotaExceeded {
            ceiling: ceiling_bytes,
            actual: None,
        },
        YtDlpErrorType::BotDetection | YtDlpErrorType::RateLimited | YtDlpErrorType::NetworkError => {
            AttemptFailure::Transient(describe(error_type).to_string())
        }
        YtDlpErrorType::Unknown => {
            let reason = last_error_line(stderr)
                .map(|l| crate::core::utils::truncate_chars(l.trim_start_matches("ERROR:").trim(), 200))
                .unwrap_or_else(|| describe(error_type).to_string());
            AttemptFailure::SourceUnavailable(reason)
        }
        _ => AttemptFailure::SourceUnavailable(describe(error_type).to_string()),
    }
}
