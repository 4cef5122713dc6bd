//! Small formatting helpers shared by the pipeline and the Telegram layer.

/// Formats a byte count as megabytes with two decimals, e.g. `12.50 MB`.
pub fn format_size_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Formats a duration in seconds as `m:ss` or `h:mm:ss`.
///
/// # Example
///
/// ```
/// use mediadrop::core::utils::format_duration;
///
/// assert_eq!(format_duration(65), "1:05");
/// assert_eq!(format_duration(3725), "1:02:05");
/// ```
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Caption attached to a delivered file: title plus duration when known.
pub fn format_media_caption(title: Option<&str>, duration_secs: Option<u64>) -> String {
    let title = title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or("Untitled");
    match duration_secs {
        Some(d) => format!("{} ({})", title, format_duration(d)),
        None => title.to_string(),
    }
}

/// Truncates a string to at most `max_chars` characters, appending `…` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_mb() {
        assert_eq!(format_size_mb(50 * 1024 * 1024), "50.00 MB");
        assert_eq!(format_size_mb(0), "0.00 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(3600), "1:00:00");
    }

    #[test]
    fn test_format_media_caption() {
        assert_eq!(format_media_caption(Some("Song"), Some(125)), "Song (2:05)");
        assert_eq!(format_media_caption(Some("  "), None), "Untitled");
        assert_eq!(format_media_caption(None, Some(5)), "Untitled (0:05)");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello world", 6), "hello…");
        assert_eq!(truncate_chars("привет мир", 7), "привет…");
    }
}
