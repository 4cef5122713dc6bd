//! yt-dlp progress parsing and throttling.

use crate::download::source::SourceProgress;

/// Parses progress from a yt-dlp output line.
///
/// Example: `[download]  45.2% of ~10.00MiB at 500.00KiB/s ETA 00:10`
pub fn parse_progress(line: &str) -> Option<SourceProgress> {
    if !line.contains("[download]") {
        return None;
    }

    // "[download] Destination: ..." and friends
    if !line.contains('%') {
        log::trace!("Download line without percent: {}", line);
        return None;
    }

    let mut percent = None;
    let mut speed_bytes_sec = None;
    let mut eta_seconds = None;
    let mut total_bytes = None;

    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if part.ends_with('%') {
            if let Ok(p) = part.trim_end_matches('%').parse::<f32>() {
                // Clamp so garbage never jumps straight to 100%
                percent = Some(p.clamp(0.0, 100.0) as u8);
            }
        }

        let next = parts.get(i + 1).copied();
        match (*part, next) {
            // estimates print as "of ~  95.37MiB" for fragmented downloads
            ("of", Some("~")) => total_bytes = parts.get(i + 2).and_then(|size| parse_size(size)),
            ("of", Some(size)) => total_bytes = parse_size(size),
            ("at", Some(speed)) => speed_bytes_sec = parse_size(speed).map(|b| b as f64),
            ("ETA", Some(eta)) => eta_seconds = parse_eta(eta),
            _ => {}
        }
    }

    let percent = percent?;
    let downloaded_bytes = total_bytes.map(|total| (total as f64 * (percent as f64 / 100.0)) as u64);

    Some(SourceProgress {
        percent,
        speed_bytes_sec,
        eta_seconds,
        downloaded_bytes,
        total_bytes,
    })
}

/// Parses a size like `10.00MiB`, `~1.5GiB`, `500.00KiB/s` or `812B`.
pub fn parse_size(size_str: &str) -> Option<u64> {
    let s = size_str.trim_start_matches('~').trim_end_matches("/s");
    let (number, multiplier) = if let Some(n) = s.strip_suffix("GiB") {
        (n, 1024.0 * 1024.0 * 1024.0)
    } else if let Some(n) = s.strip_suffix("MiB") {
        (n, 1024.0 * 1024.0)
    } else if let Some(n) = s.strip_suffix("KiB") {
        (n, 1024.0)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1.0)
    } else {
        return None;
    };
    number.parse::<f64>().ok().map(|v| (v * multiplier) as u64)
}

/// Parses an ETA like `00:10`, `1:23` or `1:02:03`.
pub fn parse_eta(eta_str: &str) -> Option<u64> {
    let parts: Vec<u64> = eta_str
        .split(':')
        .map(|p| p.parse::<u64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [m, s] => Some(m * 60 + s),
        [h, m, s] => Some(h * 3600 + m * 60 + s),
        _ => None,
    }
}

/// Lets through one update per `step` percent so chat messages are not edited on every line.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    step: u8,
    last_percent: Option<u8>,
}

impl ProgressThrottle {
    pub fn new(step: u8) -> Self {
        Self {
            step: step.max(1),
            last_percent: None,
        }
    }

    pub fn should_emit(&mut self, percent: u8) -> bool {
        let emit = match self.last_percent {
            None => true,
            Some(last) if percent < last => true,
            Some(last) => percent - last >= self.step || (percent == 100 && last != 100),
        };
        if emit {
            self.last_percent = Some(percent);
        }
        emit
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(5)
    }
}
