//! Media source backed by yt-dlp.
//!
//! One implementation serves every platform; the `Platform` only decides which
//! URLs are claimed and which extractor arguments are added.

use crate::core::config;
use crate::core::error::AppError;
use crate::download::error::AttemptFailure;
use crate::download::ladder::{FormatConstraint, QualityCandidate, Tier};
use crate::download::progress::parse_progress;
use crate::download::request::MediaKind;
use crate::download::source::{FetchRequest, MediaSource, Platform, ProbeResult, SourceProgress};
use crate::download::ytdlp_errors::{classify_failure, is_size_limit_line};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use url::Url;

/// How many trailing stderr lines are kept for error classification.
const STDERR_TAIL_LINES: usize = 200;

/// Overhead (percent) added to yt-dlp's size estimate for muxing/conversion.
const SIZE_ESTIMATE_OVERHEAD_PERCENT: u64 = 15;

/// Media source powered by yt-dlp.
pub struct YtDlpSource {
    platform: Platform,
    binary: String,
    name: String,
}

impl YtDlpSource {
    pub fn new(platform: Platform) -> Self {
        Self::with_binary(platform, config::YTDL_BIN.clone())
    }

    pub fn with_binary(platform: Platform, binary: impl Into<String>) -> Self {
        Self {
            platform,
            binary: binary.into(),
            name: format!("yt-dlp:{}", platform),
        }
    }

    /// Extra arguments a platform's extractor needs.
    fn platform_args(&self) -> Vec<String> {
        match self.platform {
            Platform::YouTube => vec![
                "--extractor-args".to_string(),
                "youtube:player_client=android,web".to_string(),
            ],
            Platform::Instagram | Platform::Facebook => vec![
                "--add-header".to_string(),
                format!("Referer:https://www.{}.com/", self.platform),
            ],
            Platform::TikTok | Platform::Generic => Vec::new(),
        }
    }

    /// Arguments for one fetch attempt, URL last.
    pub fn build_fetch_args(&self, request: &FetchRequest) -> Vec<String> {
        let template = output_template(&request.output_path);
        let mut args: Vec<String> = vec![
            "-o".into(),
            template,
            "--newline".into(),
            "--no-playlist".into(),
            "--force-overwrites".into(),
            "--no-mtime".into(),
            "--socket-timeout".into(),
            "30".into(),
            "--retries".into(),
            "2".into(),
            "--fragment-retries".into(),
            "3".into(),
            "--max-filesize".into(),
            request.ceiling_bytes.to_string(),
            "-f".into(),
            format_selector(&request.candidate),
        ];

        match request.candidate.kind {
            MediaKind::Video => {
                args.extend([
                    "--merge-output-format".into(),
                    "mp4".into(),
                    "--postprocessor-args".into(),
                    "Merger:-movflags +faststart".into(),
                ]);
                if request.candidate.format == FormatConstraint::AnyContainer {
                    args.extend(["--remux-video".into(), "mp4".into()]);
                }
            }
            MediaKind::Audio => {
                args.extend([
                    "--extract-audio".into(),
                    "--audio-format".into(),
                    "mp3".into(),
                    "--audio-quality".into(),
                    audio_quality(request.candidate.tier),
                ]);
            }
        }

        args.extend(self.platform_args());
        args.push(request.url.to_string());
        args
    }

    fn build_probe_args(&self, url: &Url) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--dump-single-json".into(),
            "--skip-download".into(),
            "--no-playlist".into(),
            "--no-warnings".into(),
            "--socket-timeout".into(),
            "10".into(),
        ];
        args.extend(self.platform_args());
        args.push(url.to_string());
        args
    }
}

/// yt-dlp format selector for a ladder candidate.
///
/// Video rungs prefer H.264/AAC so Telegram can play the result inline.
pub fn format_selector(candidate: &QualityCandidate) -> String {
    match (candidate.kind, candidate.tier) {
        (MediaKind::Video, Tier::Level(h)) => format!(
            "bv*[height<={h}][vcodec^=avc1]+ba[acodec^=mp4a]/bv*[height<={h}][ext=mp4]+ba[ext=m4a]/b[height<={h}][ext=mp4]/b[height<={h}]"
        ),
        (MediaKind::Video, Tier::Lowest) => "wv*+wa/w".to_string(),
        (MediaKind::Audio, Tier::Level(_)) => "ba/b".to_string(),
        (MediaKind::Audio, Tier::Lowest) => "wa/w".to_string(),
    }
}

/// `--audio-quality` value: a bitrate for explicit rungs, the smallest VBR setting for the sentinel.
fn audio_quality(tier: Tier) -> String {
    match tier {
        Tier::Level(kbps) => format!("{}K", kbps),
        Tier::Lowest => "9".to_string(),
    }
}

/// `<dir>/<stem>.%(ext)s` so yt-dlp keeps our stem whatever container it produces.
fn output_template(output_path: &Path) -> String {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mediadrop".to_string());
    let dir = output_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{}.%(ext)s", stem)).to_string_lossy().into_owned()
}

/// Parses `--dump-single-json` output into a probe result.
pub fn parse_probe_json(json: &str) -> Result<ProbeResult, AppError> {
    let info: YtDlpInfo = serde_json::from_str(json)?;

    let title = info
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let duration_secs = info.duration.filter(|d| *d > 0.0).map(|d| d.round() as u64);

    // Merged formats report their parts separately
    let requested: Option<u64> = info
        .requested_formats
        .as_ref()
        .and_then(|formats| formats.iter().map(YtDlpFormat::size).sum::<Option<u64>>());

    let estimated_size = info
        .format
        .size()
        .or(requested)
        .map(|size| size.saturating_add(size / 100 * SIZE_ESTIMATE_OVERHEAD_PERCENT));

    Ok(ProbeResult {
        title,
        duration_secs,
        estimated_size,
    })
}

/// The subset of `yt-dlp --dump-json` output the prober reads.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    #[serde(flatten)]
    format: YtDlpFormat,
    requested_formats: Option<Vec<YtDlpFormat>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

impl YtDlpFormat {
    fn size(&self) -> Option<u64> {
        self.filesize
            .or(self.filesize_approx)
            .filter(|s| *s > 0.0)
            .map(|s| s as u64)
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_url(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        match self.platform {
            Platform::Generic => {
                // Direct file links are not pages yt-dlp can extract
                let path = url.path().to_lowercase();
                !matches!(
                    path.rsplit('.').next(),
                    Some("zip" | "rar" | "pdf" | "exe" | "apk" | "dmg" | "iso")
                )
            }
            platform => platform.matches(url),
        }
    }

    async fn probe(&self, url: &Url) -> Result<ProbeResult, AppError> {
        let args = self.build_probe_args(url);
        log::debug!("yt-dlp probe: {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Download(format!(
                "probe failed: {}",
                crate::download::ytdlp_errors::last_error_line(&stderr).unwrap_or("unknown error")
            )));
        }

        let probe = parse_probe_json(&String::from_utf8_lossy(&output.stdout))?;
        log::info!(
            "Probed {}: title={:?}, duration={:?}s, estimated={:?} B",
            url,
            probe.title,
            probe.duration_secs,
            probe.estimated_size
        );
        Ok(probe)
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        progress_tx: mpsc::UnboundedSender<SourceProgress>,
    ) -> Result<PathBuf, AttemptFailure> {
        let args = self.build_fetch_args(request);
        log::debug!("yt-dlp command for {} fetch: {} {}", request.candidate, self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AttemptFailure::Transient(format!("failed to start {}: {}", self.binary, e)))?;

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::debug!("yt-dlp stderr: {}", line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Vec::from(tail).join("\n")
            })
        });

        let mut size_limit_hit: Option<Option<u64>> = None;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::trace!("yt-dlp stdout: {}", line);
                if is_size_limit_line(&line) {
                    size_limit_hit = Some(None);
                    break;
                }
                if let Some(progress) = parse_progress(&line) {
                    if let Some(total) = progress.total_bytes.filter(|t| *t > request.ceiling_bytes) {
                        log::info!(
                            "{} announced {} B, over the {} B ceiling; aborting transfer",
                            request.candidate,
                            total,
                            request.ceiling_bytes
                        );
                        size_limit_hit = Some(Some(total));
                        break;
                    }
                    let _ = progress_tx.send(progress);
                }
            }
        }

        if let Some(actual) = size_limit_hit {
            if let Err(e) = child.kill().await {
                log::warn!("Failed to kill yt-dlp after size limit: {}", e);
            }
            return Err(AttemptFailure::QuotaExceeded {
                ceiling: request.ceiling_bytes,
                actual,
            });
        }

        let status = child
            .wait()
            .await
            .map_err(|e| AttemptFailure::Transient(format!("yt-dlp process failed: {}", e)))?;

        let stderr_text = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            let failure = classify_failure(&stderr_text, request.ceiling_bytes);
            log::warn!("yt-dlp exited with {} for {}: {}", status, request.candidate, failure);
            return Err(failure);
        }

        Ok(request.output_path.clone())
    }
}
