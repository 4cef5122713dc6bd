use thiserror::Error;

/// Centralized infrastructure error type.
///
/// Pipeline-level outcomes (fallback exhaustion, delivery failure) have their own
/// typed errors in `crate::download`; this enum covers everything underneath them:
/// process spawning, file I/O, JSON decoding and command validation.
///
/// # Example
///
/// ```no_run
/// use mediadrop::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Download/yt-dlp errors
    #[error("Download error: {0}")]
    Download(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding errors (yt-dlp probe output)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Label used for the `errors_total` metric.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Download(_) => "download",
            AppError::Io(_) => "io",
            AppError::Json(_) => "json",
            AppError::Validation(_) => "validation",
        }
    }
}
