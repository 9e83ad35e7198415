// Error types for the acquisition pipeline

use std::path::PathBuf;

use thiserror::Error;

use super::diagnostics::{diagnose_error, FailureReason};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// No strategy can handle this URL
    #[error("unsupported URL: {0}")]
    Unsupported(String),

    /// Resource missing, private, deleted or otherwise inaccessible
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Remote side throttled or blocked the request (429, bot checks, 403)
    #[error("rate limited: {0}")]
    QuotaOrRateLimited(String),

    /// Socket, page-load or per-attempt wall clock timeout
    #[error("network timeout: {0}")]
    NetworkTimeout(String),

    /// Strategy reported success but no usable file could be located
    #[error("artifact missing after download: {}", .0.display())]
    ArtifactMissingAfterDownload(PathBuf),

    /// External tool or engine could not be started
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Any other tool failure
    #[error("download failed: {0}")]
    Failed(String),
}

impl DownloadError {
    /// Only transient conditions are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout(_) | Self::CapabilityUnavailable(_)
        )
    }

    /// Message for the delivery collaborator, distinct per class.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unsupported(_) => "This link is not supported.",
            Self::NotFound(_) => {
                "The content could not be found. It may be private, deleted or region-locked."
            }
            Self::QuotaOrRateLimited(_) => {
                "The platform is limiting requests right now. Please try again later."
            }
            Self::NetworkTimeout(_) => "The platform did not respond in time. Please try again.",
            Self::ArtifactMissingAfterDownload(_) => {
                "The download finished but the file could not be located."
            }
            Self::CapabilityUnavailable(_) => {
                "A required download tool is unavailable at the moment."
            }
            Self::Failed(_) => "The download failed.",
        }
    }
}

/// Failure of a single transcoder invocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscodeError {
    #[error("failed to start {tool}: {message}")]
    Spawn { tool: String, message: String },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("transcoder produced no output at {}", .0.display())]
    EmptyOutput(PathBuf),
}

fn classify(reason: FailureReason, message: String) -> DownloadError {
    match reason {
        FailureReason::UnsupportedUrl => DownloadError::Unsupported(message),
        FailureReason::PrivateContent
        | FailureReason::ContentUnavailable
        | FailureReason::AgeRestricted
        | FailureReason::GeoBlocked
        | FailureReason::DrmProtected => DownloadError::NotFound(message),
        FailureReason::RateLimited | FailureReason::BotDetection | FailureReason::Forbidden => {
            DownloadError::QuotaOrRateLimited(message)
        }
        FailureReason::NetworkTimeout => DownloadError::NetworkTimeout(message),
        FailureReason::ToolMissing => DownloadError::CapabilityUnavailable(message),
        FailureReason::Unknown => DownloadError::Failed(message),
    }
}

// Tool stderr is classified by pattern; see diagnostics.rs
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let reason = diagnose_error(&s).unwrap_or(FailureReason::Unknown);
        classify(reason, first_error_line(&s))
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => Self::NetworkTimeout(err.to_string()),
            std::io::ErrorKind::NotFound => Self::CapabilityUnavailable(err.to_string()),
            _ => Self::Failed(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return Self::NetworkTimeout(err.to_string());
        }
        match err.status().map(|s| s.as_u16()) {
            Some(404) | Some(410) => Self::NotFound(err.to_string()),
            Some(403) | Some(429) => Self::QuotaOrRateLimited(err.to_string()),
            _ => Self::Failed(err.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for DownloadError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::NetworkTimeout(err.to_string())
    }
}

/// yt-dlp prints warnings before the actual `ERROR:` line.
fn first_error_line(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| output.lines().map(str::trim).find(|line| !line.is_empty()))
        .unwrap_or("no output")
        .to_string()
}
