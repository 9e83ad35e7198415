// Failure diagnostics - identifies why an extraction tool gave up
//
// Analyzes tool output to determine the failure class. The result feeds
// `DownloadError::from(String)`; patterns are checked in order of
// specificity so that e.g. "command not found" never reads as a 404.

use serde::{Deserialize, Serialize};

/// Reasons why a platform or tool refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Extractor has no handler for this URL
    UnsupportedUrl,

    /// External binary missing or not executable
    ToolMissing,

    /// DRM-protected content, cannot be downloaded
    DrmProtected,

    /// Private post or video requiring authorization
    PrivateContent,

    /// Age-restricted content requiring login
    AgeRestricted,

    /// Deleted, removed or never existed
    ContentUnavailable,

    /// Geographic restriction
    GeoBlocked,

    /// Rate limiting (429 or similar)
    RateLimited,

    /// Bot detection or login wall
    BotDetection,

    /// HTTP 403 Forbidden - general access denied
    Forbidden,

    /// Network timeout (soft IP block or slow CDN)
    NetworkTimeout,

    /// Generic/unknown failure
    Unknown,
}

impl FailureReason {
    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::UnsupportedUrl => "Unsupported URL",
            Self::ToolMissing => "Extraction tool missing",
            Self::DrmProtected => "DRM-protected content",
            Self::PrivateContent => "Private content",
            Self::AgeRestricted => "Age-restricted content",
            Self::ContentUnavailable => "Content unavailable",
            Self::GeoBlocked => "Geographic restriction",
            Self::RateLimited => "Rate limited",
            Self::BotDetection => "Bot detection triggered",
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::NetworkTimeout => "Network timeout",
            Self::Unknown => "Unknown failure",
        }
    }
}

/// Analyze tool output and return the failure reason
pub fn diagnose_error(error: &str) -> Option<FailureReason> {
    let lower = error.to_lowercase();

    if lower.contains("unsupported url") || lower.contains("no suitable extractor") {
        return Some(FailureReason::UnsupportedUrl);
    }

    // Only launch failures; a missing output path is not a missing tool
    if lower.contains("command not found")
        || lower.contains("executable not found")
        || lower.contains("cannot find binary path")
        || lower.contains("failed to spawn")
        || lower.contains("failed to start")
    {
        return Some(FailureReason::ToolMissing);
    }

    if lower.contains("drm")
        || lower.contains("widevine")
        || lower.contains("encrypted media")
        || lower.contains("requires purchase")
    {
        return Some(FailureReason::DrmProtected);
    }

    if lower.contains("private video")
        || lower.contains("video is private")
        || lower.contains("this account is private")
        || lower.contains("access restricted")
    {
        return Some(FailureReason::PrivateContent);
    }

    if lower.contains("age-restricted")
        || lower.contains("sign in to confirm your age")
        || lower.contains("age_verification")
    {
        return Some(FailureReason::AgeRestricted);
    }

    if lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("no longer available")
        || lower.contains("has been deleted")
        || lower.contains("does not exist")
        || lower.contains("http error 404")
        || lower.contains("404: not found")
        || lower.contains("no video could be found")
    {
        return Some(FailureReason::ContentUnavailable);
    }

    if lower.contains("not available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geo restriction")
        || lower.contains("geo-restricted")
    {
        return Some(FailureReason::GeoBlocked);
    }

    if lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("rate-limit")
        || lower.contains("too many requests")
    {
        return Some(FailureReason::RateLimited);
    }

    if lower.contains("not a bot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
        || lower.contains("login required")
        || lower.contains("login_required")
        || lower.contains("checkpoint_required")
    {
        return Some(FailureReason::BotDetection);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(FailureReason::Forbidden);
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("network unreachable")
        || lower.contains("temporary failure in name resolution")
    {
        return Some(FailureReason::NetworkTimeout);
    }

    if !error.trim().is_empty() {
        return Some(FailureReason::Unknown);
    }

    None
}
