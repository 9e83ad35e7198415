// Pipeline configuration
//
// Every knob has a default; `from_env` and `from_json_file` only override
// what they find. Durations are stored as plain integers so the JSON file
// stays hand-editable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Retry policy for a single strategy call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay unit; attempt `n` waits `base_delay * 2^n` before the next try
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Independent timeouts for every external capability call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Wall clock for one strategy attempt
    pub attempt_secs: u64,
    /// Socket timeout handed to yt-dlp and the HTTP client
    pub socket_secs: u64,
    pub page_load_secs: u64,
    pub script_secs: u64,
    /// yt-dlp metadata dumps and ffprobe calls
    pub metadata_secs: u64,
    /// ffmpeg segment/concat/compress calls
    pub transcode_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attempt_secs: 300,
            socket_secs: 30,
            page_load_secs: 30,
            script_secs: 20,
            metadata_secs: 30,
            transcode_secs: 600,
        }
    }
}

impl TimeoutConfig {
    pub fn attempt(&self) -> Duration {
        Duration::from_secs(self.attempt_secs)
    }

    pub fn socket(&self) -> Duration {
        Duration::from_secs(self.socket_secs)
    }

    pub fn page_load(&self) -> Duration {
        Duration::from_secs(self.page_load_secs)
    }

    pub fn script(&self) -> Duration {
        Duration::from_secs(self.script_secs)
    }

    pub fn metadata(&self) -> Duration {
        Duration::from_secs(self.metadata_secs)
    }

    pub fn transcode(&self) -> Duration {
        Duration::from_secs(self.transcode_secs)
    }
}

/// Preferred video codec, audio codec and container for tiered format chains.
///
/// Prefixes are matched against yt-dlp's `vcodec`/`acodec`/`ext` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecPreference {
    pub video: String,
    pub audio: String,
    pub container: String,
}

impl Default for CodecPreference {
    fn default() -> Self {
        Self {
            video: "avc1".to_string(),
            audio: "mp4a".to_string(),
            container: "mp4".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramApiConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl Default for InstagramApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://apihut.in/api/download/videos".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VkConfig {
    pub endpoint: String,
    pub access_token: Option<String>,
    pub api_version: String,
}

impl Default for VkConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.vk.com/method".to_string(),
            access_token: None,
            api_version: "5.199".to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Shared download directory; job files carry a job-scoped suffix
    pub download_dir: PathBuf,
    /// Parent of the `merge-*` scratch directories
    pub work_dir: PathBuf,
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
    pub progress_interval_ms: u64,
    pub request_ttl_secs: u64,
    /// Quality choices below this height are hidden when taller ones exist
    pub min_quality_height: u32,
    pub codec_preference: CodecPreference,
    pub photo_segment_secs: f64,
    /// Merged output above this size goes through the compress pass
    pub merge_size_ceiling_mb: u64,
    pub compress_target_mb: u64,
    /// Hard limit of the delivery channel
    pub delivery_size_ceiling_mb: u64,
    /// Per-file cap for direct HTTP downloads
    pub max_download_bytes: u64,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub instagram_api: InstagramApiConfig,
    pub vk: VkConfig,
    /// Nitter front-end tried before the browser for X/Twitter posts
    pub nitter_url: String,
    /// Upper bound on concurrent blocking work (subprocesses, browsers, scans)
    pub worker_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let base = dirs::cache_dir()
            .map(|dir| dir.join("mediagrab"))
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            download_dir: base.join("downloads"),
            work_dir: base.join("work"),
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            progress_interval_ms: 300,
            request_ttl_secs: 15 * 60,
            min_quality_height: 360,
            codec_preference: CodecPreference::default(),
            photo_segment_secs: 3.0,
            merge_size_ceiling_mb: 50,
            compress_target_mb: 45,
            delivery_size_ceiling_mb: 2000,
            max_download_bytes: 2 * 1024 * 1024 * 1024,
            proxy: None,
            ytdlp_path: None,
            ffmpeg_path: None,
            ffprobe_path: None,
            chrome_path: None,
            headless: true,
            instagram_api: InstagramApiConfig::default(),
            vk: VkConfig::default(),
            nitter_url: "https://nitter.net".to_string(),
            worker_threads: 4,
        }
    }
}

impl PipelineConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn request_ttl(&self) -> Duration {
        Duration::from_secs(self.request_ttl_secs)
    }

    pub fn photo_segment_duration(&self) -> Duration {
        Duration::from_secs_f64(self.photo_segment_secs.max(0.1))
    }

    pub fn merge_size_ceiling_bytes(&self) -> u64 {
        self.merge_size_ceiling_mb * 1024 * 1024
    }

    pub fn delivery_size_ceiling_bytes(&self) -> u64 {
        self.delivery_size_ceiling_mb * 1024 * 1024
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.retry = RetryConfig {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
        };
        self
    }

    pub fn with_worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Read a JSON file; missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults overridden by process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Override fields from a variable lookup. Only deployment-specific
    /// knobs live here; tuning values come from the JSON file.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("MEDIAGRAB_DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("MEDIAGRAB_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(v) = parse_var(&get, "MEDIAGRAB_MAX_ATTEMPTS")? {
            self.retry.max_attempts = v;
        }
        if let Some(v) = parse_var(&get, "MEDIAGRAB_WORKERS")? {
            self.worker_threads = v;
        }
        self.proxy = get("MEDIAGRAB_PROXY").or(self.proxy);
        self.ytdlp_path = get("MEDIAGRAB_YTDLP").map(PathBuf::from).or(self.ytdlp_path);
        self.ffmpeg_path = get("MEDIAGRAB_FFMPEG").map(PathBuf::from).or(self.ffmpeg_path);
        self.ffprobe_path = get("MEDIAGRAB_FFPROBE").map(PathBuf::from).or(self.ffprobe_path);
        self.chrome_path = get("MEDIAGRAB_CHROME").map(PathBuf::from).or(self.chrome_path);
        if let Some(url) = get("MEDIAGRAB_NITTER_URL") {
            self.nitter_url = url.trim_end_matches('/').to_string();
        }
        self.vk.access_token = get("VK_ACCESS_TOKEN").or(self.vk.access_token);
        self.instagram_api.api_key = get("INSTAGRAM_API_KEY").or(self.instagram_api.api_key);
        // megabytes
        if let Some(mb) = parse_var::<u64, _>(&get, "MAX_FILE_SIZE")? {
            self.max_download_bytes = mb * 1024 * 1024;
        }

        Ok(self)
    }
}

fn parse_var<T, F>(get: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
    }
}
