// yt-dlp backend - metadata/extraction port over the `yt-dlp` binary
//
// Encodings come from `--dump-json`. Downloads run with a machine-readable
// progress template on stdout and `--print after_move:` reporting the final
// path, so renames by post-processors are visible to the caller.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::config::PipelineConfig;
use crate::downloader::errors::DownloadError;
use crate::downloader::models::{Encoding, FetchRequest};
use crate::downloader::pool::WorkerPool;
use crate::downloader::progress::{parse_progress_line, ProgressSink};
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::traits::MetadataPort;
use crate::downloader::utils::{get_proxy_args, get_timeout_args, run_output_with_timeout};

const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.status)s";
const ARTIFACT_MARKER: &str = "[artifact] ";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

pub struct YtDlpBackend {
    binary: PathBuf,
    proxy: Option<String>,
    socket_timeout: Duration,
    metadata_timeout: Duration,
    max_filesize: u64,
    pool: WorkerPool,
}

impl YtDlpBackend {
    pub fn new(config: &PipelineConfig, tools: &ToolManager, pool: WorkerPool) -> Self {
        Self {
            binary: tools.resolve(ToolType::YtDlp),
            proxy: config.proxy.clone(),
            socket_timeout: config.timeouts.socket(),
            metadata_timeout: config.timeouts.metadata(),
            max_filesize: config.max_download_bytes,
            pool,
        }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-colors".to_string(),
            "--retries".to_string(),
            "2".to_string(),
            "--user-agent".to_string(),
            USER_AGENT.to_string(),
        ];
        args.extend(get_timeout_args(self.socket_timeout));
        args.extend(get_proxy_args(self.proxy.as_deref()));
        args
    }

    fn build_metadata_args(&self, url: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.push("--dump-json".to_string());
        args.push("--skip-download".to_string());
        args.push("--no-warnings".to_string());
        args.push(url.to_string());
        args
    }

    fn build_fetch_args(&self, request: &FetchRequest) -> Vec<String> {
        let mut args = self.base_args();
        args.extend([
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "--print".to_string(),
            format!("after_move:{}%(filepath)s", ARTIFACT_MARKER),
            "--max-filesize".to_string(),
            self.max_filesize.to_string(),
            "-f".to_string(),
            request.format_selector.clone(),
            "-o".to_string(),
            request.output_template().to_string_lossy().into_owned(),
        ]);

        if request.audio_only {
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
                "--audio-quality".to_string(),
                "192K".to_string(),
            ]);
        } else {
            args.extend(["--merge-output-format".to_string(), "mp4".to_string()]);
        }

        if let Some(referer) = &request.profile.referer {
            args.push("--referer".to_string());
            args.push(referer.clone());
        }
        if request.profile.restrict_filenames {
            args.push("--restrict-filenames".to_string());
        }

        args.push(request.url.clone());
        args
    }

    fn parse_encodings(stdout: &[u8]) -> Result<Vec<Encoding>, DownloadError> {
        let json: serde_json::Value = serde_json::from_slice(stdout)
            .map_err(|e| DownloadError::Failed(format!("invalid yt-dlp JSON: {}", e)))?;

        let Some(formats) = json["formats"].as_array() else {
            // Single-format extractors only describe the top-level entry
            return Ok(vec![Self::parse_encoding(&json)]);
        };
        Ok(formats.iter().map(Self::parse_encoding).collect())
    }

    fn parse_encoding(f: &serde_json::Value) -> Encoding {
        Encoding {
            format_id: f["format_id"].as_str().unwrap_or("").to_string(),
            ext: f["ext"].as_str().unwrap_or("").to_string(),
            width: f["width"].as_u64().map(|w| w as u32),
            height: f["height"].as_u64().map(|h| h as u32),
            vcodec: f["vcodec"].as_str().map(|s| s.to_string()),
            acodec: f["acodec"].as_str().map(|s| s.to_string()),
            filesize: f["filesize"].as_u64(),
            filesize_approx: f["filesize_approx"].as_u64(),
        }
    }
}

#[async_trait]
impl MetadataPort for YtDlpBackend {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve_available_encodings(&self, url: &str) -> Result<Vec<Encoding>, DownloadError> {
        let _slot = self.pool.slot().await?;
        let args = self.build_metadata_args(url);
        tracing::debug!(binary = %self.binary.display(), url, "Listing encodings");

        let output = run_output_with_timeout(&self.binary, &args, self.metadata_timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::warn!(url, stderr = %stderr.trim(), "Encoding lookup failed");
            return Err(DownloadError::from(stderr));
        }
        Self::parse_encodings(&output.stdout)
    }

    async fn fetch(&self, request: &FetchRequest, progress: ProgressSink) -> Result<PathBuf, DownloadError> {
        let _slot = self.pool.slot().await?;
        let args = self.build_fetch_args(request);
        tracing::info!(
            url = %request.url,
            format = %request.format_selector,
            stem = %request.file_stem,
            "Starting yt-dlp download"
        );

        // Dropping this future (attempt timeout) kills the child
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DownloadError::CapabilityUnavailable(format!("failed to start yt-dlp: {}", e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Failed("yt-dlp stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Failed("yt-dlp stderr not captured".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut reported: Option<PathBuf> = None;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(path) = line.strip_prefix(ARTIFACT_MARKER) {
                reported = Some(PathBuf::from(path.trim()));
            } else if let Some(update) = parse_progress_line(&line) {
                progress.emit(update);
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            tracing::warn!(status = %status, stderr = %stderr.trim(), "yt-dlp failed");
            return Err(DownloadError::from(stderr));
        }

        let ext = if request.audio_only { "mp3" } else { "mp4" };
        Ok(reported.unwrap_or_else(|| request.expected_path(ext)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::ExtractionProfile;

    fn backend() -> YtDlpBackend {
        let config = PipelineConfig {
            proxy: Some("socks5h://127.0.0.1:1080".to_string()),
            ytdlp_path: Some(PathBuf::from("/usr/bin/yt-dlp")),
            ..Default::default()
        };
        YtDlpBackend::new(&config, &ToolManager::from_config(&config), WorkerPool::new(1))
    }

    fn request(audio_only: bool, profile: ExtractionProfile) -> FetchRequest {
        FetchRequest {
            url: "https://vk.com/video-1_2".to_string(),
            format_selector: "b".to_string(),
            output_dir: PathBuf::from("/tmp/dl"),
            file_stem: "vk_-1_2_job".to_string(),
            audio_only,
            profile,
        }
    }

    #[test]
    fn test_fetch_args_with_profile() {
        let args = backend().build_fetch_args(&request(
            false,
            ExtractionProfile::for_platform(crate::classifier::Platform::Vk),
        ));

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-o") + 1], "/tmp/dl/vk_-1_2_job.%(ext)s");
        assert_eq!(args[pos("--referer") + 1], "https://vk.com/");
        assert_eq!(args[pos("--proxy") + 1], "socks5h://127.0.0.1:1080");
        assert_eq!(args[pos("--socket-timeout") + 1], "30");
        assert!(args.contains(&"--restrict-filenames".to_string()));
        assert!(args.contains(&"--merge-output-format".to_string()));
        assert_eq!(args.last().unwrap(), "https://vk.com/video-1_2");
    }

    #[test]
    fn test_audio_args() {
        let args = backend().build_fetch_args(&request(true, ExtractionProfile::default()));
        assert!(args.contains(&"-x".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--audio-format" && w[1] == "mp3"));
        assert!(!args.contains(&"--referer".to_string()));
    }

    #[test]
    fn test_parse_encodings() {
        let json = br#"{
            "id": "abc123",
            "formats": [
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "filesize": 3000000},
                {"format_id": "136", "ext": "mp4", "width": 1280, "height": 720, "vcodec": "avc1.4d401f", "acodec": "none"},
                {"format_id": "247", "ext": "webm", "width": 1280, "height": 720, "vcodec": "vp9", "acodec": "none", "filesize_approx": 9000000}
            ]
        }"#;
        let encodings = YtDlpBackend::parse_encodings(json).unwrap();
        assert_eq!(encodings.len(), 3);
        assert!(!encodings[0].has_video_track());
        assert_eq!(encodings[1].height, Some(720));
        assert_eq!(encodings[2].effective_size(), Some(9_000_000));
    }

    #[test]
    fn test_parse_single_format_entry() {
        let json = br#"{"id": "x", "ext": "mp4", "width": 720, "height": 1280, "vcodec": "h264", "acodec": "aac"}"#;
        let encodings = YtDlpBackend::parse_encodings(json).unwrap();
        assert_eq!(encodings.len(), 1);
        assert_eq!(encodings[0].height, Some(1280));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            YtDlpBackend::parse_encodings(b"not json"),
            Err(DownloadError::Failed(_))
        ));
    }
}
