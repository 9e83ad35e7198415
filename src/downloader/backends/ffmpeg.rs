// ffmpeg/ffprobe backend - transcoder port
//
// Every call is a bounded subprocess holding a worker-pool slot. Outputs
// are checked for existence and size before they are reported.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::downloader::errors::TranscodeError;
use crate::downloader::pool::WorkerPool;
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::traits::TranscoderPort;
use crate::downloader::utils::{is_nonempty_file, run_output_with_timeout};

const AUDIO_BITRATE_KBPS: u64 = 128;
const MIN_VIDEO_BITRATE_KBPS: u64 = 200;

pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    metadata_timeout: Duration,
    transcode_timeout: Duration,
    pool: WorkerPool,
}

impl FfmpegBackend {
    pub fn new(config: &PipelineConfig, tools: &ToolManager, pool: WorkerPool) -> Self {
        Self {
            ffmpeg: tools.resolve(ToolType::Ffmpeg),
            ffprobe: tools.resolve(ToolType::Ffprobe),
            metadata_timeout: config.timeouts.metadata(),
            transcode_timeout: config.timeouts.transcode(),
            pool,
        }
    }

    async fn run_ffmpeg(&self, args: Vec<String>, output: &Path) -> Result<PathBuf, TranscodeError> {
        let _slot = self.pool.slot().await.map_err(|e| TranscodeError::Spawn {
            tool: "ffmpeg".to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(args = ?args, "Running ffmpeg");
        let result = run_output_with_timeout(&self.ffmpeg, &args, self.transcode_timeout).await?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(TranscodeError::Failed {
                tool: "ffmpeg".to_string(),
                status: result.status.to_string(),
                stderr: tail(&stderr, 5),
            });
        }

        if !is_nonempty_file(output) {
            return Err(TranscodeError::EmptyOutput(output.to_path_buf()));
        }
        Ok(output.to_path_buf())
    }

    async fn run_ffprobe(&self, args: Vec<String>) -> Option<String> {
        let _slot = self.pool.slot().await.ok()?;
        match run_output_with_timeout(&self.ffprobe, &args, self.metadata_timeout).await {
            Ok(out) if out.status.success() => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
            Ok(out) => {
                tracing::debug!(stderr = %String::from_utf8_lossy(&out.stderr).trim(), "ffprobe failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "ffprobe unavailable");
                None
            }
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

fn to_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Parse `WIDTHxHEIGHT` as printed by `-of csv=p=0:s=x`
pub fn parse_dimensions(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (w, h) = line.split_once('x')?;
    let (w, h) = (w.trim().parse().ok()?, h.trim().parse().ok()?);
    (w > 0 && h > 0).then_some((w, h))
}

pub fn parse_duration(output: &str) -> Option<f64> {
    output
        .lines()
        .map(str::trim)
        .find_map(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Total bitrate that lands a `duration_secs` clip near `target_mb`
pub fn target_bitrate_kbps(target_mb: u64, duration_secs: f64) -> u64 {
    if duration_secs <= 0.0 {
        return MIN_VIDEO_BITRATE_KBPS;
    }
    let total = (target_mb as f64 * 8192.0 / duration_secs) as u64;
    total.max(MIN_VIDEO_BITRATE_KBPS)
}

pub fn image_segment_args(image: &Path, duration: Duration, output: &Path) -> Vec<String> {
    let mut args = to_args(&["-hide_banner", "-loglevel", "error", "-loop", "1", "-i"]);
    args.push(path_arg(image));
    args.extend(to_args(&["-c:v", "libx264", "-t"]));
    args.push(format!("{:.3}", duration.as_secs_f64()));
    args.extend(to_args(&[
        "-pix_fmt",
        "yuv420p",
        "-vf",
        "scale=trunc(iw/2)*2:trunc(ih/2)*2,setsar=1",
        "-y",
    ]));
    args.push(path_arg(output));
    args
}

pub fn copy_segment_args(input: &Path, output: &Path) -> Vec<String> {
    let mut args = to_args(&["-hide_banner", "-loglevel", "error", "-i"]);
    args.push(path_arg(input));
    args.extend(to_args(&["-c", "copy", "-y"]));
    args.push(path_arg(output));
    args
}

pub fn concat_args(manifest: &Path, output: &Path) -> Vec<String> {
    let mut args = to_args(&["-hide_banner", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"]);
    args.push(path_arg(manifest));
    args.extend(to_args(&["-c", "copy", "-movflags", "+faststart", "-y"]));
    args.push(path_arg(output));
    args
}

pub fn compress_args(input: &Path, bitrate_kbps: u64, output: &Path) -> Vec<String> {
    let video_kbps = bitrate_kbps
        .saturating_sub(AUDIO_BITRATE_KBPS)
        .max(MIN_VIDEO_BITRATE_KBPS);
    let mut args = to_args(&["-hide_banner", "-loglevel", "error", "-i"]);
    args.push(path_arg(input));
    args.extend(to_args(&["-c:v", "libx264", "-preset", "fast", "-crf", "23"]));
    args.push("-maxrate".to_string());
    args.push(format!("{}k", video_kbps));
    args.push("-bufsize".to_string());
    args.push(format!("{}k", video_kbps * 2));
    args.extend(to_args(&[
        "-vf",
        "scale=-2:720,setsar=1",
        "-c:a",
        "aac",
        "-b:a",
        "128k",
        "-movflags",
        "+faststart",
        "-y",
    ]));
    args.push(path_arg(output));
    args
}

#[async_trait]
impl TranscoderPort for FfmpegBackend {
    async fn media_dimensions(&self, path: &Path) -> Option<(u32, u32)> {
        let mut args = to_args(&[
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0:s=x",
        ]);
        args.push(path_arg(path));
        parse_dimensions(&self.run_ffprobe(args).await?)
    }

    async fn media_duration(&self, path: &Path) -> Option<f64> {
        let mut args = to_args(&[
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ]);
        args.push(path_arg(path));
        parse_duration(&self.run_ffprobe(args).await?)
    }

    async fn transcode_image_to_video(
        &self,
        image: &Path,
        duration: Duration,
        output: &Path,
    ) -> Result<PathBuf, TranscodeError> {
        self.run_ffmpeg(image_segment_args(image, duration, output), output)
            .await
    }

    async fn copy_segment(&self, input: &Path, output: &Path) -> Result<PathBuf, TranscodeError> {
        self.run_ffmpeg(copy_segment_args(input, output), output).await
    }

    async fn concat_segments(&self, manifest: &Path, output: &Path) -> Result<PathBuf, TranscodeError> {
        self.run_ffmpeg(concat_args(manifest, output), output).await
    }

    async fn compress(
        &self,
        input: &Path,
        target_size_mb: u64,
        output: &Path,
    ) -> Result<PathBuf, TranscodeError> {
        let duration = self
            .media_duration(input)
            .await
            .ok_or_else(|| TranscodeError::Failed {
                tool: "ffprobe".to_string(),
                status: "no duration".to_string(),
                stderr: format!("could not read duration of {}", input.display()),
            })?;

        let bitrate = target_bitrate_kbps(target_size_mb, duration);
        tracing::info!(
            input = %input.display(),
            duration,
            bitrate_kbps = bitrate,
            target_mb = target_size_mb,
            "Compressing"
        );
        self.run_ffmpeg(compress_args(input, bitrate, output), output)
            .await
    }
}
