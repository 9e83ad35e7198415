use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
    Ffprobe,
    Chromium,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
            ToolType::Ffprobe => "ffprobe",
            ToolType::Chromium => "chromium",
        }
    }

    /// Binary names tried in PATH, most common first
    fn binary_names(&self) -> &'static [&'static str] {
        match self {
            ToolType::YtDlp => &["yt-dlp"],
            ToolType::Ffmpeg => &["ffmpeg"],
            ToolType::Ffprobe => &["ffprobe"],
            ToolType::Chromium => &[
                "chromium",
                "chromium-browser",
                "google-chrome",
                "google-chrome-stable",
            ],
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp | ToolType::Chromium => "--version",
            ToolType::Ffmpeg | ToolType::Ffprobe => "-version",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: &'static str,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub is_available: bool,
}

/// Locates external binaries: explicit config path first, then PATH.
#[derive(Debug, Clone, Default)]
pub struct ToolManager {
    ytdlp: Option<PathBuf>,
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
    chromium: Option<PathBuf>,
}

impl ToolManager {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            ytdlp: config.ytdlp_path.clone(),
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            chromium: config.chrome_path.clone(),
        }
    }

    fn configured(&self, tool_type: ToolType) -> Option<&PathBuf> {
        match tool_type {
            ToolType::YtDlp => self.ytdlp.as_ref(),
            ToolType::Ffmpeg => self.ffmpeg.as_ref(),
            ToolType::Ffprobe => self.ffprobe.as_ref(),
            ToolType::Chromium => self.chromium.as_ref(),
        }
    }

    /// Path to run the tool with. Falls back to the bare binary name so a
    /// missing tool surfaces as a spawn failure at call time.
    pub fn resolve(&self, tool_type: ToolType) -> PathBuf {
        self.locate(tool_type)
            .unwrap_or_else(|| PathBuf::from(tool_type.binary_names()[0]))
    }

    /// Installed location, if any
    pub fn locate(&self, tool_type: ToolType) -> Option<PathBuf> {
        if let Some(path) = self.configured(tool_type) {
            return Some(path.clone());
        }

        tool_type
            .binary_names()
            .iter()
            .find_map(|name| which::which(name).ok())
    }

    /// Blocking: runs `<tool> --version`.
    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.locate(tool_type);
        let version = path
            .as_deref()
            .and_then(|p| self.get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str(),
            is_available: path.is_some(),
            version,
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        [
            ToolType::YtDlp,
            ToolType::Ffmpeg,
            ToolType::Ffprobe,
            ToolType::Chromium,
        ]
        .into_iter()
        .map(|t| self.get_tool_info(t))
        .collect()
    }

    fn get_version(&self, path: &Path, tool_type: ToolType) -> Option<String> {
        match Command::new(path).arg(tool_type.version_arg()).output() {
            Ok(output) if output.status.success() => {
                let out = String::from_utf8_lossy(&output.stdout);
                // ffmpeg prints a banner; the first line carries the version
                out.lines()
                    .next()
                    .map(|line| line.trim().to_string())
                    .filter(|line| !line.is_empty())
            }
            _ => None,
        }
    }
}
