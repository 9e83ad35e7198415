// Helper functions for backend implementations

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use super::errors::{DownloadError, TranscodeError};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("failed to collect output of {program}: {message}")]
    Io { program: String, message: String },
}

impl From<CommandError> for DownloadError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Spawn { .. } => DownloadError::CapabilityUnavailable(err.to_string()),
            CommandError::Timeout { .. } => DownloadError::NetworkTimeout(err.to_string()),
            CommandError::Io { .. } => DownloadError::Failed(err.to_string()),
        }
    }
}

impl From<CommandError> for TranscodeError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Spawn { program, source } => TranscodeError::Spawn {
                tool: program,
                message: source.to_string(),
            },
            CommandError::Timeout { program, secs } => TranscodeError::Timeout { tool: program, secs },
            CommandError::Io { program, message } => TranscodeError::Failed {
                tool: program,
                status: "unknown".to_string(),
                stderr: message,
            },
        }
    }
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .unwrap_or_else(|| OsStr::new("tool"))
        .to_string_lossy()
        .into_owned()
}

/// Run command with timeout, killing the child when it expires
pub async fn run_output_with_timeout(
    program: &Path,
    args: &[String],
    limit: Duration,
) -> Result<std::process::Output, CommandError> {
    let name = program_name(program);
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: name.clone(),
            source,
        })?;

    let io_err = |message: String| CommandError::Io {
        program: name.clone(),
        message,
    };

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| io_err("stdout not captured".to_string()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| io_err("stderr not captured".to_string()))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(limit, child.wait()).await {
        Ok(status_res) => {
            let status = status_res.map_err(|e| io_err(e.to_string()))?;
            let stdout = stdout_task
                .await
                .map_err(|e| io_err(e.to_string()))?
                .map_err(|e| io_err(e.to_string()))?;
            let stderr = stderr_task
                .await
                .map_err(|e| io_err(e.to_string()))?
                .map_err(|e| io_err(e.to_string()))?;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(CommandError::Timeout {
                program: name,
                secs: limit.as_secs(),
            })
        }
    }
}

/// Build proxy arguments for yt-dlp
pub fn get_proxy_args(proxy: Option<&str>) -> Vec<String> {
    match proxy {
        Some(proxy) if !proxy.is_empty() => vec!["--proxy".to_string(), proxy.to_string()],
        _ => Vec::new(),
    }
}

/// Build timeout arguments for yt-dlp
pub fn get_timeout_args(socket_timeout: Duration) -> Vec<String> {
    vec![
        "--socket-timeout".to_string(),
        socket_timeout.as_secs().max(1).to_string(),
    ]
}

/// True when `path` is a regular file with content
pub fn is_nonempty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// `stem.ext`, `stem.f137.mp4`, `stem_2.jpg` belong to `stem`; `stem0.mp4` doesn't.
fn belongs_to(name: &str, stem: &str) -> bool {
    name.strip_prefix(stem)
        .and_then(|rest| rest.chars().next())
        .map_or(false, |c| c == '.' || c == '_')
}

/// Newest non-empty file in `dir` whose name starts with `stem` and whose
/// extension is in `extensions` (case-insensitive). Blocking.
pub fn scan_for_artifact(dir: &Path, stem: &str, extensions: &[&str]) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?;
            if !belongs_to(name, stem) || name.ends_with(".part") {
                return None;
            }
            let ext = path.extension()?.to_str()?.to_ascii_lowercase();
            if !extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
                return None;
            }
            let meta = entry.metadata().ok()?;
            if !meta.is_file() || meta.len() == 0 {
                return None;
            }
            let created = meta
                .created()
                .or_else(|_| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            Some((created, path))
        })
        .max_by_key(|(created, _)| *created)
        .map(|(_, path)| path)
}

/// Remove every file in `dir` whose name starts with `stem`. Blocking.
pub fn purge_job_files(dir: &Path, stem: &str) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| belongs_to(n, stem))
        })
        .filter(|path| path.is_file() && std::fs::remove_file(path).is_ok())
        .count()
}
