// Progress reporting
//
// Adapters push raw updates into a `ProgressSink` from whatever thread or
// task they run on. A drain task on the caller's runtime throttles and
// de-duplicates them before invoking the user callback, so the callback
// always runs on the caller's scheduler.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Downloading,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub status: ProgressStatus,
    pub bytes_downloaded: u64,
    pub bytes_total: Option<u64>,
}

impl ProgressUpdate {
    pub fn downloading(bytes_downloaded: u64, bytes_total: Option<u64>) -> Self {
        Self {
            status: ProgressStatus::Downloading,
            bytes_downloaded,
            bytes_total,
        }
    }

    pub fn finished(bytes_downloaded: u64) -> Self {
        Self {
            status: ProgressStatus::Finished,
            bytes_downloaded,
            bytes_total: Some(bytes_downloaded),
        }
    }

    pub fn percent(&self) -> Option<f32> {
        self.bytes_total
            .filter(|total| *total > 0)
            .map(|total| (self.bytes_downloaded as f64 / total as f64 * 100.0) as f32)
    }
}

pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Cloneable, thread-safe emitter handed to adapters
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

impl ProgressSink {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, update: ProgressUpdate) {
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is listening any more
            let _ = tx.send(update);
        }
    }
}

/// Minimum-interval and duplicate filter
#[derive(Debug)]
pub struct ProgressThrottle {
    min_interval: Duration,
    last_emit: Option<Instant>,
    last: Option<ProgressUpdate>,
}

impl ProgressThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: None,
            last: None,
        }
    }

    /// Whether `update` should reach the callback. `Finished` skips the
    /// interval check but is still de-duplicated.
    pub fn admit(&mut self, update: &ProgressUpdate, now: Instant) -> bool {
        if self.last.as_ref() == Some(update) {
            return false;
        }
        let interval_ok = match self.last_emit {
            Some(last) => now.duration_since(last) >= self.min_interval,
            None => true,
        };
        if !interval_ok && update.status != ProgressStatus::Finished {
            return false;
        }
        self.last_emit = Some(now);
        self.last = Some(*update);
        true
    }
}

/// Start the drain task on the current runtime. The task ends once every
/// clone of the returned sink is dropped.
pub fn spawn_reporter(
    callback: ProgressCallback,
    min_interval: Duration,
) -> (ProgressSink, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();
    let handle = tokio::spawn(async move {
        let mut throttle = ProgressThrottle::new(min_interval);
        while let Some(update) = rx.recv().await {
            if throttle.admit(&update, Instant::now()) {
                callback(update);
            }
        }
    });
    (ProgressSink { tx: Some(tx) }, handle)
}

lazy_static! {
    static ref PROGRESS_LINE: Regex = Regex::new(
        r"^\[progress\]\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)"
    )
    .unwrap();
}

/// Parse one line printed by yt-dlp with the progress template
/// `[progress] <downloaded> <total> <estimate> <status>`.
pub fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    let caps = PROGRESS_LINE.captures(line.trim())?;
    let number = |s: &str| s.parse::<f64>().ok().map(|v| v as u64);

    let downloaded = number(&caps[1]).unwrap_or(0);
    let total = number(&caps[2]).or_else(|| number(&caps[3]));
    let status = match &caps[4] {
        "finished" => ProgressStatus::Finished,
        "downloading" => ProgressStatus::Downloading,
        _ => return None,
    };

    Some(ProgressUpdate {
        status,
        bytes_downloaded: downloaded,
        bytes_total: total,
    })
}
