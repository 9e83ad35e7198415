// ffmpeg concat demuxer manifest

use std::path::{Path, PathBuf};

/// Ordered list of segment files, rendered as `file '<path>'` lines.
#[derive(Debug, Default, Clone)]
pub struct ConcatManifest {
    entries: Vec<PathBuf>,
}

impl ConcatManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: PathBuf) {
        self.entries.push(segment);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|p| format!("file '{}'\n", escape(p)))
            .collect()
    }

    pub async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, self.render()).await
    }
}

/// Single quotes close the quoted string, so they are written as `'\''`.
fn escape(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}
