use std::path::PathBuf;

use tracing::info;

use crate::error::{Error, Result};

/// Destination for the fully assembled download.
pub trait FileWriter {
    /// Creates or overwrites `name` with exactly `bytes`, returning where it went.
    fn write(&self, name: &str, bytes: &[u8]) -> impl Future<Output = Result<PathBuf>> + Send;
}

/// Observer of download progress. Purely informational.
pub trait ProgressReporter {
    fn report(&mut self, done: usize, total: usize, index: u32, peers: usize);
}

/// Writes into a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsWriter {
    dir: PathBuf,
}

impl FsWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FileWriter for FsWriter {
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::io(&self.dir, e))?;
        let path = self.dir.join(sanitize_filename(name));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::io(&path, e))?;
        info!(path = %path.display(), bytes = bytes.len(), "wrote output file");
        Ok(path)
    }
}

/// Reduces a torrent-supplied name to a single safe path component.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Logs a line per completed piece.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&mut self, done: usize, total: usize, index: u32, peers: usize) {
        let percent = if total == 0 {
            100.0
        } else {
            done as f64 / total as f64 * 100.0
        };
        info!(
            index,
            peers,
            "({percent:.2}%) downloaded piece {index} from {peers} peers ({done}/{total})"
        );
    }
}
