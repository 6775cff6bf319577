//! Write-then-rename file replacement.
//!
//! Content goes to a temporary file in the destination directory and is
//! renamed over the target only on [`AtomicFile::commit`]. Dropping an
//! uncommitted file removes the temporary.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

pub struct AtomicFile {
    file: File,
    temp: TempPath,
    dest: PathBuf,
}

impl AtomicFile {
    /// Start writing a replacement for `dest`, creating parent directories.
    pub async fn create(dest: &Path) -> io::Result<Self> {
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir).await?;

        let (file, temp) = tokio::task::spawn_blocking(move || NamedTempFile::new_in(dir))
            .await
            .map_err(io::Error::other)??
            .into_parts();

        Ok(Self {
            file: File::from_std(file),
            temp,
            dest: dest.to_path_buf(),
        })
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf).await
    }

    /// Flush to disk and move the file into place.
    pub async fn commit(mut self) -> io::Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);
        self.temp.persist(&self.dest).map_err(|e| e.error)
    }
}

/// Replace `dest` with `bytes`.
pub async fn write_atomically(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = AtomicFile::create(dest).await?;
    file.write_all(bytes).await?;
    file.commit().await
}
