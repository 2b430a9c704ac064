use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use fs2::FileExt;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::WatchError;
use crate::schema::{LogState, UpdateRecord};

/// Pause before a reader re-reads a file that failed to parse.
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

/// JSON-file-backed update log.  One writer, any number of readers.
#[derive(Debug, Clone)]
pub struct UpdateLogStore {
    path: PathBuf,
    max_updates: usize,
}

/// Exclusive advisory lock on the store's `.lock` sibling.  Released on drop.
#[derive(Debug)]
pub struct WriterLock {
    file: File,
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl UpdateLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_updates: 0,
        }
    }

    /// Cap the number of retained records (0 = unbounded).
    pub fn with_max_updates(mut self, max_updates: usize) -> Self {
        self.max_updates = max_updates;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let filename = self
            .path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "updates.json".to_string());
        self.path.with_file_name(format!("{filename}.{suffix}"))
    }

    /// Load the state for a detection cycle.
    ///
    /// A missing file is the normal first-run state.  An existing file that is
    /// not a valid log (bad JSON or bad UTF-8) is copied byte-for-byte to a
    /// timestamped `.corrupt-*` sibling and replaced by an empty state.  If the
    /// file cannot be read or the copy cannot be written, the error is
    /// returned so the caller never overwrites the only copy.
    pub async fn load(&self) -> Result<LogState, WatchError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no update log yet — starting empty");
                return Ok(LogState::default());
            }
            Err(source) => {
                return Err(WatchError::StorageRead {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        match serde_json::from_slice::<LogState>(&raw) {
            Ok(state) => Ok(state),
            Err(err) => {
                let corrupt_path = self.preserve_corrupt(&raw).await?;
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    sidecar = %corrupt_path.display(),
                    "corrupt update log — starting fresh (original preserved in .corrupt file)"
                );
                Ok(LogState::default())
            }
        }
    }

    /// Copy `raw` to a fresh `.corrupt-<timestamp>` sibling.  Existing
    /// sidecars are never overwritten.
    async fn preserve_corrupt(&self, raw: &[u8]) -> Result<PathBuf, WatchError> {
        let stamp = Local::now().format("%Y%m%dT%H%M%S%3f");
        let mut attempt = 0u32;
        loop {
            let suffix = if attempt == 0 {
                format!("corrupt-{stamp}")
            } else {
                format!("corrupt-{stamp}-{attempt}")
            };
            let corrupt_path = self.sibling(&suffix);
            let preserve_err = |source: io::Error| WatchError::Preserve {
                path: corrupt_path.clone(),
                source,
            };

            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&corrupt_path)
                .await
            {
                Ok(file) => file,
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists && attempt < 100 => {
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(preserve_err(err)),
            };
            file.write_all(raw).await.map_err(preserve_err)?;
            file.sync_all().await.map_err(preserve_err)?;
            return Ok(corrupt_path);
        }
    }

    /// Load the state for a read-only query.
    ///
    /// Returns `None` when no log exists yet.  A failed read or parse is
    /// retried once before giving up with `None`; nothing is ever written.
    pub async fn load_for_read(&self) -> Option<LogState> {
        for attempt in 0..2 {
            match tokio::fs::read(&self.path).await {
                Ok(raw) => match serde_json::from_slice::<LogState>(&raw) {
                    Ok(state) => return Some(state),
                    Err(err) => {
                        debug!(attempt, error = %err, "update log did not parse");
                    }
                },
                Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
                Err(err) => {
                    debug!(attempt, error = %err, "update log read failed");
                }
            }
            if attempt == 0 {
                tokio::time::sleep(READ_RETRY_DELAY).await;
            }
        }

        warn!(path = %self.path.display(), "update log unreadable — serving placeholder");
        None
    }

    /// Record a change stamped with the current local time.  Storage is not
    /// touched; call [`save`](Self::save) to persist.
    pub fn append(&self, mut state: LogState, fingerprint: String, labels: Vec<String>) -> LogState {
        let record = UpdateRecord::new(labels, Local::now());
        state.push(fingerprint, record, self.max_updates);
        state
    }

    /// Atomically replace the log file with `state`.
    ///
    /// The JSON is written to a `.tmp` sibling, flushed and synced, then
    /// renamed over the target, so readers see either the old or the new
    /// file in full.  The `.tmp` file is removed on any error path.
    pub async fn save(&self, state: &LogState) -> Result<(), WatchError> {
        let rendered = render_pretty(state)?;
        let write_err = |source: io::Error| WatchError::StorageWrite {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp_path = self.sibling("tmp");
        let write_result: io::Result<()> = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .await?;
            file.write_all(&rendered).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(err) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(err));
        }

        if let Err(err) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(err));
        }

        Ok(())
    }

    /// Try to become the single writer.  `Ok(None)` means another holder
    /// (usually another process) currently owns the lock.
    pub fn try_lock_writer(&self) -> Result<Option<WriterLock>, WatchError> {
        let lock_path = self.sibling("lock");
        let lock_err = |source: io::Error| WatchError::Lock {
            path: lock_path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(lock_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(lock_err)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(WriterLock { file })),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(err) => Err(lock_err(err)),
        }
    }
}

/// Four-space indented JSON plus a trailing newline.
fn render_pretty(state: &LogState) -> Result<Vec<u8>, WatchError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    state.serialize(&mut ser)?;
    buf.push(b'\n');
    Ok(buf)
}
