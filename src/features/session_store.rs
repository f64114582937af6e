//! Seen-post ledger persistence.
//!
//! Every post identifier the agent has evaluated is appended to a plain
//! text file (one identifier per line). The file is read once at startup and
//! then only ever appended to: each new identifier is written and synced to
//! disk before [`SessionStore::mark_seen`] returns, so a crash never causes a
//! post to be evaluated twice.
//!
//! While a run holds the store, the file carries an exclusive advisory lock
//! so a second agent pointed at the same ledger fails fast instead of
//! interleaving writes.

use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Durable-state failure. Always fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is locked by another running agent")]
    Locked { path: PathBuf },

    #[error("failed to record seen post '{id}' in {path}: {source}")]
    MarkSeen {
        id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to append lead '{post_id}' to {path}: {reason}")]
    AppendLead {
        post_id: String,
        path: PathBuf,
        reason: String,
    },

    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("{path} has header '{found}', expected '{expected}'; move it aside or choose another output file")]
    HeaderMismatch {
        path: PathBuf,
        found: String,
        expected: String,
    },
}

/// Persisted form of the seen set.
pub trait SessionStore: Send {
    /// Every identifier recorded by this and previous runs.
    fn load(&mut self) -> Result<HashSet<String>, StoreError>;

    /// Record `id` durably. Marking an already-recorded id is a no-op.
    fn mark_seen(&mut self, id: &str) -> Result<(), StoreError>;

    /// Flush anything buffered. File-backed marks are already durable.
    fn persist(&mut self) -> Result<(), StoreError>;
}

/// Line-oriented ledger file.
pub struct FileSessionStore {
    path: PathBuf,
    file: File,
    known: HashSet<String>,
}

impl FileSessionStore {
    /// Open (or create) the ledger, read existing ids and take the lock.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?;

        FileExt::try_lock_exclusive(&file).map_err(|_| StoreError::Locked { path: path.clone() })?;

        let known = read_ids(&file, &path)?;
        terminate_last_line(&mut file).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;
        if known.is_empty() {
            info!("session_store: no previous ledger at {}, starting fresh", path.display());
        } else {
            info!(
                "session_store: resuming with {} seen posts from {}",
                known.len(),
                path.display()
            );
        }

        Ok(Self { path, file, known })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

fn read_ids(file: &File, path: &Path) -> Result<HashSet<String>, StoreError> {
    let mut ids = HashSet::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| StoreError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let id = line.trim();
        if !id.is_empty() {
            ids.insert(id.to_string());
        }
    }
    Ok(ids)
}

/// A ledger edited by hand (or cut short by a crash) may end mid-line;
/// close that line so the next append starts on its own.
fn terminate_last_line(file: &mut File) -> std::io::Result<()> {
    if file.metadata()?.len() == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
        file.sync_data()?;
    }
    Ok(())
}

impl SessionStore for FileSessionStore {
    fn load(&mut self) -> Result<HashSet<String>, StoreError> {
        Ok(self.known.clone())
    }

    fn mark_seen(&mut self, id: &str) -> Result<(), StoreError> {
        let id = id.trim();
        if id.is_empty() || self.known.contains(id) {
            return Ok(());
        }
        let err = |source| StoreError::MarkSeen {
            id: id.to_string(),
            path: self.path.clone(),
            source,
        };
        // One write per line so a line is never split across two syscalls.
        self.file
            .write_all(format!("{}\n", id).as_bytes())
            .map_err(err)?;
        self.file.flush().map_err(err)?;
        self.file.sync_data().map_err(err)?;
        self.known.insert(id.to_string());
        debug!("session_store: marked seen {}", id);
        Ok(())
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        self.file.sync_all().map_err(|source| StoreError::MarkSeen {
            id: "<sync>".to_string(),
            path: self.path.clone(),
            source,
        })
    }
}
