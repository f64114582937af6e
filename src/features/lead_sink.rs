//! Append-only CSV output of qualified leads.
//!
//! Columns: `post_id, author, excerpt, query, rationale, timestamp`. The
//! header row is written only when the file is new or empty; later runs
//! append rows under the existing header, which must carry exactly these
//! columns. Each row is flushed and synced before [`LeadSink::append`]
//! returns.

use crate::core::types::LeadRecord;
use crate::features::session_store::StoreError;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;

pub const LEAD_COLUMNS: [&str; 6] = [
    "post_id",
    "author",
    "excerpt",
    "query",
    "rationale",
    "timestamp",
];

pub trait LeadSink: Send {
    /// Durably append one record.
    fn append(&mut self, record: &LeadRecord) -> Result<(), StoreError>;
}

pub struct CsvLeadSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    written: usize,
}

impl CsvLeadSink {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?;
        }

        let has_rows = std::fs::metadata(&path)
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if has_rows {
            check_header(&path)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?;

        // `serialize` emits the header before the first row when enabled.
        let writer = csv::WriterBuilder::new()
            .has_headers(!has_rows)
            .from_writer(file);

        info!(
            "lead_sink: writing leads to {} ({})",
            path.display(),
            if has_rows { "appending" } else { "new file" }
        );

        Ok(Self {
            path,
            writer,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended by this sink instance.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl LeadSink for CsvLeadSink {
    fn append(&mut self, record: &LeadRecord) -> Result<(), StoreError> {
        let fail = |reason: String| StoreError::AppendLead {
            post_id: record.post_id.clone(),
            path: self.path.clone(),
            reason,
        };

        self.writer
            .serialize(record)
            .map_err(|e| fail(e.to_string()))?;
        self.writer.flush().map_err(|e| fail(e.to_string()))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| fail(e.to_string()))?;

        self.written += 1;
        info!("lead_sink: saved lead {} to {}", record.post_id, self.path.display());
        Ok(())
    }
}

/// Refuse to append under a header with a different column set.
fn check_header(path: &Path) -> Result<(), StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| StoreError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let headers = reader.headers().map_err(|e| StoreError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let found: Vec<&str> = headers.iter().map(str::trim).collect();
    if found != LEAD_COLUMNS {
        return Err(StoreError::HeaderMismatch {
            path: path.to_path_buf(),
            found: found.join(","),
            expected: LEAD_COLUMNS.join(","),
        });
    }
    Ok(())
}

/// Post ids already present in a lead file. Missing file → empty set.
pub fn recorded_post_ids(path: &Path) -> Result<HashSet<String>, StoreError> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let read_err = |reason: String| StoreError::Read {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| read_err(e.to_string()))?;

    let headers = reader.headers().map_err(|e| read_err(e.to_string()))?.clone();
    // `link` is the id column of lead files written by older tooling.
    let Some(col) = headers
        .iter()
        .position(|h| h.trim() == LEAD_COLUMNS[0])
        .or_else(|| headers.iter().position(|h| h.trim() == "link"))
    else {
        return Err(read_err(format!(
            "no '{}' column in header",
            LEAD_COLUMNS[0]
        )));
    };

    let mut ids = HashSet::new();
    for row in reader.records() {
        let row = row.map_err(|e| read_err(e.to_string()))?;
        if let Some(id) = row.get(col).map(str::trim).filter(|s| !s.is_empty()) {
            ids.insert(id.to_string());
        }
    }
    Ok(ids)
}
