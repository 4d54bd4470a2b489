//! Append-only JSON-lines audit trail.
//!
//! Every record is written as a single line and synced to disk before
//! [`AuditLogger::log`] returns. The logger never truncates, rewrites or
//! deletes the file.

use crate::error::AuditError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lifecycle stage of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Pending,
    Done,
    Failed,
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    pub status: AuditStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    pub fn new(plan_id: impl Into<String>, status: AuditStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            plan_id: plan_id.into(),
            operation_index: None,
            source: None,
            destination: None,
            status,
            error: None,
        }
    }

    pub fn operation(
        mut self,
        index: usize,
        source: Option<&Path>,
        destination: &Path,
    ) -> Self {
        self.operation_index = Some(index);
        self.source = source.map(Path::to_path_buf);
        self.destination = Some(destination.to_path_buf());
        self
    }

    pub fn error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Appends records to a log file.
#[derive(Debug)]
pub struct AuditLogger {
    path: PathBuf,
    file: File,
}

impl AuditLogger {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `record` and syncs it to disk.
    pub fn log(&mut self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(record).map_err(|e| AuditError::Write {
            path: self.path.clone(),
            source: e.into(),
        })?;
        line.push('\n');

        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.sync_data())
            .map_err(|source| AuditError::Write {
                path: self.path.clone(),
                source,
            })?;

        debug!(plan_id = %record.plan_id, index = ?record.operation_index, status = ?record.status, "audit record written");
        Ok(())
    }

    /// Reads every record from an existing log. Blank lines are skipped.
    pub fn read(path: &Path) -> Result<Vec<AuditRecord>, AuditError> {
        let file = File::open(path).map_err(|source| AuditError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| AuditError::Open {
                path: path.to_path_buf(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| AuditError::Corrupt {
                path: path.to_path_buf(),
                line: number + 1,
                reason: e.to_string(),
            })?;
            records.push(record);
        }
        Ok(records)
    }
}
