//! Read-only inventory of the approved root.
//!
//! A [`Snapshot`] is taken once per planning cycle. Building it performs a
//! single recursive traversal, reads metadata only and never writes. The
//! result is immutable and must not be reused for a later plan.

use crate::error::Abort;
use crate::guard::PathGuard;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

/// Metadata for one regular file present at scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    path: PathBuf,
    size_bytes: u64,
    modified: DateTime<Utc>,
    extension: String,
}

impl FileMeta {
    /// Resolved absolute path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    /// Lowercased extension with its leading dot, or an empty string.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The final path component.
    pub fn file_name(&self) -> &std::ffi::OsStr {
        self.path.file_name().unwrap_or_default()
    }
}

/// Lowercased `.ext` form of a path's extension.
pub(crate) fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Immutable point-in-time inventory of files under an approved root.
#[derive(Debug, Clone)]
pub struct Snapshot {
    snapshot_id: String,
    root: PathBuf,
    created_at: DateTime<Utc>,
    files: Vec<FileMeta>,
}

impl Snapshot {
    pub fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }

    /// The canonical approved root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Files ordered by resolved path.
    pub fn files(&self) -> &[FileMeta] {
        &self.files
    }

    /// `file`'s path relative to the root.
    pub fn relative_path<'a>(&self, file: &'a FileMeta) -> &'a Path {
        file.path().strip_prefix(&self.root).unwrap_or(file.path())
    }
}

/// Builds snapshots of an approved root.
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Scans `approved_root` and returns its file inventory.
    ///
    /// # Errors
    ///
    /// Aborts when the root does not resolve, sits under a forbidden system
    /// prefix, is not a directory, when any entry cannot be resolved or
    /// stat-ed, or when an entry resolves outside the root (for example a
    /// symlink pointing elsewhere).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tidyplan::snapshot::SnapshotBuilder;
    /// use std::path::Path;
    ///
    /// let snapshot = SnapshotBuilder::build(Path::new("/home/me/Downloads")).unwrap();
    /// for file in snapshot.files() {
    ///     println!("{} ({} bytes)", file.path().display(), file.size_bytes());
    /// }
    /// ```
    pub fn build(approved_root: &Path) -> Result<Snapshot, Abort> {
        let root = fs::canonicalize(approved_root).map_err(|_| {
            Abort::new(format!(
                "Approved root does not exist or cannot be resolved: {}",
                approved_root.display()
            ))
        })?;

        PathGuard::check_resolved(&root).map_err(|_| {
            Abort::new(format!(
                "Approved root is forbidden system path: {}",
                root.display()
            ))
        })?;

        if !root.is_dir() {
            return Err(Abort::new(format!(
                "Approved root is not a directory: {}",
                root.display()
            )));
        }

        // Keyed by resolved path: deterministic order, one entry per file even
        // when symlinks inside the root point at each other.
        let mut files = BTreeMap::new();

        for entry in WalkDir::new(&root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                Abort::new(format!("Failed to read entry during snapshot: {}", e))
            })?;

            let resolved = fs::canonicalize(entry.path()).map_err(|_| {
                Abort::new(format!(
                    "Failed to resolve path during snapshot: {}",
                    entry.path().display()
                ))
            })?;

            if !resolved.starts_with(&root) || resolved == root {
                return Err(Abort::new(format!(
                    "Path escaped approved root boundary: {}",
                    entry.path().display()
                )));
            }

            let metadata = fs::metadata(&resolved).map_err(|_| {
                Abort::new(format!(
                    "Failed to stat file during snapshot: {}",
                    resolved.display()
                ))
            })?;

            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified().map_err(|_| {
                Abort::new(format!(
                    "Failed to read modification time: {}",
                    resolved.display()
                ))
            })?;

            let extension = dotted_extension(&resolved);
            files.entry(resolved.clone()).or_insert(FileMeta {
                path: resolved,
                size_bytes: metadata.len(),
                modified: DateTime::<Utc>::from(modified),
                extension,
            });
        }

        let snapshot = Snapshot {
            snapshot_id: Uuid::new_v4().to_string(),
            root,
            created_at: Utc::now(),
            files: files.into_values().collect(),
        };

        info!(
            snapshot_id = %snapshot.snapshot_id,
            root = %snapshot.root.display(),
            files = snapshot.files.len(),
            "snapshot built"
        );
        for file in &snapshot.files {
            debug!(path = %file.path.display(), size = file.size_bytes, "snapshot entry");
        }

        Ok(snapshot)
    }
}
