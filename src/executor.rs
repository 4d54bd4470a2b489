//! Applies single plan operations to the filesystem.
//!
//! The executor knows nothing about transactions: it performs exactly one
//! operation and hands back the [`UndoAction`] that reverses it. Failures are
//! returned, never swallowed. A failed operation leaves no trace: parent
//! directories it created are removed again before the error is returned.

use crate::error::ExecutionError;
use crate::plan::{Operation, OperationKind};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// The inverse step of a completed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoStep {
    /// Undo of MKDIR: remove the directory.
    RemoveDir { path: PathBuf },
    /// Undo of MOVE: move `from` back to `to`.
    MoveBack { from: PathBuf, to: PathBuf },
    /// Undo of COPY: delete the copy, file or tree.
    Delete { path: PathBuf },
    /// Undo of RENAME: rename `from` back to `to`.
    RenameBack { from: PathBuf, to: PathBuf },
}

/// Everything needed to reverse one completed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoAction {
    pub step: UndoStep,
    /// Directories the operation had to create, deepest first.
    pub created_dirs: Vec<PathBuf>,
}

impl UndoAction {
    pub fn new(step: UndoStep) -> Self {
        Self {
            step,
            created_dirs: Vec::new(),
        }
    }

    fn with_created_dirs(mut self, created_dirs: Vec<PathBuf>) -> Self {
        self.created_dirs = created_dirs;
        self
    }
}

/// Executes operations one at a time.
pub struct Executor;

impl Executor {
    /// Applies `operation` and returns its inverse.
    ///
    /// | Operation | Effect | Inverse |
    /// |---|---|---|
    /// | MKDIR | creates the directory and missing parents, fails if it exists | remove it |
    /// | MOVE | creates missing parents, moves source to destination | move back |
    /// | COPY | creates missing parents, copies a file or a tree | delete the copy |
    /// | RENAME | renames in place, no parent creation | rename back |
    ///
    /// MOVE, COPY and RENAME never overwrite an existing destination.
    /// Symlinks inside a copied tree are recreated as links, not followed.
    pub fn apply(operation: &Operation) -> Result<UndoAction, ExecutionError> {
        debug!(kind = operation.kind.name(), destination = %operation.destination().display(), "applying operation");

        match &operation.kind {
            OperationKind::Mkdir { destination } => {
                ensure_absent(destination)?;
                let missing = missing_ancestors(destination);
                if let Err(e) = fs::create_dir_all(destination) {
                    remove_created_dirs(&missing);
                    return Err(io_error("create directory", destination, e));
                }

                // The directory itself is removed by the main step; only its
                // freshly created parents remain for cleanup.
                let parents = missing.into_iter().skip(1).collect();
                Ok(UndoAction::new(UndoStep::RemoveDir {
                    path: destination.clone(),
                })
                .with_created_dirs(parents))
            }
            OperationKind::Move {
                source,
                destination,
            } => {
                ensure_present(source)?;
                ensure_absent(destination)?;
                let created = with_parents(destination, || {
                    relocate(source, destination).map_err(|e| io_error("move", source, e))
                })?;

                Ok(UndoAction::new(UndoStep::MoveBack {
                    from: destination.clone(),
                    to: source.clone(),
                })
                .with_created_dirs(created))
            }
            OperationKind::Copy {
                source,
                destination,
            } => {
                ensure_present(source)?;
                ensure_absent(destination)?;
                let created = with_parents(destination, || {
                    copy_any(source, destination).map_err(|e| {
                        // Leave no half-written copy behind.
                        if let Err(cleanup) = remove_any(destination)
                            && cleanup.kind() != io::ErrorKind::NotFound
                        {
                            warn!(path = %destination.display(), error = %cleanup, "could not remove partial copy");
                        }
                        io_error("copy", source, e)
                    })
                })?;

                Ok(UndoAction::new(UndoStep::Delete {
                    path: destination.clone(),
                })
                .with_created_dirs(created))
            }
            OperationKind::Rename {
                source,
                destination,
            } => {
                ensure_present(source)?;
                ensure_absent(destination)?;
                fs::rename(source, destination).map_err(|e| io_error("rename", source, e))?;

                Ok(UndoAction::new(UndoStep::RenameBack {
                    from: destination.clone(),
                    to: source.clone(),
                }))
            }
        }
    }
}

fn io_error(action: &'static str, path: &Path, source: io::Error) -> ExecutionError {
    ExecutionError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_present(path: &Path) -> Result<(), ExecutionError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ExecutionError::SourceMissing {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(io_error("inspect", path, e)),
    }
}

fn ensure_absent(path: &Path) -> Result<(), ExecutionError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Err(ExecutionError::DestinationExists {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error("inspect", path, e)),
    }
}

/// Ancestors of `path` (itself included) that do not exist, deepest first.
fn missing_ancestors(path: &Path) -> Vec<PathBuf> {
    path.ancestors()
        .take_while(|ancestor| !ancestor.as_os_str().is_empty() && !ancestor.exists())
        .map(Path::to_path_buf)
        .collect()
}

/// Creates the parent directories of `path` and runs `step`.
///
/// Returns the directories it created. When either part fails, those
/// directories are removed again before the error is returned.
fn with_parents<F>(path: &Path, step: F) -> Result<Vec<PathBuf>, ExecutionError>
where
    F: FnOnce() -> Result<(), ExecutionError>,
{
    let Some(parent) = path.parent() else {
        step()?;
        return Ok(Vec::new());
    };

    let created = missing_ancestors(parent);
    let outcome = fs::create_dir_all(parent)
        .map_err(|e| io_error("create directory", parent, e))
        .and_then(|()| step());
    if let Err(e) = outcome {
        remove_created_dirs(&created);
        return Err(e);
    }
    Ok(created)
}

/// Best-effort removal of directories an operation created, deepest first.
///
/// Directories that are gone already are skipped. Ones that are no longer
/// empty stay in place with a warning.
pub(crate) fn remove_created_dirs(dirs: &[PathBuf]) {
    for dir in dirs {
        match fs::remove_dir(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "could not remove created directory");
            }
        }
    }
}

/// Moves `from` to `to`, copying then deleting when a rename cannot cross devices.
pub(crate) fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(from = %from.display(), to = %to.display(), "rename crosses devices, copying");
            copy_any(from, to)?;
            remove_any(from)
        }
        Err(e) => Err(e),
    }
}

/// Copies a file, a symlink, or a directory tree recursively.
fn copy_any(from: &Path, to: &Path) -> io::Result<()> {
    let file_type = fs::symlink_metadata(from)?.file_type();
    if file_type.is_symlink() {
        return copy_symlink(from, to);
    }
    if !file_type.is_dir() {
        return fs::copy(from, to).map(|_| ());
    }

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let target = to.join(relative);
        if entry.file_type().is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Recreates the link at `to` with the same target text.
#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, _to: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot copy symlink {}", from.display()),
    ))
}

/// Removes a file or a whole directory tree.
pub(crate) fn remove_any(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
