/// Reverses completed operations after a failed transaction.
///
/// Undo actions are replayed last-in first-out. The first failing step stops
/// the rollback and is never retried.
use crate::error::RollbackError;
use crate::executor::{UndoAction, UndoStep, relocate, remove_any, remove_created_dirs};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// Replays undo actions.
pub struct RollbackEngine;

impl RollbackEngine {
    /// Undoes `actions` in strict reverse order.
    ///
    /// # Edge Cases Handled
    ///
    /// * **Directory already gone**: removing it is a no-op
    /// * **Copy already gone**: deleting it is a no-op
    /// * **Moved file gone**: a [`RollbackError::SourceMissing`], rollback stops
    /// * **Original location taken**: a [`RollbackError::Occupied`], nothing is overwritten
    /// * **Created parents no longer empty**: left in place with a warning
    pub fn rollback(actions: Vec<UndoAction>) -> Result<(), RollbackError> {
        let total = actions.len();
        info!(steps = total, "rolling back");

        for (position, action) in actions.into_iter().rev().enumerate() {
            debug!(index = total - position - 1, step = ?action.step, "undoing");
            Self::undo_step(&action.step)?;
            remove_created_dirs(&action.created_dirs);
        }

        info!(steps = total, "rollback complete");
        Ok(())
    }

    fn undo_step(step: &UndoStep) -> Result<(), RollbackError> {
        match step {
            UndoStep::RemoveDir { path } => match fs::remove_dir(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_error("remove directory", path, e)),
            },
            UndoStep::Delete { path } => match remove_any(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_error("delete", path, e)),
            },
            UndoStep::MoveBack { from, to } => {
                Self::ready_to_restore(from, to)?;
                relocate(from, to).map_err(|e| io_error("move back", from, e))
            }
            UndoStep::RenameBack { from, to } => {
                Self::ready_to_restore(from, to)?;
                fs::rename(from, to).map_err(|e| io_error("rename back", from, e))
            }
        }
    }

    fn ready_to_restore(from: &Path, to: &Path) -> Result<(), RollbackError> {
        if fs::symlink_metadata(from).is_err() {
            return Err(RollbackError::SourceMissing {
                path: from.to_path_buf(),
            });
        }
        if fs::symlink_metadata(to).is_ok() {
            return Err(RollbackError::Occupied {
                path: to.to_path_buf(),
            });
        }
        Ok(())
    }
}

fn io_error(action: &'static str, path: &Path, source: io::Error) -> RollbackError {
    RollbackError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}
