//! Hard boundary enforcement against system-critical directories.
//!
//! The guard holds a fixed deny-list of system prefixes for the platform
//! families we know about. Any path equal to or below one of them is refused,
//! comparing canonical forms on both sides. Resolution failures on the input
//! are refusals too: the guard never fails open.

use crate::error::Abort;
use once_cell::sync::Lazy;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// System prefixes no approved root or operation endpoint may touch.
const FORBIDDEN_PATH_PREFIXES: &[&str] = &[
    // Windows
    "C:/Windows",
    "C:/Program Files",
    "C:/Program Files (x86)",
    "C:/System Volume Information",
    "C:/$Recycle.Bin",
    // Linux
    "/boot",
    "/sys",
    "/proc",
    "/dev",
    "/lib",
    "/usr",
    "/etc",
    // macOS
    "/System",
    "/Library",
    "/Applications",
    "/Volumes",
];

/// Canonical forms of the prefixes that exist on this host.
static RESOLVED_PREFIXES: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    FORBIDDEN_PATH_PREFIXES
        .iter()
        .map(Path::new)
        .filter(|prefix| prefix.is_absolute())
        .filter_map(|prefix| fs::canonicalize(prefix).ok())
        .collect()
});

/// Checks paths against the forbidden system prefixes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathGuard;

impl PathGuard {
    /// Refuses `path` if it resolves to, or below, a forbidden prefix.
    ///
    /// The path must exist: it is canonicalized strictly, so an unresolvable
    /// path is an abort. Use [`PathGuard::check_endpoint`] for operation
    /// endpoints that may not exist yet.
    pub fn check(path: &Path) -> Result<(), Abort> {
        let resolved = fs::canonicalize(path).map_err(|e| {
            Abort::new(format!(
                "Failed to resolve path {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::check_resolved(&resolved)
    }

    /// Like [`PathGuard::check`] but tolerates a missing tail.
    ///
    /// Returns the resolved form so callers can reuse it.
    pub fn check_endpoint(path: &Path) -> Result<PathBuf, Abort> {
        let resolved = resolve_lenient(path).map_err(|e| {
            Abort::new(format!(
                "Failed to resolve path {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::check_resolved(&resolved)?;
        Ok(resolved)
    }

    /// Checks an already canonical path.
    pub fn check_resolved(resolved: &Path) -> Result<(), Abort> {
        for forbidden in RESOLVED_PREFIXES.iter() {
            if resolved.starts_with(forbidden) {
                debug!(path = %resolved.display(), prefix = %forbidden.display(), "forbidden path refused");
                return Err(Abort::new(format!(
                    "Forbidden system path: {}",
                    resolved.display()
                )));
            }
        }
        Ok(())
    }
}

/// Resolves an absolute path whose final components may not exist yet.
///
/// The deepest existing ancestor is canonicalized (following symlinks) and the
/// missing components are appended back. `..` is refused anywhere in the path
/// since it cannot be interpreted safely before the prefix exists.
pub fn resolve_lenient(path: &Path) -> io::Result<PathBuf> {
    if !path.is_absolute() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path is not absolute",
        ));
    }

    let mut base = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "parent directory components are not permitted",
                ));
            }
            Component::CurDir => {}
            other => base.push(other.as_os_str()),
        }
    }

    let mut missing = Vec::new();
    loop {
        match fs::canonicalize(&base) {
            Ok(mut resolved) => {
                for name in missing.iter().rev() {
                    resolved.push(name);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let name = base.file_name().map(|n| n.to_os_string()).ok_or(e)?;
                missing.push(name);
                base.pop();
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_forbidden_prefix_and_descendants_rejected() {
        assert!(PathGuard::check(Path::new("/etc")).is_err());
        assert!(PathGuard::check(Path::new("/usr/bin")).is_err());
        assert!(PathGuard::check_endpoint(Path::new("/etc/not-yet-there/file.txt")).is_err());
    }

    #[test]
    fn test_temp_directory_allowed() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        assert!(PathGuard::check(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_unresolvable_input_fails_closed() {
        let result = PathGuard::check(Path::new("/definitely/not/a/real/path"));
        let abort = result.expect_err("missing path must abort");
        assert!(abort.reason.contains("Failed to resolve"));
    }

    #[test]
    fn test_resolve_lenient_appends_missing_tail() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let canonical_root = fs::canonicalize(temp_dir.path()).unwrap();

        let resolved = resolve_lenient(&temp_dir.path().join("Docs").join("a.pdf")).unwrap();
        assert_eq!(resolved, canonical_root.join("Docs").join("a.pdf"));
    }

    #[test]
    fn test_resolve_lenient_rejects_parent_components() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let sneaky = temp_dir.path().join("..").join("elsewhere");
        assert!(resolve_lenient(&sneaky).is_err());
        assert!(PathGuard::check_endpoint(&sneaky).is_err());
    }

    #[test]
    fn test_resolve_lenient_rejects_relative_paths() {
        assert!(resolve_lenient(Path::new("relative/path")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_into_forbidden_directory_rejected() {
        if fs::canonicalize("/etc").is_err() {
            return;
        }
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let link = temp_dir.path().join("sneaky");
        std::os::unix::fs::symlink("/etc", &link).unwrap();

        assert!(PathGuard::check(&link).is_err());
        assert!(PathGuard::check_endpoint(&link.join("passwd.bak")).is_err());
    }
}
