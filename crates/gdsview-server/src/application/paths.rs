//! Confines client-supplied paths to the served root directory.

use std::path::{Component, Path, PathBuf};

use crate::domain::ViewError;

/// Resolves `requested` against `root` and returns the canonical path.
///
/// Relative paths are taken relative to `root`; absolute paths are accepted
/// when they point inside it. `..` components are folded lexically first,
/// then an existing path is canonicalized so a symlink that leads out of the
/// root is caught too.
///
/// # Errors
///
/// - [`ViewError::PathEscape`] if the path leaves `root`.
/// - [`ViewError::NotFound`] if it stays inside `root` but does not exist.
pub fn resolve_under_root(root: &Path, requested: &Path) -> Result<PathBuf, ViewError> {
    let root = root
        .canonicalize()
        .map_err(|_| ViewError::NotFound(root.to_path_buf()))?;
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };
    let normalized = normalize(&joined);

    match normalized.canonicalize() {
        Ok(real) if real.starts_with(&root) => Ok(real),
        Ok(_) => Err(ViewError::PathEscape(requested.to_path_buf())),
        Err(_) if normalized.starts_with(&root) => Err(ViewError::NotFound(normalized)),
        Err(_) => Err(ViewError::PathEscape(requested.to_path_buf())),
    }
}

/// Folds `.` and `..` without touching the file system. `..` at the
/// file-system root stays at the root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
