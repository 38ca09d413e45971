//! Path containment and file existence probes.
//!
//! [`is_inside`] is purely lexical and never fails. [`file_exists`] is the
//! only function here that touches the filesystem.

use std::io;
use std::path::{Component, Path, PathBuf};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of an existence check.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Something other than a regular file sits at a path that must hold one.
    #[error("Not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    /// Any I/O failure other than "not found", passed through unchanged.
    #[error(transparent)]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Path guard
// ---------------------------------------------------------------------------

/// Resolve `path` to an absolute, lexically normalized form.
///
/// Relative paths are joined onto the current directory. `.` components are
/// dropped and `..` pops the previous component (never above the root).
/// Symlinks are not followed. Returns `None` if the current directory cannot
/// be determined.
pub fn normalize(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

/// Returns `true` only if `child` is strictly inside `parent`.
///
/// Both paths are normalized first. Equal paths are not "inside", and any
/// normalization failure yields `false`.
pub fn is_inside(child: impl AsRef<Path>, parent: impl AsRef<Path>) -> bool {
    let (Some(child), Some(parent)) = (normalize(child.as_ref()), normalize(parent.as_ref()))
    else {
        return false;
    };
    child != parent && child.starts_with(&parent)
}

// ---------------------------------------------------------------------------
// Existence check
// ---------------------------------------------------------------------------

/// Check whether `path` exists and is a regular file.
///
/// - Missing path: `Ok(false)`.
/// - Directory, or symlink resolving to a non-file: [`FsError::NotAFile`].
/// - Any other I/O failure: [`FsError::Io`].
pub async fn file_exists(path: impl AsRef<Path>) -> Result<bool, FsError> {
    let path = path.as_ref();
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(true),
        Ok(_) => Err(FsError::NotAFile(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FsError::Io(e)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
