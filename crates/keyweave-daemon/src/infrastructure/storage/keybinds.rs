//! Writes the generated compositor keybind fragment.
//!
//! The fragment is regenerated from scratch on every config application.  It
//! is written to a temporary file next to the target and renamed over it, so
//! the compositor never reads a half-written file.

use std::path::{Path, PathBuf};

use super::config::StorageError;

/// Atomically replaces `path` with `contents`, creating parent directories.
///
/// # Errors
///
/// [`StorageError::Io`] naming the path that failed.
pub fn write_atomically(path: &Path, contents: &str) -> Result<(), StorageError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| StorageError::Io { path, source }
    };

    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(io_error(dir))?;
    }
    let temp = temp_path(path);
    std::fs::write(&temp, contents).map_err(io_error(&temp))?;
    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(io_error(path)(e));
    }
    Ok(())
}

/// `dir/.name.tmp` for `dir/name`: same directory, so the rename is atomic.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "keybinds".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
