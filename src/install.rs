//! Install directory lifecycle.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result of preparing an install directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prepared {
    Created,
    /// Directory already existed and the caller agreed to reuse it.
    Reused,
    /// Directory already existed and the caller declined.
    Declined,
}

/// Create the install directory, or ask before reusing an existing one.
pub fn prepare_install_dir(
    dir: &Path,
    confirm_existing: impl FnOnce(&Path) -> bool,
) -> Result<Prepared, InstallDirError> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(InstallDirError::NotADirectory(dir.to_path_buf()));
        }
        if !confirm_existing(dir) {
            return Ok(Prepared::Declined);
        }
        tracing::debug!(dir = %dir.display(), "reusing existing install directory");
        return Ok(Prepared::Reused);
    }

    std::fs::create_dir_all(dir).map_err(|source| InstallDirError::Create {
        source,
        path: dir.to_path_buf(),
    })?;
    tracing::info!(dir = %dir.display(), "created install directory");
    Ok(Prepared::Created)
}

/// Create the install directory if it is missing. Returns true if it had to be created.
pub fn ensure_install_dir(dir: &Path) -> Result<bool, InstallDirError> {
    if dir.is_dir() {
        return Ok(false);
    }
    std::fs::create_dir_all(dir).map_err(|source| InstallDirError::Create {
        source,
        path: dir.to_path_buf(),
    })?;
    Ok(true)
}

/// Delete an install directory and everything in it. There is no undo.
pub fn delete_install_dir(dir: &Path) -> Result<(), InstallDirError> {
    std::fs::remove_dir_all(dir).map_err(|source| InstallDirError::Remove {
        source,
        path: dir.to_path_buf(),
    })?;
    tracing::info!(dir = %dir.display(), "deleted install directory");
    Ok(())
}

#[derive(Debug, Error)]
pub enum InstallDirError {
    #[error("Failed to create directory {dir}: {source}", dir = .path.display())]
    Create {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("Failed to remove {dir}: {source}", dir = .path.display())]
    Remove {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("{dir} exists and is not a directory", dir = .0.display())]
    NotADirectory(PathBuf),
}
