//! Filesystem helpers for the output tree.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StorageError;

pub fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Outcome of a policy-aware copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    /// Destination already existed and overwriting is disabled. The
    /// destination path is still valid output.
    SkippedExisting,
}

/// Copies `from` to `to`, creating parent directories. When `to` exists
/// and `overwrite` is false the copy is skipped, not treated as an error,
/// so re-runs stay idempotent.
pub fn copy_file(from: &Path, to: &Path, overwrite: bool) -> Result<CopyOutcome, StorageError> {
    if to.exists() && !overwrite {
        debug!(path = %to.display(), "destination exists, skipping copy");
        return Ok(CopyOutcome::SkippedExisting);
    }

    if let Some(parent) = to.parent() {
        ensure_directory(parent)?;
    }

    std::fs::copy(from, to).map_err(|e| StorageError::CopyFile {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    })?;
    debug!(from = %from.display(), to = %to.display(), "copied file");
    Ok(CopyOutcome::Copied)
}

pub fn write_pretty_json(path: &Path, value: &serde_json::Value) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(value, &mut serializer).map_err(|e| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    buf.push(b'\n');

    std::fs::write(path, buf).map_err(|e| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Relativizes `path` against `base`, falling back to the absolute path
/// when it is not underneath the base.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    match path.strip_prefix(base) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => {
            warn!(path = %path.display(), base = %base.display(), "path not under base, keeping absolute");
            path.to_path_buf()
        }
    }
}
