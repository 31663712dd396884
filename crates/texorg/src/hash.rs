use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::StorageError;

/// Short content hash used for the `[sha5]` path token: the first five
/// hex characters of the file's SHA-256.
pub fn sha5_of_file(path: &Path) -> Result<String, StorageError> {
    let mut file = std::fs::File::open(path).map_err(|e| StorageError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| StorageError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    let hex = format!("{:x}", digest);
    Ok(hex[..5].to_string())
}
