//! On-disk stores.
//!
//! - [`urls`]: line-delimited URL sets (canonical and temp stores)
//! - [`articles`]: the CSV article record store
//!
//! Every mutation is a complete file operation. Appends write one buffer in a
//! single call, and whole-file rewrites go through a sibling `.partial` file
//! that is renamed over the target. A run interrupted between two mutations
//! therefore leaves each file well-formed.

pub mod articles;
pub mod urls;

pub use articles::ArticleStore;
pub use urls::UrlStore;

use crate::errors::StoreError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Read a whole file, treating "not found" as `None`.
pub(crate) async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Create the parent directory of `path` if it has one.
pub(crate) async fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e)),
        _ => Ok(()),
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Replace the contents of `path` via write-then-rename.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    ensure_parent(path).await?;
    let tmp = partial_path(path);
    fs::write(&tmp, contents)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}
