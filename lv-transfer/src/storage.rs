//! Archive and CSV file storage
//!
//! Every file the admin API reads or writes lives directly inside one
//! directory (`<root>/transfers`). Requests name files by bare file name.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid file name '{0}'")]
    InvalidName(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Directory holding transfer archives and CSV uploads
#[derive(Debug, Clone)]
pub struct ArchiveStorage {
    dir: PathBuf,
}

impl ArchiveStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the storage directory if needed
    pub fn ensure_exists(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    /// Path for a bare file name; names with separators or `..` are rejected
    pub fn path_for(&self, file_name: &str) -> Result<PathBuf, StorageError> {
        let trimmed = file_name.trim();
        let invalid = trimmed.is_empty()
            || trimmed == "."
            || trimmed.contains("..")
            || trimmed.contains('/')
            || trimmed.contains('\\')
            || trimmed.contains('\0');

        if invalid {
            return Err(StorageError::InvalidName(file_name.to_string()));
        }

        Ok(self.dir.join(trimmed))
    }

    /// Path of an existing file
    pub fn existing(&self, file_name: &str) -> Result<PathBuf, StorageError> {
        let path = self.path_for(file_name)?;
        if !path.is_file() {
            return Err(StorageError::NotFound(file_name.to_string()));
        }
        Ok(path)
    }

    /// Fresh path for an export taken at `at`
    ///
    /// `transfer-YYYYMMDD-HHMMSS.tar.gz`, with `-2`, `-3`, ... appended when
    /// an export of the same second already exists.
    pub fn new_export_path(&self, at: DateTime<Utc>) -> PathBuf {
        let stem = format!("transfer-{}", at.format("%Y%m%d-%H%M%S"));
        let mut path = self.dir.join(format!("{}.tar.gz", stem));
        let mut suffix = 2;

        while path.exists() {
            path = self.dir.join(format!("{}-{}.tar.gz", stem, suffix));
            suffix += 1;
        }

        path
    }
}
