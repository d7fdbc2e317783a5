//! Index record definitions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::scanner::path_utils::{join_record_path, path_key, split_for_record};
use crate::scanner::{hash_to_hex, Hash};

/// One row of the `files` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// SHA-256 (hex) of the normalized absolute path
    pub id: String,
    /// File name with extension, on-disk spelling
    pub fullname: String,
    /// Parent directory, forward slashes, on-disk spelling
    pub directory: String,
    /// BLAKE3 (hex) of the file content
    pub hash: String,
    /// Reserved; always `None` in this version
    pub original: Option<String>,
    /// Reserved for incremental rescans; always `false` in this version
    pub uptodate: bool,
}

impl FileRecord {
    /// Build the record for a file whose content hash is known.
    ///
    /// Returns `None` if the path is not UTF-8 or has no file name.
    #[must_use]
    pub fn new(path: &Path, hash: &Hash) -> Option<Self> {
        let (directory, fullname) = split_for_record(path)?;
        Some(Self {
            id: record_id(path),
            fullname,
            directory,
            hash: hash_to_hex(hash),
            original: None,
            uptodate: false,
        })
    }

    /// Filesystem path of the file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        join_record_path(&self.directory, &self.fullname)
    }

    /// Key of the tie-break order: `directory + "/" + fullname`,
    /// compared byte-wise.
    ///
    /// SQLite's default BINARY collation compares the same way, so the
    /// index query and in-memory sorting agree.
    #[must_use]
    pub fn sort_key(&self) -> String {
        format!("{}/{}", self.directory, self.fullname)
    }
}

/// Derive the record id for an absolute path.
///
/// The id only depends on the normalized spelling, so NFC and NFD forms
/// of the same name share one id.
#[must_use]
pub fn record_id(path: &Path) -> String {
    let digest = Sha256::digest(path_key(path).as_bytes());
    format!("{:x}", digest)
}
