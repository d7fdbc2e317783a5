//! Path normalization utilities.
//!
//! Index records are keyed by a digest of the file's absolute path, so the
//! same file must always produce the same key. Two spellings can otherwise
//! differ for the same visual name:
//!
//! - Unicode form: macOS hands out NFD names (`e` + U+0301) where Linux and
//!   Windows typically use NFC (`é` as U+00E9).
//! - Separators: Windows paths use `\`, the index always stores `/`.
//!
//! # Example
//!
//! ```
//! use dupestash::scanner::path_utils::{path_key, split_for_record};
//! use std::path::Path;
//!
//! let nfc = Path::new("/photos/café.jpg");
//! let nfd = Path::new("/photos/cafe\u{0301}.jpg");
//! assert_eq!(path_key(nfc), path_key(nfd));
//!
//! let (directory, fullname) = split_for_record(nfc).unwrap();
//! assert_eq!(directory, "/photos");
//! assert_eq!(fullname, "café.jpg");
//! ```

use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Normalize a path string to NFC (Composed) form.
#[must_use]
pub fn normalize_path_str(s: &str) -> String {
    s.nfc().collect()
}

/// Convert a path to a forward-slash string.
///
/// Returns `None` for paths that are not valid UTF-8.
#[must_use]
pub fn to_slash(path: &Path) -> Option<String> {
    let s = path.to_str()?;
    if cfg!(windows) {
        Some(s.replace('\\', "/"))
    } else {
        Some(s.to_string())
    }
}

/// Normalized key for a path: forward slashes, NFC.
///
/// Used to derive record ids; never used to reopen the file.
#[must_use]
pub fn path_key(path: &Path) -> String {
    let slashed = to_slash(path).unwrap_or_else(|| path.to_string_lossy().replace('\\', "/"));
    normalize_path_str(&slashed)
}

/// Split an absolute file path into the `(directory, fullname)` pair stored
/// in the index, keeping the on-disk spelling.
///
/// Returns `None` if the path is not UTF-8 or has no file name.
#[must_use]
pub fn split_for_record(path: &Path) -> Option<(String, String)> {
    let fullname = path.file_name()?.to_str()?.to_string();
    let directory = to_slash(path.parent()?)?;
    Some((directory, fullname))
}

/// Make `path` absolute against the current directory without touching the
/// filesystem. Falls back to `path` unchanged if the current directory is
/// unavailable.
#[must_use]
pub fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Rebuild a filesystem path from a stored `(directory, fullname)` pair.
#[must_use]
pub fn join_record_path(directory: &str, fullname: &str) -> PathBuf {
    Path::new(directory).join(fullname)
}
