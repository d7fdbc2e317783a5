//! BLAKE3 file hasher with streaming support.
//!
//! # Overview
//!
//! The [`Hasher`] reads a file in fixed-size chunks and feeds each chunk
//! to a BLAKE3 state, so memory use does not grow with file size. After
//! every chunk the caller's progress callback receives the number of bytes
//! consumed so far for that file.
//!
//! The digest is a pure function of the content: the path, chunk size and
//! timing never influence it.
//!
//! # Example
//!
//! ```no_run
//! use dupestash::scanner::{hash_to_hex, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let hash = hasher
//!     .hash_with_progress(Path::new("movie.mkv"), |read| println!("{} bytes", read))
//!     .unwrap();
//! println!("{}", hash_to_hex(&hash));
//! ```

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use super::HashingError;

/// 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Default read size per chunk (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Smallest chunk size accepted by [`Hasher::with_chunk_size`].
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

/// Streaming content hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    chunk_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher reading [`DEFAULT_CHUNK_SIZE`] bytes at a time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Use a different chunk size, clamped to at least [`MIN_CHUNK_SIZE`].
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(MIN_CHUNK_SIZE);
        self
    }

    /// Bytes read per chunk.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Hash an entire file.
    ///
    /// # Errors
    ///
    /// Returns a [`HashingError`] naming the path if the file cannot be
    /// opened or a read fails part-way.
    pub fn full_hash(&self, path: &Path) -> Result<Hash, HashingError> {
        self.hash_with_progress(path, |_| {})
    }

    /// Hash an entire file, reporting cumulative bytes after each chunk.
    ///
    /// # Errors
    ///
    /// Returns a [`HashingError`] naming the path if the file cannot be
    /// opened or a read fails part-way. No partial digest is returned.
    pub fn hash_with_progress<F>(&self, path: &Path, on_chunk: F) -> Result<Hash, HashingError>
    where
        F: FnMut(u64),
    {
        let file = File::open(path).map_err(|e| HashingError::from_io(path, e))?;
        self.hash_reader(file, on_chunk)
            .map_err(|e| HashingError::from_io(path, e))
    }

    /// Hash everything a reader yields.
    ///
    /// # Errors
    ///
    /// Propagates the first non-`Interrupted` read error.
    pub fn hash_reader<R, F>(&self, mut reader: R, mut on_chunk: F) -> io::Result<Hash>
    where
        R: Read,
        F: FnMut(u64),
    {
        let mut state = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.chunk_size];
        let mut consumed: u64 = 0;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            state.update(&buffer[..n]);
            consumed += n as u64;
            on_chunk(consumed);
        }

        Ok(*state.finalize().as_bytes())
    }
}

/// Lowercase hex encoding of a digest (64 characters).
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    blake3::Hash::from(*hash).to_hex().to_string()
}
