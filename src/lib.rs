//! dupestash - find identical files and move the extra copies aside
//!
//! A scan walks a directory tree, hashes every regular file with BLAKE3 and
//! stores one record per file in a SQLite index next to the tree. Files
//! sharing a hash form a duplicate group; one member stays in place and the
//! others are moved into a sibling directory that mirrors the original
//! layout.
//!
//! ```no_run
//! use dupestash::config::RunPaths;
//! use dupestash::index::FileIndex;
//! use dupestash::pipeline::Pipeline;
//! use dupestash::progress::SilentObserver;
//! use std::path::Path;
//!
//! let paths = RunPaths::derive(Path::new("/data/photos"), None, "_duplicates").unwrap();
//! let mut index = FileIndex::open(&paths.index_path).unwrap();
//! let outcome = Pipeline::new(&paths.scan_root, &paths.duplicates_root)
//!     .run(&mut index, &SilentObserver)
//!     .unwrap();
//! println!("{}", outcome.report.summary());
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod index;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod signal;

pub use app::run_app;
