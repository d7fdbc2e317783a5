//! Persistent file index.
//!
//! This module stores one [`FileRecord`] per scanned file in SQLite so a
//! second run against the same root can skip straight to relocation.
//!
//! # Architecture
//!
//! * [`database`]: connection setup, schema, the scan transaction and the
//!   duplicate-group query.
//! * [`record`]: the stored row and how its id is derived.
//!
//! # Consistency
//!
//! A full scan is written through [`FileIndex::write_scan`], which wraps
//! every insert in one transaction. Either all records of the scan become
//! visible or none do.

pub mod database;
pub mod record;

pub use database::{FileIndex, IndexError, IndexResult, ScanWriter};
pub use record::{record_id, FileRecord};
