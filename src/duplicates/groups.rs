//! Duplicate groups derived from the file index.
//!
//! # Overview
//!
//! A duplicate group is the set of two or more [`FileRecord`]s that share
//! one content hash. Exactly one member is the *kept* file; the rest are
//! relocated.
//!
//! The kept file is chosen deterministically: members are ordered by
//! [`FileRecord::sort_key`] (`directory + "/" + fullname`, compared
//! byte-wise) and the first one is kept. Insertion order and SQL result
//! order never matter.
//!
//! # Example
//!
//! ```
//! use dupestash::duplicates::group_records;
//! use dupestash::index::FileRecord;
//! use std::path::Path;
//!
//! let x = blake3::hash(b"X");
//! let y = blake3::hash(b"Y");
//! let records = vec![
//!     FileRecord::new(Path::new("/root/a/2.txt"), x.as_bytes()).unwrap(),
//!     FileRecord::new(Path::new("/root/b/3.txt"), y.as_bytes()).unwrap(),
//!     FileRecord::new(Path::new("/root/a/1.txt"), x.as_bytes()).unwrap(),
//! ];
//!
//! let groups = group_records(records);
//! assert_eq!(groups.len(), 1);
//! assert_eq!(groups[0].kept.fullname, "1.txt");
//! assert_eq!(groups[0].duplicates[0].fullname, "2.txt");
//! ```

use serde::{Deserialize, Serialize};

use crate::index::FileRecord;

/// Set of two or more records with identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// BLAKE3 hash (hex) shared by every member
    pub hash: String,
    /// Member left at its original location
    pub kept: FileRecord,
    /// Members to relocate, in tie-break order
    pub duplicates: Vec<FileRecord>,
}

impl DuplicateGroup {
    /// Build a group from members sharing one hash.
    ///
    /// Returns `None` when fewer than two members are given. Members are
    /// sorted so the kept file does not depend on input order.
    #[must_use]
    pub fn from_members(mut members: Vec<FileRecord>) -> Option<Self> {
        if members.len() < 2 {
            return None;
        }
        members.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()).then_with(|| a.id.cmp(&b.id)));

        let mut iter = members.into_iter();
        let kept = iter.next()?;
        debug_assert!(iter.as_slice().iter().all(|r| r.hash == kept.hash));

        Some(Self {
            hash: kept.hash.clone(),
            kept,
            duplicates: iter.collect(),
        })
    }

    /// Number of members, kept file included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.duplicates.len() + 1
    }

    /// Always `false`; a group has at least two members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate over every member, kept file first.
    pub fn members(&self) -> impl Iterator<Item = &FileRecord> {
        std::iter::once(&self.kept).chain(self.duplicates.iter())
    }
}

/// Statistics about a set of duplicate groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingStats {
    /// Number of groups
    pub groups: usize,
    /// Total members across all groups
    pub members: usize,
    /// Members that will be relocated
    pub duplicates: usize,
}

impl GroupingStats {
    /// Compute statistics for `groups`.
    #[must_use]
    pub fn from_groups(groups: &[DuplicateGroup]) -> Self {
        groups.iter().fold(Self::default(), |mut stats, group| {
            stats.groups += 1;
            stats.members += group.len();
            stats.duplicates += group.duplicates.len();
            stats
        })
    }
}

/// Partition records into duplicate groups.
///
/// Groups come out ordered by hash; hashes with a single record produce no
/// group.
#[must_use]
pub fn group_records(mut records: Vec<FileRecord>) -> Vec<DuplicateGroup> {
    records.sort_by(|a, b| a.hash.cmp(&b.hash));

    let mut groups = Vec::new();
    let mut current: Vec<FileRecord> = Vec::new();

    for record in records {
        if current.first().is_some_and(|first| first.hash != record.hash) {
            groups.extend(DuplicateGroup::from_members(std::mem::take(&mut current)));
        }
        current.push(record);
    }
    groups.extend(DuplicateGroup::from_members(current));

    log::debug!(
        "Grouped records into {} duplicate group(s)",
        groups.len()
    );
    groups
}
