//! Duplicate handling.
//!
//! - [`groups`]: derive duplicate groups and pick the kept file
//! - [`relocate`]: move the other members into the duplicates tree

pub mod groups;
pub mod relocate;

pub use groups::{group_records, DuplicateGroup, GroupingStats};
pub use relocate::{RelocatedFile, RelocationError, RelocationReport, Relocator, ResolvedGroup};
