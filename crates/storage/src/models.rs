//! Storage models.
//!
//! These types describe what a storage backend knows about an entry without
//! consulting the metadata store.

use crate::path::LogicalPath;
use time::UtcDateTime;

/// Entry metadata returned by storage backends.
///
/// Produced by directory listings and `stat` calls; consumed by the
/// synchronizer when it reconciles a folder against the metadata store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Logical path relative to the owner's root
    pub path: LogicalPath,
    pub is_folder: bool,
    /// Size in bytes (always zero for folders)
    pub size: u64,
    /// Last modified timestamp
    pub modified: UtcDateTime,
}
impl Entry {
    pub fn file(path: LogicalPath, size: u64, modified: UtcDateTime) -> Self {
        Self { path, is_folder: false, size, modified }
    }

    pub fn folder(path: LogicalPath, modified: UtcDateTime) -> Self {
        Self { path, is_folder: true, size: 0, modified }
    }

    /// Final path segment; only the owner's root has none.
    pub fn name(&self) -> &str {
        self.path.name().unwrap_or_default()
    }

    /// Hidden and platform junk entries that listings never show.
    pub fn is_hidden(&self) -> bool {
        let name = self.name();
        name.starts_with('.') || name.eq_ignore_ascii_case("thumbs.db") || name.eq_ignore_ascii_case("desktop.ini")
    }
}
