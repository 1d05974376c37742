//! Directory synchronization.
//!
//! Listing a folder is also when the metadata store catches up with the
//! filesystem: entries nobody has recorded yet are sniffed and recorded, and
//! records for entries that have disappeared are dropped.

use crate::error::{ErrorKind, Result, from_storage};
use cirrus_cache::{FileRecord, Repository};
use cirrus_storage::error::ErrorKind as StorageErrorKind;
use cirrus_storage::{BackendHandle, Entry, FileType, LogicalPath, Owner, SNIFF_LEN};
use exn::ResultExt;
use futures::StreamExt;
use std::cmp::Ordering;
use std::collections::HashSet;
use time::UtcDateTime;
use tracing::instrument;

/// One visible child of a listed folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub name: String,
    pub is_folder: bool,
    /// Size in bytes (zero for folders).
    pub size: u64,
    pub modified: UtcDateTime,
    pub file_type: FileType,
}
impl Listing {
    /// Folders first, then names compared byte by byte.
    fn order(a: &Self, b: &Self) -> Ordering {
        b.is_folder.cmp(&a.is_folder).then_with(|| a.name.as_bytes().cmp(b.name.as_bytes()))
    }
}

/// Produces the authoritative listing of `folder` and reconciles the
/// metadata store with it.
///
/// A folder that doesn't exist lists as empty (and any records still claiming
/// to be inside it are removed). Failing to read the filesystem or the store
/// is [`StorageUnavailable`](ErrorKind::StorageUnavailable).
#[instrument(skip_all, fields(owner = %owner, folder = %folder))]
pub async fn list_folder(
    backend: &BackendHandle,
    cache: &Repository,
    owner: &Owner,
    folder: &LogicalPath,
) -> Result<Vec<Listing>> {
    let mut on_disk = HashSet::new();
    let mut listings = Vec::new();
    let mut entries = backend.list_stream(owner, folder);
    while let Some(entry) = entries.next().await {
        let entry = match entry {
            Ok(entry) => entry,
            // Deleted between being listed and being looked at.
            Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => continue,
            Err(err) => return Err(from_storage(err, ErrorKind::StorageUnavailable)),
        };
        on_disk.insert(entry.path.clone());
        if entry.is_hidden() {
            continue;
        }
        let Some(record) = ensure_record(backend, cache, owner, &entry).await? else {
            continue;
        };
        listings.push(Listing {
            name: entry.name().to_string(),
            is_folder: entry.is_folder,
            size: entry.size,
            modified: entry.modified,
            file_type: record.file_type,
        });
    }
    drop(entries);
    remove_stale(cache, owner, folder, &on_disk).await?;
    listings.sort_by(Listing::order);
    tracing::debug!(count = listings.len(), "Listed folder");
    Ok(listings)
}

/// Looks up the record for an entry, creating one if there isn't any.
///
/// Returns `None` if the entry vanished before it could be sniffed.
async fn ensure_record(
    backend: &BackendHandle,
    cache: &Repository,
    owner: &Owner,
    entry: &Entry,
) -> Result<Option<FileRecord>> {
    if let Some(record) = cache.find(owner, &entry.path).await.or_raise(|| ErrorKind::StorageUnavailable)? {
        return Ok(Some(record));
    }
    let record = match describe(backend, owner, entry).await {
        Ok(record) => record,
        Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => return Ok(None),
        Err(err) => return Err(err),
    };
    if cache.upsert_if_absent(&record).await.or_raise(|| ErrorKind::StorageUnavailable)? {
        tracing::debug!(path = %record.path, file_type = %record.file_type, "Recorded untracked entry");
    }
    Ok(Some(record))
}

/// Builds a fresh record for an on-disk entry, sniffing files for their type.
pub(crate) async fn describe(backend: &BackendHandle, owner: &Owner, entry: &Entry) -> Result<FileRecord> {
    if entry.is_folder {
        return Ok(FileRecord::folder(owner.clone(), entry.path.clone(), entry.modified));
    }
    let head = backend
        .read_head(owner, &entry.path, SNIFF_LEN)
        .await
        .map_err(|err| from_storage(err, ErrorKind::StorageUnavailable))?;
    let file_type = FileType::sniff(&head, entry.name());
    Ok(FileRecord::file(owner.clone(), entry.path.clone(), entry.size, file_type, entry.modified))
}

/// Drops records of direct children that are no longer on disk, together
/// with everything recorded beneath them.
async fn remove_stale(
    cache: &Repository,
    owner: &Owner,
    folder: &LogicalPath,
    on_disk: &HashSet<LogicalPath>,
) -> Result<()> {
    let recorded = cache.list_folder(owner, folder).await.or_raise(|| ErrorKind::StorageUnavailable)?;
    for record in recorded.into_iter().filter(|r| !on_disk.contains(&r.path)) {
        let removed = cache.delete_by_path(owner, &record.path).await.or_raise(|| ErrorKind::StorageUnavailable)?;
        tracing::info!(path = %record.path, removed, "Removed records for missing entry");
    }
    Ok(())
}
