//! File operations on behalf of a verified owner.
//!
//! Every mutation hits the filesystem first. The metadata store is only
//! updated once the filesystem agrees; when the store then fails, the failure
//! is logged and left for the next listing of the folder to repair.

use crate::error::{ErrorKind, Result, from_storage};
use crate::sync::describe;
use cirrus_cache::{FileRecord, Repository};
use cirrus_storage::backend::BoxAsyncRead;
use cirrus_storage::{BackendHandle, FileType, LogicalPath, Owner, SNIFF_LEN, content_type, validate_path};
use exn::ResultExt;
use time::UtcDateTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::instrument;

const COPY_BUFFER: usize = 64 * 1024;
/// Longest file name common filesystems accept, in bytes.
const MAX_NAME_BYTES: usize = 255;

/// A file ready to be streamed back to its owner.
pub struct Download {
    pub reader: BoxAsyncRead,
    pub name: String,
    pub content_type: String,
    pub size: u64,
}

/// Validates a client-supplied path for use with the operations below.
pub fn parse_path(raw: &str) -> Result<LogicalPath> {
    validate_path(raw).or_raise(|| ErrorKind::invalid(raw.escape_default().to_string()))
}

/// Reduces a client-supplied file name to something safe to store.
///
/// Only the final component survives, so `C:\Users\me\cat.png` and
/// `../../cat.png` both become `cat.png`.
fn sanitize_name(original: &str) -> Result<String> {
    let name = original.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if name.is_empty() || name == "." || name == ".." || name.chars().any(char::is_control) {
        exn::bail!(ErrorKind::invalid(original.escape_default().to_string()));
    }
    Ok(name.to_string())
}

fn unix_millis(now: UtcDateTime) -> i128 {
    now.unix_timestamp_nanos() / 1_000_000
}

/// Stores an upload in `folder` as `<unix-millis>-<name>`.
///
/// The body is streamed into a hidden temporary file that's renamed into
/// place once complete, so a listing never shows half an upload. If anything
/// goes wrong (including the body itself failing, or the upload being
/// abandoned mid-copy) the temporary file is removed and nothing is recorded.
#[instrument(skip_all, fields(owner = %owner, folder = %folder))]
pub async fn upload<R>(
    backend: &BackendHandle,
    cache: &Repository,
    owner: &Owner,
    folder: &LogicalPath,
    original_name: &str,
    body: R,
) -> Result<FileRecord>
where
    R: AsyncRead + Unpin + Send,
{
    let name = sanitize_name(original_name)?;
    let now = UtcDateTime::now();
    let stored = format!("{}-{name}", unix_millis(now));
    if stored.len() > MAX_NAME_BYTES {
        exn::bail!(ErrorKind::invalid(name));
    }
    let path = folder.join(&stored).or_raise(|| ErrorKind::invalid(name.clone()))?;
    let temp = folder
        .join(&format!(".upload-{}", now.unix_timestamp_nanos()))
        .or_raise(|| ErrorKind::invalid(name.clone()))?;

    backend
        .create_folder(owner, folder)
        .await
        .map_err(|err| from_storage(err, ErrorKind::WriteFailed))?;
    let partial = PartialUpload::new(backend, owner, &temp);
    let (size, head) = match write_temp(backend, owner, &temp, body).await {
        Ok(written) => written,
        Err(err) => {
            partial.discard().await;
            return Err(err);
        },
    };
    if let Err(err) = backend.rename(owner, &temp, &path).await {
        partial.discard().await;
        return Err(from_storage(err, ErrorKind::WriteFailed));
    }
    partial.keep();

    let record = FileRecord::file(owner.clone(), path, size, FileType::sniff(&head, &stored), now);
    if let Err(err) = cache.insert(&record).await {
        tracing::warn!(path = %record.path, error = ?err, "Stored upload but could not record it");
    }
    tracing::info!(path = %record.path, bytes = size, file_type = %record.file_type, "Stored upload");
    Ok(record)
}

/// A temporary upload file that is removed unless it's kept.
///
/// Dropping it (the request went away while the body was still being
/// copied) schedules the removal on the runtime, since `Drop` can't await.
struct PartialUpload {
    backend: BackendHandle,
    owner: Owner,
    temp: Option<LogicalPath>,
}
impl PartialUpload {
    fn new(backend: &BackendHandle, owner: &Owner, temp: &LogicalPath) -> Self {
        Self { backend: backend.clone(), owner: owner.clone(), temp: Some(temp.clone()) }
    }

    async fn discard(mut self) {
        if let Some(temp) = self.temp.take() {
            discard(&self.backend, &self.owner, &temp).await;
        }
    }

    fn keep(mut self) {
        self.temp = None;
    }
}
impl Drop for PartialUpload {
    fn drop(&mut self) {
        let Some(temp) = self.temp.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(path = %temp, "No runtime left to remove abandoned upload");
            return;
        };
        let backend = self.backend.clone();
        let owner = self.owner.clone();
        runtime.spawn(async move {
            tracing::debug!(path = %temp, "Upload abandoned mid-copy");
            discard(&backend, &owner, &temp).await;
        });
    }
}

/// Copies `body` into `temp`, returning the byte count and the leading bytes
/// needed to sniff the content type.
async fn write_temp<R>(backend: &BackendHandle, owner: &Owner, temp: &LogicalPath, mut body: R) -> Result<(u64, Vec<u8>)>
where
    R: AsyncRead + Unpin + Send,
{
    let mut writer = backend
        .writer(owner, temp)
        .await
        .map_err(|err| from_storage(err, ErrorKind::WriteFailed))?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    let mut buffer = vec![0u8; COPY_BUFFER];
    let mut size = 0u64;
    loop {
        let read = body.read(&mut buffer).await.or_raise(|| ErrorKind::WriteFailed)?;
        if read == 0 {
            break;
        }
        let chunk = &buffer[..read];
        if head.len() < SNIFF_LEN {
            let wanted = (SNIFF_LEN - head.len()).min(read);
            head.extend_from_slice(&chunk[..wanted]);
        }
        writer.write_all(chunk).await.or_raise(|| ErrorKind::WriteFailed)?;
        size += read as u64;
    }
    writer.shutdown().await.or_raise(|| ErrorKind::WriteFailed)?;
    Ok((size, head))
}

async fn discard(backend: &BackendHandle, owner: &Owner, temp: &LogicalPath) {
    match backend.delete(owner, temp).await {
        Ok(()) => tracing::debug!(path = %temp, "Removed partial upload"),
        Err(err) if matches!(&*err, cirrus_storage::error::ErrorKind::NotFound(_)) => {},
        Err(err) => tracing::warn!(path = %temp, error = ?err, "Could not remove partial upload"),
    }
}

/// Renames (or moves) a file or folder, carrying its records along.
///
/// The destination's parent folders are created as needed. If the source was
/// never recorded, a record is created for the destination instead.
#[instrument(skip_all, fields(owner = %owner, from = %from, to = %to))]
pub async fn rename(
    backend: &BackendHandle,
    cache: &Repository,
    owner: &Owner,
    from: &LogicalPath,
    to: &LogicalPath,
) -> Result<()> {
    if from.is_root() || to.is_root() {
        exn::bail!(ErrorKind::invalid(""));
    }
    let exists = backend
        .exists(owner, from)
        .await
        .map_err(|err| from_storage(err, ErrorKind::StorageUnavailable))?;
    if !exists {
        exn::bail!(ErrorKind::NotFound(from.to_string()));
    }
    backend
        .rename(owner, from, to)
        .await
        .map_err(|err| from_storage(err, ErrorKind::StorageUnavailable))?;
    match cache.update_path(owner, from, to).await {
        Ok(true) => {},
        Ok(false) => backfill(backend, cache, owner, to).await,
        Err(err) => tracing::warn!(error = ?err, "Renamed on disk but could not update records"),
    }
    tracing::info!("Renamed");
    Ok(())
}

async fn backfill(backend: &BackendHandle, cache: &Repository, owner: &Owner, path: &LogicalPath) {
    let record = match backend.stat(owner, path).await {
        Ok(entry) => describe(backend, owner, &entry).await,
        Err(err) => Err(from_storage(err, ErrorKind::StorageUnavailable)),
    };
    let result = match record {
        Ok(record) => cache.upsert_if_absent(&record).await.or_raise(|| ErrorKind::StorageUnavailable),
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        tracing::warn!(path = %path, error = ?err, "Could not record renamed entry");
    }
}

/// Deletes a file, or a folder and everything in it, along with its records.
#[instrument(skip_all, fields(owner = %owner, path = %path))]
pub async fn delete(backend: &BackendHandle, cache: &Repository, owner: &Owner, path: &LogicalPath) -> Result<()> {
    if path.is_root() {
        exn::bail!(ErrorKind::invalid(""));
    }
    backend
        .delete(owner, path)
        .await
        .map_err(|err| from_storage(err, ErrorKind::StorageUnavailable))?;
    match cache.delete_by_path(owner, path).await {
        Ok(removed) => tracing::info!(removed, "Deleted"),
        Err(err) => tracing::warn!(error = ?err, "Deleted on disk but could not remove records"),
    }
    Ok(())
}

/// Opens a file for download.
#[instrument(skip_all, fields(owner = %owner, path = %path))]
pub async fn download(backend: &BackendHandle, owner: &Owner, path: &LogicalPath) -> Result<Download> {
    if path.is_root() {
        exn::bail!(ErrorKind::invalid(""));
    }
    let entry = backend
        .stat(owner, path)
        .await
        .map_err(|err| from_storage(err, ErrorKind::StorageUnavailable))?;
    if entry.is_folder {
        exn::bail!(ErrorKind::invalid(path.to_string()));
    }
    let reader = backend
        .reader(owner, path)
        .await
        .map_err(|err| from_storage(err, ErrorKind::StorageUnavailable))?;
    let name = entry.name().to_string();
    Ok(Download {
        reader,
        content_type: content_type(&name),
        name,
        size: entry.size,
    })
}

/// Creates the folder `name` inside `parent`.
///
/// Creating a folder that already exists succeeds. Nothing is recorded here;
/// the folder is picked up the next time `parent` is listed.
#[instrument(skip_all, fields(owner = %owner, parent = %parent))]
pub async fn create_folder(
    backend: &BackendHandle,
    owner: &Owner,
    parent: &LogicalPath,
    name: &str,
) -> Result<LogicalPath> {
    let path = parent.join(name.trim()).or_raise(|| ErrorKind::invalid(name.escape_default().to_string()))?;
    backend
        .create_folder(owner, &path)
        .await
        .map_err(|err| from_storage(err, ErrorKind::WriteFailed))?;
    tracing::info!(path = %path, "Created folder");
    Ok(path)
}
