//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified,
//! owner-scoped interface for the filesystem side of cirrus. Every method
//! takes the [`Owner`] first: a backend never sees a path that isn't already
//! pinned beneath one principal's root.

mod local;

pub use self::local::LocalBackend;
use crate::error::Result;
use crate::models::Entry;
use crate::path::{LogicalPath, Owner};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};

pub(crate) type EntryStream<'a> = Pin<Box<dyn Stream<Item = Result<Entry>> + Send + 'a>>;
pub type BoxAsyncRead = Box<dyn AsyncRead + Send + Unpin + 'static>;
pub type BoxAsyncWrite = Box<dyn AsyncWrite + Send + Unpin + 'static>;

/// Unified interface for storage backends.
///
/// All storage operations are asynchronous. It's a glorified CRUD interface
/// over a directory tree, scoped per owner.
///
/// # Path Handling
/// Paths are [`LogicalPath`]s, which are validated on construction, so
/// implementations only have to map them beneath the owner's root. Operations
/// that would touch the owner's root itself (writing, deleting or renaming
/// it) must be rejected with [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use cirrus_storage::{LogicalPath, Owner, backend::StorageBackend, error::Result};
///
/// async fn size_of_report(backend: &dyn StorageBackend, owner: &Owner) -> Result<u64> {
///     let path: LogicalPath = "docs/report.pdf".parse()?;
///     if backend.exists(owner, &path).await? {
///         Ok(backend.stat(owner, &path).await?.size)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// List the immediate children of a folder.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, owner: &Owner, folder: &LogicalPath) -> Result<Vec<Entry>> {
        self.list_stream(owner, folder).try_collect().await
    }

    /// Stream the immediate children of a folder.
    ///
    /// Entries are yielded in whatever order the backend produces them,
    /// hidden entries included; filtering and ordering is the caller's
    /// business. A folder that doesn't exist yields nothing rather than an
    /// error: a folder that hasn't been created yet is just empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use cirrus_storage::{LogicalPath, Owner, backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend, owner: &Owner) -> Result<()> {
    /// let folder: LogicalPath = "photos".parse()?;
    /// let mut stream = backend.list_stream(owner, &folder);
    /// while let Some(entry) = stream.try_next().await? {
    ///     println!("{}: {} bytes", entry.path, entry.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, owner: &'a Owner, folder: &'a LogicalPath) -> EntryStream<'a>;

    /// Check if a file or folder exists.
    async fn exists(&self, owner: &Owner, path: &LogicalPath) -> Result<bool>;

    /// Get entry metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if nothing
    /// exists at `path`.
    async fn stat(&self, owner: &Owner, path: &LogicalPath) -> Result<Entry>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, owner: &Owner, path: &LogicalPath) -> Result<Vec<u8>>;

    /// Read only the first N bytes (for signature detection).
    ///
    /// If the file is smaller than `bytes`, returns the entire file.
    async fn read_head(&self, owner: &Owner, path: &LogicalPath, bytes: usize) -> Result<Vec<u8>>;

    /// Open a file for streaming reads.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist, and [`WrongType`](crate::error::ErrorKind::WrongType)
    /// if `path` is a folder.
    async fn reader(&self, owner: &Owner, path: &LogicalPath) -> Result<BoxAsyncRead>;

    /// Write file contents, creating parent folders as needed.
    async fn write(&self, owner: &Owner, path: &LogicalPath, data: &[u8]) -> Result<()>;

    /// Open a file for streaming writes, creating parent folders as needed.
    ///
    /// Callers should `flush()` (or `shutdown()`) before dropping the writer
    /// so that errors are propagated.
    async fn writer(&self, owner: &Owner, path: &LogicalPath) -> Result<BoxAsyncWrite>;

    /// Create a folder (and any missing parents).
    ///
    /// Creating a folder that already exists is not an error.
    async fn create_folder(&self, owner: &Owner, path: &LogicalPath) -> Result<()>;

    /// Delete a file, or a folder together with everything inside it.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if nothing
    /// exists at `path`.
    async fn delete(&self, owner: &Owner, path: &LogicalPath) -> Result<()>;

    /// Rename/move a file or folder.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the source
    /// does not exist.
    ///
    /// # Notes
    /// - Implementations should create parent folders of the destination
    /// - If the destination already exists, the platform's rename semantics
    ///   apply (files are overwritten)
    async fn rename(&self, owner: &Owner, from: &LogicalPath, to: &LogicalPath) -> Result<()>;
}
