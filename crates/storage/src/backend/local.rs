//! Local filesystem storage backend.
//!
//! This module provides a storage backend implementation for the local filesystem.
//! Each owner gets their own directory beneath the configured root, and files are
//! accessed using standard filesystem operations via `tokio::fs` for async I/O.

use crate::backend::{BoxAsyncRead, BoxAsyncWrite, EntryStream};
use crate::error::ErrorKind;
use crate::models::Entry;
use crate::path::{self, LogicalPath, Owner};
use crate::{StorageBackend, error::Result};
use async_stream::stream;
use async_trait::async_trait;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};
use tokio::io::AsyncReadExt;

enum ListEntry {
    Found(Entry),
    Skip,
}

/// Local filesystem storage backend.
///
/// Stores files in a directory on the local filesystem. An owner's logical
/// path `docs/a.pdf` lives at `<root>/<owner>/docs/a.pdf`.
///
/// # Examples
///
/// ```no_run
/// use cirrus_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("local", "/srv/cirrus/uploads").map_err(|e| e.to_string())?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory shared by all owners
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Arguments
    /// * `root` - Absolute path to the storage root directory
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists but is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::invalid(root.display().to_string()));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::WrongType(root));
            }
        } else {
            // Use non-async here; it'll only happen once on startup and it's
            // not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves an untrusted logical path for `owner` to an absolute path.
    ///
    /// Fails with [`InvalidPath`](ErrorKind::InvalidPath) for anything that
    /// tries to leave the owner's directory.
    pub fn resolve(&self, owner: &Owner, raw: &str) -> Result<PathBuf> {
        let path = path::validate(raw)?;
        Ok(self.absolute_path(owner, &path))
    }

    fn absolute_path(&self, owner: &Owner, path: &LogicalPath) -> PathBuf {
        path::resolve(&self.root, owner, path)
    }

    /// Same as [`absolute_path`](Self::absolute_path) but refuses the owner's
    /// root, for operations that must never replace or remove it.
    fn absolute_non_root(&self, owner: &Owner, path: &LogicalPath) -> Result<PathBuf> {
        if path.is_root() {
            exn::bail!(ErrorKind::invalid(""));
        }
        Ok(self.absolute_path(owner, path))
    }

    fn entry(path: LogicalPath, metadata: &Metadata) -> Result<Entry> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        Ok(match metadata.is_dir() {
            true => Entry::folder(path, modified),
            false => Entry::file(path, metadata.len(), modified),
        })
    }

    /// Error messages carry the logical path, never the absolute one.
    fn map_io_error(e: std::io::Error, path: impl AsRef<Path>) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.as_ref().to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.as_ref().to_path_buf()),
            std::io::ErrorKind::AlreadyExists
            | std::io::ErrorKind::IsADirectory
            | std::io::ErrorKind::NotADirectory
            | std::io::ErrorKind::DirectoryNotEmpty => ErrorKind::AlreadyExists(path.as_ref().to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    async fn create_parent(abs_path: &Path, path: &LogicalPath) -> Result<()> {
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path.as_str()))?;
        }
        Ok(())
    }

    /// Pulled out of the stream loop so that `?` can be used; the loop body
    /// only has to yield whatever comes back.
    async fn process_entry(entry: DirEntry, folder: &LogicalPath) -> Result<ListEntry> {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            tracing::warn!(folder = %folder, "Skipping entry with a non UTF-8 name");
            return Ok(ListEntry::Skip);
        };
        let Ok(path) = folder.join(&name) else {
            tracing::warn!(folder = %folder, name, "Skipping entry that can't be addressed by a logical path");
            return Ok(ListEntry::Skip);
        };
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, path.as_str()))?;
        // Note: symlinks are not followed (DirEntry::metadata does not
        // traverse them), so silently drop them along with sockets and
        // other oddities.
        if !metadata.is_dir() && !metadata.is_file() {
            return Ok(ListEntry::Skip);
        }
        Ok(ListEntry::Found(Self::entry(path, &metadata)?))
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, owner: &'a Owner, folder: &'a LogicalPath) -> EntryStream<'a> {
        let dir = self.absolute_path(owner, folder);
        Box::pin(stream! {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // A folder that doesn't exist yet is an empty folder.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
                Err(err) => {
                    yield Err(exn::Exn::from(Self::map_io_error(err, folder.as_str())));
                    return;
                }
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(exn::Exn::from(Self::map_io_error(e, folder.as_str())));
                        break;
                    },
                };
                match Self::process_entry(entry, folder).await {
                    Ok(ListEntry::Found(e)) => yield Ok(e),
                    Ok(ListEntry::Skip) => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    async fn exists(&self, owner: &Owner, path: &LogicalPath) -> Result<bool> {
        let abs_path = self.absolute_path(owner, path);
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn stat(&self, owner: &Owner, path: &LogicalPath) -> Result<Entry> {
        let abs_path = self.absolute_path(owner, path);
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path.as_str()))?;
        Self::entry(path.clone(), &metadata)
    }

    async fn read(&self, owner: &Owner, path: &LogicalPath) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(owner, path);
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path.as_str()))?)
    }

    async fn read_head(&self, owner: &Owner, path: &LogicalPath, bytes: usize) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(owner, path);
        let file = fs::File::open(&abs_path).await.map_err(|e| Self::map_io_error(e, path.as_str()))?;
        let mut buffer = Vec::with_capacity(bytes);
        file.take(bytes as u64).read_to_end(&mut buffer).await.map_err(ErrorKind::Io)?;
        Ok(buffer)
    }

    async fn reader(&self, owner: &Owner, path: &LogicalPath) -> Result<BoxAsyncRead> {
        let abs_path = self.absolute_path(owner, path);
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path.as_str()))?;
        if metadata.is_dir() {
            exn::bail!(ErrorKind::WrongType(PathBuf::from(path.as_str())));
        }
        let file = fs::File::open(&abs_path).await.map_err(|e| Self::map_io_error(e, path.as_str()))?;
        Ok(Box::new(file))
    }

    async fn write(&self, owner: &Owner, path: &LogicalPath, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_non_root(owner, path)?;
        Self::create_parent(&abs_path, path).await?;
        Ok(fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path.as_str()))?)
    }

    async fn writer(&self, owner: &Owner, path: &LogicalPath) -> Result<BoxAsyncWrite> {
        let abs_path = self.absolute_non_root(owner, path)?;
        Self::create_parent(&abs_path, path).await?;
        let file = fs::File::create(&abs_path).await.map_err(|e| Self::map_io_error(e, path.as_str()))?;
        Ok(Box::new(file))
    }

    async fn create_folder(&self, owner: &Owner, path: &LogicalPath) -> Result<()> {
        let abs_path = self.absolute_path(owner, path);
        Ok(fs::create_dir_all(&abs_path).await.map_err(|e| Self::map_io_error(e, path.as_str()))?)
    }

    async fn delete(&self, owner: &Owner, path: &LogicalPath) -> Result<()> {
        let abs_path = self.absolute_non_root(owner, path)?;
        let metadata = fs::symlink_metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path.as_str()))?;
        let result = match metadata.is_dir() {
            true => fs::remove_dir_all(&abs_path).await,
            false => fs::remove_file(&abs_path).await,
        };
        Ok(result.map_err(|e| Self::map_io_error(e, path.as_str()))?)
    }

    async fn rename(&self, owner: &Owner, from: &LogicalPath, to: &LogicalPath) -> Result<()> {
        let from_path = self.absolute_non_root(owner, from)?;
        let to_path = self.absolute_non_root(owner, to)?;
        // Moving a folder inside itself would fail half way through on some
        // platforms; refuse it up front.
        if to.starts_with(from) && to != from {
            exn::bail!(ErrorKind::invalid(to.as_str()));
        }
        if !fs::try_exists(&from_path).await.map_err(ErrorKind::Io)? {
            exn::bail!(ErrorKind::NotFound(PathBuf::from(from.as_str())));
        }
        Self::create_parent(&to_path, to).await?;
        Ok(fs::rename(&from_path, &to_path).await.map_err(|e| Self::map_io_error(e, to.as_str()))?)
    }
}
