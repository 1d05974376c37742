use crate::error::{Error, ErrorKind};
use cirrus_storage::{FileType, LogicalPath, Owner, validate_path};
use exn::ResultExt;
use time::UtcDateTime;

/// Cached metadata for one file or folder an owner has stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub owner: Owner,
    pub path: LogicalPath,
    pub is_folder: bool,
    /// Size in bytes; always zero for folders.
    pub size: u64,
    pub file_type: FileType,
    /// Set once when the record is created; renames keep it.
    pub uploaded_at: UtcDateTime,
}
impl FileRecord {
    pub fn file(owner: Owner, path: LogicalPath, size: u64, file_type: FileType, uploaded_at: UtcDateTime) -> Self {
        Self { owner, path, is_folder: false, size, file_type, uploaded_at }
    }

    pub fn folder(owner: Owner, path: LogicalPath, uploaded_at: UtcDateTime) -> Self {
        Self { owner, path, is_folder: true, size: 0, file_type: FileType::Folder, uploaded_at }
    }

    /// Logical path of the containing folder (the root for top-level entries).
    pub fn folder_prefix(&self) -> LogicalPath {
        self.path.parent().unwrap_or_default()
    }

    /// Where the file can be fetched from when the storage root is served
    /// statically under `base`. Never persisted.
    ///
    /// Every segment is percent-encoded; the separators between them aren't.
    pub fn public_url(&self, base: &str) -> String {
        let mut url = base.trim_end_matches('/').to_string();
        for segment in std::iter::once(self.owner.as_str()).chain(self.path.segments()) {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    pub(crate) owner: String,
    pub(crate) path: String,
    pub(crate) folder: String,
    pub(crate) is_folder: bool,
    pub(crate) size: i64,
    pub(crate) file_type: String,
    pub(crate) uploaded_at: i64,
}
impl TryFrom<&FileRecord> for FileRow {
    type Error = Error;
    fn try_from(record: &FileRecord) -> Result<Self, Self::Error> {
        if record.path.is_root() {
            exn::bail!(ErrorKind::InvalidData("path"));
        }
        Ok(Self {
            owner: record.owner.to_string(),
            path: record.path.to_string(),
            folder: record.folder_prefix().to_string(),
            is_folder: record.is_folder,
            size: i64::try_from(record.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            file_type: record.file_type.to_string(),
            uploaded_at: record.uploaded_at.unix_timestamp(),
        })
    }
}
impl TryFrom<FileRow> for FileRecord {
    type Error = Error;
    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            owner: Owner::new(row.owner).or_raise(|| ErrorKind::InvalidData("owner"))?,
            path: validate_path(row.path).or_raise(|| ErrorKind::InvalidData("path"))?,
            is_folder: row.is_folder,
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            file_type: row.file_type.parse::<FileType>().or_raise(|| ErrorKind::InvalidData("file type"))?,
            uploaded_at: UtcDateTime::from_unix_timestamp(row.uploaded_at)
                .or_raise(|| ErrorKind::InvalidData("upload date"))?,
        })
    }
}
