//! Repository for file records.
//!
//! Records are keyed by (owner, logical path). Subtree operations match on
//! whole path segments, so `docs` never drags `docs-old` along with it.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{FileRecord, FileRow};
use cirrus_storage::{LogicalPath, Owner};
use exn::ResultExt;
use sqlx::SqlitePool;
use tracing::instrument;

/// Repository for managing [`FileRecord`]s in the metadata store.
///
/// The store is an index over the filesystem, never the source of truth:
/// callers mutate the filesystem first and only then bring the records in
/// line with it.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Create a record, replacing whatever was recorded at the same path.
    pub async fn insert(&self, record: &FileRecord) -> Result<()> {
        let row = FileRow::try_from(record)?;
        Self::bind_row(sqlx::query(include_str!("../queries/insert.sql")), row)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Create a record only if none exists yet for its (owner, path).
    ///
    /// Returns `true` if a row was inserted. Calling this repeatedly with the
    /// same record is harmless, which is what lets concurrent listings of the
    /// same folder race each other.
    pub async fn upsert_if_absent(&self, record: &FileRecord) -> Result<bool> {
        let row = FileRow::try_from(record)?;
        let result = Self::bind_row(sqlx::query(include_str!("../queries/insert_if_absent.sql")), row)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    fn bind_row<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        row: FileRow,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        query
            .bind(row.owner)
            .bind(row.path)
            .bind(row.folder)
            .bind(row.is_folder)
            .bind(row.size)
            .bind(row.file_type)
            .bind(row.uploaded_at)
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// Get the record at exactly `path`.
    pub async fn find(&self, owner: &Owner, path: &LogicalPath) -> Result<Option<FileRecord>> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../queries/find_by_path.sql"))
            .bind(owner.as_str())
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(FileRecord::try_from).transpose()
    }

    /// Every record beneath `folder`, at any depth, ordered by path.
    ///
    /// The folder's own record is not included. The owner's root matches all
    /// of the owner's records.
    pub async fn find_subtree(&self, owner: &Owner, folder: &LogicalPath) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../queries/find_subtree.sql"))
            .bind(owner.as_str())
            .bind(folder.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileRecord::try_from).collect()
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Records whose containing folder is exactly `folder`, ordered by path.
    pub async fn list_folder(&self, owner: &Owner, folder: &LogicalPath) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../queries/list_folder.sql"))
            .bind(owner.as_str())
            .bind(folder.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileRecord::try_from).collect()
    }

    /// Number of records belonging to `owner`.
    pub async fn count(&self, owner: &Owner) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count.sql"))
            .bind(owner.as_str())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Move the record at `from`, and every record beneath it, to `to`.
    ///
    /// Anything already recorded at `to` (or beneath it) is replaced. Upload
    /// timestamps are kept. Runs in a single transaction.
    ///
    /// Returns `true` if a record existed at `from`.
    #[instrument(level = "debug", skip_all, fields(owner = %owner, from = %from, to = %to))]
    pub async fn update_path(&self, owner: &Owner, from: &LogicalPath, to: &LogicalPath) -> Result<bool> {
        if from.is_root() || to.is_root() {
            exn::bail!(ErrorKind::InvalidData("path"));
        }
        if from == to {
            return Ok(self.find(owner, from).await?.is_some());
        }
        let to_folder = to.parent().unwrap_or_default();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let replaced = sqlx::query(include_str!("../queries/delete_by_path.sql"))
            .bind(owner.as_str())
            .bind(to.as_str())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let moved = sqlx::query(include_str!("../queries/move_record.sql"))
            .bind(owner.as_str())
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(to_folder.as_str())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let descendants = sqlx::query(include_str!("../queries/move_descendants.sql"))
            .bind(owner.as_str())
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::debug!(
            replaced = replaced.rows_affected(),
            descendants = descendants.rows_affected(),
            "Moved records"
        );
        Ok(moved.rows_affected() > 0)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete the record at `path` and every record beneath it.
    ///
    /// Returns the number of records removed. Deleting at the owner's root
    /// removes every record the owner has.
    pub async fn delete_by_path(&self, owner: &Owner, path: &LogicalPath) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/delete_by_path.sql"))
            .bind(owner.as_str())
            .bind(path.as_str())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_storage::{FileType, validate_path};
    use rstest::rstest;
    use time::UtcDateTime;

    async fn setup() -> (Database, Repository, Owner) {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        (db, repo, Owner::new("alice@example.com").unwrap())
    }

    fn p(path: &str) -> LogicalPath {
        validate_path(path).unwrap()
    }

    fn file(owner: &Owner, path: &str, size: u64) -> FileRecord {
        FileRecord::file(owner.clone(), p(path), size, FileType::from_name(path), UtcDateTime::now())
    }

    fn folder(owner: &Owner, path: &str) -> FileRecord {
        FileRecord::folder(owner.clone(), p(path), UtcDateTime::now())
    }

    fn paths(records: &[FileRecord]) -> Vec<&str> {
        records.iter().map(|r| r.path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (db, repo, owner) = setup().await;
        let record = file(&owner, "docs/report.pdf", 2048);
        repo.insert(&record).await.unwrap();
        let found = repo.find(&owner, &p("docs/report.pdf")).await.unwrap().unwrap();
        assert_eq!(found.size, 2048);
        assert_eq!(found.file_type, FileType::Pdf);
        assert!(!found.is_folder);
        assert!(repo.find(&owner, &p("docs/missing.pdf")).await.unwrap().is_none());
        db.close().await;
    }

    #[tokio::test]
    async fn test_insert_replaces() {
        let (db, repo, owner) = setup().await;
        repo.insert(&file(&owner, "a.txt", 1)).await.unwrap();
        repo.insert(&file(&owner, "a.txt", 99)).await.unwrap();
        assert_eq!(repo.find(&owner, &p("a.txt")).await.unwrap().unwrap().size, 99);
        assert_eq!(repo.count(&owner).await.unwrap(), 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_upsert_if_absent_is_idempotent() {
        let (db, repo, owner) = setup().await;
        assert!(repo.upsert_if_absent(&file(&owner, "a.txt", 1)).await.unwrap());
        assert!(!repo.upsert_if_absent(&file(&owner, "a.txt", 50)).await.unwrap());
        // The first record wins.
        assert_eq!(repo.find(&owner, &p("a.txt")).await.unwrap().unwrap().size, 1);
        assert_eq!(repo.count(&owner).await.unwrap(), 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_owners_are_isolated() {
        let (db, repo, alice) = setup().await;
        let bob = Owner::new("bob@example.com").unwrap();
        repo.insert(&file(&alice, "docs/a.pdf", 1)).await.unwrap();
        assert!(repo.find(&bob, &p("docs/a.pdf")).await.unwrap().is_none());
        assert!(repo.find_subtree(&bob, &LogicalPath::root()).await.unwrap().is_empty());
        assert_eq!(repo.delete_by_path(&bob, &p("docs")).await.unwrap(), 0);
        assert_eq!(repo.count(&alice).await.unwrap(), 1);
        db.close().await;
    }

    #[rstest]
    #[case("", &["abc", "abc/x.txt", "abc/y/z.txt", "abcdef", "abcdef/x.txt", "top.txt"])]
    #[case("abc", &["abc/x.txt", "abc/y/z.txt"])]
    #[case("abc/y", &["abc/y/z.txt"])]
    #[case("ab", &[])]
    #[tokio::test]
    async fn test_find_subtree_matches_segments(#[case] prefix: &str, #[case] expected: &[&str]) {
        let (db, repo, owner) = setup().await;
        repo.insert(&folder(&owner, "abc")).await.unwrap();
        repo.insert(&file(&owner, "abc/x.txt", 1)).await.unwrap();
        repo.insert(&file(&owner, "abc/y/z.txt", 1)).await.unwrap();
        repo.insert(&folder(&owner, "abcdef")).await.unwrap();
        repo.insert(&file(&owner, "abcdef/x.txt", 1)).await.unwrap();
        repo.insert(&file(&owner, "top.txt", 1)).await.unwrap();
        let found = repo.find_subtree(&owner, &p(prefix)).await.unwrap();
        assert_eq!(paths(&found), expected);
        db.close().await;
    }

    #[tokio::test]
    async fn test_list_folder_is_direct_children_only() {
        let (db, repo, owner) = setup().await;
        repo.insert(&file(&owner, "docs/a.pdf", 1)).await.unwrap();
        repo.insert(&folder(&owner, "docs/sub")).await.unwrap();
        repo.insert(&file(&owner, "docs/sub/b.pdf", 1)).await.unwrap();
        repo.insert(&file(&owner, "root.txt", 1)).await.unwrap();
        assert_eq!(paths(&repo.list_folder(&owner, &p("docs")).await.unwrap()), ["docs/a.pdf", "docs/sub"]);
        assert_eq!(paths(&repo.list_folder(&owner, &LogicalPath::root()).await.unwrap()), ["root.txt"]);
        db.close().await;
    }

    #[tokio::test]
    async fn test_update_path_moves_descendants() {
        let (db, repo, owner) = setup().await;
        let original = folder(&owner, "old");
        repo.insert(&original).await.unwrap();
        repo.insert(&file(&owner, "old/a.txt", 1)).await.unwrap();
        repo.insert(&file(&owner, "old/sub/b.txt", 2)).await.unwrap();
        repo.insert(&file(&owner, "older/c.txt", 3)).await.unwrap();

        assert!(repo.update_path(&owner, &p("old"), &p("new/place")).await.unwrap());

        let all = repo.find_subtree(&owner, &LogicalPath::root()).await.unwrap();
        assert_eq!(paths(&all), ["new/place", "new/place/a.txt", "new/place/sub/b.txt", "older/c.txt"]);
        let moved = repo.find(&owner, &p("new/place/sub/b.txt")).await.unwrap().unwrap();
        assert_eq!(moved.folder_prefix().as_str(), "new/place/sub");
        let children = repo.list_folder(&owner, &p("new/place")).await.unwrap();
        assert_eq!(paths(&children), ["new/place/a.txt", "new/place/sub"]);
        let renamed = repo.find(&owner, &p("new/place")).await.unwrap().unwrap();
        assert_eq!(renamed.uploaded_at, original.uploaded_at.replace_nanosecond(0).unwrap());
        db.close().await;
    }

    #[tokio::test]
    async fn test_update_path_replaces_destination() {
        let (db, repo, owner) = setup().await;
        repo.insert(&file(&owner, "a.txt", 1)).await.unwrap();
        repo.insert(&file(&owner, "b.txt", 2)).await.unwrap();
        assert!(repo.update_path(&owner, &p("a.txt"), &p("b.txt")).await.unwrap());
        assert_eq!(repo.count(&owner).await.unwrap(), 1);
        assert_eq!(repo.find(&owner, &p("b.txt")).await.unwrap().unwrap().size, 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_update_path_without_record() {
        let (db, repo, owner) = setup().await;
        assert!(!repo.update_path(&owner, &p("ghost.txt"), &p("spirit.txt")).await.unwrap());
        assert!(repo.update_path(&owner, &LogicalPath::root(), &p("x")).await.is_err());
        db.close().await;
    }

    #[tokio::test]
    async fn test_delete_by_path_removes_descendants() {
        let (db, repo, owner) = setup().await;
        repo.insert(&folder(&owner, "docs")).await.unwrap();
        repo.insert(&file(&owner, "docs/a.pdf", 1)).await.unwrap();
        repo.insert(&file(&owner, "docs/sub/b.pdf", 1)).await.unwrap();
        repo.insert(&file(&owner, "docs-old/c.pdf", 1)).await.unwrap();
        assert_eq!(repo.delete_by_path(&owner, &p("docs")).await.unwrap(), 3);
        assert_eq!(paths(&repo.find_subtree(&owner, &LogicalPath::root()).await.unwrap()), ["docs-old/c.pdf"]);
        assert_eq!(repo.delete_by_path(&owner, &p("docs")).await.unwrap(), 0);
        db.close().await;
    }

    #[tokio::test]
    async fn test_root_records_are_rejected() {
        let (db, repo, owner) = setup().await;
        let err = repo.insert(&folder(&owner, "")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("path")));
        db.close().await;
    }
}
