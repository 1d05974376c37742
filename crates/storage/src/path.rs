//! Path validation and owner scoping.
//!
//! Every path a client sends is a *logical* path: forward-slash separated and
//! relative to that client's own storage root. This module turns untrusted
//! strings into [`LogicalPath`]s, and pins each one beneath its [`Owner`]'s
//! directory so that no two principals can ever address the same file.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, ErrorKind, Result};

/// A validated, normalized path relative to an owner's storage root.
///
/// The empty path is the owner's root folder. A `LogicalPath` never contains
/// `..`, `.` or empty segments, never starts with a separator, and never
/// contains null bytes; the only way to build one is through [`validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalPath(String);

/// The verified identity a storage root belongs to.
///
/// Used verbatim as the first directory level beneath the storage root, so it
/// has to be a single safe path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner(String);

/// Validates a client-supplied logical path.
///
/// Backslashes are treated as separators, repeated separators and `.`
/// segments are dropped. Paths that try to climb (`..`, even when they would
/// land back inside the root), absolute paths, drive prefixes and null bytes
/// are rejected with [`InvalidPath`](ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use cirrus_storage::validate_path;
/// assert_eq!(validate_path("docs//./reports/").unwrap().as_str(), "docs/reports");
/// assert_eq!(validate_path("docs\\q1.pdf").unwrap().as_str(), "docs/q1.pdf");
/// assert!(validate_path("").unwrap().is_root());
/// assert!(validate_path("../../etc/passwd").is_err());
/// assert!(validate_path("docs/../secrets").is_err());
/// assert!(validate_path("/etc/passwd").is_err());
/// assert!(validate_path("C:/Windows").is_err());
/// ```
pub fn validate(raw: impl AsRef<str>) -> Result<LogicalPath> {
    let raw = raw.as_ref();
    // Null bytes truncate paths in C-based syscalls.
    if raw.contains('\0') {
        exn::bail!(ErrorKind::invalid(raw.escape_default().to_string()));
    }
    let normalized = raw.replace('\\', "/");
    if normalized.starts_with('/') {
        exn::bail!(ErrorKind::invalid(raw));
    }
    let mut segments = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {},
            ".." => exn::bail!(ErrorKind::invalid(raw)),
            s if segments.is_empty() && is_drive_prefix(s) => exn::bail!(ErrorKind::invalid(raw)),
            s => segments.push(s),
        }
    }
    Ok(LogicalPath(segments.join("/")))
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Maps an owner's logical path to its absolute location beneath `root`.
///
/// This cannot fail: both the owner and the path were validated when they
/// were constructed.
pub fn resolve(root: &Path, owner: &Owner, path: &LogicalPath) -> PathBuf {
    let mut absolute = root.join(owner.as_str());
    for segment in path.segments() {
        absolute.push(segment);
    }
    absolute
}

impl LogicalPath {
    /// The owner's root folder.
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Final segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Containing folder, or `None` for the root.
    pub fn parent(&self) -> Option<LogicalPath> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rfind('/') {
            Some(idx) => Self(self.0[..idx].to_string()),
            None => Self::root(),
        })
    }

    /// Appends exactly one segment.
    ///
    /// Fails when `name` would add more than one level (or none at all), so a
    /// folder name like `"a/b"` or `".."` can't sneak through.
    pub fn join(&self, name: &str) -> Result<LogicalPath> {
        let child = validate(name)?;
        if child.segments().count() != 1 {
            exn::bail!(ErrorKind::invalid(name));
        }
        Ok(match self.is_root() {
            true => child,
            false => Self(format!("{}/{}", self.0, child.0)),
        })
    }

    /// Component-wise prefix test: `docs` contains `docs/a.pdf` but not
    /// `docs-old/a.pdf`. Every path starts with the root.
    pub fn starts_with(&self, prefix: &LogicalPath) -> bool {
        if prefix.is_root() || self == prefix {
            return true;
        }
        self.0.strip_prefix(prefix.as_str()).is_some_and(|rest| rest.starts_with('/'))
    }

    /// Re-anchors `self` from beneath `from` to beneath `to`.
    ///
    /// Returns `None` if `self` is not inside (or equal to) `from`.
    pub fn rebase(&self, from: &LogicalPath, to: &LogicalPath) -> Option<LogicalPath> {
        if !self.starts_with(from) {
            return None;
        }
        let rest = self.0[from.0.len()..].trim_start_matches('/');
        Some(match (to.is_root(), rest.is_empty()) {
            (_, true) => to.clone(),
            (true, false) => Self(rest.to_string()),
            (false, false) => Self(format!("{}/{rest}", to.0)),
        })
    }

    pub fn to_relative(&self) -> PathBuf {
        self.segments().collect()
    }
}
impl Display for LogicalPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
impl AsRef<str> for LogicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
impl FromStr for LogicalPath {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        validate(s)
    }
}

impl Owner {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let safe = !id.is_empty()
            && !id.starts_with('.')
            && !id.chars().any(|c| c == '/' || c == '\\' || c.is_control());
        if !safe {
            exn::bail!(ErrorKind::invalid(id.escape_default().to_string()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for Owner {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
