//! Content classification.
//!
//! Files are bucketed into a handful of coarse [`FileType`]s for analytics.
//! The magic bytes at the start of a file are trusted first (via [`infer`]);
//! when they don't say anything useful the extension decides (via
//! [`mime_guess`]).

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Number of leading bytes worth reading for signature detection.
pub const SNIFF_LEN: usize = 512;

const OCTET_STREAM: &str = "application/octet-stream";

/// Coarse content category of a stored entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FileType {
    Image,
    Video,
    Pdf,
    Doc,
    Folder,
    #[default]
    Other,
}

impl FileType {
    /// Classifies a file from its first bytes and its name.
    ///
    /// ```
    /// use cirrus_storage::FileType;
    /// assert_eq!(FileType::sniff(b"%PDF-1.7\n...", "scan"), FileType::Pdf);
    /// assert_eq!(FileType::sniff(b"plain words", "notes.txt"), FileType::Doc);
    /// assert_eq!(FileType::sniff(b"", "mystery.bin"), FileType::Other);
    /// ```
    pub fn sniff(head: &[u8], name: &str) -> Self {
        let by_signature = infer::get(head).map(|kind| Self::from_mime(kind.mime_type()));
        match by_signature {
            Some(found) if found != Self::Other => found,
            _ => Self::from_name(name),
        }
    }

    /// Classifies a file from its extension alone.
    pub fn from_name(name: &str) -> Self {
        mime_guess::from_path(name).first_raw().map(Self::from_mime).unwrap_or_default()
    }

    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/") {
            return Self::Image;
        }
        if mime.starts_with("video/") {
            return Self::Video;
        }
        match mime.as_str() {
            "application/pdf" => Self::Pdf,
            "text/plain" | "text/markdown" | "text/csv" | "application/rtf" | "text/rtf" | "application/msword" => {
                Self::Doc
            },
            m if m.starts_with("application/vnd.openxmlformats-officedocument.")
                || m.starts_with("application/vnd.oasis.opendocument.")
                || m.starts_with("application/vnd.ms-") =>
            {
                Self::Doc
            },
            _ => Self::Other,
        }
    }

    /// Short name used for persistence and display.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Pdf => "pdf",
            FileType::Doc => "doc",
            FileType::Folder => "folder",
            FileType::Other => "other",
        }
    }
}

/// MIME type to serve a file with, judged by its name.
pub fn content_type(name: &str) -> String {
    mime_guess::from_path(name).first_raw().unwrap_or(OCTET_STREAM).to_string()
}

impl Display for FileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for FileType {
    fn as_ref(&self) -> &'static str {
        self.as_str()
    }
}

/// Returned when a persisted file type is not one we know about.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("unknown file type: {_0}")]
pub struct UnknownFileType(#[error(not(source))] pub String);

impl FromStr for FileType {
    type Err = UnknownFileType;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "image" => Self::Image,
            "video" => Self::Video,
            "pdf" => Self::Pdf,
            "doc" => Self::Doc,
            "folder" => Self::Folder,
            "other" => Self::Other,
            unknown => return Err(UnknownFileType(unknown.to_string())),
        })
    }
}
