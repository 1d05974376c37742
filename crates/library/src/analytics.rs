//! Folder analytics.
//!
//! Statistics come from the metadata store alone; the filesystem is never
//! walked. A folder that hasn't been listed since files were added behind the
//! server's back will be under-counted until it is.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use cirrus_cache::{FileRecord, Repository};
use cirrus_storage::{FileType, LogicalPath, Owner};
use exn::ResultExt;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Summary text for a folder without a single record beneath it.
pub const EMPTY_MESSAGE: &str = "This folder is empty.";

const MIB: f64 = 1024.0 * 1024.0;

/// Number of files per content category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    #[serde(rename = "imageCount")]
    pub image: u64,
    #[serde(rename = "videoCount")]
    pub video: u64,
    #[serde(rename = "pdfCount")]
    pub pdf: u64,
    #[serde(rename = "docCount")]
    pub doc: u64,
    #[serde(rename = "otherCount")]
    pub other: u64,
}

/// Counts over every record beneath a folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_files: u64,
    pub total_folders: u64,
    #[serde(rename = "totalSize")]
    pub total_bytes: u64,
    #[serde(flatten)]
    pub types: TypeCounts,
}
impl Stats {
    fn add(&mut self, record: &FileRecord) {
        if record.is_folder {
            self.total_folders += 1;
            return;
        }
        self.total_files += 1;
        self.total_bytes += record.size;
        let counter = match record.file_type {
            FileType::Image => &mut self.types.image,
            FileType::Video => &mut self.types.video,
            FileType::Pdf => &mut self.types.pdf,
            FileType::Doc => &mut self.types.doc,
            FileType::Folder | FileType::Other => &mut self.types.other,
        };
        *counter += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.total_files == 0 && self.total_folders == 0
    }
}
impl<'a> FromIterator<&'a FileRecord> for Stats {
    fn from_iter<I: IntoIterator<Item = &'a FileRecord>>(records: I) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.add(record);
        }
        stats
    }
}

/// What the analytics endpoint reports for a folder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub summary: String,
    pub stats: Stats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prose: Option<String>,
}

/// Turns a stats snapshot into prose for humans.
///
/// Best-effort: a failing summarizer never fails the request, its prose is
/// simply left out.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, stats: &Stats) -> Result<String>;
}

pub type SummarizerHandle = Arc<dyn Summarizer + Send + Sync>;

fn plural(count: u64, one: &str, many: &str) -> String {
    match count {
        1 => format!("1 {one}"),
        n => format!("{n} {many}"),
    }
}

/// One-line description of the stats, or [`EMPTY_MESSAGE`].
pub fn describe(stats: &Stats) -> String {
    if stats.is_empty() {
        return EMPTY_MESSAGE.to_string();
    }
    let mut text = format!(
        "{} and {} totalling {:.2} MB.",
        plural(stats.total_files, "file", "files"),
        plural(stats.total_folders, "folder", "folders"),
        stats.total_bytes as f64 / MIB,
    );
    let breakdown: Vec<String> = [
        (stats.types.image, "image", "images"),
        (stats.types.video, "video", "videos"),
        (stats.types.pdf, "PDF", "PDFs"),
        (stats.types.doc, "document", "documents"),
        (stats.types.other, "other file", "other files"),
    ]
    .into_iter()
    .filter(|(count, _, _)| *count > 0)
    .map(|(count, one, many)| plural(count, one, many))
    .collect();
    if !breakdown.is_empty() {
        text.push_str(&format!(" Includes {}.", breakdown.join(", ")));
    }
    text
}

/// Summarizes everything recorded beneath `folder`.
#[instrument(skip_all, fields(owner = %owner, folder = %folder))]
pub async fn summarize(
    cache: &Repository,
    summarizer: Option<&SummarizerHandle>,
    owner: &Owner,
    folder: &LogicalPath,
) -> Result<Summary> {
    let records = cache.find_subtree(owner, folder).await.or_raise(|| ErrorKind::StorageUnavailable)?;
    let stats: Stats = records.iter().collect();
    let prose = match summarizer {
        Some(summarizer) if !stats.is_empty() => match summarizer.summarize(&stats).await {
            Ok(prose) => Some(prose),
            Err(err) => {
                tracing::warn!(error = ?err, "Summarizer failed; leaving prose out");
                None
            },
        },
        _ => None,
    };
    Ok(Summary { summary: describe(&stats), stats, prose })
}
