pub mod backend;
pub mod error;
mod file_type;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::file_type::{FileType, SNIFF_LEN, UnknownFileType, content_type};
pub use crate::models::Entry;
pub use crate::path::{LogicalPath, Owner, resolve, validate as validate_path};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
