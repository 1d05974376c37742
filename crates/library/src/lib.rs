//! Everything cirrus does with an owner's files, between the HTTP layer and
//! storage.
//!
//! - [`sync`] lists folders and keeps the metadata store in line with disk
//! - [`ops`] uploads, renames, deletes, downloads and creates folders
//! - [`analytics`] summarizes what's stored beneath a folder
//!
//! Operations are free functions over a [`BackendHandle`](cirrus_storage::BackendHandle)
//! and a [`Repository`](cirrus_cache::Repository), taking the verified
//! [`Owner`](cirrus_storage::Owner) explicitly.

pub mod analytics;
pub mod error;
pub mod ops;
pub mod sync;

pub use crate::analytics::{Stats, Summarizer, SummarizerHandle, Summary};
pub use crate::ops::{Download, parse_path};
pub use crate::sync::{Listing, list_folder};
