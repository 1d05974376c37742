//! SQLite metadata store for stored files.
//!
//! This crate provides the metadata database that tracks what cirrus knows
//! about each owner's files: their type, size and when they were uploaded.
//! The database is not the source of truth - the files on disk are. If the
//! database is deleted, it is rebuilt lazily as folders are listed again.
//!
//! # Architecture
//! There is one entity, the [`FileRecord`], keyed by (owner, logical path).
//! Each record also stores the path of its containing folder so that both
//! "direct children" and "whole subtree" queries stay on an index.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::FileRecord;
pub use crate::repo::Repository;
