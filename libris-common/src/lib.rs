//! # Libris Common Library
//!
//! Shared code for the Libris catalogue service:
//! - Domain models (items, shelves, placements)
//! - Validation of free text, ISBNs, cover images and reading status
//! - Shelf layout planning
//! - Configuration resolution
//! - SQLite schema initialization

pub mod config;
pub mod db;
pub mod error;
pub mod isbn;
pub mod layout;
pub mod models;
pub mod patch;
pub mod time;
pub mod uuid_utils;
pub mod validation;

pub use error::{Error, Result};
