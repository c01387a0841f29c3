//! Domain services used by the HTTP handlers

pub mod catalog;
pub mod importer;
pub mod items;
pub mod series;
pub mod shelves;

pub use catalog::{CatalogLookup, GoogleBooksClient};
pub use importer::{ImportSummary, Importer};
pub use items::ItemService;
pub use shelves::{ScanError, ShelfInput, ShelfService};
