//! SQLite database access
//!
//! Schema creation and pool setup shared by the service and its tests.

pub mod init;

pub use init::{connect, create_schema};
