//! Local storage module
//!
//! Provides the SQLite-backed key-value settings store the gateway reads
//! its tool registry from.

mod database;
mod error;
mod settings;

pub use database::Database;
pub use error::StorageError;
pub use settings::{InMemorySettingsStore, SettingsStore, SqliteSettingsStore};
