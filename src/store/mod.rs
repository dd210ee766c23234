//! Persistence — SQLite-backed user settings.
//!
//! The chat transcript itself is owned by the caller; this module persists
//! only the settings that outlive a session (sampling defaults under the
//! `options.` namespace).

pub mod settings;

pub use settings::{MemorySettings, SettingsDb, SettingsStore};

use std::path::PathBuf;

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Default on-disk location of the settings database (`gollama.db` in the
/// platform data directory).
pub fn default_db_path() -> PathBuf {
    crate::data_dir().join("gollama.db")
}
