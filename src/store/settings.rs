//! Persisted user settings.
//!
//! Settings live in a single `settings(name, value)` table with dot-namespaced
//! names; sampling defaults sit under the `options.` prefix (e.g.
//! `options.temperature`). Values are stored as text and parsed on read, so a
//! garbled value degrades to "unset" rather than failing the request.

use std::str::FromStr;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::inference::types::SamplingOptions;
use super::StoreError;

/// Read access to the persisted sampling defaults.
///
/// The prompt client merges these under every request's options. Tests use
/// [`MemorySettings`]; the application uses [`SettingsDb`].
pub trait SettingsStore: Send + Sync {
    fn default_sampling(&self) -> SamplingOptions;
}

// ─── In-memory store ────────────────────────────────────────────────────────

/// Fixed in-memory defaults, for tests and for running without a database.
pub struct MemorySettings {
    sampling: SamplingOptions,
}

impl MemorySettings {
    pub fn new(sampling: SamplingOptions) -> Self {
        Self { sampling }
    }

    /// No defaults at all: every request field passes through unchanged.
    pub fn empty() -> Self {
        Self::new(SamplingOptions::default())
    }
}

impl SettingsStore for MemorySettings {
    fn default_sampling(&self) -> SamplingOptions {
        self.sampling
    }
}

// ─── SQLite store ───────────────────────────────────────────────────────────

/// SQLite-backed settings store.
///
/// Uses `rusqlite` in synchronous mode behind a mutex. WAL mode is enabled
/// for concurrent reads during streaming.
pub struct SettingsDb {
    conn: Mutex<Connection>,
}

impl SettingsDb {
    /// Open (or create) the settings database at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Set (insert or replace) a named setting.
    pub fn set_setting(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("settings db lock poisoned");
        conn.execute(
            "INSERT INTO settings (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![name, value],
        )?;
        Ok(())
    }

    /// Get a named setting, if present.
    pub fn get_setting(&self, name: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().expect("settings db lock poisoned");
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Remove a named setting.
    pub fn delete_setting(&self, name: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("settings db lock poisoned");
        conn.execute("DELETE FROM settings WHERE name = ?1", params![name])?;
        Ok(())
    }

    fn parsed<T: FromStr>(&self, name: &str) -> Option<T> {
        match self.get_setting(name) {
            Ok(Some(value)) => match value.trim().parse() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    tracing::warn!(name, value, "ignoring unparseable setting");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(name, error = %e, "failed to read setting");
                None
            }
        }
    }
}

impl SettingsStore for SettingsDb {
    fn default_sampling(&self) -> SamplingOptions {
        SamplingOptions {
            temperature: self.parsed("options.temperature"),
            top_k: self.parsed("options.top_k"),
            top_p: self.parsed("options.top_p"),
            seed: self.parsed("options.seed"),
            num_ctx: self.parsed("options.num_ctx"),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
