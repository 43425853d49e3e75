use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Logical names for the persisted collections.
pub mod keys {
    pub const TASKS: &str = "tasks";
    pub const ACTION_LOGS: &str = "action-logs";
    pub const SETTINGS: &str = "settings";
    pub const PROFILE: &str = "profile";
    pub const DOCUMENTS: &str = "documents";
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key        TEXT PRIMARY KEY CHECK(length(key) > 0),
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);
";

/// Durable key/value store. Values are JSON blobs, one per logical
/// collection; a save replaces the whole value.
pub struct Store {
    conn: Connection,
}

fn set_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;
        set_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        set_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM kv WHERE key = ?1")?;
        let raw: Option<String> = stmt
            .query_row([key], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        match raw {
            Some(json) => {
                let value = serde_json::from_str(&json)
                    .with_context(|| format!("corrupt value for key '{key}'"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
            rusqlite::params![key, json],
        )?;
        Ok(())
    }
}
