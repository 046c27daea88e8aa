//! SQLite persistence for the link state, allowing debounce windows to
//! survive daemon restarts.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result};

use tetherd_core::types::{DebounceRecord, LinkSnapshot};

/// SQLite-backed store for the single monitored link. One row, upserted on
/// every durable transition.
pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Open (or create) a database at the given filesystem path and run
    /// migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(500))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Create the schema if it does not already exist.
    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS link_state (
                slot               INTEGER PRIMARY KEY CHECK (slot = 1),
                target             TEXT NOT NULL,
                is_connected       INTEGER NOT NULL,
                last_change_ms     INTEGER NOT NULL,
                hotspot_enabled    INTEGER NOT NULL DEFAULT 0,
                debounce_active    INTEGER NOT NULL DEFAULT 0,
                disconnected_at_ms INTEGER
            );",
        )?;
        Ok(())
    }

    /// Upsert the full link row: snapshot plus the debounce window (or its
    /// absence) in one write, so a crash never leaves the two halves
    /// disagreeing.
    pub fn save(&self, snapshot: &LinkSnapshot, debounce: Option<DebounceRecord>) -> Result<()> {
        let disconnected_at_ms = debounce.map(|d| d.disconnected_at.timestamp_millis());
        self.conn.execute(
            "INSERT OR REPLACE INTO link_state
                (slot, target, is_connected, last_change_ms,
                 hotspot_enabled, debounce_active, disconnected_at_ms)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.target,
                snapshot.connected,
                snapshot.last_change.timestamp_millis(),
                snapshot.hotspot_enabled,
                debounce.is_some(),
                disconnected_at_ms,
            ],
        )?;
        Ok(())
    }

    /// Load the stored link row, if any.
    pub fn load(&self) -> Result<Option<(LinkSnapshot, Option<DebounceRecord>)>> {
        self.conn
            .query_row(
                "SELECT target, is_connected, last_change_ms,
                        hotspot_enabled, debounce_active, disconnected_at_ms
                 FROM link_state WHERE slot = 1",
                [],
                |row| {
                    let target: String = row.get(0)?;
                    let connected: bool = row.get(1)?;
                    let last_change_ms: i64 = row.get(2)?;
                    let hotspot_enabled: bool = row.get(3)?;
                    let debounce_active: bool = row.get(4)?;
                    let disconnected_at_ms: Option<i64> = row.get(5)?;
                    Ok((
                        target,
                        connected,
                        last_change_ms,
                        hotspot_enabled,
                        debounce_active,
                        disconnected_at_ms,
                    ))
                },
            )
            .optional()
            .map(|row| {
                row.map(
                    |(target, connected, last_ms, hotspot, active, disc_ms)| {
                        let snapshot = LinkSnapshot {
                            target,
                            connected,
                            last_change: from_millis(last_ms),
                            hotspot_enabled: hotspot,
                        };
                        // active without a timestamp is an invalid half-write;
                        // treat it as no window.
                        let debounce = match (active, disc_ms) {
                            (true, Some(ms)) => Some(DebounceRecord {
                                disconnected_at: from_millis(ms),
                            }),
                            _ => None,
                        };
                        (snapshot, debounce)
                    },
                )
            })
    }

    /// Update only the actuator-reported hotspot state.
    pub fn update_hotspot(&self, enabled: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE link_state SET hotspot_enabled = ?1 WHERE slot = 1",
            params![enabled],
        )?;
        Ok(())
    }

    /// Delete the stored row. Used on explicit stop and for full reset.
    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM link_state", [])?;
        Ok(())
    }
}

/// Millisecond timestamps outside chrono's representable range only arise
/// from a corrupted row; fall back to the epoch rather than panicking.
fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
