//! Single-slot command mailbox between the monitor and the actuator.
//!
//! The two sides are separate processes with no shared memory; a SQLite
//! database file stands in for a message queue. The slot is lossy by
//! design: publishing overwrites an unconsumed command, so a rapid
//! enable-then-disable sequence may surface only the disable. Only the
//! most recent desired state matters to the actuator.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Result, TransactionBehavior};

use tetherd_core::types::{CommandKind, PendingCommand};

pub struct CommandRelay {
    conn: Connection,
}

impl CommandRelay {
    /// Open (or create) the relay database. Both the monitor and the
    /// actuator open the same file.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(500))?;
        let relay = Self { conn };
        relay.migrate()?;
        Ok(relay)
    }

    /// In-memory relay. Useful for testing the slot semantics; cannot be
    /// shared across connections.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let relay = Self { conn };
        relay.migrate()?;
        Ok(relay)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pending_command (
                slot      INTEGER PRIMARY KEY CHECK (slot = 1),
                kind      TEXT NOT NULL,
                target    TEXT NOT NULL,
                was_woken INTEGER NOT NULL DEFAULT 0
            );",
        )?;
        Ok(())
    }

    /// Write a command into the slot, silently discarding any unconsumed
    /// predecessor. Last write wins.
    pub fn publish(&self, command: &PendingCommand) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO pending_command (slot, kind, target, was_woken)
             VALUES (1, ?1, ?2, ?3)",
            params![command.kind.as_str(), command.target, command.was_woken],
        )?;
        Ok(())
    }

    /// Atomically read and clear the slot. The read and the delete share
    /// one immediate transaction so a concurrent publisher can never
    /// observe a half-consumed slot.
    pub fn poll_and_consume(&mut self) -> Result<Option<PendingCommand>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let row: Option<(String, String, bool)> = tx
            .query_row(
                "SELECT kind, target, was_woken FROM pending_command WHERE slot = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        if row.is_some() {
            tx.execute("DELETE FROM pending_command WHERE slot = 1", [])?;
        }
        tx.commit()?;

        Ok(row.and_then(|(kind, target, was_woken)| {
            // An unparseable kind can only come from a foreign writer;
            // the slot was already cleared above, so just drop it.
            let kind = CommandKind::from_str(&kind).ok()?;
            Some(PendingCommand {
                kind,
                target,
                was_woken,
            })
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
