// SQLite persistence for the pick ledger and connection registry.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::draft::pick::Pick;
use crate::draft::player::Player;

/// A ledger or registry read/write failed. Submissions that hit this abort
/// wholesale: nothing is partially assigned and no event is broadcast.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a conditional pick append.
#[derive(Debug, Error)]
pub enum AppendError {
    /// The (draft, order) slot was already taken by a concurrent writer. The
    /// caller re-reads the ledger and retries with a fresh order.
    #[error("order {order} already taken for draft {draft_id}")]
    OrderConflict { draft_id: String, order: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Durable append log of picks, ordered per draft.
#[async_trait]
pub trait PickLedger: Send + Sync {
    /// Highest assigned overall order for the draft; 0 if the draft has no
    /// picks yet.
    async fn max_order(&self, draft_id: &str) -> Result<u32, StoreError>;

    /// Append a pick, conditional on its order slot being free.
    async fn append(&self, pick: &Pick) -> Result<(), AppendError>;

    /// All picks for a draft, ascending by overall order.
    async fn picks(&self, draft_id: &str) -> Result<Vec<Pick>, StoreError>;
}

/// Durable mapping of draft -> player registrations.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// All registrations for a draft (connected or not). A keyed query, not
    /// a scan.
    async fn players(&self, draft_id: &str) -> Result<Vec<Player>, StoreError>;

    /// Insert or update a registration, keyed by (draft_id, connection_id).
    async fn put(&self, player: &Player) -> Result<(), StoreError>;

    /// Clear the connected flag on every registration holding this handle.
    async fn mark_disconnected(&self, connection_id: &str) -> Result<(), StoreError>;
}

/// SQLite-backed implementation of both collaborators.
///
/// The picks table's composite primary key is the conditional-append
/// mechanism: a plain INSERT into a taken (draft_id, overall_order) slot
/// fails with a constraint violation, which [`PickLedger::append`] surfaces
/// as [`AppendError::OrderConflict`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `path` and ensure the schema exists.
    /// Pass `":memory:"` for an ephemeral database (useful for tests).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS picks (
                draft_id      TEXT NOT NULL,
                overall_order INTEGER NOT NULL,
                player_id     TEXT NOT NULL,
                selection     TEXT NOT NULL,
                made_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (draft_id, overall_order)
            );

            CREATE TABLE IF NOT EXISTS players (
                draft_id      TEXT NOT NULL,
                connection_id TEXT NOT NULL,
                name          TEXT NOT NULL,
                is_connected  INTEGER NOT NULL,
                joined_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (draft_id, connection_id)
            );

            CREATE INDEX IF NOT EXISTS idx_players_connection_id
                ON players(connection_id);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }
}

#[async_trait]
impl PickLedger for Database {
    async fn max_order(&self, draft_id: &str) -> Result<u32, StoreError> {
        let conn = self.conn();
        let max: Option<u32> = conn
            .query_row(
                "SELECT overall_order FROM picks
                 WHERE draft_id = ?1
                 ORDER BY overall_order DESC
                 LIMIT 1",
                params![draft_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(max.unwrap_or(0))
    }

    async fn append(&self, pick: &Pick) -> Result<(), AppendError> {
        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO picks (draft_id, overall_order, player_id, selection)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                pick.draft_id,
                pick.overall_order,
                pick.player_id,
                pick.selection
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(AppendError::OrderConflict {
                    draft_id: pick.draft_id.clone(),
                    order: pick.overall_order,
                })
            }
            Err(e) => Err(AppendError::Store(StoreError::Database(e))),
        }
    }

    async fn picks(&self, draft_id: &str) -> Result<Vec<Pick>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT draft_id, overall_order, player_id, selection
             FROM picks WHERE draft_id = ?1 ORDER BY overall_order",
        )?;

        let picks = stmt
            .query_map(params![draft_id], |row| {
                Ok(Pick {
                    draft_id: row.get(0)?,
                    overall_order: row.get(1)?,
                    player_id: row.get(2)?,
                    selection: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(picks)
    }
}

#[async_trait]
impl ConnectionRegistry for Database {
    async fn players(&self, draft_id: &str) -> Result<Vec<Player>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT draft_id, connection_id, name, is_connected
             FROM players WHERE draft_id = ?1 ORDER BY joined_at, connection_id",
        )?;

        let players = stmt
            .query_map(params![draft_id], |row| {
                Ok(Player {
                    draft_id: row.get(0)?,
                    connection_id: row.get(1)?,
                    name: row.get(2)?,
                    is_connected: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(players)
    }

    async fn put(&self, player: &Player) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO players (draft_id, connection_id, name, is_connected)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(draft_id, connection_id) DO UPDATE SET
                name         = excluded.name,
                is_connected = excluded.is_connected",
            params![
                player.draft_id,
                player.connection_id,
                player.name,
                player.is_connected
            ],
        )?;
        Ok(())
    }

    async fn mark_disconnected(&self, connection_id: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE players SET is_connected = 0 WHERE connection_id = ?1",
            params![connection_id],
        )?;
        Ok(())
    }
}
