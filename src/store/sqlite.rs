use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::info;

use super::{MoodEntry, MoodJournal, StreakStore};

/// Thread-safe SQLite store for streaks and the mood journal
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        // Run migrations on the raw connection before wrapping in Mutex.
        Self::run_migrations(&conn)?;

        info!("Session database initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS streaks (
                session_id TEXT PRIMARY KEY,
                count INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS moods (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                mood TEXT NOT NULL,
                logged_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_moods_session
                ON moods(session_id, logged_at);
            ",
        )
        .context("Failed to run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl StreakStore for SqliteStore {
    async fn get(&self, session_id: &str) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: Option<i64> = conn
            .query_row(
                "SELECT count FROM streaks WHERE session_id = ?1",
                rusqlite::params![session_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read streak")?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    async fn set(&self, session_id: &str, count: u64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO streaks (session_id, count) VALUES (?1, ?2)
             ON CONFLICT(session_id) DO UPDATE SET
                count = excluded.count,
                updated_at = datetime('now')",
            rusqlite::params![session_id, count as i64],
        )
        .context("Failed to set streak")?;
        Ok(())
    }

    async fn increment(&self, session_id: &str) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row(
                "INSERT INTO streaks (session_id, count) VALUES (?1, 1)
                 ON CONFLICT(session_id) DO UPDATE SET
                    count = count + 1,
                    updated_at = datetime('now')
                 RETURNING count",
                rusqlite::params![session_id],
                |row| row.get(0),
            )
            .context("Failed to increment streak")?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl MoodJournal for SqliteStore {
    async fn record(&self, session_id: &str, mood: &str) -> Result<MoodEntry> {
        let entry = MoodEntry::new(session_id, mood);
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO moods (id, session_id, mood, logged_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                &entry.id,
                &entry.session_id,
                &entry.mood,
                entry.logged_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
            ],
        )
        .context("Failed to record mood")?;
        Ok(entry)
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<MoodEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, mood, logged_at
             FROM moods
             WHERE session_id = ?1
             ORDER BY logged_at DESC, rowid DESC
             LIMIT ?2",
        )?;

        let entries = stmt
            .query_map(rusqlite::params![session_id, limit as i64], parse_mood_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list moods")?;

        Ok(entries)
    }
}

fn parse_mood_row(row: &rusqlite::Row) -> rusqlite::Result<MoodEntry> {
    let logged_at: String = row.get(3)?;
    let logged_at = DateTime::parse_from_rfc3339(&logged_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(MoodEntry {
        id: row.get(0)?,
        session_id: row.get(1)?,
        mood: row.get(2)?,
        logged_at,
    })
}
