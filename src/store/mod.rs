pub mod file;
pub mod sqlite;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::config::{StoreBackend, StoreConfig};

pub use file::FileStreakStore;
pub use sqlite::SqliteStore;

/// Per-session mood-streak counters.
///
/// `increment` must be atomic with respect to other calls on the same store,
/// so concurrent requests for one session never lose an update.
#[async_trait]
pub trait StreakStore: Send + Sync {
    /// Current count, 0 if the session has never been seen
    async fn get(&self, session_id: &str) -> Result<u64>;
    async fn set(&self, session_id: &str, count: u64) -> Result<()>;
    /// Add one and return the new count
    async fn increment(&self, session_id: &str) -> Result<u64>;
}

/// A mood the user reported
#[derive(Debug, Clone, PartialEq)]
pub struct MoodEntry {
    pub id: String,
    pub session_id: String,
    pub mood: String,
    pub logged_at: DateTime<Utc>,
}

impl MoodEntry {
    pub fn new(session_id: &str, mood: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            mood: mood.to_string(),
            logged_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait MoodJournal: Send + Sync {
    async fn record(&self, session_id: &str, mood: &str) -> Result<MoodEntry>;
    /// Most recent entries first
    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<MoodEntry>>;
}

/// In-process store for both streaks and moods. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    streaks: Mutex<HashMap<String, u64>>,
    moods: Mutex<Vec<MoodEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreakStore for MemoryStore {
    async fn get(&self, session_id: &str) -> Result<u64> {
        let streaks = self.streaks.lock().await;
        Ok(streaks.get(session_id).copied().unwrap_or(0))
    }

    async fn set(&self, session_id: &str, count: u64) -> Result<()> {
        let mut streaks = self.streaks.lock().await;
        streaks.insert(session_id.to_string(), count);
        Ok(())
    }

    async fn increment(&self, session_id: &str) -> Result<u64> {
        let mut streaks = self.streaks.lock().await;
        let count = streaks.entry(session_id.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

#[async_trait]
impl MoodJournal for MemoryStore {
    async fn record(&self, session_id: &str, mood: &str) -> Result<MoodEntry> {
        let entry = MoodEntry::new(session_id, mood);
        self.moods.lock().await.push(entry.clone());
        Ok(entry)
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<MoodEntry>> {
        let moods = self.moods.lock().await;
        Ok(moods
            .iter()
            .rev()
            .filter(|m| m.session_id == session_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// The stores a running service uses
#[derive(Clone)]
pub struct Stores {
    pub streaks: Arc<dyn StreakStore>,
    pub moods: Arc<dyn MoodJournal>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            streaks: store.clone(),
            moods: store,
        }
    }

    /// Open the configured backend. The file backend only persists streaks;
    /// moods stay in memory.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let stores = match config.backend {
            StoreBackend::Memory => Self::in_memory(),
            StoreBackend::File => Self {
                streaks: Arc::new(FileStreakStore::open(&config.path).await?),
                moods: Arc::new(MemoryStore::new()),
            },
            StoreBackend::Sqlite => {
                let store = Arc::new(SqliteStore::open(&config.path)?);
                Self {
                    streaks: store.clone(),
                    moods: store,
                }
            }
        };
        info!(
            "Session store ready: {:?} ({})",
            config.backend,
            config.path.display()
        );
        Ok(stores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_absent_session_reads_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_then_increment() {
        let store = MemoryStore::new();
        store.set("s1", 0).await.unwrap();
        assert_eq!(store.increment("s1").await.unwrap(), 1);
        assert_eq!(store.increment("s1").await.unwrap(), 2);
        assert_eq!(store.get("s1").await.unwrap(), 2);
        assert_eq!(store.get("s2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment("busy").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get("busy").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_recent_moods_newest_first_per_session() {
        let store = MemoryStore::new();
        store.record("a", "calm").await.unwrap();
        store.record("b", "tired").await.unwrap();
        store.record("a", "anxious").await.unwrap();
        store.record("a", "hopeful").await.unwrap();

        let recent = store.recent("a", 2).await.unwrap();
        let moods: Vec<&str> = recent.iter().map(|m| m.mood.as_str()).collect();
        assert_eq!(moods, vec!["hopeful", "anxious"]);
        assert!(recent.iter().all(|m| m.session_id == "a"));
    }

    #[tokio::test]
    async fn test_open_memory_backend() {
        let stores = Stores::open(&StoreConfig::default()).await.unwrap();
        stores.streaks.set("x", 3).await.unwrap();
        assert_eq!(stores.streaks.get("x").await.unwrap(), 3);
    }
}
