use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::StreakStore;

/// Streak counters persisted as `session=count` lines.
///
/// The whole file is rewritten after every change while the store lock is
/// held, so writes for the same process are serialized.
pub struct FileStreakStore {
    path: PathBuf,
    streaks: Mutex<BTreeMap<String, u64>>,
}

impl FileStreakStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let streaks = match tokio::fs::read_to_string(path).await {
            Ok(content) => parse_streaks(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Streak file {} not found, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read streak file: {}", path.display()))
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            streaks: Mutex::new(streaks),
        })
    }

    async fn persist(&self, streaks: &BTreeMap<String, u64>) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, format_streaks(streaks))
            .await
            .with_context(|| format!("Failed to write streak file: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace streak file: {}", self.path.display()))?;
        debug!("Persisted {} streaks to {}", streaks.len(), self.path.display());
        Ok(())
    }
}

/// Parse `session=count` lines. Blank lines and `#` comments are skipped.
/// Keys are read back exactly as [`format_streaks`] escaped them.
pub fn parse_streaks(content: &str) -> BTreeMap<String, u64> {
    let mut streaks = BTreeMap::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        match line
            .rsplit_once('=')
            .and_then(|(session, count)| Some((session, count.trim().parse::<u64>().ok()?)))
        {
            Some((session, count)) => {
                streaks.insert(unescape_key(session), count);
            }
            None => warn!("Skipping malformed streak line {}: {}", lineno + 1, line),
        }
    }
    streaks
}

pub fn format_streaks(streaks: &BTreeMap<String, u64>) -> String {
    let mut out = String::new();
    for (session, count) in streaks {
        out.push_str(&format!("{}={}\n", escape_key(session), count));
    }
    out
}

/// Percent-encode the characters that would change how a line parses
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        if matches!(c, '%' | '=' | '#') || c.is_ascii_whitespace() || c.is_ascii_control() {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

fn unescape_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];
        let byte = tail
            .get(..2)
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .filter(u8::is_ascii);
        match byte {
            Some(byte) => {
                out.push(byte as char);
                rest = &tail[2..];
            }
            None => {
                out.push('%');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl StreakStore for FileStreakStore {
    async fn get(&self, session_id: &str) -> Result<u64> {
        let streaks = self.streaks.lock().await;
        Ok(streaks.get(session_id).copied().unwrap_or(0))
    }

    async fn set(&self, session_id: &str, count: u64) -> Result<()> {
        let mut streaks = self.streaks.lock().await;
        let mut next = streaks.clone();
        next.insert(session_id.to_string(), count);
        self.persist(&next).await?;
        *streaks = next;
        Ok(())
    }

    async fn increment(&self, session_id: &str) -> Result<u64> {
        let mut streaks = self.streaks.lock().await;
        let mut next = streaks.clone();
        let count = {
            let entry = next.entry(session_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        self.persist(&next).await?;
        *streaks = next;
        Ok(count)
    }
}
