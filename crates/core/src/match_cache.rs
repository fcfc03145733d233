//! Cache of match outcomes.
//!
//! Matching is the slowest pipeline phase, so its outcome is cached under a
//! fresh id and handed back to the client, letting estimation re-run with
//! different optimizer settings without re-matching. The in-memory map is
//! authoritative; disk persistence exists only so a restarted server can
//! pick up recent matches, and every disk failure is logged and swallowed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::MatchOutcome;
use crate::types::Timestamp;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const MAX_ENTRIES: usize = 16;

pub type MatchId = uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    id: MatchId,
    created_at: Timestamp,
    outcome: MatchOutcome,
}

pub struct MatchCache {
    entries: Mutex<HashMap<MatchId, CacheEntry>>,
    /// Optional persistence directory; `None` disables disk entirely.
    disk_dir: Option<PathBuf>,
    ttl: Duration,
    max_entries: usize,
}

impl MatchCache {
    pub fn new(disk_dir: Option<PathBuf>) -> Self {
        Self::with_limits(disk_dir, DEFAULT_TTL, MAX_ENTRIES)
    }

    pub fn with_limits(disk_dir: Option<PathBuf>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            disk_dir,
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Store an outcome under a fresh id, evicting the oldest entries when
    /// the cache is full.
    pub fn insert(&self, outcome: MatchOutcome) -> MatchId {
        let entry = CacheEntry {
            id: MatchId::new_v4(),
            created_at: chrono::Utc::now(),
            outcome,
        };
        let id = entry.id;

        {
            let mut entries = self.lock();
            while entries.len() >= self.max_entries {
                let oldest = entries
                    .values()
                    .min_by_key(|e| e.created_at)
                    .map(|e| e.id);
                match oldest {
                    Some(oldest) => {
                        entries.remove(&oldest);
                        self.remove_from_disk(oldest);
                    }
                    None => break,
                }
            }
            entries.insert(id, entry.clone());
        }

        self.write_to_disk(&entry);
        id
    }

    /// Look up a fresh outcome, falling back to disk on a memory miss.
    /// Expired entries are dropped from both places.
    pub fn get(&self, id: MatchId) -> Option<MatchOutcome> {
        let cutoff = self.cutoff();

        {
            let mut entries = self.lock();
            if let Some(entry) = entries.get(&id) {
                if entry.created_at >= cutoff {
                    return Some(entry.outcome.clone());
                }
                entries.remove(&id);
                self.remove_from_disk(id);
                return None;
            }
        }

        let entry = self.read_from_disk(id)?;
        if entry.created_at < cutoff {
            self.remove_from_disk(id);
            return None;
        }
        let outcome = entry.outcome.clone();
        self.lock().insert(id, entry);
        Some(outcome)
    }

    pub fn clear(&self) {
        let ids: Vec<MatchId> = {
            let mut entries = self.lock();
            let ids = entries.keys().copied().collect();
            entries.clear();
            ids
        };
        for id in ids {
            self.remove_from_disk(id);
        }
    }

    fn cutoff(&self) -> Timestamp {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        chrono::Utc::now()
            .checked_sub_signed(ttl)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<MatchId, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn entry_path(&self, id: MatchId) -> Option<PathBuf> {
        self.disk_dir.as_ref().map(|dir| dir.join(format!("{id}.json")))
    }

    fn write_to_disk(&self, entry: &CacheEntry) {
        let Some(path) = self.entry_path(entry.id) else {
            return;
        };
        let result = self
            .disk_dir
            .as_ref()
            .map(std::fs::create_dir_all)
            .unwrap_or(Ok(()))
            .and_then(|()| {
                let data = serde_json::to_vec(entry).map_err(std::io::Error::other)?;
                std::fs::write(&path, data)
            });
        if let Err(e) = result {
            tracing::debug!(match_id = %entry.id, error = %e, "Match cache disk write failed");
        }
    }

    fn read_from_disk(&self, id: MatchId) -> Option<CacheEntry> {
        let path = self.entry_path(id)?;
        let data = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&data) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(match_id = %id, error = %e, "Corrupt match cache file");
                None
            }
        }
    }

    fn remove_from_disk(&self, id: MatchId) {
        if let Some(path) = self.entry_path(id) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(match_id = %id, error = %e, "Match cache disk remove failed");
                }
            }
        }
    }
}
