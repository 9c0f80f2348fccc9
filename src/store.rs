use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{error, warn};

use crate::storage::StorageBackend;

const HISTORY_KEY: &str = "nonton_history";
const BOOKMARK_KEY: &str = "nonton_bookmarks";

/// Oldest entries past this count are dropped from the tail.
pub const HISTORY_CAP: usize = 50;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HistoryEntry {
    pub id: String,
    pub title: String,
    pub poster: String,
    pub link: String,
    pub watched_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookmarkEntry {
    pub id: String,
    pub title: String,
    pub poster: String,
    pub link: String,
    pub bookmarked_at: DateTime<Utc>,
}

/// Watch history and bookmarks over an injected storage backend. Both
/// collections are read and written whole; unreadable stored data counts as
/// empty rather than an error, since this is disposable convenience state.
pub struct ActivityStore {
    backend: Box<dyn StorageBackend>,
}

impl ActivityStore {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Records a watch event: dedups by id, stamps the current time, prepends
    /// and caps the collection. Entries without an id are refused.
    pub fn record_watch(&mut self, entry: HistoryEntry) {
        if entry.id.is_empty() {
            warn!("refusing to record history entry without an id");
            return;
        }
        let mut history: Vec<HistoryEntry> = self.read_collection(HISTORY_KEY);
        history.retain(|e| e.id != entry.id);
        history.insert(
            0,
            HistoryEntry {
                watched_at: Utc::now(),
                ..entry
            },
        );
        history.truncate(HISTORY_CAP);
        self.write_collection(HISTORY_KEY, &history);
    }

    /// Most recently watched first.
    pub fn list_history(&self) -> Vec<HistoryEntry> {
        self.read_collection(HISTORY_KEY)
    }

    /// Erases the whole history. Confirmation is the caller's concern.
    pub fn clear_history(&mut self) {
        if let Err(err) = self.backend.remove(HISTORY_KEY) {
            error!("failed to clear history: {err:#}");
        }
    }

    /// Flips the bookmark state for `entry.id`. Returns `Some(true)` when the
    /// entry is now bookmarked, `Some(false)` when it was removed, and `None`
    /// when the entry has no id.
    pub fn toggle_bookmark(&mut self, entry: BookmarkEntry) -> Option<bool> {
        if entry.id.is_empty() {
            warn!("refusing to toggle bookmark without an id");
            return None;
        }
        let mut bookmarks: Vec<BookmarkEntry> = self.read_collection(BOOKMARK_KEY);
        let bookmarked = match bookmarks.iter().position(|e| e.id == entry.id) {
            Some(pos) => {
                bookmarks.remove(pos);
                false
            }
            None => {
                bookmarks.insert(
                    0,
                    BookmarkEntry {
                        bookmarked_at: Utc::now(),
                        ..entry
                    },
                );
                true
            }
        };
        self.write_collection(BOOKMARK_KEY, &bookmarks);
        Some(bookmarked)
    }

    /// Most recently bookmarked first.
    pub fn list_bookmarks(&self) -> Vec<BookmarkEntry> {
        self.read_collection(BOOKMARK_KEY)
    }

    /// Erases all bookmarks. Confirmation is the caller's concern.
    pub fn clear_bookmarks(&mut self) {
        if let Err(err) = self.backend.remove(BOOKMARK_KEY) {
            error!("failed to clear bookmarks: {err:#}");
        }
    }

    pub fn is_bookmarked(&self, id: &str) -> bool {
        !id.is_empty() && self.list_bookmarks().iter().any(|e| e.id == id)
    }

    fn read_collection<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let data = match self.backend.load(key) {
            Ok(Some(data)) => data,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!("failed to load {key}: {err:#}");
                return Vec::new();
            }
        };
        match serde_json::from_str(&data) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("discarding unreadable {key} collection: {err}");
                Vec::new()
            }
        }
    }

    fn write_collection<T: Serialize>(&mut self, key: &str, entries: &[T]) {
        let data = match serde_json::to_string(entries) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to serialize {key}: {err}");
                return;
            }
        };
        if let Err(err) = self.backend.store(key, &data) {
            error!("failed to persist {key}: {err:#}");
        }
    }
}
