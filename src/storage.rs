use anyhow::{Context, Result, anyhow};
use dirs_next::data_dir;
use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::Mutex,
};

/// Key/value persistence seam for the activity store. Values are whole
/// serialized collections; there is no partial update.
pub trait StorageBackend: Send {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn store(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON file per key under a data directory.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn default_dir() -> Result<PathBuf> {
        let base = data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;
        Ok(base.join("nonton"))
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed to read storage file {}", path.display()))?;
        Ok(Some(data))
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create storage directory {}", self.dir.display()))?;
        let path = self.key_path(key);
        fs::write(&path, value)
            .with_context(|| format!("failed to write storage file {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(());
        }
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove storage file {}", path.display()))?;
        Ok(())
    }
}

/// In-memory backend for tests and `--ephemeral` runs.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory storage mutex poisoned"))
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_backend_round_trips() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        backend.store("history", "[1,2,3]").unwrap();
        assert_eq!(backend.load("history").unwrap().as_deref(), Some("[1,2,3]"));
    }

    #[test]
    fn file_backend_missing_key_loads_none() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        assert!(backend.load("nothing").unwrap().is_none());
    }

    #[test]
    fn file_backend_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        backend.store("bookmarks", "[]").unwrap();
        backend.remove("bookmarks").unwrap();
        backend.remove("bookmarks").unwrap();
        assert!(backend.load("bookmarks").unwrap().is_none());
    }

    #[test]
    fn memory_backend_round_trips() {
        let backend = MemoryBackend::new();
        assert!(backend.load("k").unwrap().is_none());
        backend.store("k", "v").unwrap();
        assert_eq!(backend.load("k").unwrap().as_deref(), Some("v"));
        backend.remove("k").unwrap();
        assert!(backend.load("k").unwrap().is_none());
    }
}
