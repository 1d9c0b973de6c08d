//! Local key/value cache for offline fallback.
//!
//! A flat string store with no transactions and no expiry. The sync services
//! keep one entry per scope, written only from successful remote fetches.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use dashmap::DashMap;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Persisted string storage keyed by scope.
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    /// Remove `key`. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> CacheResult<()>;
}

/// Cache held in process memory.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Cache stored as one file per key in a directory.
///
/// Keys are escaped into file names; writes go through a temporary file and
/// a rename so a reader never sees a half-written entry.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Open (creating if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> CacheResult<PathBuf> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", escape_key(key))))
    }
}

/// Escape everything except ASCII alphanumerics, `_` and `-` as `%XX`.
fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("%{:02X}", byte));
        }
    }
    escaped
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        let path = self.path_for(key)?;
        let tmp = self
            .dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));

        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(value.as_bytes())?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
