use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::contexts::agent_runner::{ExecutionError, GenerationService, Model};
use crate::data::{Cache, Transcript};

/// Root folder used when none is given
pub const DEFAULT_CACHE_FOLDER: &str = ".figsmith";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// FileCache is an implementation of the Cache trait that stores replies
/// in a file structure.
///
/// The cache is organized as: `{folder}/{namespace}/{key}.cache`
#[derive(Debug, Clone)]
pub struct FileCache {
    /// The root folder path for the cache (defaults to ".figsmith")
    folder: String,
    /// Subfolder grouping related entries, typically a model hash
    namespace: String,
}

impl FileCache {
    /// Creates a new FileCache instance
    ///
    /// # Arguments
    /// * `folder` - Optional root folder path. If None, defaults to ".figsmith"
    /// * `namespace` - Subfolder for this group of entries
    pub fn new(folder: Option<String>, namespace: String) -> Self {
        Self {
            folder: folder.unwrap_or_else(|| DEFAULT_CACHE_FOLDER.to_string()),
            namespace,
        }
    }

    /// Path format: `{folder}/{namespace}/{key}.cache`
    ///
    /// Keys are hex digests, already safe for file names.
    fn get_cache_path(&self, key: &str) -> PathBuf {
        let mut path = self.get_cache_dir();
        path.push(format!("{}.cache", key));
        path
    }

    /// Unique per process and write, inside the entry's own directory
    fn get_temp_path(&self, key: &str) -> PathBuf {
        let mut path = self.get_cache_dir();
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        path.push(format!("{}.cache.{}.{}.tmp", key, process::id(), n));
        path
    }

    fn get_cache_dir(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.folder);
        path.push(&self.namespace);
        path
    }
}

impl Cache for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        // unreadable entries count as misses
        fs::read_to_string(self.get_cache_path(key)).ok()
    }

    fn set(&self, key: &str, value: &str) {
        let path = self.get_cache_path(key);
        let dir = self.get_cache_dir();

        if let Err(e) = fs::create_dir_all(&dir) {
            log::warn!("Failed to create cache directory {:?}: {}", dir, e);
            return;
        }

        // write then rename, so readers never see a partial entry
        let tmp_path = self.get_temp_path(key);
        if let Err(e) = fs::write(&tmp_path, value) {
            log::warn!("Failed to write cache file {:?}: {}", tmp_path, e);
            let _ = fs::remove_file(&tmp_path);
            return;
        }
        if let Err(e) = fs::rename(&tmp_path, &path) {
            log::warn!("Failed to move cache file into place {:?}: {}", path, e);
            let _ = fs::remove_file(&tmp_path);
        }
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Generation service that answers repeated transcripts from a `FileCache`.
///
/// Entries live under `{folder}/{hash(model)}/{hash(transcript)}.cache`, so
/// a change to any message or to the model yields a miss.
pub struct CachedGenerationService<S> {
    inner: S,
    folder: Option<String>,
}

impl<S: GenerationService> CachedGenerationService<S> {
    pub fn new(inner: S, folder: Option<String>) -> Self {
        Self { inner, folder }
    }

    fn cache_for(&self, model: &Model) -> FileCache {
        FileCache::new(self.folder.clone(), sha256_hex(model.name.as_bytes()))
    }

    fn cache_key(transcript: &Transcript) -> Result<String, ExecutionError> {
        let serialized = serde_json::to_string(transcript)
            .map_err(|e| ExecutionError::InvalidResponse(format!("Unserializable transcript: {}", e)))?;
        Ok(sha256_hex(serialized.as_bytes()))
    }
}

impl<S: GenerationService> GenerationService for CachedGenerationService<S> {
    fn invoke(&self, model: &Model, transcript: &Transcript) -> Result<String, ExecutionError> {
        let cache = self.cache_for(model);
        let key = Self::cache_key(transcript)?;

        if let Some(reply) = cache.get(&key) {
            log::debug!("Cache hit for {} ({})", model.name, key);
            return Ok(reply);
        }

        let reply = self.inner.invoke(model, transcript)?;
        cache.set(&key, &reply);
        Ok(reply)
    }
}
