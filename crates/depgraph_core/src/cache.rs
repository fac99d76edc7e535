//! Cache Manager (spec §4.G): content-addressed, two-tiered (file + repo)
//! cache with TTL and size-based eviction.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

use crate::model::CacheStats;

pub const DEFAULT_MAX_AGE_MS: u128 = 86_400_000;
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 104_857_600;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Serialize, serde::Deserialize)]
struct Envelope {
    timestamp_ms: u128,
    key: String,
    data: serde_json::Value,
}

pub struct CacheManager {
    dir: PathBuf,
    max_age_ms: u128,
    max_size_bytes: u64,
    enabled: bool,
    stats: std::sync::Mutex<CacheStats>,
}

impl CacheManager {
    pub fn new(dir: PathBuf, max_age_ms: u128, max_size_bytes: u64, enabled: bool) -> Self {
        Self {
            dir,
            max_age_ms,
            max_size_bytes,
            enabled,
            stats: std::sync::Mutex::new(CacheStats::default()),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().unwrap().clone()
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }
        let path = self.entry_path(key);
        let metadata = std::fs::metadata(&path).ok()?;
        let modified = metadata.modified().ok()?;
        let age_ms = now_ms().saturating_sub(to_ms(modified));

        if age_ms > self.max_age_ms {
            let _ = std::fs::remove_file(&path);
            self.bump_miss();
            return None;
        }

        let bytes = std::fs::read(&path).ok()?;
        let envelope: Envelope = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(_) => {
                self.bump_error();
                return None;
            }
        };
        match serde_json::from_value(envelope.data) {
            Ok(value) => {
                self.bump_hit();
                Some(value)
            }
            Err(_) => {
                self.bump_error();
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, data: &T) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)?;
        let envelope = Envelope {
            timestamp_ms: now_ms(),
            key: key.to_string(),
            data: serde_json::to_value(data)?,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let final_path = self.entry_path(key);
        let tmp_path = self.dir.join(format!("{key}.json.tmp-{}", std::process::id()));
        std::fs::write(&tmp_path, &bytes)?;
        std::fs::rename(&tmp_path, &final_path)?;

        self.bump_write();
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        if !self.dir.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().map(|e| e == "json").unwrap_or(false) {
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    pub fn cleanup_expired(&self) -> Result<(), CacheError> {
        if !self.dir.exists() {
            return Ok(());
        }
        let now = now_ms();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    if now.saturating_sub(to_ms(modified)) > self.max_age_ms {
                        let _ = std::fs::remove_file(&path);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn enforce_size_limit(&self) -> Result<(), CacheError> {
        if !self.dir.exists() {
            return Ok(());
        }
        let mut entries: Vec<(PathBuf, u64, SystemTime)> = Vec::new();
        let mut total: u64 = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let metadata = entry.metadata()?;
            total += metadata.len();
            entries.push((path, metadata.len(), metadata.modified()?));
        }

        if total <= self.max_size_bytes {
            return Ok(());
        }

        entries.sort_by_key(|(_, _, modified)| *modified);
        for (path, size, _) in entries {
            if total <= self.max_size_bytes {
                break;
            }
            if std::fs::remove_file(&path).is_ok() {
                total = total.saturating_sub(size);
            }
        }
        Ok(())
    }

    fn bump_hit(&self) {
        self.stats.lock().unwrap().hits += 1;
    }
    fn bump_miss(&self) {
        self.stats.lock().unwrap().misses += 1;
    }
    fn bump_write(&self) {
        self.stats.lock().unwrap().writes += 1;
    }
    fn bump_error(&self) {
        self.stats.lock().unwrap().errors += 1;
    }

    /// Called by the caller when a `get` simply found nothing on disk
    /// (distinct from the TTL-expiry path above, which tracks its own
    /// miss).
    pub fn record_plain_miss(&self) {
        self.bump_miss();
    }
}

fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0)
}

fn to_ms(t: SystemTime) -> u128 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0)
}

/// File cache key: sha256(absolute path, size, mtime-ns). Pure content
/// changes that preserve size and mtime escape detection — a documented
/// trade-off against rehashing file bodies.
pub fn file_key(absolute_path: &Path, size: u64, modified_ns: i128) -> String {
    let mut hasher = Sha256::new();
    hasher.update(absolute_path.to_string_lossy().as_bytes());
    hasher.update(size.to_le_bytes());
    hasher.update(modified_ns.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Repo cache key: sha256(absolute repo path, sorted excludes, sorted
/// includes, include_external flag, max_file_size).
pub fn repo_key(
    repo_path: &Path,
    include_external: bool,
    exclude_patterns: &[String],
    include_extensions: &[String],
    max_file_size: u64,
) -> String {
    let mut sorted_excludes = exclude_patterns.to_vec();
    sorted_excludes.sort();
    let mut sorted_includes = include_extensions.to_vec();
    sorted_includes.sort();

    let mut hasher = Sha256::new();
    hasher.update(repo_path.to_string_lossy().as_bytes());
    hasher.update([include_external as u8]);
    hasher.update(sorted_excludes.join(",").as_bytes());
    hasher.update(sorted_includes.join(",").as_bytes());
    hasher.update(max_file_size.to_le_bytes());
    hex::encode(hasher.finalize())
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn file_key_changes_with_size() {
        let p = Path::new("/repo/a.js");
        let k1 = file_key(p, 10, 100);
        let k2 = file_key(p, 11, 100);
        assert_ne!(k1, k2);
    }

    #[test]
    fn repo_key_is_order_independent_over_pattern_lists() {
        let p = Path::new("/repo");
        let k1 = repo_key(p, false, &["b/**".into(), "a/**".into()], &[".js".into()], 1024);
        let k2 = repo_key(p, false, &["a/**".into(), "b/**".into()], &[".js".into()], 1024);
        assert_eq!(k1, k2);
    }

    #[test]
    fn set_then_get_round_trips_and_counts_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf(), DEFAULT_MAX_AGE_MS, DEFAULT_MAX_SIZE_BYTES, true);
        cache.set("abc", &serde_json::json!({"x": 1})).unwrap();
        let value: serde_json::Value = cache.get("abc").unwrap();
        assert_eq!(value["x"], 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn expired_entry_is_evicted_and_counted_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf(), 0, DEFAULT_MAX_SIZE_BYTES, true);
        cache.set("abc", &serde_json::json!({"x": 1})).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let value: Option<serde_json::Value> = cache.get("abc");
        assert!(value.is_none());
        assert!(!dir.path().join("abc.json").exists());
    }
}
