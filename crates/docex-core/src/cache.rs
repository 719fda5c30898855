//! Content-addressed result cache.
//!
//! Entries are JSON files named `<sha256>.json` in a single directory and are
//! mirrored in memory. Writes go through a temp file in the same directory
//! and are renamed into place, so readers never see a partial entry.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::Utc;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::models::{CacheEntry, ContentHash, FinalResult};

const ENTRY_EXTENSION: &str = "json";

/// Counters reported by [`ContentCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hits over lookups, 0.0 when nothing was looked up yet.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

pub struct ContentCache {
    dir: PathBuf,
    entries: RwLock<HashMap<ContentHash, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ContentCache {
    /// Open (creating if needed) a cache directory and preload its entries.
    ///
    /// Unreadable entries are skipped with a warning.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut entries = HashMap::new();
        for (hash, path) in entry_files(&dir)? {
            match load_entry(&hash, &path) {
                Ok(entry) => {
                    entries.insert(hash, entry);
                }
                Err(e) => warn!("Skipping cache entry: {}", e),
            }
        }
        debug!("Opened cache at {} with {} entries", dir.display(), entries.len());

        Ok(Self {
            dir,
            entries: RwLock::new(entries),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, hash: &ContentHash) -> PathBuf {
        self.dir.join(format!("{}.{}", hash, ENTRY_EXTENSION))
    }

    /// Look up a stored result. Corrupt entries count as misses.
    pub fn get(&self, hash: &ContentHash) -> Option<FinalResult> {
        let cached = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(hash)
            .map(|entry| entry.result.clone());
        if let Some(result) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(result);
        }

        // Another process may have written the entry since we opened.
        let path = self.entry_path(hash);
        if path.is_file() {
            match load_entry(hash, &path) {
                Ok(entry) => {
                    let result = self
                        .entries
                        .write()
                        .unwrap_or_else(|e| e.into_inner())
                        .entry(hash.clone())
                        .or_insert(entry)
                        .result
                        .clone();
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(result);
                }
                Err(e) => warn!("{}", e),
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a result. Writing the same result twice is a no-op.
    pub fn put(&self, hash: &ContentHash, result: &FinalResult) -> Result<(), CacheError> {
        let unchanged = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(hash)
            .is_some_and(|entry| entry.result == *result);
        if unchanged {
            return Ok(());
        }

        let entry = CacheEntry {
            content_hash: hash.clone(),
            result: result.clone(),
            written_at: Utc::now(),
        };

        let mut file = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut file, &entry)?;
        file.flush()?;

        // Rename and map update happen under one write lock.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        file.persist(self.entry_path(hash)).map_err(|e| CacheError::Io(e.error))?;
        entries.insert(hash.clone(), entry);
        debug!("Cached result for {}", hash.short());
        Ok(())
    }

    /// Delete every entry and reset the counters. Returns the number of files removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for (_, path) in entry_files(&self.dir)? {
            fs::remove_file(&path)?;
            removed += 1;
        }
        self.entries.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!("Cleared {} cache entries", removed);
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        let bytes = entry_files(&self.dir)
            .map(|files| {
                files
                    .iter()
                    .filter_map(|(_, path)| fs::metadata(path).ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0);

        CacheStats {
            entries: self.entries.read().unwrap_or_else(|e| e.into_inner()).len(),
            bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// `<hash>.json` files in `dir`. Anything else is ignored.
fn entry_files(dir: &Path) -> Result<Vec<(ContentHash, PathBuf)>, CacheError> {
    let mut files = Vec::new();
    for dir_entry in fs::read_dir(dir)? {
        let path = dir_entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
            continue;
        }
        let hash = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(ContentHash::from_hex);
        if let Some(hash) = hash {
            files.push((hash, path));
        }
    }
    Ok(files)
}

fn load_entry(hash: &ContentHash, path: &Path) -> Result<CacheEntry, CacheError> {
    let corrupted = |reason: String| CacheError::Corrupted {
        hash: hash.to_string(),
        reason,
    };

    let content = fs::read_to_string(path)?;
    let entry: CacheEntry = serde_json::from_str(&content).map_err(|e| corrupted(e.to_string()))?;
    if entry.content_hash != *hash {
        return Err(corrupted(format!("entry is for {}", entry.content_hash)));
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentType, Fields, ProviderKind, ProviderResult};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_result(name: &str) -> FinalResult {
        let mut fields = Fields::new();
        fields.insert("name".to_string(), name.to_string());
        let provider = ProviderResult::structured(ProviderKind::Primary, fields.clone());
        FinalResult::accepted(provider, fields, DocumentType::License, None, Utc::now())
    }

    #[test]
    fn test_put_get_and_reopen() {
        let dir = TempDir::new().unwrap();
        let hash = ContentHash::of(b"image-a");
        let result = sample_result("山田 太郎");

        let cache = ContentCache::open(dir.path()).unwrap();
        assert_eq!(cache.get(&hash), None);
        cache.put(&hash, &result).unwrap();
        assert_eq!(cache.get(&hash), Some(result.clone()));

        let stats = cache.stats();
        assert_eq!((stats.entries, stats.hits, stats.misses), (1, 1, 1));
        assert!(stats.bytes > 0);
        assert_eq!(stats.hit_rate(), 0.5);

        let reopened = ContentCache::open(dir.path()).unwrap();
        assert_eq!(reopened.stats().entries, 1);
        assert_eq!(reopened.get(&hash), Some(result));
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let hash = ContentHash::of(b"image-b");
        fs::write(dir.path().join(format!("{}.json", hash)), "{ not json").unwrap();

        let cache = ContentCache::open(dir.path()).unwrap();
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.get(&hash), None);
        assert_eq!(cache.stats().misses, 1);

        let result = sample_result("A");
        cache.put(&hash, &result).unwrap();
        assert_eq!(cache.get(&hash), Some(result));
    }

    #[test]
    fn test_entry_under_wrong_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let real = ContentHash::of(b"real");
        let other = ContentHash::of(b"other");

        let cache = ContentCache::open(dir.path()).unwrap();
        cache.put(&real, &sample_result("A")).unwrap();
        fs::copy(
            dir.path().join(format!("{}.json", real)),
            dir.path().join(format!("{}.json", other)),
        )
        .unwrap();

        let reopened = ContentCache::open(dir.path()).unwrap();
        assert_eq!(reopened.get(&other), None);
        assert!(reopened.get(&real).is_some());
    }

    #[test]
    fn test_repeated_put_is_noop() {
        let dir = TempDir::new().unwrap();
        let hash = ContentHash::of(b"image-c");
        let result = sample_result("A");
        let cache = ContentCache::open(dir.path()).unwrap();

        cache.put(&hash, &result).unwrap();
        let path = dir.path().join(format!("{}.json", hash));
        let first = fs::read_to_string(&path).unwrap();
        cache.put(&hash, &result).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn test_clear_removes_entries_and_resets_counters() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
        let cache = ContentCache::open(dir.path()).unwrap();

        for key in [b"1".as_slice(), b"2", b"3"] {
            let hash = ContentHash::of(key);
            cache.put(&hash, &sample_result("A")).unwrap();
            cache.get(&hash);
        }
        cache.get(&ContentHash::of(b"missing"));

        assert_eq!(cache.clear().unwrap(), 3);
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 0,
                bytes: 0,
                hits: 0,
                misses: 0
            }
        );
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_entry_written_by_another_instance_is_found() {
        let dir = TempDir::new().unwrap();
        let hash = ContentHash::of(b"shared");
        let first = ContentCache::open(dir.path()).unwrap();
        let second = ContentCache::open(dir.path()).unwrap();

        first.put(&hash, &sample_result("A")).unwrap();
        assert!(second.get(&hash).is_some());
        assert_eq!(second.stats().hits, 1);
    }

    #[test]
    fn test_concurrent_puts_and_gets_never_expose_partial_entries() {
        let dir = TempDir::new().unwrap();
        let hash = ContentHash::of(b"contended");
        let payloads: Vec<FinalResult> = (0..4)
            .map(|i| sample_result(&format!("{}", i).repeat(2_000)))
            .collect();
        let cache = ContentCache::open(dir.path()).unwrap();

        std::thread::scope(|scope| {
            for payload in &payloads {
                let cache = &cache;
                let hash = &hash;
                scope.spawn(move || {
                    for _ in 0..25 {
                        cache.put(hash, payload).unwrap();
                    }
                });
            }
            for _ in 0..4 {
                let cache = &cache;
                let hash = &hash;
                let payloads = &payloads;
                scope.spawn(move || {
                    for _ in 0..100 {
                        if let Some(seen) = cache.get(hash) {
                            assert!(payloads.contains(&seen));
                        }
                    }
                });
            }
        });

        let in_memory = cache.get(&hash).unwrap();
        assert!(payloads.contains(&in_memory));

        let reopened = ContentCache::open(dir.path()).unwrap();
        let on_disk = reopened.get(&hash).unwrap();
        assert!(payloads.contains(&on_disk));
        assert_eq!(on_disk, in_memory);
        assert_eq!(reopened.stats().entries, 1);
    }
}
