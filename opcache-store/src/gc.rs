use std::fs::DirEntry;
use std::path::PathBuf;
use std::time::SystemTime;

use opcache_hash::Digest;

use crate::error::StoreError;
use crate::store::{CacheStore, HardlinkSupport};

/// Aggregate counts over a store's directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Number of valid cache entries.
    pub total_files: u64,
    /// Total bytes across all valid cache entries.
    pub total_bytes: u64,
    /// Number of valid entries with `st_nlink == 1` (no workspace references them).
    pub unused_files: u64,
    /// Total bytes across unused entries.
    pub unused_bytes: u64,
}

impl CacheStore {
    /// Enumerate every directory entry directly under the store's root, including dotfiles and
    /// entries that are not valid cache files. Non-recursive.
    pub fn list_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut out = Vec::new();
        for entry in read_dir(self.dir())? {
            out.push(entry.path());
        }
        Ok(out)
    }

    /// Files under the store whose basename is not a valid hex digest — a directory that should
    /// contain nothing but cache entries, but might have picked up stray files.
    pub fn suspicious_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        Ok(self
            .list_files()?
            .into_iter()
            .filter(|p| !is_valid_entry(p))
            .collect())
    }

    /// Delete every valid entry with `st_nlink == 1`. On a filesystem without working hardlinks,
    /// `st_nlink` carries no meaning as an "unused" signal, so this degrades to a no-op.
    pub fn delete_unused(&self) -> Result<u64, StoreError> {
        if self.hardlink_support() == HardlinkSupport::Unsupported {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in self.valid_entries()? {
            if entry.nlink == 1 {
                remove(&entry.path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Aggregate stats over the store's valid entries.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats::default();
        for entry in self.valid_entries()? {
            stats.total_files += 1;
            stats.total_bytes += entry.size;
            if entry.nlink == 1 {
                stats.unused_files += 1;
                stats.unused_bytes += entry.size;
            }
        }
        Ok(stats)
    }

    /// Evict entries until the store's remaining live bytes are at most `percent`% of the current
    /// total (and, if `max_bytes` is given, at most that many bytes too), oldest-accessed first,
    /// ties broken by evicting the larger entry first.
    ///
    /// Entries with `st_nlink == 1` are treated as infinitely old and are evicted before anything
    /// else, regardless of their actual access time.
    pub fn evict(&self, percent: u64, max_bytes: Option<u64>) -> Result<(), StoreError> {
        if self.hardlink_support() == HardlinkSupport::Unsupported {
            return Ok(());
        }
        let mut entries = self.valid_entries()?;
        let total_bytes: u64 = entries.iter().map(|e| e.size).sum();
        let mut budget = total_bytes * percent / 100;
        if let Some(max) = max_bytes {
            budget = budget.min(max);
        }

        entries.sort_by(|a, b| {
            effective_atime(a)
                .cmp(&effective_atime(b))
                .then_with(|| b.size.cmp(&a.size))
        });

        let mut remaining = total_bytes;
        for entry in entries {
            if remaining <= budget {
                break;
            }
            remove(&entry.path)?;
            remaining -= entry.size;
        }
        Ok(())
    }

    fn valid_entries(&self) -> Result<Vec<Entry>, StoreError> {
        let mut out = Vec::new();
        for dir_entry in read_dir(self.dir())? {
            let path = dir_entry.path();
            if !is_valid_entry(&path) {
                continue;
            }
            let metadata = dir_entry.metadata().map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            out.push(Entry {
                size: metadata.len(),
                nlink: nlink_of(&metadata),
                atime: atime_of(&metadata),
                path,
            });
        }
        Ok(out)
    }
}

struct Entry {
    path: PathBuf,
    size: u64,
    nlink: u64,
    atime: SystemTime,
}

/// `nlink == 1` entries sort before everything else regardless of their real access time — they
/// have no live workspace reference and are the first candidates for eviction.
fn effective_atime(entry: &Entry) -> SystemTime {
    if entry.nlink == 1 {
        SystemTime::UNIX_EPOCH
    } else {
        entry.atime
    }
}

fn is_valid_entry(path: &std::path::Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => Digest::from_hex(name).is_ok(),
        None => false,
    }
}

fn read_dir(dir: &std::path::Path) -> Result<Vec<DirEntry>, StoreError> {
    std::fs::read_dir(dir)
        .map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

fn remove(path: &std::path::Path) -> Result<(), StoreError> {
    std::fs::remove_file(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn nlink_of(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.nlink()
}

#[cfg(not(unix))]
fn nlink_of(_metadata: &std::fs::Metadata) -> u64 {
    1
}

#[cfg(unix)]
fn atime_of(metadata: &std::fs::Metadata) -> SystemTime {
    use std::os::unix::fs::MetadataExt;
    SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(metadata.atime().max(0) as u64)
}

#[cfg(not(unix))]
fn atime_of(metadata: &std::fs::Metadata) -> SystemTime {
    metadata.accessed().unwrap_or(SystemTime::UNIX_EPOCH)
}
