use std::cell::Cell;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use opcache_hash::retry::retry_eintr;

use crate::error::StoreError;
use crate::notifier::Notifier;

/// Size of the buffer used when falling back to a streamed copy, matching `opcache-hash`'s own
/// chunking so neither side of a materialize/absorb call holds more than one chunk in memory.
const COPY_BUFFER_SIZE: usize = 8 * 1024;

/// Whether this store's directory lives on a filesystem that actually supports hardlinks.
///
/// Probed once at [`CacheStore::open`]. `st_nlink` is meaningless as an "unused" signal on a
/// filesystem where every link is really a copy, so [`crate::gc`] consults this flag before
/// trusting `nlink == 1` and degrades GC to "never evict" when hardlinks aren't available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardlinkSupport {
    /// A probe hardlink inside the store directory succeeded.
    Supported,
    /// The probe failed (most often `EXDEV`/`EPERM`, e.g. an overlay or network filesystem).
    Unsupported,
}

/// An on-disk, content-addressed store of immutable files.
///
/// Each entry is a regular file named `hex(digest)` directly under the store's root directory: no
/// subdirectories, no sidecar metadata, no manifest. The only index is the filename itself.
///
/// A `CacheStore` owns exactly one directory; two handles open on the same directory in the same
/// process are disallowed (not enforced here — the scheduler is trusted to obey it, same as it is
/// trusted to serialize calls into one handle).
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    /// Latches to `true` the first time `hard_link` raises `EXDEV`; once latched, every later
    /// `materialize`/`absorb` call goes straight to the copy path without retrying the link.
    copying_mode: Cell<bool>,
    /// If true, every `try_hit` misses and every `record` no-ops.
    disabled: bool,
    hardlink_support: HardlinkSupport,
}

impl CacheStore {
    /// Open (creating if absent) a cache store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, disabled: bool) -> Result<CacheStore, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Open {
            path: dir.clone(),
            source,
        })?;
        let hardlink_support = probe_hardlink_support(&dir);
        if hardlink_support == HardlinkSupport::Unsupported {
            debug!(
                "store at {} has no working hardlinks; GC will never evict",
                dir.display()
            );
        }
        Ok(CacheStore {
            dir,
            copying_mode: Cell::new(false),
            disabled,
            hardlink_support,
        })
    }

    /// The directory this store is rooted at.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether this store is disabled: hits always miss, records always no-op.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Whether `hard_link` has ever failed with `EXDEV` on this handle, or the filesystem was
    /// never found to support hardlinks in the first place.
    pub fn is_copying_mode(&self) -> bool {
        self.copying_mode.get() || self.hardlink_support == HardlinkSupport::Unsupported
    }

    /// Capability probed once at [`CacheStore::open`].
    pub fn hardlink_support(&self) -> HardlinkSupport {
        self.hardlink_support
    }

    /// The path an entry keyed by `key_hex` would live at.
    pub fn path_for_key_hex(&self, key_hex: &str) -> PathBuf {
        self.dir.join(key_hex)
    }

    /// Place the cache entry at `src` into the workspace at `dst`. Tries a hardlink
    /// first, falling back to a streamed copy after the first cross-device failure on this
    /// handle. A pre-existing `dst` is unlinked and relinked/overwritten rather than treated as a
    /// conflict. Returns `Ok(false)` on a plain miss (`src` does not exist) — every other failure
    /// is fatal.
    pub fn materialize(
        &self,
        notifier: &dyn Notifier,
        src: &Path,
        dst: &Path,
    ) -> Result<bool, StoreError> {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        if !self.is_copying_mode() {
            let mut unlinked_existing = false;
            loop {
                match retry_eintr(|| std::fs::hard_link(src, dst)) {
                    Ok(()) => return Ok(true),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
                    // `dst` already names a file (the normal steady state of an incremental
                    // build re-linking over a previous run's output): unlink it and link once
                    // more instead of treating this as fatal.
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists && !unlinked_existing => {
                        unlinked_existing = true;
                        std::fs::remove_file(dst).map_err(|source| StoreError::MaterializeFatal {
                            src: src.to_path_buf(),
                            dst: dst.to_path_buf(),
                            source,
                        })?;
                    }
                    Err(e) if is_exdev(&e) => {
                        notifier.notify_warn(&format!(
                            "cross-device link from {} to {}; switching this store to copy mode",
                            src.display(),
                            dst.display()
                        ));
                        self.copying_mode.set(true);
                        break;
                    }
                    Err(source) => {
                        return Err(StoreError::MaterializeFatal {
                            src: src.to_path_buf(),
                            dst: dst.to_path_buf(),
                            source,
                        })
                    }
                }
            }
        }

        self.copy_with_permissions(src, dst)
    }

    /// Place a cache entry's bytes at `src` into `dst`.
    pub fn put(&self, notifier: &dyn Notifier, src: &Path, dst: &Path) -> Result<bool, StoreError> {
        self.materialize(notifier, src, dst)
    }

    /// Place a workspace file at `src` into the store at `dst` — the same primitive, run in the
    /// opposite logical direction.
    pub fn absorb(&self, notifier: &dyn Notifier, src: &Path, dst: &Path) -> Result<bool, StoreError> {
        self.materialize(notifier, src, dst)
    }

    fn copy_with_permissions(&self, src: &Path, dst: &Path) -> Result<bool, StoreError> {
        let mut input = match retry_eintr(|| File::open(src)) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(StoreError::MaterializeFatal {
                    src: src.to_path_buf(),
                    dst: dst.to_path_buf(),
                    source,
                })
            }
        };
        let permissions = input
            .metadata()
            .map_err(|source| StoreError::MaterializeFatal {
                src: src.to_path_buf(),
                dst: dst.to_path_buf(),
                source,
            })?
            .permissions();

        let mut output = retry_eintr(|| File::create(dst)).map_err(|source| StoreError::MaterializeFatal {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            source,
        })?;

        let mut buf = [0u8; COPY_BUFFER_SIZE];
        loop {
            let n = retry_eintr(|| input.read(&mut buf)).map_err(|source| StoreError::MaterializeFatal {
                src: src.to_path_buf(),
                dst: dst.to_path_buf(),
                source,
            })?;
            if n == 0 {
                break;
            }
            retry_eintr(|| output.write_all(&buf[..n])).map_err(|source| StoreError::MaterializeFatal {
                src: src.to_path_buf(),
                dst: dst.to_path_buf(),
                source,
            })?;
        }

        std::fs::set_permissions(dst, permissions).map_err(|source| StoreError::MaterializeFatal {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            source,
        })?;
        Ok(true)
    }
}

fn is_exdev(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

/// Probe whether `dir` supports hardlinks by attempting one between two throwaway files inside
/// it, then cleaning up. Run once, at [`CacheStore::open`].
fn probe_hardlink_support(dir: &Path) -> HardlinkSupport {
    let src = dir.join(".opcache-hardlink-probe-src");
    let dst = dir.join(".opcache-hardlink-probe-dst");
    let _ = std::fs::remove_file(&src);
    let _ = std::fs::remove_file(&dst);
    let result = File::create(&src)
        .and_then(|_| std::fs::hard_link(&src, &dst))
        .map(|_| HardlinkSupport::Supported)
        .unwrap_or(HardlinkSupport::Unsupported);
    let _ = std::fs::remove_file(&src);
    let _ = std::fs::remove_file(&dst);
    result
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::notifier::NullNotifier;

    fn write_file(path: &Path, content: &[u8]) {
        File::create(path).unwrap().write_all(content).unwrap();
    }

    #[test]
    fn test_open_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        assert!(!dir.exists());
        let store = CacheStore::open(&dir, false).unwrap();
        assert!(dir.exists());
        assert_eq!(store.dir(), dir.as_path());
    }

    #[test]
    fn test_materialize_hardlinks_by_default() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path().join("store"), false).unwrap();
        let src = tmp.path().join("entry");
        write_file(&src, b"hello");
        let dst = tmp.path().join("workspace").join("out");
        let ok = store.materialize(&NullNotifier, &src, &dst).unwrap();
        assert!(ok);
        assert_eq!(std::fs::read(&dst).unwrap(), b"hello");
        assert!(!store.is_copying_mode());
    }

    #[test]
    fn test_materialize_missing_src_is_miss() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path().join("store"), false).unwrap();
        let dst = tmp.path().join("workspace").join("out");
        let ok = store
            .materialize(&NullNotifier, &tmp.path().join("nope"), &dst)
            .unwrap();
        assert!(!ok);
        assert!(!dst.exists());
    }

    #[test]
    fn test_copy_preserves_permissions() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path().join("store"), false).unwrap();
        let src = tmp.path().join("entry");
        write_file(&src, b"content");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&src).unwrap().permissions();
            perms.set_mode(0o640);
            std::fs::set_permissions(&src, perms).unwrap();
        }
        let dst = tmp.path().join("out");
        let ok = store.copy_with_permissions(&src, &dst).unwrap();
        assert!(ok);
        assert_eq!(std::fs::read(&dst).unwrap(), b"content");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let src_mode = std::fs::metadata(&src).unwrap().permissions().mode() & 0o777;
            let dst_mode = std::fs::metadata(&dst).unwrap().permissions().mode() & 0o777;
            assert_eq!(src_mode, dst_mode);
        }
    }

    #[test]
    fn test_probe_hardlink_support_on_tmpfs() {
        let tmp = TempDir::new().unwrap();
        let support = probe_hardlink_support(tmp.path());
        // Most CI/dev filesystems support hardlinks within one directory.
        assert_eq!(support, HardlinkSupport::Supported);
    }

    #[test]
    fn test_materialize_overwrites_existing_destination() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path().join("store"), false).unwrap();
        let src = tmp.path().join("entry");
        write_file(&src, b"new");
        let dst = tmp.path().join("workspace").join("out");
        write_file(&dst, b"stale");
        let ok = store.materialize(&NullNotifier, &src, &dst).unwrap();
        assert!(ok);
        assert_eq!(std::fs::read(&dst).unwrap(), b"new");
    }

    #[test]
    fn test_absorb_twice_with_existing_store_entry_succeeds() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path().join("store"), false).unwrap();
        let workspace_file = tmp.path().join("workspace.out");
        write_file(&workspace_file, b"roundtrip");
        let store_entry = tmp.path().join("store").join("deadbeef");
        assert!(store
            .absorb(&NullNotifier, &workspace_file, &store_entry)
            .unwrap());
        // a second absorb of the same write, as a later build's `record` would perform, must not
        // fail just because the store entry is already populated.
        assert!(store
            .absorb(&NullNotifier, &workspace_file, &store_entry)
            .unwrap());
        assert_eq!(std::fs::read(&store_entry).unwrap(), b"roundtrip");
    }

    #[test]
    fn test_put_and_absorb_are_materialize() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path().join("store"), false).unwrap();
        let workspace_file = tmp.path().join("workspace.out");
        write_file(&workspace_file, b"roundtrip");
        let store_entry = tmp.path().join("store").join("deadbeef");
        assert!(store
            .absorb(&NullNotifier, &workspace_file, &store_entry)
            .unwrap());
        let back = tmp.path().join("workspace2.out");
        assert!(store.put(&NullNotifier, &store_entry, &back).unwrap());
        assert_eq!(std::fs::read(&back).unwrap(), b"roundtrip");
    }
}
