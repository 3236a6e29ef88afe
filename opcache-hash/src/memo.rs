use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::digest::Digest;
use crate::retry::retry_eintr;

/// Error stamping a file. Carries the offending path and the underlying OS error so the caller
/// can report something actionable.
#[derive(Error, Debug)]
#[error("failed to stamp {path}: {source}")]
pub struct MemoError {
    /// The file that could not be stamped.
    pub path: PathBuf,
    /// The underlying I/O error.
    #[source]
    pub source: io::Error,
}

/// Caches `path -> Digest` for the lifetime of one cache instance.
///
/// Single-threaded and interior-mutable (`RefCell`/`Cell`), not `Mutex`-guarded: there is no
/// concurrent access to memoize against here.
///
/// Once a path has a digest recorded, that entry is never invalidated for the lifetime of the
/// table: the caller is trusted not to mutate a file after it has been stamped.
#[derive(Default)]
pub struct FileStampTable {
    entries: RefCell<HashMap<PathBuf, Digest>>,
    total_time: Cell<Duration>,
}

impl FileStampTable {
    /// Build a new, empty table.
    pub fn new() -> FileStampTable {
        FileStampTable::default()
    }

    /// Return the digest of `path`, computing and memoizing it on first access.
    ///
    /// `Ok(None)` means the file does not exist — an expected, recoverable condition the upper
    /// layers use to treat a read as "absent" rather than failing the whole operation. Any other
    /// I/O failure is a [`MemoError`].
    pub fn stamp(&self, path: &Path) -> Result<Option<Digest>, MemoError> {
        if let Some(digest) = self.entries.borrow().get(path) {
            trace!("Stamp of {} served from memo", path.display());
            return Ok(Some(*digest));
        }

        let start = Instant::now();
        let result = self.compute(path);
        self.total_time.set(self.total_time.get() + start.elapsed());

        let digest = result?;
        if let Some(digest) = digest {
            debug!("Stamped {} as {}", path.display(), digest);
            self.entries.borrow_mut().insert(path.to_path_buf(), digest);
        } else {
            debug!("{} is absent, nothing to stamp", path.display());
        }
        Ok(digest)
    }

    fn compute(&self, path: &Path) -> Result<Option<Digest>, MemoError> {
        let file = match retry_eintr(|| File::open(path)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(MemoError {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let digest = Digest::of_fd(&file).map_err(|e| MemoError {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Other, e.to_string()),
        })?;
        drop(file);
        Ok(Some(digest))
    }

    /// Cumulative wall-clock time spent inside [`FileStampTable::stamp`] across every call,
    /// including cache hits (which are cheap but not free) — exposed purely for diagnostics.
    pub fn total_stamp_time(&self) -> Duration {
        self.total_time.get()
    }

    /// Number of distinct paths currently memoized.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether no path has been stamped yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
