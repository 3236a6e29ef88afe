use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A fatal failure from the cache store: any OS error other than a plain miss is fatal for the
/// call that raised it.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to create or open the store's root directory.
    #[error("failed to open cache store at {path}: {source}")]
    Open {
        /// The directory that could not be created/opened.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A materialize/absorb call failed for a reason other than a plain miss.
    #[error("materializing {src} -> {dst} failed: {source}")]
    MaterializeFatal {
        /// The source path of the failed link/copy.
        src: PathBuf,
        /// The destination path of the failed link/copy.
        dst: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A GC/stats call failed to stat or remove an entry.
    #[error("cache store I/O failed on {path}: {source}")]
    Io {
        /// The entry being read or removed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}
