use std::path::PathBuf;

use thiserror::Error;

use opcache_hash::MemoError;
use opcache_model::OperationId;
use opcache_store::StoreError;

use crate::write_key::WriteKey;

/// A fatal failure from the executor facade.
#[derive(Error, Debug)]
pub enum ExecError {
    /// `record` was called on an operation that never went through `try_hit` (or whose stamp was
    /// otherwise never set). Calling code is expected to always fingerprint before recording.
    #[error("operation {0} has no stamp set; try_hit must run before record")]
    MissingStamp(OperationId),

    /// An operation's declared writes were not produced: the operation "lied" about its writes.
    #[error("operation {op} declared write {path} (key {key}) but it does not exist in the workspace")]
    MissingWrite {
        /// The operation that lied.
        op: OperationId,
        /// The path the operation claimed to have written.
        path: PathBuf,
        /// The write key that would have named this entry in the store.
        key: WriteKey,
    },

    /// Stamping an input file (the executable or a declared read) failed with something other
    /// than "not found".
    #[error("failed to fingerprint operation {op}: {source}")]
    Fingerprint {
        /// The operation being fingerprinted.
        op: OperationId,
        /// The underlying stamping failure.
        #[source]
        source: MemoError,
    },

    /// The executable named by a `Spawn` operation does not exist, so no fingerprint can be
    /// computed for it.
    #[error("operation {op} names executable {path} which does not exist")]
    MissingExecutable {
        /// The operation whose executable is missing.
        op: OperationId,
        /// The path that does not resolve to a file.
        path: PathBuf,
    },

    /// A store-level failure (materialize/absorb) other than a plain miss.
    #[error(transparent)]
    Store(#[from] StoreError),
}
