//! `opcache`: a content-addressed cache that memoizes the outputs of external process
//! invocations, so that re-running a build with unchanged inputs reuses prior outputs instead of
//! re-executing the underlying tools.
//!
//! This crate is the root package of the `opcache` workspace: it wires together the five
//! cooperating components built out across `opcache-hash`, `opcache-model`, `opcache-store` and
//! `opcache-exec`, and exposes the configuration surface an embedding build driver constructs
//! against.
//!
//! ```
//! use opcache::{CacheConfig, open};
//! use opcache_model::{Operation, OperationIdGen};
//!
//! # fn main() -> anyhow::Result<()> {
//! # let tmp = tempfile::TempDir::new()?;
//! let config = CacheConfig {
//!     directory: tmp.path().join("store"),
//!     disabled: false,
//! };
//! let store = open(&config)?;
//! let notifier = opcache_store::NullNotifier;
//! let executor = opcache_exec::Executor::new(&store, &notifier);
//!
//! let id_gen = OperationIdGen::new();
//! let out = tmp.path().join("out");
//! std::fs::write(&out, b"hello")?;
//! let mut op = Operation::spawn(id_gen.next(), "/bin/true", vec!["true".into()], vec![], None);
//! op.add_write(out.clone());
//!
//! // first run: miss, the scheduler would execute the tool and then record it
//! assert!(!executor.try_hit(&mut op));
//! op.set_exec_start(Some(std::time::SystemTime::now()));
//! executor.record(&mut op)?;
//!
//! // a later build with the same operation hits the cache
//! std::fs::remove_file(&out)?;
//! let mut op2 = Operation::spawn(id_gen.next(), "/bin/true", vec!["true".into()], vec![], None);
//! op2.add_write(out.clone());
//! assert!(executor.try_hit(&mut op2));
//! assert_eq!(std::fs::read(&out)?, b"hello");
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

use std::path::PathBuf;

use anyhow::Context;

pub use opcache_exec::{ExecError, Executor, WriteKey};
pub use opcache_hash::{Digest, DigestError, FileStampTable, MemoError};
pub use opcache_model::{
    FilePath, Operation, OperationError, OperationId, OperationIdGen, OperationKind,
    OperationStatus, StateError,
};
pub use opcache_store::{
    CacheStore, HardlinkSupport, LoggingNotifier, NullNotifier, Notifier, StoreError, StoreStats,
};

/// The configuration surface a build driver constructs a cache from. Everything else — CLI
/// parsing, environment variables, exit codes — is the responsibility of the embedding driver,
/// not this crate.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// The on-disk root of the cache store.
    pub directory: PathBuf,
    /// If true, every lookup misses and every record is a no-op.
    pub disabled: bool,
}

/// Open a [`CacheStore`] from a [`CacheConfig`], creating its directory if absent.
pub fn open(config: &CacheConfig) -> anyhow::Result<CacheStore> {
    CacheStore::open(&config.directory, config.disabled)
        .with_context(|| format!("failed to open cache store at {}", config.directory.display()))
}
