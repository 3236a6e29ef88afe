//! The executor facade: binds an [`opcache_model::Operation`] to an [`opcache_store::CacheStore`],
//! deciding cache hit/miss, materializing writes on a hit, and recording writes once an operation
//! has actually run.
//!
//! This is where the five components of `opcache` meet: the stamp engine and file-stamp memo
//! fingerprint an operation, the operation model supplies its reads/writes/status, and the cache
//! store supplies `materialize`/`absorb`.

#![deny(missing_docs)]

#[macro_use]
extern crate log;

mod error;
mod executor;
mod fingerprint;
mod write_key;

pub use error::ExecError;
pub use executor::{spawn_fingerprint, Executor};
pub use fingerprint::FingerprintBuilder;
pub use write_key::WriteKey;
