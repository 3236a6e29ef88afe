//! A content-addressed, on-disk store of immutable files, plus the garbage-collection policy over
//! it.
//!
//! Every entry lives directly under the store's root directory, named `hex(digest)`. Entries move
//! in and out of the workspace via [`CacheStore::materialize`]/[`CacheStore::put`]/
//! [`CacheStore::absorb`], which prefer a hardlink and fall back to a streamed copy the first time
//! the workspace and the store turn out to live on different filesystems.

#![deny(missing_docs)]

#[macro_use]
extern crate log;

mod error;
mod gc;
mod notifier;
mod store;

pub use error::StoreError;
pub use gc::StoreStats;
pub use notifier::{LoggingNotifier, NullNotifier, Notifier};
pub use store::{CacheStore, HardlinkSupport};
