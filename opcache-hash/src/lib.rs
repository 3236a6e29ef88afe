//! Cryptographic stamping of bytes, strings and files, plus a per-build memo table that caches
//! `path -> Digest` so re-stamping the same input during one build is free the second time.
//!
//! This crate is the foundation the rest of `opcache` is built on: the cache store addresses its
//! entries by [`Digest`], the executor fingerprints operations by folding digests together, and
//! the [`FileStampTable`] is the single place that ever actually reads a tracked input file's
//! bytes.

#![deny(missing_docs)]

#[macro_use]
extern crate log;

mod digest;
mod memo;
pub mod retry;

pub use digest::{Digest, DigestError, DIGEST_BYTES};
pub use memo::{FileStampTable, MemoError};
