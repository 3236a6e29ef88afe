//! The operation model: the vocabulary the executor facade and cache store share to describe one
//! unit of externally observable build work and track it through its lifecycle.
//!
//! This crate is pure data and pure state-transition logic — it performs no I/O and makes no
//! caching decision. `opcache-exec` is the only crate that drives an [`Operation`] through its
//! states.

#![deny(missing_docs)]

mod operation;

pub use operation::{
    FilePath, Operation, OperationError, OperationId, OperationIdGen, OperationKind,
    OperationStatus, StateError,
};
