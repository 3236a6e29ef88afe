use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use thiserror::Error;

use opcache_hash::Digest;

/// An abstract, normalized filesystem path. Carries no ownership beyond its own bytes and is
/// freely copied between an operation's `reads`/`writes` sets and the executor that drives it.
pub type FilePath = PathBuf;

/// Monotonically increasing identifier of an [`Operation`], unique within one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(u64);

impl Display for OperationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out unique, increasing [`OperationId`]s for one build.
#[derive(Default)]
pub struct OperationIdGen {
    next: AtomicU64,
}

impl OperationIdGen {
    /// Build a new generator starting at 0.
    pub fn new() -> OperationIdGen {
        OperationIdGen::default()
    }

    /// Allocate the next id.
    pub fn next(&self) -> OperationId {
        OperationId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// The kind of externally observable work an [`Operation`] performs.
///
/// Only [`OperationKind::Spawn`] is ever cached by the executor facade: the others pass through
/// unchanged, exactly as the scheduler presents them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Run an external process.
    Spawn {
        /// The executable, as the first token of the command line.
        cmd: PathBuf,
        /// Full argument vector, including `argv[0]`.
        argv: Vec<String>,
        /// Environment entries in caller order. The cache does not sort these: the caller is
        /// responsible for restricting the environment to the subset that actually matters, and
        /// sorting here would make two operations with a permuted-but-identical env set collide.
        env: Vec<(String, String)>,
        /// Path of the file redirected to stdin, if any.
        stdin: Option<FilePath>,
    },
    /// Copy a file from one path to another.
    CopyFile {
        /// Source path.
        src: FilePath,
        /// Destination path.
        dst: FilePath,
    },
    /// Read a file's content.
    Read {
        /// The file read.
        file: FilePath,
    },
    /// Write data to a file.
    Write {
        /// The file written.
        file: FilePath,
        /// The bytes written.
        data: Vec<u8>,
    },
    /// Delete a file.
    Delete {
        /// The file deleted.
        file: FilePath,
    },
    /// Create a directory.
    Mkdir {
        /// The directory created.
        dir: FilePath,
    },
    /// A barrier with no filesystem effect of its own.
    Sync,
}

impl OperationKind {
    /// Whether this kind of operation is ever looked up in or recorded to the cache. Only
    /// [`OperationKind::Spawn`] is; every other kind is not cached.
    pub fn is_cacheable_kind(&self) -> bool {
        matches!(self, OperationKind::Spawn { .. })
    }
}

/// The lifecycle state of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    /// Not yet looked up in the cache nor executed.
    Pending,
    /// Ran externally and its outputs have been absorbed (or are about to be).
    Executed,
    /// Fully satisfied from the cache; terminal.
    Cached,
    /// Failed; terminal, never cached.
    Failed,
}

/// An illegal [`OperationStatus`] transition was attempted.
#[derive(Error, Debug, Eq, PartialEq)]
#[error("operation {op} cannot transition from {from:?} to {to:?}")]
pub struct StateError {
    /// The operation that rejected the transition.
    pub op: OperationId,
    /// The status it was in.
    pub from: OperationStatus,
    /// The status that was requested.
    pub to: OperationStatus,
}

/// An [`Operation`] failed validation before being handed to the executor.
#[derive(Error, Debug, Eq, PartialEq)]
pub enum OperationError {
    /// A cacheable operation (`Spawn`) declared no writes; the executor has nothing to key a
    /// cache entry on.
    #[error("operation {0} is cacheable but declares no writes")]
    EmptyWrites(OperationId),
    /// The same path appeared in both `reads` and `writes`.
    #[error("operation {op} reads and writes {path:?}, which is not allowed")]
    ReadWriteOverlap {
        /// The offending operation.
        op: OperationId,
        /// The path present in both sets.
        path: FilePath,
    },
}

/// A record describing one unit of externally observable work.
///
/// `Operation` is pure data: constructing one performs no I/O and no caching decision. The
/// executor facade (`opcache-exec`) is the only component that mutates `stamp`, `status` and the
/// timestamps, and the only component that drives any control flow around an operation.
#[derive(Debug, Clone)]
pub struct Operation {
    id: OperationId,
    kind: OperationKind,
    reads: BTreeSet<FilePath>,
    writes: BTreeSet<FilePath>,
    stamp: Option<Digest>,
    status: OperationStatus,
    exec_start: Option<SystemTime>,
    exec_end: Option<SystemTime>,
    cached: bool,
}

impl Operation {
    fn new(id: OperationId, kind: OperationKind) -> Operation {
        Operation {
            id,
            kind,
            reads: BTreeSet::new(),
            writes: BTreeSet::new(),
            stamp: None,
            status: OperationStatus::Pending,
            exec_start: None,
            exec_end: None,
            cached: false,
        }
    }

    /// Build a `Spawn` operation.
    pub fn spawn(
        id: OperationId,
        cmd: impl Into<PathBuf>,
        argv: Vec<String>,
        env: Vec<(String, String)>,
        stdin: Option<FilePath>,
    ) -> Operation {
        Operation::new(
            id,
            OperationKind::Spawn {
                cmd: cmd.into(),
                argv,
                env,
                stdin,
            },
        )
    }

    /// Build a `CopyFile` operation.
    pub fn copy_file(id: OperationId, src: FilePath, dst: FilePath) -> Operation {
        let mut op = Operation::new(id, OperationKind::CopyFile { src, dst });
        if let OperationKind::CopyFile { src, dst } = &op.kind {
            op.reads.insert(src.clone());
            op.writes.insert(dst.clone());
        }
        op
    }

    /// Build a `Read` operation.
    pub fn read(id: OperationId, file: FilePath) -> Operation {
        let mut op = Operation::new(id, OperationKind::Read { file: file.clone() });
        op.reads.insert(file);
        op
    }

    /// Build a `Write` operation.
    pub fn write(id: OperationId, file: FilePath, data: Vec<u8>) -> Operation {
        let mut op = Operation::new(id, OperationKind::Write { file: file.clone(), data });
        op.writes.insert(file);
        op
    }

    /// Build a `Delete` operation.
    pub fn delete(id: OperationId, file: FilePath) -> Operation {
        let mut op = Operation::new(id, OperationKind::Delete { file: file.clone() });
        op.writes.insert(file);
        op
    }

    /// Build a `Mkdir` operation.
    pub fn mkdir(id: OperationId, dir: FilePath) -> Operation {
        let mut op = Operation::new(id, OperationKind::Mkdir { dir: dir.clone() });
        op.writes.insert(dir);
        op
    }

    /// Build a `Sync` operation.
    pub fn sync(id: OperationId) -> Operation {
        Operation::new(id, OperationKind::Sync)
    }

    /// Declare that this operation reads `path`. Only meaningful for `Spawn`, where `reads`
    /// feeds the fingerprint.
    pub fn add_read(&mut self, path: FilePath) -> &mut Self {
        self.reads.insert(path);
        self
    }

    /// Declare that this operation writes `path`.
    pub fn add_write(&mut self, path: FilePath) -> &mut Self {
        self.writes.insert(path);
        self
    }

    /// This operation's id.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// This operation's kind.
    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    /// The paths this operation declares as inputs, in sorted order.
    pub fn reads(&self) -> &BTreeSet<FilePath> {
        &self.reads
    }

    /// The paths this operation declares as outputs, in sorted order.
    pub fn writes(&self) -> &BTreeSet<FilePath> {
        &self.writes
    }

    /// The operation's fingerprint, if computed.
    pub fn stamp(&self) -> Option<Digest> {
        self.stamp
    }

    /// Set the operation's fingerprint. Only the executor calls this.
    pub fn set_stamp(&mut self, stamp: Digest) {
        self.stamp = Some(stamp);
    }

    /// The operation's current lifecycle state.
    pub fn status(&self) -> OperationStatus {
        self.status
    }

    /// Attempt to move this operation to `new`. Pending can become Cached, Executed or Failed;
    /// Executed can become Failed; every other transition is rejected.
    pub fn transition_to(&mut self, new: OperationStatus) -> Result<(), StateError> {
        use OperationStatus::*;
        let allowed = matches!(
            (self.status, new),
            (Pending, Cached) | (Pending, Executed) | (Pending, Failed) | (Executed, Failed)
        );
        if !allowed {
            return Err(StateError {
                op: self.id,
                from: self.status,
                to: new,
            });
        }
        self.status = new;
        Ok(())
    }

    /// When execution of this operation started, if it has.
    pub fn exec_start(&self) -> Option<SystemTime> {
        self.exec_start
    }

    /// Record the start of execution.
    pub fn set_exec_start(&mut self, at: Option<SystemTime>) {
        self.exec_start = at;
    }

    /// When execution of this operation ended, if it has.
    pub fn exec_end(&self) -> Option<SystemTime> {
        self.exec_end
    }

    /// Record the end of execution.
    pub fn set_exec_end(&mut self, at: Option<SystemTime>) {
        self.exec_end = at;
    }

    /// Whether this operation's outputs have been recorded to the store.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Mark this operation's outputs as recorded to the store.
    pub fn set_cached(&mut self, cached: bool) {
        self.cached = cached;
    }

    /// Check this operation's declared inputs/outputs: a cacheable operation must declare at
    /// least one write, and reads/writes must be disjoint.
    pub fn validate(&self) -> Result<(), OperationError> {
        if self.kind.is_cacheable_kind() && self.writes.is_empty() {
            return Err(OperationError::EmptyWrites(self.id));
        }
        if let Some(path) = self.reads.intersection(&self.writes).next() {
            return Err(OperationError::ReadWriteOverlap {
                op: self.id,
                path: path.clone(),
            });
        }
        Ok(())
    }
}
