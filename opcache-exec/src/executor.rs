use std::time::SystemTime;

use opcache_hash::{Digest, FileStampTable};
use opcache_model::{Operation, OperationKind, OperationStatus};
use opcache_store::{CacheStore, Notifier};

use crate::error::ExecError;
use crate::fingerprint::FingerprintBuilder;
use crate::write_key::WriteKey;

/// Compute the spawn fingerprint of `op`: the executable's digest, then argv, then env, then the
/// stdin redirection path (if any), then the digest of every declared read in sorted order.
///
/// `op.reads()` is already sorted (it's a `BTreeSet`), so no extra sort is needed to satisfy the
/// "sorted order" requirement of step 5.
pub fn spawn_fingerprint(op: &Operation, memo: &FileStampTable) -> Result<Digest, ExecError> {
    let (cmd, argv, env, stdin) = match op.kind() {
        OperationKind::Spawn {
            cmd,
            argv,
            env,
            stdin,
        } => (cmd, argv, env, stdin),
        _ => panic!("spawn_fingerprint called on a non-Spawn operation"),
    };

    let mut builder = FingerprintBuilder::new();

    let exe_digest = memo
        .stamp(cmd)
        .map_err(|source| ExecError::Fingerprint { op: op.id(), source })?
        .ok_or_else(|| ExecError::MissingExecutable {
            op: op.id(),
            path: cmd.clone(),
        })?;
    builder.push_digest(exe_digest);

    for token in argv {
        builder.push_str(token);
    }

    for (key, value) in env {
        builder.push_str(key);
        builder.push_str(value);
    }

    match stdin {
        Some(path) => builder.push_path(path),
        None => builder.push_bytes(&[]),
    };

    for read in op.reads() {
        match memo
            .stamp(read)
            .map_err(|source| ExecError::Fingerprint { op: op.id(), source })?
        {
            Some(digest) => builder.push_digest(digest),
            // An absent declared read is distinguishable from one whose digest happens to produce
            // this marker: the marker is not a valid `Digest::of_*` output for any byte sequence
            // *fed through this exact prefix*, since a real digest segment is always exactly
            // `DIGEST_BYTES` long and this one is shorter.
            None => builder.push_bytes(b"<absent>"),
        };
    }

    Ok(builder.finish())
}

/// Binds an [`Operation`] to a [`CacheStore`]: decides cache hit/miss, materializes writes on a
/// hit, and records writes into the store once an operation has actually executed.
///
/// Owns the per-build [`FileStampTable`] used to fingerprint operations and stamp their declared
/// reads. A scheduler drives one `Executor` across every operation of a build, calling
/// [`Executor::try_hit`] then, on a miss, running the operation externally and calling
/// [`Executor::record`].
pub struct Executor<'a> {
    store: &'a CacheStore,
    memo: FileStampTable,
    notifier: &'a dyn Notifier,
}

impl<'a> Executor<'a> {
    /// Build an executor over `store`, routing diagnostics through `notifier`.
    pub fn new(store: &'a CacheStore, notifier: &'a dyn Notifier) -> Executor<'a> {
        Executor {
            store,
            memo: FileStampTable::new(),
            notifier,
        }
    }

    /// The file-stamp memo this executor has accumulated so far.
    pub fn file_stamps(&self) -> &FileStampTable {
        &self.memo
    }

    /// Attempt to satisfy `op` entirely from the cache.
    ///
    /// On success, `op.status()` becomes [`OperationStatus::Cached`] and every declared write
    /// exists in the workspace with the cached bytes. On failure (cache disabled, wrong kind, no
    /// writes, any write missing from the store, or a fatal store error), returns `false` and
    /// undoes any write this call itself materialized — `op` is left exactly as it was found,
    /// still `Pending`, ready for the scheduler to execute it externally.
    pub fn try_hit(&self, op: &mut Operation) -> bool {
        if self.store.is_disabled() {
            return false;
        }
        if !matches!(op.kind(), OperationKind::Spawn { .. }) {
            return false;
        }
        if op.writes().is_empty() {
            return false;
        }

        let stamp = match spawn_fingerprint(op, &self.memo) {
            Ok(stamp) => stamp,
            Err(e) => {
                self.notifier
                    .notify_error(op.id(), &format!("fingerprinting failed: {e}"));
                return false;
            }
        };
        op.set_stamp(stamp);
        op.set_exec_start(Some(SystemTime::now()));
        trace!("operation {} fingerprinted as {}", op.id(), stamp);

        let mut materialized = Vec::new();
        for write in op.writes() {
            let key = WriteKey::new(stamp, write);
            let entry = self.store.path_for_key_hex(&key.to_hex());
            match self.store.materialize(self.notifier, &entry, write) {
                Ok(true) => materialized.push(write.clone()),
                Ok(false) => {
                    rollback(&materialized);
                    op.set_exec_start(None);
                    return false;
                }
                Err(e) => {
                    self.notifier
                        .notify_error(op.id(), &format!("materialize failed: {e}"));
                    rollback(&materialized);
                    op.set_exec_start(None);
                    return false;
                }
            }
        }

        op.transition_to(OperationStatus::Cached)
            .expect("try_hit only runs on a Pending operation");
        op.set_exec_end(Some(SystemTime::now()));
        self.notifier.notify_debug(op.id(), "cache hit");
        true
    }

    /// Absorb `op`'s already-produced writes into the store, keyed by its fingerprint.
    ///
    /// Precondition: `op` has executed externally since the last `try_hit`, every path in
    /// `op.writes()` exists on disk, `op.stamp()` is set, and `op.is_cached()` is false.
    pub fn record(&self, op: &mut Operation) -> Result<(), ExecError> {
        if self.store.is_disabled() {
            return Ok(());
        }
        if !matches!(op.kind(), OperationKind::Spawn { .. }) {
            return Ok(());
        }
        if op.is_cached() {
            return Ok(());
        }

        let stamp = op.stamp().ok_or_else(|| ExecError::MissingStamp(op.id()))?;

        for write in op.writes() {
            let key = WriteKey::new(stamp, write);
            let entry = self.store.path_for_key_hex(&key.to_hex());
            match self.store.absorb(self.notifier, write, &entry) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(ExecError::MissingWrite {
                        op: op.id(),
                        path: write.clone(),
                        key,
                    })
                }
                Err(source) => return Err(ExecError::Store(source)),
            }
        }

        op.set_cached(true);
        debug!("operation {} recorded to the store", op.id());
        Ok(())
    }
}

/// Undo every write materialized so far during a failed `try_hit` call: delete each one, ignoring
/// errors, since the operation is about to be reported as a miss regardless.
fn rollback(materialized: &[std::path::PathBuf]) {
    for path in materialized {
        let _ = std::fs::remove_file(path);
    }
}
