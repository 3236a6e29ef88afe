//! End-to-end scenarios S1-S6 of the cache's testable properties, each driving the public
//! `opcache` surface exactly as a scheduler would: build an `Operation`, call `try_hit`, on a miss
//! pretend to run the tool and call `record`.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use opcache::{open, CacheConfig, Executor, NullNotifier, Operation, OperationIdGen, OperationStatus};

fn init() {
    let _ = env_logger::Builder::from_default_env().is_test(true).try_init();
}

fn store_in(tmp: &TempDir) -> opcache::CacheStore {
    open(&CacheConfig {
        directory: tmp.path().join("store"),
        disabled: false,
    })
    .unwrap()
}

fn fake_tool(tmp: &TempDir, name: &str) -> PathBuf {
    let path = tmp.path().join(name);
    fs::write(&path, b"#!/bin/sh\n").unwrap();
    path
}

/// S1: a spawn op with a single write hits after being recorded, reproducing the exact bytes.
#[test]
fn s1_hit_reproduces_bytes() {
    init();
    let tmp = TempDir::new().unwrap();
    let store = store_in(&tmp);
    let executor = Executor::new(&store, &NullNotifier);
    let ids = OperationIdGen::new();
    let echo = fake_tool(&tmp, "echo");
    let out = tmp.path().join("w").join("out");
    fs::create_dir_all(out.parent().unwrap()).unwrap();

    fs::write(&out, b"hi\n").unwrap();
    let mut op = Operation::spawn(ids.next(), echo.clone(), vec!["echo".into(), "hi".into()], vec![], None);
    op.add_write(out.clone());
    assert!(!executor.try_hit(&mut op)); // empty store: miss, but the fingerprint is now set
    executor.record(&mut op).unwrap();

    fs::remove_file(&out).unwrap();

    let mut op2 = Operation::spawn(ids.next(), echo, vec!["echo".into(), "hi".into()], vec![], None);
    op2.add_write(out.clone());
    assert!(executor.try_hit(&mut op2));
    assert_eq!(fs::read(&out).unwrap(), b"hi\n");
    assert_eq!(op2.status(), OperationStatus::Cached);
}

/// S2: editing a declared read changes the fingerprint, so a subsequent try_hit misses.
#[test]
fn s2_miss_on_edited_read() {
    init();
    let tmp = TempDir::new().unwrap();
    let store = store_in(&tmp);
    let executor = Executor::new(&store, &NullNotifier);
    let ids = OperationIdGen::new();
    let cat = fake_tool(&tmp, "cat");
    let input = tmp.path().join("w").join("in");
    let out = tmp.path().join("w").join("out");
    fs::create_dir_all(input.parent().unwrap()).unwrap();

    fs::write(&input, b"A").unwrap();
    fs::write(&out, b"A").unwrap();
    let mut op = Operation::spawn(ids.next(), cat.clone(), vec!["cat".into(), input.display().to_string()], vec![], None);
    op.add_read(input.clone());
    op.add_write(out.clone());
    assert!(!executor.try_hit(&mut op));
    executor.record(&mut op).unwrap();

    fs::write(&input, b"B").unwrap();

    let mut op2 = Operation::spawn(ids.next(), cat, vec!["cat".into(), input.display().to_string()], vec![], None);
    op2.add_read(input);
    op2.add_write(out);
    assert!(!executor.try_hit(&mut op2));
}

/// S3: if only some of an op's writes exist in the store, try_hit misses and rolls back every
/// write it materialized for this call.
#[test]
fn s3_partial_hit_rolls_back() {
    init();
    let tmp = TempDir::new().unwrap();
    let store = store_in(&tmp);
    let executor = Executor::new(&store, &NullNotifier);
    let ids = OperationIdGen::new();
    let tool = fake_tool(&tmp, "tool");
    let a = tmp.path().join("w").join("a");
    let b = tmp.path().join("w").join("b");
    fs::create_dir_all(a.parent().unwrap()).unwrap();

    // seed the store with only the key for `a`, using an op whose fingerprint matches the later
    // two-write op (same cmd/argv/env/reads).
    fs::write(&a, b"A").unwrap();
    let mut seed = Operation::spawn(ids.next(), tool.clone(), vec!["tool".into()], vec![], None);
    seed.add_write(a.clone());
    assert!(!executor.try_hit(&mut seed));
    executor.record(&mut seed).unwrap();

    fs::remove_file(&a).unwrap();

    let mut op = Operation::spawn(ids.next(), tool, vec!["tool".into()], vec![], None);
    op.add_write(a.clone());
    op.add_write(b.clone());
    assert!(!executor.try_hit(&mut op));
    assert!(!a.exists());
    assert!(!b.exists());
}

/// S4: cross-device hardlink fallback. Skips when `/tmp` and the OS temp-backed workspace happen
/// to live on the same device (no cross-device boundary to exercise).
#[test]
fn s4_exdev_fallback_latches_copying_mode() {
    init();
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;

        let store_dir = TempDir::new().unwrap();
        let workspace_dir = TempDir::new_in("/dev/shm").or_else(|_| TempDir::new());
        let Ok(workspace_dir) = workspace_dir else {
            return;
        };

        let store_dev = fs::metadata(store_dir.path()).unwrap().dev();
        let workspace_dev = fs::metadata(workspace_dir.path()).unwrap().dev();
        if store_dev == workspace_dev {
            // No cross-device boundary available in this environment; nothing to exercise.
            return;
        }

        let store = open(&CacheConfig {
            directory: store_dir.path().join("store"),
            disabled: false,
        })
        .unwrap();
        let executor = Executor::new(&store, &NullNotifier);
        let ids = OperationIdGen::new();
        let tool = fake_tool(&store_dir, "tool");
        let out = workspace_dir.path().join("out");
        fs::write(&out, b"payload").unwrap();

        let mut op = Operation::spawn(ids.next(), tool.clone(), vec!["tool".into()], vec![], None);
        op.add_write(out.clone());
        assert!(!executor.try_hit(&mut op));
        executor.record(&mut op).unwrap();
        assert!(store.is_copying_mode());

        fs::remove_file(&out).unwrap();
        let mut op2 = Operation::spawn(ids.next(), tool, vec!["tool".into()], vec![], None);
        op2.add_write(out.clone());
        assert!(executor.try_hit(&mut op2));
        assert_eq!(fs::read(&out).unwrap(), b"payload");
        assert!(store.is_copying_mode());
    }
}

/// S5: evicting to 50% leaves at most 50 KiB + one entry's worth of bytes behind, from 100 1 KiB
/// entries.
#[test]
fn s5_eviction_respects_budget() {
    init();
    let tmp = TempDir::new().unwrap();
    let store = store_in(&tmp);
    let executor = Executor::new(&store, &NullNotifier);
    let ids = OperationIdGen::new();
    let tool = fake_tool(&tmp, "tool");

    for i in 0..100 {
        let out = tmp.path().join("w").join(format!("out{i}"));
        fs::create_dir_all(out.parent().unwrap()).unwrap();
        fs::write(&out, vec![b'x'; 1024]).unwrap();
        let mut op = Operation::spawn(ids.next(), tool.clone(), vec!["tool".into(), i.to_string()], vec![], None);
        op.add_write(out.clone());
        assert!(!executor.try_hit(&mut op));
        executor.record(&mut op).unwrap();
    }

    store.evict(50, None).unwrap();
    let stats = store.stats().unwrap();
    assert!(stats.total_bytes <= 50 * 1024 + 1024);
}

/// S6: deleting unused entries removes exactly the ones whose workspace counterpart is gone.
#[test]
fn s6_delete_unused_is_precise() {
    init();
    let tmp = TempDir::new().unwrap();
    let store = store_in(&tmp);
    let executor = Executor::new(&store, &NullNotifier);
    let ids = OperationIdGen::new();
    let tool = fake_tool(&tmp, "tool");

    let mut outs = Vec::new();
    for i in 0..10 {
        let out = tmp.path().join("w").join(format!("out{i}"));
        fs::create_dir_all(out.parent().unwrap()).unwrap();
        fs::write(&out, format!("content{i}")).unwrap();
        let mut op = Operation::spawn(ids.next(), tool.clone(), vec!["tool".into(), i.to_string()], vec![], None);
        op.add_write(out.clone());
        assert!(!executor.try_hit(&mut op));
        executor.record(&mut op).unwrap();
        outs.push(out);
    }

    for out in outs.iter().take(4) {
        fs::remove_file(out).unwrap();
    }

    let removed = store.delete_unused().unwrap();
    assert_eq!(removed, 4);
    let stats = store.stats().unwrap();
    assert_eq!(stats.total_files, 6);
}
