//! Concurrent acquisition tests for the directory locker

use std::sync::{Arc, Barrier};
use std::thread;

use staging_lock::{DirectoryLocker, LockMode};
use tempfile::TempDir;

#[test]
fn test_only_one_exclusive_grant_under_contention() {
    let dir = TempDir::new().unwrap();
    let locker = Arc::new(DirectoryLocker::new());
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let locker = Arc::clone(&locker);
            let barrier = Arc::clone(&barrier);
            let path = dir.path().to_path_buf();
            thread::spawn(move || {
                barrier.wait();
                locker.lock_directory(&path, true).is_ok()
            })
        })
        .collect();

    let granted = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .filter(|ok| *ok)
        .count();

    assert_eq!(granted, 1);
    assert_eq!(locker.held_mode(dir.path()), Some(LockMode::Exclusive));
}

#[test]
fn test_mixed_requests_never_grant_both_modes() {
    let dir = TempDir::new().unwrap();
    let locker = Arc::new(DirectoryLocker::new());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let locker = Arc::clone(&locker);
            let barrier = Arc::clone(&barrier);
            let path = dir.path().to_path_buf();
            thread::spawn(move || {
                let exclusive = i % 2 == 0;
                barrier.wait();
                (exclusive, locker.lock_directory(&path, exclusive).is_ok())
            })
        })
        .collect();

    let results: Vec<(bool, bool)> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();

    let exclusive_grants = results.iter().filter(|(ex, ok)| *ex && *ok).count();
    let shared_grants = results.iter().filter(|(ex, ok)| !*ex && *ok).count();

    if exclusive_grants > 0 {
        assert_eq!(exclusive_grants, 1);
        assert_eq!(shared_grants, 0);
    } else {
        assert!(shared_grants >= 1);
        assert_eq!(locker.hold_count(dir.path()), shared_grants);
    }
}

#[test]
fn test_guards_from_many_threads_release_cleanly() {
    let dir = TempDir::new().unwrap();
    let locker = Arc::new(DirectoryLocker::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let locker = Arc::clone(&locker);
            let path = dir.path().to_path_buf();
            thread::spawn(move || {
                for _ in 0..50 {
                    if let Ok(guard) = locker.acquire(&path, LockMode::Shared) {
                        drop(guard);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    assert_eq!(locker.hold_count(dir.path()), 0);
    locker.lock_directory(dir.path(), true).unwrap();
}
