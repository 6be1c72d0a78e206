//! Shared/exclusive directory locking for staging stores
//!
//! A directory is locked through a marker file (`.lock`) that lives inside
//! it. Two layers enforce exclusion:
//! - within this process, a table of held locks keyed by directory path
//!   decides compatibility and counts re-entrant shared holds
//! - across processes, `flock(2)` on the marker file (`LOCK_SH`/`LOCK_EX`
//!   with `LOCK_NB`) rejects incompatible holders
//!
//! Acquisition never waits. A conflicting request fails immediately and the
//! caller decides whether to retry.

use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

/// Lock result type
pub type LockResult<T> = Result<T, LockError>;

/// Name of the marker file placed in every locked directory.
pub const LOCK_FILENAME: &str = ".lock";

/// Lock mode requested for a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Any number of shared holders may coexist.
    Shared,
    /// Excludes every other holder, shared or exclusive.
    Exclusive,
}

impl LockMode {
    /// Mode for an `exclusive` flag.
    pub fn from_exclusive(exclusive: bool) -> Self {
        if exclusive {
            LockMode::Exclusive
        } else {
            LockMode::Shared
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => write!(f, "shared"),
            LockMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Who currently holds a conflicting lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockHolder {
    /// This process holds the lock in the given mode.
    ThisProcess(LockMode),
    /// Another process holds the marker file.
    OtherProcess,
}

impl fmt::Display for LockHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockHolder::ThisProcess(mode) => write!(f, "{} lock held by this process", mode),
            LockHolder::OtherProcess => write!(f, "lock held by another process"),
        }
    }
}

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("cannot acquire {requested} lock on {path}: {holder}")]
    Conflict {
        path: PathBuf,
        requested: LockMode,
        holder: LockHolder,
    },

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LockError {
    /// Whether this error is a mode conflict (as opposed to an I/O failure).
    pub fn is_conflict(&self) -> bool {
        matches!(self, LockError::Conflict { .. })
    }
}

/// A lock this process holds on one directory.
#[derive(Debug)]
struct HeldLock {
    mode: LockMode,
    count: usize,
    marker: File,
}

/// Per-process registry of directory locks.
///
/// Share one locker (behind an `Arc`) between every component that locks
/// store directories; two lockers in one process would not see each other's
/// shared holds and would fall back to `flock` semantics only.
#[derive(Debug, Default)]
pub struct DirectoryLocker {
    held: Mutex<HashMap<PathBuf, HeldLock>>,
}

impl DirectoryLocker {
    /// Create an empty locker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `dir` in shared or exclusive mode.
    ///
    /// Shared requests on a directory this process already holds shared
    /// increment the hold count. Every other combination with an existing
    /// hold fails with [`LockError::Conflict`]. The compatibility check and
    /// the grant happen under one table lock, so two conflicting requests
    /// can never both succeed.
    pub fn lock_directory(&self, dir: &Path, exclusive: bool) -> LockResult<()> {
        let requested = LockMode::from_exclusive(exclusive);
        if !dir.is_dir() {
            return Err(LockError::NotADirectory(dir.to_path_buf()));
        }
        let key = lock_key(dir)?;
        let mut held = self.table();

        if let Some(existing) = held.get_mut(&key) {
            if existing.mode == LockMode::Shared && requested == LockMode::Shared {
                existing.count += 1;
                debug!(path = %key.display(), count = existing.count, "shared lock re-entered");
                return Ok(());
            }
            warn!(path = %key.display(), %requested, held = %existing.mode, "lock conflict");
            return Err(LockError::Conflict {
                path: key,
                requested,
                holder: LockHolder::ThisProcess(existing.mode),
            });
        }

        let marker = match try_lock_marker(&key.join(LOCK_FILENAME), requested) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                warn!(path = %key.display(), %requested, "lock held by another process");
                return Err(LockError::Conflict {
                    path: key,
                    requested,
                    holder: LockHolder::OtherProcess,
                });
            }
            Err(e) => return Err(LockError::Io(e)),
        };

        debug!(path = %key.display(), mode = %requested, "lock acquired");
        held.insert(
            key,
            HeldLock {
                mode: requested,
                count: 1,
                marker,
            },
        );
        Ok(())
    }

    /// Release one hold on `dir`.
    ///
    /// Releasing a directory this process does not hold is a no-op.
    pub fn unlock_directory(&self, dir: &Path) -> LockResult<()> {
        let key = lock_key(dir)?;
        let mut held = self.table();

        let remaining = match held.get_mut(&key) {
            Some(existing) => {
                existing.count -= 1;
                existing.count
            }
            None => return Ok(()),
        };

        if remaining == 0 {
            if let Some(released) = held.remove(&key) {
                release_marker(&released.marker);
                debug!(path = %key.display(), mode = %released.mode, "lock released");
            }
        }
        Ok(())
    }

    /// Mode this process currently holds on `dir`, if any.
    pub fn held_mode(&self, dir: &Path) -> Option<LockMode> {
        let key = lock_key(dir).ok()?;
        self.table().get(&key).map(|h| h.mode)
    }

    /// Number of holds this process has on `dir`.
    pub fn hold_count(&self, dir: &Path) -> usize {
        lock_key(dir)
            .ok()
            .and_then(|key| self.table().get(&key).map(|h| h.count))
            .unwrap_or(0)
    }

    /// Acquire a lock released automatically when the guard drops.
    pub fn acquire(self: &Arc<Self>, dir: &Path, mode: LockMode) -> LockResult<DirectoryLock> {
        self.lock_directory(dir, mode == LockMode::Exclusive)?;
        Ok(DirectoryLock {
            locker: Arc::clone(self),
            path: dir.to_path_buf(),
            mode,
            released: false,
        })
    }

    fn table(&self) -> MutexGuard<'_, HashMap<PathBuf, HeldLock>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// RAII hold on a directory lock.
#[derive(Debug)]
pub struct DirectoryLock {
    locker: Arc<DirectoryLocker>,
    path: PathBuf,
    mode: LockMode,
    released: bool,
}

impl DirectoryLock {
    /// The locked directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode of this hold.
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Release the hold now, reporting any failure.
    pub fn release(mut self) -> LockResult<()> {
        self.released = true;
        self.locker.unlock_directory(&self.path)
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.locker.unlock_directory(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to release lock");
            }
        }
    }
}

/// Key for the lock table: the directory as an absolute path.
///
/// Not canonicalized, so a directory deleted while locked can still be
/// unlocked under the same key.
fn lock_key(dir: &Path) -> io::Result<PathBuf> {
    if dir.is_absolute() {
        Ok(dir.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}

/// Open the marker file and take a non-blocking `flock` on it.
#[cfg(unix)]
fn try_lock_marker(lock_path: &Path, mode: LockMode) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::AsRawFd;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o644)
        .open(lock_path)?;

    let operation = match mode {
        LockMode::Shared => libc::LOCK_SH,
        LockMode::Exclusive => libc::LOCK_EX,
    };

    // SAFETY: the descriptor belongs to `file`, which is alive for the call.
    let result = unsafe { libc::flock(file.as_raw_fd(), operation | libc::LOCK_NB) };

    if result == 0 {
        Ok(file)
    } else {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
        } else {
            Err(err)
        }
    }
}

/// Without `flock`, only the in-process table enforces exclusion.
#[cfg(not(unix))]
fn try_lock_marker(lock_path: &Path, _mode: LockMode) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
}

#[cfg(unix)]
fn release_marker(file: &File) {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor belongs to `file`, which outlives the call.
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
fn release_marker(_file: &File) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shared_shared_allowed() {
        let dir = TempDir::new().unwrap();
        let locker = DirectoryLocker::new();

        locker.lock_directory(dir.path(), false).unwrap();
        locker.lock_directory(dir.path(), false).unwrap();

        assert_eq!(locker.held_mode(dir.path()), Some(LockMode::Shared));
        assert_eq!(locker.hold_count(dir.path()), 2);
        assert!(dir.path().join(LOCK_FILENAME).exists());
    }

    #[test]
    fn test_exclusive_conflicts() {
        for (first, second) in [(false, true), (true, false), (true, true)] {
            let dir = TempDir::new().unwrap();
            let locker = DirectoryLocker::new();

            locker.lock_directory(dir.path(), first).unwrap();
            let err = locker.lock_directory(dir.path(), second).unwrap_err();
            assert!(err.is_conflict(), "{first} then {second}: {err}");
        }
    }

    #[test]
    fn test_unlock_more_than_locked_is_noop() {
        let dir = TempDir::new().unwrap();
        let locker = DirectoryLocker::new();

        locker.unlock_directory(dir.path()).unwrap();
        locker.lock_directory(dir.path(), true).unwrap();
        locker.unlock_directory(dir.path()).unwrap();
        locker.unlock_directory(dir.path()).unwrap();

        assert_eq!(locker.held_mode(dir.path()), None);
        locker.lock_directory(dir.path(), true).unwrap();
    }

    #[test]
    fn test_shared_released_after_all_holds() {
        let dir = TempDir::new().unwrap();
        let locker = DirectoryLocker::new();

        locker.lock_directory(dir.path(), false).unwrap();
        locker.lock_directory(dir.path(), false).unwrap();
        locker.unlock_directory(dir.path()).unwrap();
        assert!(locker.lock_directory(dir.path(), true).is_err());

        locker.unlock_directory(dir.path()).unwrap();
        locker.lock_directory(dir.path(), true).unwrap();
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let dir = TempDir::new().unwrap();
        let locker = Arc::new(DirectoryLocker::new());

        {
            let guard = locker.acquire(dir.path(), LockMode::Exclusive).unwrap();
            assert_eq!(guard.mode(), LockMode::Exclusive);
            assert!(locker.lock_directory(dir.path(), false).is_err());
        }

        let _again = locker.acquire(dir.path(), LockMode::Exclusive).unwrap();
    }

    #[test]
    fn test_missing_directory_rejected() {
        let dir = TempDir::new().unwrap();
        let locker = DirectoryLocker::new();

        let err = locker
            .lock_directory(&dir.path().join("absent"), true)
            .unwrap_err();
        assert!(matches!(err, LockError::NotADirectory(_)));
    }

    #[test]
    #[cfg(unix)]
    fn test_separate_lockers_conflict_through_flock() {
        let dir = TempDir::new().unwrap();
        let first = DirectoryLocker::new();
        let second = DirectoryLocker::new();

        first.lock_directory(dir.path(), true).unwrap();
        let err = second.lock_directory(dir.path(), false).unwrap_err();
        assert!(matches!(
            err,
            LockError::Conflict {
                holder: LockHolder::OtherProcess,
                ..
            }
        ));

        first.unlock_directory(dir.path()).unwrap();
        second.lock_directory(dir.path(), false).unwrap();
    }
}
