//! Store management under a base directory
//!
//! The manager allocates store names, opens stores under the right directory
//! lock, lists, drops, exports and imports them. Every store it hands out
//! carries its lock; the lock is released when the store is closed or
//! dropped.

mod archive;

pub use archive::{ExportSummary, ARCHIVE_ROOT};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use staging_lock::{DirectoryLocker, LockError, LockMode};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::{
    next_store_name, validate_name, ArtifactStore, ArtifactStoreTemplate, StoreError, StoreMetadata,
    StoreState, META_DIR, METADATA_FILE,
};

/// Attempts at claiming a fresh store directory before giving up.
const MAX_NAME_ATTEMPTS: usize = 32;

/// Errors from manager operations
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("store not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    #[error("could not allocate a store name for prefix {0}")]
    NameExhausted(String),

    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for manager operations
pub type ManagerResult<T> = Result<T, ManagerError>;

/// How a caller intends to use a selected store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAccess {
    /// Inspect only; shared lock.
    Read,
    /// Mutate or publish; exclusive lock.
    Write,
}

impl StoreAccess {
    fn lock_mode(self) -> LockMode {
        match self {
            StoreAccess::Read => LockMode::Shared,
            StoreAccess::Write => LockMode::Exclusive,
        }
    }
}

/// Outcome of [`ArtifactStoreManager::drop_all`].
#[derive(Debug, Clone, Default)]
pub struct DropAllResult {
    pub dropped: Vec<String>,
    /// Stores left in place, with the reason.
    pub skipped: Vec<(String, String)>,
}

/// Creates, opens, lists and destroys stores under one base directory.
#[derive(Debug)]
pub struct ArtifactStoreManager {
    base_dir: PathBuf,
    locker: Arc<DirectoryLocker>,
    templates: Vec<ArtifactStoreTemplate>,
}

impl ArtifactStoreManager {
    /// Manager over `base_dir` with the built-in templates.
    ///
    /// Creates the base directory if needed.
    pub fn new(base_dir: impl AsRef<Path>, locker: Arc<DirectoryLocker>) -> ManagerResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            locker,
            templates: ArtifactStoreTemplate::builtins(),
        })
    }

    /// Add a template, replacing any built-in with the same name.
    pub fn with_template(mut self, template: ArtifactStoreTemplate) -> Self {
        self.templates.retain(|t| t.name != template.name);
        self.templates.push(template);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn locker(&self) -> &Arc<DirectoryLocker> {
        &self.locker
    }

    pub fn templates(&self) -> &[ArtifactStoreTemplate] {
        &self.templates
    }

    pub fn template(&self, name: &str) -> ManagerResult<&ArtifactStoreTemplate> {
        self.templates
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ManagerError::UnknownTemplate(name.to_string()))
    }

    /// Create a new, exclusively locked store from a template.
    ///
    /// The name is `<prefix>-NNNNN`, one past the highest sibling with the
    /// same prefix. Directory creation is the claim: if another process
    /// takes the name first, allocation moves on to the next number.
    pub fn create(&self, template: &ArtifactStoreTemplate) -> ManagerResult<ArtifactStore> {
        let (name, root) = self.claim_directory(&template.prefix)?;
        let store = self.initialize(root, &name, template)?;
        info!(store = %name, template = %template.name, "created store");
        Ok(store)
    }

    /// Lock a freshly claimed directory and write its metadata. The
    /// directory is removed again if either step fails.
    fn initialize(&self, root: PathBuf, name: &str, template: &ArtifactStoreTemplate) -> ManagerResult<ArtifactStore> {
        let result = self
            .locker
            .acquire(&root, LockMode::Exclusive)
            .map_err(ManagerError::from)
            .and_then(|lock| ArtifactStore::create(root.clone(), name, template, lock).map_err(ManagerError::from));
        if let Err(e) = &result {
            warn!(store = name, error = %e, "store initialization failed, removing directory");
            if let Err(cleanup) = fs::remove_dir_all(&root) {
                warn!(store = name, error = %cleanup, "could not remove abandoned store directory");
            }
        }
        result
    }

    /// Open an existing store by exact name.
    pub fn select(&self, name: &str, access: StoreAccess) -> ManagerResult<ArtifactStore> {
        let root = self.existing_root(name)?;
        let lock = self.locker.acquire(&root, access.lock_mode())?;
        let store = ArtifactStore::open(root, lock)?;
        debug!(store = name, ?access, "selected store");
        Ok(store)
    }

    /// Lazily enumerate store names. Each call re-scans the base directory.
    pub fn list(&self) -> ManagerResult<StoreNames> {
        Ok(StoreNames {
            entries: fs::read_dir(&self.base_dir)?,
        })
    }

    /// Store names, sorted.
    pub fn list_sorted(&self) -> ManagerResult<Vec<String>> {
        let mut names: Vec<String> = self.list()?.collect();
        names.sort();
        Ok(names)
    }

    /// Delete a store.
    ///
    /// Fails with [`ManagerError::NotFound`] if absent and with
    /// [`ManagerError::Lock`] if the store is in use elsewhere.
    pub fn drop_store(&self, name: &str) -> ManagerResult<()> {
        let store = self.select(name, StoreAccess::Write)?;
        self.discard(store)
    }

    /// Delete a store this caller already holds exclusively.
    pub fn discard(&self, mut store: ArtifactStore) -> ManagerResult<()> {
        if !store.is_writable() {
            return Err(StoreError::ReadOnly(store.name().to_string()).into());
        }
        if !store.state().is_terminal() {
            store.mark(StoreState::Dropped)?;
        }
        let name = store.name().to_string();
        fs::remove_dir_all(store.root())?;
        store.close()?;
        info!(store = %name, "dropped store");
        Ok(())
    }

    /// Drop every store that can be locked; stores in use are skipped.
    pub fn drop_all(&self) -> ManagerResult<DropAllResult> {
        let mut result = DropAllResult::default();
        for name in self.list_sorted()? {
            match self.drop_store(&name) {
                Ok(()) => result.dropped.push(name),
                Err(e @ (ManagerError::Lock(_) | ManagerError::NotFound(_))) => {
                    warn!(store = %name, error = %e, "store skipped");
                    result.skipped.push((name, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(result)
    }

    /// Root directory of an existing store, after validating the name.
    fn existing_root(&self, name: &str) -> ManagerResult<PathBuf> {
        validate_name(name)?;
        let root = self.base_dir.join(name);
        if !root.join(META_DIR).join(METADATA_FILE).is_file() {
            return Err(ManagerError::NotFound(name.to_string()));
        }
        Ok(root)
    }

    /// Allocate and create a fresh store directory for `prefix`.
    fn claim_directory(&self, prefix: &str) -> ManagerResult<(String, PathBuf)> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let siblings = self.directory_names()?;
            let name = next_store_name(prefix, siblings.iter().map(String::as_str))
                .ok_or_else(|| ManagerError::NameExhausted(prefix.to_string()))?;
            validate_name(&name)?;

            let root = self.base_dir.join(&name);
            match fs::create_dir(&root) {
                Ok(()) => return Ok((name, root)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(store = %name, "name taken concurrently, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ManagerError::NameExhausted(prefix.to_string()))
    }

    /// Every directory name under the base, including stores still being
    /// initialized.
    fn directory_names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Read a store's metadata without locking it.
    pub fn peek(&self, name: &str) -> ManagerResult<StoreMetadata> {
        let root = self.existing_root(name)?;
        Ok(StoreMetadata::load(&root)?)
    }
}

/// Lazy iterator over store names in a base directory.
#[derive(Debug)]
pub struct StoreNames {
    entries: fs::ReadDir,
}

impl Iterator for StoreNames {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        for entry in self.entries.by_ref() {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if !path.join(META_DIR).join(METADATA_FILE).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_name(name).is_ok() {
                    return Some(name.to_string());
                }
            }
        }
        None
    }
}
