//! Staging store model
//!
//! A store is one directory under the manager's base directory:
//!
//! ```text
//! <base>/<name>/.lock                 lock marker
//! <base>/<name>/.meta/store.json      metadata and artifact index
//! <base>/<name>/<group path>/<artifact>/<version>/<file>
//! ```
//!
//! Metadata and artifact writes go through a temp file and a rename so a
//! crashed writer never leaves a half-written entry behind.

mod artifact;
mod name;
mod template;

pub use artifact::{Artifact, SNAPSHOT_SUFFIX};
pub use name::{next_store_name, validate_name};
pub use template::{ArtifactStoreTemplate, RepositoryMode, DEFAULT_OMIT_EXTENSIONS};

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use staging_lock::{DirectoryLock, LockMode};
use thiserror::Error;
use tracing::debug;

/// Schema version for store.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "staging-store/store@1";

/// Directory holding store metadata.
pub const META_DIR: &str = ".meta";

/// Metadata file name inside [`META_DIR`].
pub const METADATA_FILE: &str = "store.json";

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("invalid artifact coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("store {0} is open read-only")]
    ReadOnly(String),

    #[error("store {name} is {state} and can no longer change")]
    Terminal { name: String, state: StoreState },

    #[error("artifact {artifact} already exists in store {store} and redeploy is not allowed")]
    AlreadyExists { store: String, artifact: String },

    #[error("store metadata missing at {0}")]
    MissingMetadata(PathBuf),

    #[error("unsupported store schema: {0}")]
    UnsupportedSchema(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Lifecycle state of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreState {
    /// Accepting artifacts.
    Open,
    /// Content handed off to a remote repository.
    Published,
    /// Explicitly discarded.
    Dropped,
}

impl StoreState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StoreState::Published | StoreState::Dropped)
    }
}

impl std::fmt::Display for StoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreState::Open => write!(f, "open"),
            StoreState::Published => write!(f, "published"),
            StoreState::Dropped => write!(f, "dropped"),
        }
    }
}

/// Persisted store metadata (`.meta/store.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub schema_version: u32,
    pub schema_id: String,
    pub name: String,
    pub template: String,
    pub repository_mode: RepositoryMode,
    pub allow_redeploy: bool,
    pub omit_checksums_for_extensions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub state: StoreState,
    /// Artifacts in insertion order.
    pub artifacts: Vec<Artifact>,
}

impl StoreMetadata {
    fn new(name: &str, template: &ArtifactStoreTemplate) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            name: name.to_string(),
            template: template.name.clone(),
            repository_mode: template.repository_mode,
            allow_redeploy: template.allow_redeploy,
            omit_checksums_for_extensions: template.omit_checksums_for_extensions.clone(),
            created_at: Utc::now(),
            state: StoreState::Open,
            artifacts: Vec::new(),
        }
    }

    /// Load metadata from a store directory.
    pub fn load(root: &Path) -> StoreResult<Self> {
        let path = root.join(META_DIR).join(METADATA_FILE);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::MissingMetadata(path))
            }
            Err(e) => return Err(e.into()),
        };
        let metadata: Self = serde_json::from_str(&json)?;
        if metadata.schema_id != SCHEMA_ID || metadata.schema_version != SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema(format!(
                "{} v{}",
                metadata.schema_id, metadata.schema_version
            )));
        }
        Ok(metadata)
    }

    fn save(&self, root: &Path) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(root, &root.join(META_DIR).join(METADATA_FILE), &mut json.as_bytes())?;
        Ok(())
    }
}

/// An open staging store.
///
/// Holds the directory lock it was opened under until dropped or closed.
/// Stores opened with a shared lock are read-only.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    metadata: StoreMetadata,
    lock: Option<DirectoryLock>,
}

impl ArtifactStore {
    /// Initialize a new store in an existing, empty, locked directory.
    pub(crate) fn create(
        root: PathBuf,
        name: &str,
        template: &ArtifactStoreTemplate,
        lock: DirectoryLock,
    ) -> StoreResult<Self> {
        fs::create_dir_all(root.join(META_DIR))?;
        let metadata = StoreMetadata::new(name, template);
        metadata.save(&root)?;
        debug!(store = name, template = %template.name, "store created");
        Ok(Self {
            root,
            metadata,
            lock: Some(lock),
        })
    }

    /// Open an existing store under the given lock.
    pub(crate) fn open(root: PathBuf, lock: DirectoryLock) -> StoreResult<Self> {
        let metadata = StoreMetadata::load(&root)?;
        Ok(Self {
            root,
            metadata,
            lock: Some(lock),
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn template_name(&self) -> &str {
        &self.metadata.template
    }

    pub fn repository_mode(&self) -> RepositoryMode {
        self.metadata.repository_mode
    }

    pub fn allow_redeploy(&self) -> bool {
        self.metadata.allow_redeploy
    }

    pub fn omit_checksums_for_extensions(&self) -> &[String] {
        &self.metadata.omit_checksums_for_extensions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.metadata.created_at
    }

    pub fn state(&self) -> StoreState {
        self.metadata.state
    }

    pub fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }

    /// Whether this handle holds an exclusive lock.
    pub fn is_writable(&self) -> bool {
        self.lock
            .as_ref()
            .is_some_and(|lock| lock.mode() == LockMode::Exclusive)
    }

    /// Artifacts in insertion order.
    pub fn artifacts(&self) -> &[Artifact] {
        &self.metadata.artifacts
    }

    pub fn contains(&self, artifact: &Artifact) -> bool {
        self.metadata.artifacts.contains(artifact)
    }

    /// Whether the artifact's extension is exempt from checksum and
    /// signature checks.
    pub fn is_omitted(&self, artifact: &Artifact) -> bool {
        let dotted = format!(".{}", artifact.extension);
        self.metadata
            .omit_checksums_for_extensions
            .iter()
            .any(|suffix| dotted.ends_with(suffix.as_str()))
    }

    /// Location of an artifact's content on disk.
    pub fn artifact_path(&self, artifact: &Artifact) -> PathBuf {
        self.root.join(artifact.relative_path())
    }

    /// Open an artifact's content for reading, if present.
    pub fn content(&self, artifact: &Artifact) -> StoreResult<Option<File>> {
        if !self.contains(artifact) {
            return Ok(None);
        }
        Ok(Some(File::open(self.artifact_path(artifact))?))
    }

    /// Read an artifact fully, if present.
    pub fn read_all(&self, artifact: &Artifact) -> StoreResult<Option<Vec<u8>>> {
        match self.content(artifact)? {
            Some(mut file) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                Ok(Some(buf))
            }
            None => Ok(None),
        }
    }

    /// Write an artifact from a reader. Returns the number of bytes stored.
    ///
    /// An existing coordinate is replaced only in snapshot stores or stores
    /// that allow redeploy.
    pub fn put<R: Read>(&mut self, artifact: Artifact, mut reader: R) -> StoreResult<u64> {
        self.ensure_mutable()?;
        artifact.validate()?;

        let exists = self.contains(&artifact);
        if exists
            && self.metadata.repository_mode == RepositoryMode::Release
            && !self.metadata.allow_redeploy
        {
            return Err(StoreError::AlreadyExists {
                store: self.metadata.name.clone(),
                artifact: artifact.canonical_id(),
            });
        }

        let target = self.artifact_path(&artifact);
        let written = write_atomic(&self.root, &target, &mut reader)?;

        if !exists {
            self.metadata.artifacts.push(artifact.clone());
        }
        self.metadata.save(&self.root)?;
        debug!(store = %self.metadata.name, artifact = %artifact, bytes = written, "artifact stored");
        Ok(written)
    }

    pub fn put_bytes(&mut self, artifact: Artifact, content: &[u8]) -> StoreResult<u64> {
        self.put(artifact, content)
    }

    pub fn put_file(&mut self, artifact: Artifact, path: &Path) -> StoreResult<u64> {
        let file = File::open(path)?;
        self.put(artifact, file)
    }

    /// Total bytes of artifact content.
    pub fn total_size(&self) -> StoreResult<u64> {
        let mut total = 0;
        for artifact in &self.metadata.artifacts {
            total += fs::metadata(self.artifact_path(artifact))?.len();
        }
        Ok(total)
    }

    /// Move the store into a terminal state and persist it.
    pub(crate) fn mark(&mut self, state: StoreState) -> StoreResult<()> {
        self.ensure_mutable()?;
        self.metadata.state = state;
        self.metadata.save(&self.root)?;
        debug!(store = %self.metadata.name, %state, "store state changed");
        Ok(())
    }

    /// Release the directory lock.
    pub fn close(mut self) -> Result<(), staging_lock::LockError> {
        match self.lock.take() {
            Some(lock) => lock.release(),
            None => Ok(()),
        }
    }

    fn ensure_mutable(&self) -> StoreResult<()> {
        if self.metadata.state.is_terminal() {
            return Err(StoreError::Terminal {
                name: self.metadata.name.clone(),
                state: self.metadata.state,
            });
        }
        if !self.is_writable() {
            return Err(StoreError::ReadOnly(self.metadata.name.clone()));
        }
        Ok(())
    }
}

/// Write `reader` to `target` through a temp file in the store's meta dir.
fn write_atomic<R: Read + ?Sized>(root: &Path, target: &Path, reader: &mut R) -> io::Result<u64> {
    let tmp_dir = root.join(META_DIR).join("tmp");
    fs::create_dir_all(&tmp_dir)?;
    let tmp_path = tmp_dir.join(format!(
        ".tmp.{}.{}",
        std::process::id(),
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ));

    let result = (|| -> io::Result<u64> {
        let mut file = File::create(&tmp_path)?;
        let written = io::copy(reader, &mut file)?;
        file.flush()?;
        file.sync_all()?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&tmp_path, target)?;
        Ok(written)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
