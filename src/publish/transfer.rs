//! Artifact transfer to a resolved target
//!
//! The wire protocol of a remote repository lives behind [`ArtifactTransfer`].
//! [`FileTransfer`] handles `file:` URLs by copying the store into the target
//! directory in repository layout.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::PublishSession;
use crate::config::Credentials;
use crate::redirect::RemoteRepository;
use crate::store::{ArtifactStore, RepositoryMode, StoreError};

/// Fully resolved destination of a publish.
#[derive(Debug, Clone)]
pub struct PublishTarget {
    /// Repository with its URL already redirected
    pub repository: RemoteRepository,
    /// Repository whose credentials apply
    pub auth_source: RemoteRepository,
    pub credentials: Option<Credentials>,
    pub mode: RepositoryMode,
}

/// What a transfer moved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub files: usize,
    pub bytes: u64,
}

/// Transfer errors
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("unsupported repository url: {0}")]
    UnsupportedUrl(String),

    #[error("{0} already exists in the target and redeploy is not allowed")]
    WouldOverwrite(PathBuf),

    #[error("target rejected upload: {0}")]
    Rejected(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Uploads validated store content to a target repository.
pub trait ArtifactTransfer: Send + Sync {
    fn name(&self) -> &str;

    /// Upload every artifact in `store`. Retries, if any, belong here.
    fn deploy(
        &self,
        store: &ArtifactStore,
        target: &PublishTarget,
        session: &PublishSession<'_>,
    ) -> Result<TransferSummary, TransferError>;
}

/// `file:///abs/path` (or `file:/abs/path`) to a path.
pub fn path_from_file_url(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("file:")?;
    let path = rest.strip_prefix("//").unwrap_or(rest);
    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// `file://` URL of a directory, made absolute against the working directory.
pub fn file_url(path: &Path) -> io::Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(format!("file://{}", absolute.display()))
}

/// Copies artifacts into a local directory repository.
///
/// Existing files in a release target are never replaced unless the store
/// allows redeploy. Each file lands through a `.part` file and a rename.
#[derive(Debug, Clone, Default)]
pub struct FileTransfer;

impl FileTransfer {
    fn copy_one(source: &Path, destination: &Path) -> io::Result<u64> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut partial = destination.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        let bytes = io::copy(&mut File::open(source)?, &mut File::create(&partial)?)?;
        fs::rename(&partial, destination)?;
        Ok(bytes)
    }
}

impl ArtifactTransfer for FileTransfer {
    fn name(&self) -> &str {
        "file"
    }

    fn deploy(
        &self,
        store: &ArtifactStore,
        target: &PublishTarget,
        _session: &PublishSession<'_>,
    ) -> Result<TransferSummary, TransferError> {
        let root = path_from_file_url(&target.repository.url)
            .ok_or_else(|| TransferError::UnsupportedUrl(target.repository.url.clone()))?;
        let replace = store.allow_redeploy() || target.mode == RepositoryMode::Snapshot;

        // Check every destination before the first copy.
        if !replace {
            if let Some(existing) = store
                .artifacts()
                .iter()
                .map(|a| root.join(a.relative_path()))
                .find(|p| p.exists())
            {
                return Err(TransferError::WouldOverwrite(existing));
            }
        }

        let mut summary = TransferSummary::default();
        for artifact in store.artifacts() {
            let destination = root.join(artifact.relative_path());
            summary.bytes += Self::copy_one(&store.artifact_path(artifact), &destination)?;
            summary.files += 1;
            debug!(artifact = %artifact, destination = %destination.display(), "copied");
        }
        info!(
            store = store.name(),
            target = %target.repository,
            files = summary.files,
            bytes = summary.bytes,
            "transfer complete"
        );
        Ok(summary)
    }
}
