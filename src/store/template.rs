//! Store templates and repository modes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Extensions exempt from checksum and signature checks by default.
pub const DEFAULT_OMIT_EXTENSIONS: &[&str] = &[".asc", ".sig", ".md5", ".sha1", ".sha256", ".sha512"];

/// Whether a store holds release or snapshot artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryMode {
    Release,
    Snapshot,
}

impl fmt::Display for RepositoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryMode::Release => write!(f, "release"),
            RepositoryMode::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Fixed attributes used to seed a new store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactStoreTemplate {
    pub name: String,
    pub prefix: String,
    pub repository_mode: RepositoryMode,
    pub allow_redeploy: bool,
    pub omit_checksums_for_extensions: Vec<String>,
}

impl ArtifactStoreTemplate {
    /// Template with `prefix` defaulting to `name` and the default exempt
    /// extensions.
    pub fn new(
        name: impl Into<String>,
        prefix: Option<String>,
        repository_mode: RepositoryMode,
        allow_redeploy: bool,
    ) -> Self {
        let name = name.into();
        Self {
            prefix: prefix.unwrap_or_else(|| name.clone()),
            name,
            repository_mode,
            allow_redeploy,
            omit_checksums_for_extensions: DEFAULT_OMIT_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Release store, no redeploy.
    pub fn release() -> Self {
        Self::new("release", None, RepositoryMode::Release, false)
    }

    /// Release store that accepts redeploying a coordinate.
    pub fn release_redeploy() -> Self {
        Self::new("release-redeploy", None, RepositoryMode::Release, true)
    }

    /// Snapshot store. Snapshots are overwritable upstream, so no redeploy
    /// flag is needed.
    pub fn snapshot() -> Self {
        Self::new("snapshot", None, RepositoryMode::Snapshot, false)
    }

    /// The three built-in templates.
    pub fn builtins() -> Vec<Self> {
        vec![Self::release(), Self::release_redeploy(), Self::snapshot()]
    }
}
