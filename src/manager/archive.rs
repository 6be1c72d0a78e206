//! Store export and import as tar archives
//!
//! An archive holds `store/.meta/store.json` followed by every artifact at
//! its repository-layout path under `store/`. Import re-creates the store
//! through the normal write path, so coordinates are validated again and a
//! fresh name is allocated.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{info, warn};

use super::{ArtifactStoreManager, ManagerError, ManagerResult, StoreAccess};
use crate::store::{ArtifactStore, ArtifactStoreTemplate, StoreMetadata, META_DIR, METADATA_FILE};

/// Top-level directory inside an export archive.
pub const ARCHIVE_ROOT: &str = "store";

/// What an export wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub store: String,
    pub artifacts: usize,
    pub bytes: u64,
}

impl ArtifactStoreManager {
    /// Write a store to `archive` while holding a shared lock on it.
    pub fn export(&self, name: &str, archive: &Path) -> ManagerResult<ExportSummary> {
        let store = self.select(name, StoreAccess::Read)?;
        let root = Path::new(ARCHIVE_ROOT);

        let mut builder = tar::Builder::new(File::create(archive)?);
        builder.append_path_with_name(
            store.root().join(META_DIR).join(METADATA_FILE),
            root.join(META_DIR).join(METADATA_FILE),
        )?;
        for artifact in store.artifacts() {
            builder.append_path_with_name(
                store.artifact_path(artifact),
                root.join(artifact.relative_path()),
            )?;
        }
        builder.into_inner()?.sync_all()?;

        let summary = ExportSummary {
            store: store.name().to_string(),
            artifacts: store.artifacts().len(),
            bytes: store.total_size()?,
        };
        info!(store = %summary.store, archive = %archive.display(), artifacts = summary.artifacts, "exported store");
        Ok(summary)
    }

    /// Unpack an archive into a newly created, exclusively locked store.
    ///
    /// Mode, redeploy flag and exempt extensions come from the archived
    /// metadata; the name prefix comes from the matching local template when
    /// one exists.
    pub fn import(&self, archive: &Path) -> ManagerResult<ArtifactStore> {
        let staging = self.base_dir.join(format!(
            ".import-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0)
        ));
        fs::create_dir_all(&staging)?;

        let result = self.import_from(archive, &staging);
        let _ = fs::remove_dir_all(&staging);
        result
    }

    fn import_from(&self, archive: &Path, staging: &Path) -> ManagerResult<ArtifactStore> {
        tar::Archive::new(File::open(archive)?).unpack(staging)?;

        let unpacked: PathBuf = staging.join(ARCHIVE_ROOT);
        let metadata = StoreMetadata::load(&unpacked)
            .map_err(|e| ManagerError::InvalidArchive(e.to_string()))?;

        let prefix = self
            .template(&metadata.template)
            .map(|t| t.prefix.clone())
            .unwrap_or_else(|_| metadata.template.clone());
        let template = ArtifactStoreTemplate {
            name: metadata.template.clone(),
            prefix,
            repository_mode: metadata.repository_mode,
            allow_redeploy: metadata.allow_redeploy,
            omit_checksums_for_extensions: metadata.omit_checksums_for_extensions.clone(),
        };

        let mut store = self.create(&template)?;
        if let Err(e) = fill_from(&mut store, &unpacked, &metadata) {
            warn!(store = %store.name(), error = %e, "import failed, dropping partial store");
            if let Err(cleanup) = self.discard(store) {
                warn!(error = %cleanup, "could not drop partial store");
            }
            return Err(e);
        }

        info!(
            store = %store.name(),
            from = %metadata.name,
            artifacts = store.artifacts().len(),
            "imported store"
        );
        Ok(store)
    }
}

/// Copy every listed artifact from an unpacked archive into `store`.
fn fill_from(store: &mut ArtifactStore, unpacked: &Path, metadata: &StoreMetadata) -> ManagerResult<()> {
    for artifact in &metadata.artifacts {
        let source = unpacked.join(artifact.relative_path());
        if !source.is_file() {
            return Err(ManagerError::InvalidArchive(format!(
                "artifact {} listed but missing",
                artifact
            )));
        }
        store.put_file(artifact.clone(), &source)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Artifact, RepositoryMode};
    use staging_lock::DirectoryLocker;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_export_then_import_into_new_store() {
        let dir = TempDir::new().unwrap();
        let manager =
            ArtifactStoreManager::new(dir.path().join("stores"), Arc::new(DirectoryLocker::new())).unwrap();

        let mut store = manager.create(&ArtifactStoreTemplate::release_redeploy()).unwrap();
        let jar = Artifact::new("org.example", "lib", "1.0", "jar");
        let pom = jar.sibling("", "pom");
        store.put_bytes(jar.clone(), b"jar").unwrap();
        store.put_bytes(pom.clone(), b"<project/>").unwrap();
        let name = store.name().to_string();
        store.close().unwrap();

        let archive = dir.path().join("export.tar");
        let summary = manager.export(&name, &archive).unwrap();
        assert_eq!(summary.artifacts, 2);
        assert_eq!(summary.bytes, 13);

        let imported = manager.import(&archive).unwrap();
        assert_eq!(imported.name(), "release-redeploy-00002");
        assert_eq!(imported.repository_mode(), RepositoryMode::Release);
        assert!(imported.allow_redeploy());
        assert_eq!(imported.artifacts(), &[jar.clone(), pom]);
        assert_eq!(imported.read_all(&jar).unwrap().unwrap(), b"jar");

        let leftovers: Vec<_> = fs::read_dir(manager.base_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".import-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_import_rejects_archive_without_metadata() {
        let dir = TempDir::new().unwrap();
        let manager =
            ArtifactStoreManager::new(dir.path().join("stores"), Arc::new(DirectoryLocker::new())).unwrap();

        let archive = dir.path().join("bogus.tar");
        let payload = dir.path().join("readme.txt");
        fs::write(&payload, "hello").unwrap();
        let mut builder = tar::Builder::new(File::create(&archive).unwrap());
        builder.append_path_with_name(&payload, "store/readme.txt").unwrap();
        builder.into_inner().unwrap();

        assert!(matches!(
            manager.import(&archive).unwrap_err(),
            ManagerError::InvalidArchive(_)
        ));
        assert_eq!(manager.list().unwrap().count(), 0);
    }

    #[test]
    fn test_import_with_missing_artifact_leaves_no_store() {
        let dir = TempDir::new().unwrap();
        let manager =
            ArtifactStoreManager::new(dir.path().join("stores"), Arc::new(DirectoryLocker::new())).unwrap();

        let mut store = manager.create(&ArtifactStoreTemplate::release()).unwrap();
        store
            .put_bytes(Artifact::new("org.example", "lib", "1.0", "jar"), b"jar")
            .unwrap();
        let metadata = store.root().join(META_DIR).join(METADATA_FILE);
        let archive = dir.path().join("partial.tar");
        let mut builder = tar::Builder::new(File::create(&archive).unwrap());
        builder
            .append_path_with_name(&metadata, format!("{}/{}/{}", ARCHIVE_ROOT, META_DIR, METADATA_FILE))
            .unwrap();
        builder.into_inner().unwrap();
        let name = store.name().to_string();
        manager.discard(store).unwrap();

        let err = manager.import(&archive).unwrap_err();

        assert!(matches!(err, ManagerError::InvalidArchive(ref m) if m.contains("listed but missing")));
        assert!(manager.list_sorted().unwrap().is_empty(), "partial store left behind");
        assert!(!manager.base_dir().join(&name).exists());
    }
}
