//! Version policy per repository mode

use std::io;

use super::{checked_artifacts, BulkValidator, ValidationResultCollector};
use crate::store::{ArtifactStore, RepositoryMode, SNAPSHOT_SUFFIX};

/// Release stores must not hold `-SNAPSHOT` versions; snapshot stores must
/// hold nothing else.
#[derive(Debug, Clone)]
pub struct VersionPolicyValidator {
    mode: RepositoryMode,
    name: String,
}

impl VersionPolicyValidator {
    pub fn new(mode: RepositoryMode) -> Self {
        Self {
            mode,
            name: format!("{}-versions", mode),
        }
    }
}

impl BulkValidator for VersionPolicyValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        match self.mode {
            RepositoryMode::Release => "release versions carry no -SNAPSHOT suffix",
            RepositoryMode::Snapshot => "snapshot versions end in -SNAPSHOT",
        }
    }

    fn validate(&self, store: &ArtifactStore, collector: &mut ValidationResultCollector) -> io::Result<()> {
        for artifact in checked_artifacts(store) {
            let node = collector.child(&artifact.canonical_id());
            match (self.mode, artifact.is_snapshot()) {
                (RepositoryMode::Release, false) => node.add_info("OK release version"),
                (RepositoryMode::Release, true) => {
                    node.add_error(format!("{} version in release store", SNAPSHOT_SUFFIX))
                }
                (RepositoryMode::Snapshot, true) => node.add_info("OK snapshot version"),
                (RepositoryMode::Snapshot, false) => {
                    node.add_error(format!("version lacks {} in snapshot store", SNAPSHOT_SUFFIX))
                }
            };
        }
        Ok(())
    }
}
