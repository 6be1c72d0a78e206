//! Companion-file validation (checksums, detached signatures)

use std::io;
use std::sync::Arc;

use super::{Check, CheckOutcome, CloseError, ValidationResultCollector, Validator};
use crate::store::{Artifact, ArtifactStore, StoreError};

/// Runs mandatory and optional checks against each artifact's companions.
///
/// For check `c` with extension `e`, the companion of `lib-1.0.jar` is
/// `lib-1.0.jar.e`. A missing mandatory companion is an error; a missing
/// optional one is informational. Each check adds exactly one message per
/// artifact.
pub struct CompanionValidator {
    name: String,
    description: String,
    mandatory: Vec<Arc<dyn Check>>,
    optional: Vec<Arc<dyn Check>>,
}

impl CompanionValidator {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        mandatory: Vec<Arc<dyn Check>>,
        optional: Vec<Arc<dyn Check>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            mandatory,
            optional,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mandatory.is_empty() && self.optional.is_empty()
    }

    fn checks(&self) -> impl Iterator<Item = (&Arc<dyn Check>, bool)> {
        self.mandatory
            .iter()
            .map(|c| (c, true))
            .chain(self.optional.iter().map(|c| (c, false)))
    }
}

impl std::fmt::Debug for CompanionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompanionValidator")
            .field("name", &self.name)
            .field("mandatory", &self.mandatory.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("optional", &self.optional.iter().map(|c| c.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Validator for CompanionValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn validate(
        &self,
        store: &ArtifactStore,
        artifact: &Artifact,
        collector: &mut ValidationResultCollector,
    ) -> io::Result<()> {
        if store.is_omitted(artifact) || self.is_empty() {
            return Ok(());
        }
        let node = collector.child(&self.name);

        // Read once, reused by every check that finds its companion.
        let mut content: Option<Vec<u8>> = None;

        for (check, mandatory) in self.checks() {
            let companion = artifact.companion(check.extension());
            let Some(companion_bytes) = read(store, &companion)? else {
                if mandatory {
                    node.add_error(format!("MISSING {}", check.name()));
                } else {
                    node.add_info(format!("MISSING (optional) {}", check.name()));
                }
                continue;
            };

            if content.is_none() {
                content = Some(read(store, artifact)?.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, format!("{} has no content", artifact))
                })?);
            }
            let target = content.as_deref().unwrap_or_default();

            match check.verify(target, &companion_bytes) {
                CheckOutcome::Valid => node.add_info(format!("VALID {}", check.name())),
                CheckOutcome::Invalid => node.add_error(format!("INVALID {}", check.name())),
                CheckOutcome::Unknown => {
                    node.add_info(format!("PRESENT (not validated) {}", check.name()))
                }
            };
        }
        Ok(())
    }

    /// Close every check, reporting all failures together.
    fn close(&self) -> Result<(), CloseError> {
        let failures = self
            .checks()
            .filter_map(|(check, _)| check.close().err())
            .collect();
        CloseError::collect(&self.name, failures)
    }
}

fn read(store: &ArtifactStore, artifact: &Artifact) -> io::Result<Option<Vec<u8>>> {
    store.read_all(artifact).map_err(|e| match e {
        StoreError::Io(io) => io,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    })
}
