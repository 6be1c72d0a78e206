//! Ordered group of bulk validators

use std::io;
use std::sync::Arc;

use super::{BulkValidator, CheckError, CloseError, ValidationResultCollector};
use crate::store::ArtifactStore;

/// Runs each member under its own child node, in order.
pub struct CompositeBulkValidator {
    name: String,
    description: String,
    members: Vec<Arc<dyn BulkValidator>>,
}

impl CompositeBulkValidator {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        members: Vec<Arc<dyn BulkValidator>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            members,
        }
    }

    pub fn members(&self) -> &[Arc<dyn BulkValidator>] {
        &self.members
    }
}

impl std::fmt::Debug for CompositeBulkValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeBulkValidator")
            .field("name", &self.name)
            .field("members", &self.members.iter().map(|m| m.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl BulkValidator for CompositeBulkValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self, store: &ArtifactStore, collector: &mut ValidationResultCollector) -> io::Result<()> {
        for member in &self.members {
            member.validate(store, collector.child(member.name()))?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), CloseError> {
        let failures: Vec<CheckError> = self
            .members
            .iter()
            .filter_map(|m| m.close().err())
            .flat_map(|e| e.failures)
            .collect();
        CloseError::collect(&self.name, failures)
    }
}
