//! Name to implementation lookup for checks and bulk validators

use std::collections::BTreeMap;
use std::sync::Arc;

use ed25519_dalek::VerifyingKey;

use super::{
    BulkValidator, Check, CompletenessValidator, CompositeBulkValidator, ValidationError,
    VersionPolicyValidator,
};
use crate::checks::{ChecksumAlgorithm, ChecksumCheck, Ed25519SignatureCheck, GpgSignatureCheck};
use crate::store::RepositoryMode;

/// Checks and bulk validators registered by name.
///
/// Requirement sets refer to their members by name and are resolved here, so
/// a host can add a scheme with [`register_check`] without touching the
/// validation engine.
///
/// [`register_check`]: CheckRegistry::register_check
#[derive(Default, Clone)]
pub struct CheckRegistry {
    checks: BTreeMap<String, Arc<dyn Check>>,
    bulk: BTreeMap<String, Arc<dyn BulkValidator>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in check and bulk validator.
    pub fn with_defaults(trusted_keys: Vec<VerifyingKey>) -> Self {
        let mut registry = Self::new();
        for algorithm in ChecksumAlgorithm::all() {
            registry.register_check(Arc::new(ChecksumCheck::new(algorithm)));
        }
        registry.register_check(Arc::new(Ed25519SignatureCheck::new(trusted_keys)));
        registry.register_check(Arc::new(GpgSignatureCheck));

        let completeness: Arc<dyn BulkValidator> = Arc::new(CompletenessValidator);
        let release_versions: Arc<dyn BulkValidator> =
            Arc::new(VersionPolicyValidator::new(RepositoryMode::Release));
        let snapshot_versions: Arc<dyn BulkValidator> =
            Arc::new(VersionPolicyValidator::new(RepositoryMode::Snapshot));

        registry.register_bulk(Arc::new(CompositeBulkValidator::new(
            "release",
            "complete main artifacts with release versions",
            vec![completeness.clone(), release_versions.clone()],
        )));
        registry.register_bulk(completeness);
        registry.register_bulk(release_versions);
        registry.register_bulk(snapshot_versions);
        registry
    }

    /// Register a check under its own name, replacing any previous one.
    pub fn register_check(&mut self, check: Arc<dyn Check>) -> &mut Self {
        self.checks.insert(check.name().to_string(), check);
        self
    }

    pub fn register_bulk(&mut self, validator: Arc<dyn BulkValidator>) -> &mut Self {
        self.bulk.insert(validator.name().to_string(), validator);
        self
    }

    pub fn check(&self, name: &str) -> Result<Arc<dyn Check>, ValidationError> {
        self.checks
            .get(name)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownCheck(name.to_string()))
    }

    /// Resolve a list of check names, in order.
    pub fn checks<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<dyn Check>>, ValidationError> {
        names.iter().map(|n| self.check(n.as_ref())).collect()
    }

    pub fn bulk(&self, name: &str) -> Result<Arc<dyn BulkValidator>, ValidationError> {
        self.bulk
            .get(name)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownValidator(name.to_string()))
    }

    pub fn check_names(&self) -> impl Iterator<Item = &str> {
        self.checks.keys().map(String::as_str)
    }

    pub fn bulk_names(&self) -> impl Iterator<Item = &str> {
        self.bulk.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("checks", &self.checks.keys().collect::<Vec<_>>())
            .field("bulk", &self.bulk.keys().collect::<Vec<_>>())
            .finish()
    }
}
