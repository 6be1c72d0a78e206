//! Requirement sets applied before publishing
//!
//! An [`ArtifactStoreRequirements`] is the immutable policy for one publish:
//! which checksums and signatures must (or may) accompany each artifact, and
//! which bulk validator applies to release and snapshot stores. Sets are
//! described by name in a [`RequirementsSpec`] and resolved against a
//! [`CheckRegistry`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{ArtifactStore, RepositoryMode};
use crate::validation::{
    BulkValidator, Check, CheckRegistry, CompanionValidator, ValidationEngine, ValidationError,
    ValidationResultCollector, ValidationRun, Validator,
};

/// Name of the sentinel set that skips all enforcement.
pub const NONE: &str = "none";

/// Names of the built-in requirement sets.
pub const BUILTIN_REQUIREMENTS: &[&str] = &[NONE, "default", "release"];

/// Serialisable description of a requirement set, by member name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequirementsSpec {
    pub description: String,
    pub mandatory_checksums: Vec<String>,
    pub optional_checksums: Vec<String>,
    pub mandatory_signatures: Vec<String>,
    pub optional_signatures: Vec<String>,
    pub release_validator: Option<String>,
    pub snapshot_validator: Option<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl RequirementsSpec {
    /// Built-in set by name. `none` is not listed here; see [`ArtifactStoreRequirements::none`].
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self {
                description: "checksums required, signatures optional".to_string(),
                mandatory_checksums: names(&["sha1", "md5"]),
                optional_checksums: names(&["sha256", "sha512"]),
                mandatory_signatures: Vec::new(),
                optional_signatures: names(&["ed25519"]),
                release_validator: None,
                snapshot_validator: None,
            }),
            "release" => Some(Self {
                description: "signed, checksummed, complete release".to_string(),
                mandatory_checksums: names(&["sha1", "md5"]),
                optional_checksums: names(&["sha256", "sha512"]),
                mandatory_signatures: names(&["ed25519"]),
                optional_signatures: names(&["gpg"]),
                release_validator: Some("release".to_string()),
                snapshot_validator: Some("snapshot-versions".to_string()),
            }),
            _ => None,
        }
    }

    /// Resolve every member name against `registry`.
    pub fn build(&self, name: &str, registry: &CheckRegistry) -> Result<ArtifactStoreRequirements, ValidationError> {
        let bulk = |n: &Option<String>| n.as_deref().map(|n| registry.bulk(n)).transpose();
        Ok(ArtifactStoreRequirements {
            name: name.to_string(),
            description: self.description.clone(),
            mandatory_checksums: registry.checks(&self.mandatory_checksums)?,
            optional_checksums: registry.checks(&self.optional_checksums)?,
            mandatory_signatures: registry.checks(&self.mandatory_signatures)?,
            optional_signatures: registry.checks(&self.optional_signatures)?,
            release_validator: bulk(&self.release_validator)?,
            snapshot_validator: bulk(&self.snapshot_validator)?,
            skip: false,
        })
    }
}

/// Immutable policy bundle for one publish target.
#[derive(Clone)]
pub struct ArtifactStoreRequirements {
    name: String,
    description: String,
    mandatory_checksums: Vec<Arc<dyn Check>>,
    optional_checksums: Vec<Arc<dyn Check>>,
    mandatory_signatures: Vec<Arc<dyn Check>>,
    optional_signatures: Vec<Arc<dyn Check>>,
    release_validator: Option<Arc<dyn BulkValidator>>,
    snapshot_validator: Option<Arc<dyn BulkValidator>>,
    skip: bool,
}

impl ArtifactStoreRequirements {
    /// The NONE sentinel: nothing is enforced.
    pub fn none() -> Self {
        Self {
            name: NONE.to_string(),
            description: "no requirement enforcement".to_string(),
            mandatory_checksums: Vec::new(),
            optional_checksums: Vec::new(),
            mandatory_signatures: Vec::new(),
            optional_signatures: Vec::new(),
            release_validator: None,
            snapshot_validator: None,
            skip: true,
        }
    }

    /// Resolve a set by name. Config-defined sets shadow built-ins, except
    /// `none`, which always means the sentinel.
    pub fn resolve(
        name: &str,
        registry: &CheckRegistry,
        defined: &BTreeMap<String, RequirementsSpec>,
    ) -> Result<Self, ValidationError> {
        if name == NONE {
            return Ok(Self::none());
        }
        let spec = defined
            .get(name)
            .cloned()
            .or_else(|| RequirementsSpec::builtin(name))
            .ok_or_else(|| ValidationError::UnknownRequirements(name.to_string()))?;
        spec.build(name, registry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_none(&self) -> bool {
        self.skip
    }

    pub fn mandatory_checksums(&self) -> &[Arc<dyn Check>] {
        &self.mandatory_checksums
    }

    pub fn optional_checksums(&self) -> &[Arc<dyn Check>] {
        &self.optional_checksums
    }

    pub fn mandatory_signatures(&self) -> &[Arc<dyn Check>] {
        &self.mandatory_signatures
    }

    pub fn optional_signatures(&self) -> &[Arc<dyn Check>] {
        &self.optional_signatures
    }

    /// Bulk validator for `mode`, if any.
    pub fn bulk_validator(&self, mode: RepositoryMode) -> Option<&Arc<dyn BulkValidator>> {
        match mode {
            RepositoryMode::Release => self.release_validator.as_ref(),
            RepositoryMode::Snapshot => self.snapshot_validator.as_ref(),
        }
    }

    pub fn checksum_validator(&self) -> CompanionValidator {
        CompanionValidator::new(
            "checksums",
            "checksum companions",
            self.mandatory_checksums.clone(),
            self.optional_checksums.clone(),
        )
    }

    pub fn signature_validator(&self) -> CompanionValidator {
        CompanionValidator::new(
            "signatures",
            "detached signature companions",
            self.mandatory_signatures.clone(),
            self.optional_signatures.clone(),
        )
    }

    /// Validate `store` against this set.
    ///
    /// The NONE set returns a passing tree with a single INFO note.
    pub fn validate(&self, store: &ArtifactStore, engine: &ValidationEngine) -> Result<ValidationRun, ValidationError> {
        if self.skip {
            let mut root = ValidationResultCollector::new(&self.name);
            root.add_info("requirements not enforced");
            return Ok(ValidationRun::completed(root));
        }

        let validators: Vec<Arc<dyn Validator>> = [self.checksum_validator(), self.signature_validator()]
            .into_iter()
            .filter(|v| !v.is_empty())
            .map(|v| Arc::new(v) as Arc<dyn Validator>)
            .collect();
        let bulk = self.bulk_validator(store.repository_mode());
        debug!(
            requirements = %self.name,
            store = store.name(),
            bulk = bulk.map(|b| b.name()).unwrap_or("-"),
            "validating store"
        );
        engine.run(&self.name, store, bulk.map(|b| &**b), &validators)
    }
}

impl std::fmt::Debug for ArtifactStoreRequirements {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |checks: &[Arc<dyn Check>]| checks.iter().map(|c| c.name().to_string()).collect::<Vec<_>>();
        f.debug_struct("ArtifactStoreRequirements")
            .field("name", &self.name)
            .field("mandatory_checksums", &names(&self.mandatory_checksums))
            .field("optional_checksums", &names(&self.optional_checksums))
            .field("mandatory_signatures", &names(&self.mandatory_signatures))
            .field("optional_signatures", &names(&self.optional_signatures))
            .field("release_validator", &self.release_validator.as_ref().map(|v| v.name().to_string()))
            .field("snapshot_validator", &self.snapshot_validator.as_ref().map(|v| v.name().to_string()))
            .field("none", &self.skip)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{write_checksums, ChecksumAlgorithm};
    use crate::store::{Artifact, ArtifactStoreTemplate};
    use crate::validation::test_support;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use ed25519_dalek::{Signer, SigningKey};
    use tempfile::TempDir;

    fn registry(signing: &SigningKey) -> CheckRegistry {
        CheckRegistry::with_defaults(vec![signing.verifying_key()])
    }

    fn put_signed(store: &mut ArtifactStore, artifact: &Artifact, signing: &SigningKey, sign: bool) {
        let content = format!("bytes of {}", artifact);
        store.put_bytes(artifact.clone(), content.as_bytes()).unwrap();
        write_checksums(store, artifact, &[ChecksumAlgorithm::Sha1, ChecksumAlgorithm::Md5]).unwrap();
        if sign {
            let sig = STANDARD.encode(signing.sign(content.as_bytes()).to_bytes());
            store.put_bytes(artifact.companion("sig"), sig.as_bytes()).unwrap();
        }
    }

    #[test]
    fn test_builtins_resolve() {
        let signing = SigningKey::from_bytes(&[1; 32]);
        let registry = registry(&signing);
        let defined = BTreeMap::new();

        let none = ArtifactStoreRequirements::resolve("none", &registry, &defined).unwrap();
        assert!(none.is_none());

        let release = ArtifactStoreRequirements::resolve("release", &registry, &defined).unwrap();
        assert_eq!(release.mandatory_checksums().len(), 2);
        assert_eq!(release.mandatory_signatures()[0].name(), "ed25519");
        assert_eq!(release.bulk_validator(RepositoryMode::Release).unwrap().name(), "release");
        assert_eq!(
            release.bulk_validator(RepositoryMode::Snapshot).unwrap().name(),
            "snapshot-versions"
        );

        let default = ArtifactStoreRequirements::resolve("default", &registry, &defined).unwrap();
        assert!(default.bulk_validator(RepositoryMode::Release).is_none());

        assert!(matches!(
            ArtifactStoreRequirements::resolve("strict", &registry, &defined),
            Err(ValidationError::UnknownRequirements(_))
        ));
    }

    #[test]
    fn test_defined_sets_shadow_builtins() {
        let registry = CheckRegistry::with_defaults(Vec::new());
        let mut defined = BTreeMap::new();
        defined.insert(
            "default".to_string(),
            RequirementsSpec {
                mandatory_checksums: vec!["sha256".to_string()],
                ..RequirementsSpec::default()
            },
        );
        let set = ArtifactStoreRequirements::resolve("default", &registry, &defined).unwrap();
        assert_eq!(set.mandatory_checksums()[0].name(), "sha256");
        assert!(set.optional_signatures().is_empty());
    }

    #[test]
    fn test_missing_mandatory_signature_is_invalid() {
        let dir = TempDir::new().unwrap();
        let signing = SigningKey::from_bytes(&[1; 32]);
        let mut store = test_support::store(&dir, ArtifactStoreTemplate::release());
        let pom = Artifact::new("org.example", "lib", "1.0", "pom");
        put_signed(&mut store, &pom, &signing, false);

        let release = ArtifactStoreRequirements::resolve("release", &registry(&signing), &BTreeMap::new()).unwrap();
        let report = release.validate(&store, &ValidationEngine::default()).unwrap().tree;

        assert!(!report.is_passing());
        let sigs = report
            .find_child(&pom.canonical_id())
            .and_then(|n| n.find_child("signatures"))
            .unwrap();
        assert_eq!(sigs.errors(), &["MISSING ed25519".to_string()]);
    }

    #[test]
    fn test_missing_optional_signature_is_info() {
        let dir = TempDir::new().unwrap();
        let signing = SigningKey::from_bytes(&[1; 32]);
        let mut store = test_support::store(&dir, ArtifactStoreTemplate::release());
        let pom = Artifact::new("org.example", "lib", "1.0", "pom");
        put_signed(&mut store, &pom, &signing, false);

        let default = ArtifactStoreRequirements::resolve("default", &registry(&signing), &BTreeMap::new()).unwrap();
        let report = default.validate(&store, &ValidationEngine::default()).unwrap().tree;

        assert!(report.is_passing());
        let sigs = report
            .find_child(&pom.canonical_id())
            .and_then(|n| n.find_child("signatures"))
            .unwrap();
        assert!(sigs.info().contains(&"MISSING (optional) ed25519".to_string()));
    }

    #[test]
    fn test_none_skips_everything() {
        let dir = TempDir::new().unwrap();
        let mut store = test_support::store(&dir, ArtifactStoreTemplate::release());
        store
            .put_bytes(Artifact::new("g", "a", "1.0-SNAPSHOT", "jar"), b"x")
            .unwrap();
        let report = ArtifactStoreRequirements::none()
            .validate(&store, &ValidationEngine::default())
            .unwrap()
            .tree;
        assert!(report.is_passing());
        assert!(report.children().is_empty());
    }
}
