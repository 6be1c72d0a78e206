//! Sources and javadoc presence for main artifacts

use std::io;

use super::{BulkValidator, ValidationResultCollector};
use crate::store::ArtifactStore;

/// Classifiers every main jar must ship alongside it.
const REQUIRED_CLASSIFIERS: &[&str] = &["sources", "javadoc"];

/// Requires `sources` and `javadoc` jars next to every main jar.
///
/// Applies only to main artifacts (no classifier, `jar` extension). Each one
/// gets a child node named by its canonical id holding one INFO listing the
/// companions found and, if any are absent, one ERROR listing them.
#[derive(Debug, Clone, Default)]
pub struct CompletenessValidator;

impl BulkValidator for CompletenessValidator {
    fn name(&self) -> &str {
        "completeness"
    }

    fn description(&self) -> &str {
        "main jars ship sources and javadoc jars"
    }

    fn validate(&self, store: &ArtifactStore, collector: &mut ValidationResultCollector) -> io::Result<()> {
        for artifact in store.artifacts().iter().filter(|a| a.is_main()) {
            let (present, missing): (Vec<&str>, Vec<&str>) = REQUIRED_CLASSIFIERS
                .iter()
                .partition(|classifier| store.contains(&artifact.sibling(classifier, "jar")));

            let node = collector.child(&artifact.canonical_id());
            if !present.is_empty() {
                node.add_info(format!("OK: {}", present.join(", ")));
            }
            if !missing.is_empty() {
                node.add_error(format!("MISSING: {}", missing.join(", ")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Artifact, ArtifactStoreTemplate};
    use crate::validation::test_support;
    use tempfile::TempDir;

    #[test]
    fn test_complete_and_incomplete() {
        let dir = TempDir::new().unwrap();
        let mut store = test_support::store(&dir, ArtifactStoreTemplate::release());
        let full = Artifact::new("org.example", "full", "1.0", "jar");
        let partial = Artifact::new("org.example", "partial", "1.0", "jar");
        for a in [&full, &partial] {
            store.put_bytes(a.clone(), b"jar").unwrap();
            store.put_bytes(a.sibling("sources", "jar"), b"src").unwrap();
        }
        store.put_bytes(full.sibling("javadoc", "jar"), b"doc").unwrap();
        store.put_bytes(full.sibling("", "pom"), b"<project/>").unwrap();

        let mut root = ValidationResultCollector::new("completeness");
        CompletenessValidator.validate(&store, &mut root).unwrap();

        assert_eq!(root.children().len(), 2);
        let ok = root.find_child(&full.canonical_id()).unwrap();
        assert_eq!(ok.info(), &["OK: sources, javadoc".to_string()]);
        assert!(ok.errors().is_empty());

        let bad = root.find_child(&partial.canonical_id()).unwrap();
        assert_eq!(bad.info(), &["OK: sources".to_string()]);
        assert_eq!(bad.errors(), &["MISSING: javadoc".to_string()]);
        assert_eq!(root.error_count(), 1);
    }
}
