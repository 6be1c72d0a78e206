//! Artifact coordinates
//!
//! An artifact is identified by group, artifact id, version, classifier and
//! extension. The classifier is empty for main artifacts. Equality is exact
//! on all five fields.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::StoreError;

/// Version suffix marking snapshot artifacts.
pub const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

/// One artifact coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Artifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default)]
    pub classifier: String,
    pub extension: String,
}

impl Artifact {
    /// Coordinate without classifier.
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: String::new(),
            extension: extension.into(),
        }
    }

    /// Same coordinate with the given classifier.
    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = classifier.into();
        self
    }

    /// Coordinate sharing group, artifact id and version.
    pub fn sibling(&self, classifier: &str, extension: &str) -> Self {
        Self {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: self.version.clone(),
            classifier: classifier.to_string(),
            extension: extension.to_string(),
        }
    }

    /// Companion file for this artifact, e.g. `jar` -> `jar.sha1`.
    pub fn companion(&self, suffix: &str) -> Self {
        self.sibling(&self.classifier, &format!("{}.{}", self.extension, suffix))
    }

    /// Main artifact: no classifier, `jar` extension.
    pub fn is_main(&self) -> bool {
        self.classifier.is_empty() && self.extension == "jar"
    }

    pub fn is_snapshot(&self) -> bool {
        self.version.ends_with(SNAPSHOT_SUFFIX)
    }

    /// `group:artifact:extension[:classifier]:version`
    pub fn canonical_id(&self) -> String {
        if self.classifier.is_empty() {
            format!(
                "{}:{}:{}:{}",
                self.group_id, self.artifact_id, self.extension, self.version
            )
        } else {
            format!(
                "{}:{}:{}:{}:{}",
                self.group_id, self.artifact_id, self.extension, self.classifier, self.version
            )
        }
    }

    /// `artifact-version[-classifier].extension`
    pub fn file_name(&self) -> String {
        if self.classifier.is_empty() {
            format!("{}-{}.{}", self.artifact_id, self.version, self.extension)
        } else {
            format!(
                "{}-{}-{}.{}",
                self.artifact_id, self.version, self.classifier, self.extension
            )
        }
    }

    /// Path relative to a repository root, e.g.
    /// `org/example/lib/1.0/lib-1.0.jar`.
    pub fn relative_path(&self) -> PathBuf {
        let mut path: PathBuf = self.group_id.split('.').collect();
        path.push(&self.artifact_id);
        path.push(&self.version);
        path.push(self.file_name());
        path
    }

    /// Reject coordinates that cannot map to a safe relative path.
    pub fn validate(&self) -> Result<(), StoreError> {
        let fields = [
            ("group_id", &self.group_id),
            ("artifact_id", &self.artifact_id),
            ("version", &self.version),
            ("extension", &self.extension),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(StoreError::InvalidCoordinate(format!("{} is empty", field)));
            }
        }
        let all = [
            &self.group_id,
            &self.artifact_id,
            &self.version,
            &self.classifier,
            &self.extension,
        ];
        for value in all {
            if value.contains(['/', '\\', ':']) || value.contains("..") {
                return Err(StoreError::InvalidCoordinate(format!(
                    "illegal character in '{}'",
                    value
                )));
            }
        }
        if self.group_id.split('.').any(str::is_empty) {
            return Err(StoreError::InvalidCoordinate(format!(
                "malformed group id '{}'",
                self.group_id
            )));
        }
        Ok(())
    }

    /// Parse `group:artifact[:extension[:classifier]]:version`.
    ///
    /// The extension defaults to `jar`.
    pub fn parse(coordinate: &str) -> Result<Self, StoreError> {
        let parts: Vec<&str> = coordinate.split(':').collect();
        let artifact = match parts.as_slice() {
            [g, a, v] => Self::new(*g, *a, *v, "jar"),
            [g, a, e, v] => Self::new(*g, *a, *v, *e),
            [g, a, e, c, v] => Self::new(*g, *a, *v, *e).with_classifier(*c),
            _ => {
                return Err(StoreError::InvalidCoordinate(format!(
                    "expected group:artifact[:extension[:classifier]]:version, got '{}'",
                    coordinate
                )))
            }
        };
        artifact.validate()?;
        Ok(artifact)
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_id())
    }
}

impl FromStr for Artifact {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let a = Artifact::parse("org.example:lib:1.0").unwrap();
        assert_eq!(a.extension, "jar");
        assert!(a.classifier.is_empty());
        assert!(a.is_main());

        let b = Artifact::parse("org.example:lib:pom:1.0").unwrap();
        assert_eq!(b.extension, "pom");
        assert!(!b.is_main());

        let c = Artifact::parse("org.example:lib:jar:sources:1.0").unwrap();
        assert_eq!(c.classifier, "sources");
        assert_eq!(c.canonical_id(), "org.example:lib:jar:sources:1.0");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Artifact::parse("just-a-name").is_err());
        assert!(Artifact::parse("org.example::1.0").is_err());
        assert!(Artifact::parse("org..example:lib:1.0").is_err());
    }

    #[test]
    fn test_paths() {
        let a = Artifact::new("org.example", "lib", "1.0", "jar").with_classifier("javadoc");
        assert_eq!(a.file_name(), "lib-1.0-javadoc.jar");
        assert_eq!(
            a.relative_path(),
            PathBuf::from("org/example/lib/1.0/lib-1.0-javadoc.jar")
        );
    }

    #[test]
    fn test_companion_keeps_classifier() {
        let a = Artifact::new("org.example", "lib", "1.0", "jar").with_classifier("sources");
        let sha = a.companion("sha1");
        assert_eq!(sha.extension, "jar.sha1");
        assert_eq!(sha.classifier, "sources");
        assert_eq!(sha.file_name(), "lib-1.0-sources.jar.sha1");
    }

    #[test]
    fn test_equality_is_exact() {
        let a = Artifact::new("g", "a", "1", "jar");
        assert_ne!(a, a.clone().with_classifier("sources"));
        assert_ne!(a, a.sibling("", "pom"));
        assert_eq!(a, Artifact::new("g", "a", "1", "jar"));
    }

    #[test]
    fn test_snapshot_detection() {
        assert!(Artifact::new("g", "a", "1.0-SNAPSHOT", "jar").is_snapshot());
        assert!(!Artifact::new("g", "a", "1.0", "jar").is_snapshot());
    }
}
