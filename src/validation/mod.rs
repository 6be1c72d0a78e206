//! Artifact validation
//!
//! Validators come in two shapes:
//! - [`Validator`] looks at one artifact at a time
//! - [`BulkValidator`] sees the whole store once, for rules that span
//!   artifacts (every main jar has sources and javadoc)
//!
//! Checksum and signature schemes are [`Check`] plugins. A
//! [`CompanionValidator`] runs a mandatory and an optional list of checks
//! against each artifact's companion files. Checks and bulk validators are
//! registered by name in a [`CheckRegistry`] at startup.
//!
//! Findings are accumulated in a [`ValidationResultCollector`] tree and never
//! abort a run; the tree is the audit log.

mod collector;
mod companion;
mod completeness;
mod composite;
mod engine;
mod registry;
mod version;

pub use collector::{Severity, ValidationResultCollector};
pub use companion::CompanionValidator;
pub use completeness::CompletenessValidator;
pub use composite::CompositeBulkValidator;
pub use engine::{ValidationEngine, ValidationRun};
pub use registry::CheckRegistry;
pub use version::VersionPolicyValidator;

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{Artifact, ArtifactStore};

/// Three-way result of one check against one companion file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckOutcome {
    Valid,
    Invalid,
    /// Present but could not be verified (no key, unsupported format).
    Unknown,
}

/// Failure raised by a check while releasing its resources.
#[derive(Debug, Error)]
#[error("check {check} failed to close: {message}")]
pub struct CheckError {
    pub check: String,
    pub message: String,
}

impl CheckError {
    pub fn new(check: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            message: message.into(),
        }
    }
}

/// Every close failure from a group of checks or validators.
#[derive(Debug, Error)]
pub struct CloseError {
    pub owner: String,
    pub failures: Vec<CheckError>,
}

impl CloseError {
    /// Combine failures; `Ok` when there are none.
    pub fn collect(owner: &str, failures: Vec<CheckError>) -> Result<(), CloseError> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CloseError {
                owner: owner.to_string(),
                failures,
            })
        }
    }
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed to close {} check(s)", self.owner, self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

/// Errors from assembling or finishing a validation run
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unknown check: {0}")]
    UnknownCheck(String),

    #[error("unknown validator: {0}")]
    UnknownValidator(String),

    #[error("unknown requirement set: {0}")]
    UnknownRequirements(String),

    #[error(transparent)]
    Close(#[from] CloseError),

    #[error("validation worker panicked")]
    WorkerPanicked,
}

/// A checksum or signature scheme.
pub trait Check: Send + Sync {
    /// Short name, e.g. `sha1`.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Companion file suffix appended to the artifact extension.
    fn extension(&self) -> &str;

    /// Verify `content` against the companion file's bytes.
    fn verify(&self, content: &[u8], companion: &[u8]) -> CheckOutcome;

    fn close(&self) -> Result<(), CheckError> {
        Ok(())
    }
}

/// Per-artifact validator.
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn validate(
        &self,
        store: &ArtifactStore,
        artifact: &Artifact,
        collector: &mut ValidationResultCollector,
    ) -> io::Result<()>;

    fn close(&self) -> Result<(), CloseError> {
        Ok(())
    }
}

/// Whole-store validator.
pub trait BulkValidator: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn validate(&self, store: &ArtifactStore, collector: &mut ValidationResultCollector) -> io::Result<()>;

    fn close(&self) -> Result<(), CloseError> {
        Ok(())
    }
}

/// Artifacts a validator should examine: not exempt, in store order.
pub(crate) fn checked_artifacts(store: &ArtifactStore) -> impl Iterator<Item = &Artifact> {
    store.artifacts().iter().filter(|a| !store.is_omitted(a))
}
