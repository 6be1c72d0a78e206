//! Runs bulk and per-artifact validators over a store

use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use super::{
    checked_artifacts, BulkValidator, CheckError, CloseError, ValidationError, ValidationResultCollector,
    Validator,
};
use crate::store::{Artifact, ArtifactStore};

/// Maximum worker threads for one run.
pub const MAX_PARALLELISM: usize = 64;

/// A finished run: the complete result tree, plus every failure raised
/// while closing validators afterwards.
#[derive(Debug)]
pub struct ValidationRun {
    pub tree: ValidationResultCollector,
    pub close_error: Option<CloseError>,
}

impl ValidationRun {
    /// A run with nothing left to close.
    pub fn completed(tree: ValidationResultCollector) -> Self {
        Self {
            tree,
            close_error: None,
        }
    }

    /// The tree, or the close failure if there was one.
    pub fn into_result(self) -> Result<ValidationResultCollector, ValidationError> {
        match self.close_error {
            Some(e) => Err(e.into()),
            None => Ok(self.tree),
        }
    }
}

/// Validation driver.
///
/// The bulk validator runs first under a child named after it. Per-artifact
/// validators then run into one detached node per artifact (named by its
/// canonical id), which is adopted into the root in store order. Read
/// failures become ERROR messages on the affected node, so a run always
/// produces a complete tree.
#[derive(Debug, Clone, Copy)]
pub struct ValidationEngine {
    parallelism: usize,
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ValidationEngine {
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.clamp(1, MAX_PARALLELISM),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Validate `store` and close every validator afterwards.
    ///
    /// Validators are closed even when a worker panics. Close failures from
    /// all validators are reported together next to the tree. The only
    /// error is a panicked worker, which leaves no complete tree.
    pub fn run(
        &self,
        name: &str,
        store: &ArtifactStore,
        bulk: Option<&dyn BulkValidator>,
        validators: &[Arc<dyn Validator>],
    ) -> Result<ValidationRun, ValidationError> {
        let mut root = ValidationResultCollector::new(name);

        if let Some(bulk) = bulk {
            let node = root.child(bulk.name());
            if let Err(e) = bulk.validate(store, node) {
                warn!(validator = bulk.name(), error = %e, "bulk validation could not read store");
                node.add_error(format!("read failed: {}", e));
            }
        }

        let artifacts: Vec<&Artifact> = checked_artifacts(store).collect();
        let nodes = if validators.is_empty() {
            Ok(Vec::new())
        } else if self.parallelism == 1 || artifacts.len() < 2 {
            Ok(artifacts
                .iter()
                .map(|a| validate_artifact(store, a, validators))
                .collect())
        } else {
            self.run_parallel(store, &artifacts, validators)
        };

        let close_error = close_all(name, bulk, validators).err();
        if let Some(e) = &close_error {
            warn!(run = name, error = %e, "validators failed to close");
        }

        for node in nodes? {
            root.adopt(node);
        }

        debug!(
            store = store.name(),
            artifacts = artifacts.len(),
            errors = root.error_count(),
            "validation finished"
        );
        Ok(ValidationRun {
            tree: root,
            close_error,
        })
    }

    fn run_parallel(
        &self,
        store: &ArtifactStore,
        artifacts: &[&Artifact],
        validators: &[Arc<dyn Validator>],
    ) -> Result<Vec<ValidationResultCollector>, ValidationError> {
        let chunk = artifacts.len().div_ceil(self.parallelism);
        thread::scope(|scope| {
            let workers: Vec<_> = artifacts
                .chunks(chunk)
                .map(|slice| {
                    scope.spawn(move || {
                        slice
                            .iter()
                            .map(|a| validate_artifact(store, a, validators))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            // Join every worker before reporting a panic.
            let mut nodes = Vec::with_capacity(artifacts.len());
            let mut panicked = false;
            for worker in workers {
                match worker.join() {
                    Ok(chunk) => nodes.extend(chunk),
                    Err(_) => panicked = true,
                }
            }
            if panicked {
                Err(ValidationError::WorkerPanicked)
            } else {
                Ok(nodes)
            }
        })
    }
}

fn close_all(
    name: &str,
    bulk: Option<&dyn BulkValidator>,
    validators: &[Arc<dyn Validator>],
) -> Result<(), CloseError> {
    let mut failures: Vec<CheckError> = Vec::new();
    if let Some(bulk) = bulk {
        failures.extend(bulk.close().err().into_iter().flat_map(|e| e.failures));
    }
    for validator in validators {
        failures.extend(validator.close().err().into_iter().flat_map(|e| e.failures));
    }
    CloseError::collect(name, failures)
}

fn validate_artifact(
    store: &ArtifactStore,
    artifact: &Artifact,
    validators: &[Arc<dyn Validator>],
) -> ValidationResultCollector {
    let mut node = ValidationResultCollector::new(artifact.canonical_id());
    for validator in validators {
        if let Err(e) = validator.validate(store, artifact, &mut node) {
            warn!(
                validator = validator.name(),
                artifact = %artifact,
                error = %e,
                "artifact could not be read"
            );
            node.child(validator.name())
                .add_error(format!("read failed: {}", e));
        }
    }
    node
}
