//! Staging artifact store
//!
//! A filesystem-backed holding area where build outputs are collected into
//! a named store, validated against a requirement set, and published to a
//! remote repository as one unit.
//!
//! - [`manager`] creates, locks, lists and drops stores
//! - [`validation`] and [`checks`] build the hierarchical result tree
//! - [`requirements`] names the policy a publish enforces
//! - [`redirect`] resolves target URLs, auth sources and publisher names
//! - [`publish`] sequences validation and transfer
//!
//! Cross-process directory locking lives in the `staging-lock` crate.

pub mod checks;
pub mod config;
pub mod manager;
pub mod publish;
pub mod redirect;
pub mod requirements;
pub mod store;
pub mod validation;

pub use config::{ConfigurationSource, EffectiveConfig, StaticConfiguration};
pub use manager::{ArtifactStoreManager, ManagerError, StoreAccess};
pub use publish::{
    ArtifactTransfer, FileTransfer, PublishError, PublishReport, PublishSession, PublishState, Publisher,
    PublisherRegistry,
};
pub use redirect::{ArtifactDeployerRedirector, ProjectRepositories, RedirectError, RemoteRepository};
pub use requirements::ArtifactStoreRequirements;
pub use staging_lock::{DirectoryLock, DirectoryLocker, LockError, LockMode};
pub use store::{Artifact, ArtifactStore, ArtifactStoreTemplate, RepositoryMode, StoreError};
pub use validation::{CheckRegistry, ValidationEngine, ValidationResultCollector, ValidationRun};
