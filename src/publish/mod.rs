//! Publishing a store
//!
//! A publish runs in two phases:
//! - [`Publisher::prepare`] validates the store against the publisher's
//!   requirement set and stops at VALID or INVALID
//! - [`Publisher::perform`] prepares, resolves the target through the
//!   redirector, then hands the store to the transfer
//!
//! Validation always completes before the first byte is uploaded. A dry run
//! resolves everything and logs what it would have done without calling the
//! transfer. Uploaded files are not rolled back when a transfer fails.

mod state;
mod transfer;

pub use state::{PublishState, PublishStateError, PublishTransition};
pub use transfer::{
    file_url, path_from_file_url, ArtifactTransfer, FileTransfer, PublishTarget, TransferError,
    TransferSummary,
};

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, ConfigurationSource};
use crate::manager::ManagerError;
use crate::redirect::{is_direct_only, ArtifactDeployerRedirector, ProjectRepositories, RedirectError, RemoteRepository};
use crate::requirements::{ArtifactStoreRequirements, RequirementsSpec};
use crate::store::{ArtifactStore, RepositoryMode, StoreError, StoreState};
use crate::validation::{CheckRegistry, ValidationEngine, ValidationError, ValidationResultCollector};

/// Schema version for publish reports
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "staging-store/publish_report@1";

/// Plain copy into the local repository, nothing enforced.
pub const INSTALL: &str = "install";
/// Plain upload to the distribution repository, nothing enforced.
pub const DEPLOY: &str = "deploy";
/// Upload to the distribution repository under the `release` requirements.
pub const STAGED: &str = "staged";

/// Errors from publishing
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(
        "store {} is INVALID under requirements {}: {} error(s)",
        .0.store,
        .0.requirements,
        .0.validation.as_ref().map_or(0, |v| v.error_count())
    )]
    ValidationFailed(Box<PublishReport>),

    #[error(transparent)]
    Redirect(#[from] RedirectError),

    #[error("unknown publisher '{0}'; set stage.publisher or pass --publisher")]
    UnknownPublisher(String),

    #[error("no distribution repository configured for {0} stores")]
    NoTarget(RepositoryMode),

    #[error("transfer to {} failed: {source}", .report.target.as_ref().map_or("?", |t| t.url.as_str()))]
    Transfer {
        source: TransferError,
        report: Box<PublishReport>,
    },

    /// Publish stopped after validation started; the report is FAILED.
    #[error("{source}")]
    Failed {
        source: Box<PublishError>,
        report: Box<PublishReport>,
    },

    #[error("state error: {0}")]
    State(#[from] PublishStateError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PublishError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PublishError::Config(_) => 1,
            PublishError::Manager(ManagerError::NotFound(_)) => 2,
            PublishError::Manager(ManagerError::Lock(_)) => 20,
            PublishError::Manager(ManagerError::Store(StoreError::ReadOnly(_))) => 20,
            PublishError::Manager(_) => 1,
            PublishError::Store(StoreError::ReadOnly(_)) => 20,
            PublishError::Store(_) => 1,
            PublishError::Validation(_) => 1,
            PublishError::ValidationFailed(_) => 30,
            PublishError::Redirect(_) => 40,
            PublishError::UnknownPublisher(_) => 40,
            PublishError::NoTarget(_) => 40,
            PublishError::Transfer { .. } => 50,
            PublishError::Failed { source, .. } => source.exit_code(),
            PublishError::State(_) => 1,
            PublishError::Io(_) => 1,
        }
    }

    /// The report of a publish that got far enough to produce one.
    pub fn report(&self) -> Option<&PublishReport> {
        match self {
            PublishError::ValidationFailed(report) => Some(report),
            PublishError::Transfer { report, .. } => Some(report),
            PublishError::Failed { report, .. } => Some(report),
            _ => None,
        }
    }

    /// The underlying error, looking through [`PublishError::Failed`].
    pub fn cause(&self) -> &PublishError {
        match self {
            PublishError::Failed { source, .. } => source.cause(),
            other => other,
        }
    }
}

/// Result type for publish operations
pub type PublishResult<T> = Result<T, PublishError>;

/// Context of one publish invocation.
pub struct PublishSession<'a> {
    config: &'a dyn ConfigurationSource,
    distribution: ProjectRepositories,
    engine: ValidationEngine,
    dry_run: bool,
    direct_only_urls: Vec<String>,
}

impl<'a> PublishSession<'a> {
    pub fn new(config: &'a dyn ConfigurationSource, distribution: ProjectRepositories) -> Self {
        Self {
            config,
            distribution,
            engine: ValidationEngine::default(),
            dry_run: false,
            direct_only_urls: Vec::new(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.engine = ValidationEngine::new(parallelism);
        self
    }

    pub fn with_direct_only_urls(mut self, urls: Vec<String>) -> Self {
        self.direct_only_urls = urls;
        self
    }

    pub fn config(&self) -> &'a dyn ConfigurationSource {
        self.config
    }

    pub fn distribution(&self) -> &ProjectRepositories {
        &self.distribution
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn redirector(&self) -> ArtifactDeployerRedirector<'a, dyn ConfigurationSource + 'a> {
        ArtifactDeployerRedirector::new(self.config)
    }
}

/// Outcome of a publish invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReport {
    pub schema_version: u32,
    pub schema_id: String,
    pub publisher: String,
    pub requirements: String,
    pub store: String,
    pub mode: RepositoryMode,
    pub state: PublishState,
    pub history: Vec<PublishTransition>,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResultCollector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<RemoteRepository>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transferred: Option<TransferSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl PublishReport {
    fn new(publisher: &Publisher, store: &ArtifactStore, dry_run: bool) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            publisher: publisher.name.clone(),
            requirements: publisher.requirements.name().to_string(),
            store: store.name().to_string(),
            mode: store.repository_mode(),
            state: PublishState::Prepared,
            history: vec![PublishTransition {
                state: PublishState::Prepared,
                at: Utc::now(),
            }],
            dry_run,
            validation: None,
            target: None,
            auth_source: None,
            transferred: None,
            failure: None,
        }
    }

    /// Record `source` and move to FAILED.
    fn fail(mut self, source: PublishError) -> PublishError {
        warn!(store = %self.store, state = %self.state, error = %source, "publish failed");
        self.failure = Some(source.to_string());
        match self.advance(PublishState::Failed) {
            Ok(()) => PublishError::Failed {
                source: Box::new(source),
                report: Box::new(self),
            },
            Err(e) => e.into(),
        }
    }

    fn advance(&mut self, to: PublishState) -> Result<(), PublishStateError> {
        if !self.state.can_transition_to(to) {
            return Err(PublishStateError::InvalidTransition { from: self.state, to });
        }
        self.state = to;
        self.history.push(PublishTransition { state: to, at: Utc::now() });
        Ok(())
    }

    /// States visited, in order.
    pub fn states(&self) -> Vec<PublishState> {
        self.history.iter().map(|t| t.state).collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A requirement set paired with a transfer.
#[derive(Clone)]
pub struct Publisher {
    name: String,
    requirements: ArtifactStoreRequirements,
    transfer: Arc<dyn ArtifactTransfer>,
    /// Fixed destination; otherwise the project's distribution repository.
    target: Option<RemoteRepository>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("name", &self.name)
            .field("requirements", &self.requirements.name())
            .field("transfer", &self.transfer.name())
            .field("target", &self.target)
            .finish()
    }
}

impl Publisher {
    pub fn new(
        name: impl Into<String>,
        requirements: ArtifactStoreRequirements,
        transfer: Arc<dyn ArtifactTransfer>,
    ) -> Self {
        Self {
            name: name.into(),
            requirements,
            transfer,
            target: None,
        }
    }

    pub fn with_target(mut self, target: RemoteRepository) -> Self {
        self.target = Some(target);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requirements(&self) -> &ArtifactStoreRequirements {
        &self.requirements
    }

    /// Validate `store`; stops at VALID.
    pub fn prepare(&self, store: &ArtifactStore, session: &PublishSession<'_>) -> PublishResult<PublishReport> {
        let mut report = PublishReport::new(self, store, session.dry_run);
        report.advance(PublishState::Validating)?;
        info!(
            publisher = %self.name,
            store = store.name(),
            requirements = self.requirements.name(),
            "validating"
        );

        let run = match self.requirements.validate(store, &session.engine) {
            Ok(run) => run,
            Err(e) => return Err(report.fail(e.into())),
        };
        let passing = run.tree.is_passing();
        let errors = run.tree.error_count();
        report.validation = Some(run.tree);
        if let Some(close) = run.close_error {
            return Err(report.fail(ValidationError::from(close).into()));
        }
        if passing {
            report.advance(PublishState::Valid)?;
            Ok(report)
        } else {
            report.advance(PublishState::Invalid)?;
            warn!(store = store.name(), errors, "store failed validation");
            Err(PublishError::ValidationFailed(Box::new(report)))
        }
    }

    /// Validate, resolve and transfer `store`.
    ///
    /// Needs a store opened for writing. On success (other than a dry run)
    /// the store is marked published.
    pub fn perform(&self, store: &mut ArtifactStore, session: &PublishSession<'_>) -> PublishResult<PublishReport> {
        if !store.is_writable() {
            return Err(StoreError::ReadOnly(store.name().to_string()).into());
        }
        if store.state().is_terminal() {
            return Err(StoreError::Terminal {
                name: store.name().to_string(),
                state: store.state(),
            }
            .into());
        }

        let mut report = self.prepare(store, session)?;
        let target = match self.resolve_target(store.repository_mode(), session) {
            Ok(target) => target,
            Err(e) => return Err(report.fail(e)),
        };
        report.target = Some(target.repository.clone());
        report.auth_source = Some(target.auth_source.id.clone());

        if session.dry_run {
            info!(
                publisher = %self.name,
                store = store.name(),
                target = %target.repository,
                auth_source = %target.auth_source.id,
                artifacts = store.artifacts().len(),
                "dry run: would publish"
            );
            report.advance(PublishState::Published)?;
            return Ok(report);
        }

        report.advance(PublishState::Publishing)?;
        match self.transfer.deploy(store, &target, session) {
            Ok(summary) => {
                report.transferred = Some(summary);
                report.advance(PublishState::Published)?;
                info!(store = store.name(), target = %target.repository, "published");
                // Report the upload even if the state cannot be saved.
                if let Err(e) = store.mark(StoreState::Published) {
                    warn!(store = store.name(), error = %e, "published, but store state not recorded");
                }
                Ok(report)
            }
            Err(source) => {
                warn!(store = store.name(), target = %target.repository, error = %source, "transfer failed");
                report.failure = Some(source.to_string());
                report.advance(PublishState::Failed)?;
                Err(PublishError::Transfer {
                    source,
                    report: Box::new(report),
                })
            }
        }
    }

    fn resolve_target(&self, mode: RepositoryMode, session: &PublishSession<'_>) -> PublishResult<PublishTarget> {
        let repository = match &self.target {
            Some(target) => target.clone(),
            None => session
                .distribution
                .for_mode(mode)
                .cloned()
                .ok_or(PublishError::NoTarget(mode))?,
        };
        let redirector = session.redirector();
        let redirected = redirector.redirect_repository(&repository, mode);
        let auth_source = redirector.auth_source(&repository)?;
        is_direct_only(&redirected.url, &session.direct_only_urls);
        let credentials = session.config.credentials(&auth_source.id);

        Ok(PublishTarget {
            repository: redirected,
            auth_source,
            credentials,
            mode,
        })
    }
}

/// Publishers by name.
#[derive(Debug, Clone, Default)]
pub struct PublisherRegistry {
    publishers: BTreeMap<String, Publisher>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `install`, `deploy` and `staged`, all using [`FileTransfer`].
    pub fn builtin(
        checks: &CheckRegistry,
        defined: &BTreeMap<String, RequirementsSpec>,
        local_repository: &Path,
    ) -> PublishResult<Self> {
        let transfer: Arc<dyn ArtifactTransfer> = Arc::new(FileTransfer);
        let mut registry = Self::new();
        registry
            .register(
                Publisher::new(INSTALL, ArtifactStoreRequirements::none(), transfer.clone())
                    .with_target(RemoteRepository::new("local", file_url(local_repository)?)),
            )
            .register(Publisher::new(DEPLOY, ArtifactStoreRequirements::none(), transfer.clone()))
            .register(Publisher::new(
                STAGED,
                ArtifactStoreRequirements::resolve("release", checks, defined)?,
                transfer,
            ));
        Ok(registry)
    }

    pub fn register(&mut self, publisher: Publisher) -> &mut Self {
        self.publishers.insert(publisher.name.clone(), publisher);
        self
    }

    pub fn get(&self, name: &str) -> PublishResult<&Publisher> {
        self.publishers
            .get(name)
            .ok_or_else(|| PublishError::UnknownPublisher(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.publishers.keys().map(String::as_str)
    }

    /// Publisher for a store of `mode`: `explicit`, else the name the
    /// redirector derives from configuration.
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        session: &PublishSession<'_>,
        mode: RepositoryMode,
    ) -> PublishResult<&Publisher> {
        let name = session
            .redirector()
            .publisher_name(explicit, &session.distribution, mode)?;
        self.get(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{write_checksums, ChecksumAlgorithm};
    use crate::config::StaticConfiguration;
    use crate::store::{Artifact, ArtifactStoreTemplate};
    use crate::validation::test_support;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every deploy call; optionally fails.
    #[derive(Default)]
    struct RecordingTransfer {
        calls: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl ArtifactTransfer for RecordingTransfer {
        fn name(&self) -> &str {
            "recording"
        }

        fn deploy(
            &self,
            store: &ArtifactStore,
            target: &PublishTarget,
            _session: &PublishSession<'_>,
        ) -> Result<TransferSummary, TransferError> {
            self.calls
                .lock()
                .unwrap()
                .push((store.name().to_string(), target.repository.url.clone()));
            if self.fail {
                return Err(TransferError::Rejected("503 from upstream".to_string()));
            }
            Ok(TransferSummary {
                files: store.artifacts().len(),
                bytes: 0,
            })
        }
    }

    fn distribution() -> ProjectRepositories {
        ProjectRepositories {
            release: Some(RemoteRepository::new("central", "https://repo.example.org/releases")),
            snapshot: None,
        }
    }

    fn checksummed_store(dir: &TempDir) -> ArtifactStore {
        let mut store = test_support::store(dir, ArtifactStoreTemplate::release());
        let pom = Artifact::new("org.example", "lib", "1.0", "pom");
        store.put_bytes(pom.clone(), b"<project/>").unwrap();
        write_checksums(&mut store, &pom, &[ChecksumAlgorithm::Sha1, ChecksumAlgorithm::Md5]).unwrap();
        store
    }

    fn default_requirements() -> ArtifactStoreRequirements {
        ArtifactStoreRequirements::resolve("default", &CheckRegistry::with_defaults(Vec::new()), &BTreeMap::new())
            .unwrap()
    }

    #[test]
    fn test_perform_publishes_and_marks_store() {
        let dir = TempDir::new().unwrap();
        let mut store = checksummed_store(&dir);
        let transfer = Arc::new(RecordingTransfer::default());
        let publisher = Publisher::new("checked", default_requirements(), transfer.clone());
        let config = StaticConfiguration::new().with_property("stage.releaseUrl.central", "file:///srv/repo");
        let session = PublishSession::new(&config, distribution());

        let report = publisher.perform(&mut store, &session).unwrap();

        assert_eq!(
            report.states(),
            vec![
                PublishState::Prepared,
                PublishState::Validating,
                PublishState::Valid,
                PublishState::Publishing,
                PublishState::Published
            ]
        );
        assert_eq!(report.target.as_ref().unwrap().url, "file:///srv/repo");
        assert_eq!(report.auth_source.as_deref(), Some("central"));
        assert_eq!(store.state(), StoreState::Published);
        assert_eq!(transfer.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_dry_run_skips_transfer() {
        let dir = TempDir::new().unwrap();
        let mut store = checksummed_store(&dir);
        let transfer = Arc::new(RecordingTransfer::default());
        let publisher = Publisher::new("checked", default_requirements(), transfer.clone());
        let config = StaticConfiguration::new();
        let session = PublishSession::new(&config, distribution()).with_dry_run(true);

        let report = publisher.perform(&mut store, &session).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.state, PublishState::Published);
        assert!(!report.states().contains(&PublishState::Publishing));
        assert_eq!(report.target.unwrap().url, "https://repo.example.org/releases");
        assert!(transfer.calls.lock().unwrap().is_empty());
        assert_eq!(store.state(), StoreState::Open);
    }

    #[test]
    fn test_invalid_store_never_transfers() {
        let dir = TempDir::new().unwrap();
        let mut store = test_support::store(&dir, ArtifactStoreTemplate::release());
        store.put_bytes(Artifact::new("g", "a", "1.0", "pom"), b"x").unwrap();
        let transfer = Arc::new(RecordingTransfer::default());
        let publisher = Publisher::new("checked", default_requirements(), transfer.clone());
        let config = StaticConfiguration::new();
        let session = PublishSession::new(&config, distribution());

        let err = publisher.perform(&mut store, &session).unwrap_err();

        assert_eq!(err.exit_code(), 30);
        let report = err.report().unwrap();
        assert_eq!(report.state, PublishState::Invalid);
        assert!(report.validation.as_ref().unwrap().render().contains("MISSING sha1"));
        assert!(transfer.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_transfer_failure_is_terminal() {
        let dir = TempDir::new().unwrap();
        let mut store = checksummed_store(&dir);
        let transfer = Arc::new(RecordingTransfer {
            fail: true,
            ..RecordingTransfer::default()
        });
        let publisher = Publisher::new("checked", default_requirements(), transfer.clone());
        let config = StaticConfiguration::new();
        let session = PublishSession::new(&config, distribution());

        let err = publisher.perform(&mut store, &session).unwrap_err();

        assert_eq!(err.exit_code(), 50);
        let report = err.report().unwrap();
        assert_eq!(report.state, PublishState::Failed);
        assert!(report.failure.as_ref().unwrap().contains("503"));
        assert_eq!(transfer.calls.lock().unwrap().len(), 1);
        assert_eq!(store.state(), StoreState::Open);
    }

    #[test]
    fn test_missing_target_and_cycles() {
        let dir = TempDir::new().unwrap();
        let mut store = checksummed_store(&dir);
        let publisher = Publisher::new("plain", ArtifactStoreRequirements::none(), Arc::new(RecordingTransfer::default()));
        let config = StaticConfiguration::new();

        let session = PublishSession::new(&config, ProjectRepositories::default());
        let err = publisher.perform(&mut store, &session).unwrap_err();
        assert!(matches!(err.cause(), PublishError::NoTarget(RepositoryMode::Release)));
        assert_eq!(err.exit_code(), 40);
        let report = err.report().unwrap();
        assert_eq!(report.state, PublishState::Failed);
        assert_eq!(
            report.states(),
            vec![
                PublishState::Prepared,
                PublishState::Validating,
                PublishState::Valid,
                PublishState::Failed
            ]
        );
        assert!(report.failure.as_ref().unwrap().contains("no distribution repository"));

        let cyclic = StaticConfiguration::new()
            .with_service("central", "authRedirect", "mirror")
            .with_service("mirror", "authRedirect", "central");
        let session = PublishSession::new(&cyclic, distribution());
        let err = publisher.perform(&mut store, &session).unwrap_err();
        assert!(matches!(err.cause(), PublishError::Redirect(RedirectError::Cycle { .. })));
        assert_eq!(err.exit_code(), 40);
        assert_eq!(err.report().unwrap().state, PublishState::Failed);
        assert_eq!(store.state(), StoreState::Open);
    }

    /// sha1 that verifies nothing and cannot be closed.
    struct Unclosable;

    impl crate::validation::Check for Unclosable {
        fn name(&self) -> &str {
            "sha1"
        }

        fn description(&self) -> &str {
            "unclosable sha1"
        }

        fn extension(&self) -> &str {
            "sha1"
        }

        fn verify(&self, _content: &[u8], _companion: &[u8]) -> crate::validation::CheckOutcome {
            crate::validation::CheckOutcome::Valid
        }

        fn close(&self) -> Result<(), crate::validation::CheckError> {
            Err(crate::validation::CheckError::new("sha1", "handle still open"))
        }
    }

    #[test]
    fn test_close_failure_fails_with_tree() {
        let dir = TempDir::new().unwrap();
        let mut store = checksummed_store(&dir);
        let mut checks = CheckRegistry::with_defaults(Vec::new());
        checks.register_check(Arc::new(Unclosable));
        let requirements = ArtifactStoreRequirements::resolve("default", &checks, &BTreeMap::new()).unwrap();
        let transfer = Arc::new(RecordingTransfer::default());
        let publisher = Publisher::new("checked", requirements, transfer.clone());
        let config = StaticConfiguration::new();
        let session = PublishSession::new(&config, distribution());

        let err = publisher.perform(&mut store, &session).unwrap_err();

        assert!(matches!(err.cause(), PublishError::Validation(ValidationError::Close(_))));
        let report = err.report().unwrap();
        assert_eq!(
            report.states(),
            vec![PublishState::Prepared, PublishState::Validating, PublishState::Failed]
        );
        assert!(report.validation.as_ref().unwrap().render().contains("VALID sha1"));
        assert!(report.failure.as_ref().unwrap().contains("handle still open"));
        assert!(transfer.calls.lock().unwrap().is_empty());
    }

    /// Deploys, then leaves the store unable to save its metadata.
    struct BreaksMetadata;

    impl ArtifactTransfer for BreaksMetadata {
        fn name(&self) -> &str {
            "breaks-metadata"
        }

        fn deploy(
            &self,
            store: &ArtifactStore,
            _target: &PublishTarget,
            _session: &PublishSession<'_>,
        ) -> Result<TransferSummary, TransferError> {
            let meta = store.root().join(crate::store::META_DIR);
            std::fs::remove_dir_all(&meta).unwrap();
            std::fs::write(&meta, b"not a directory").unwrap();
            Ok(TransferSummary {
                files: store.artifacts().len(),
                bytes: 0,
            })
        }
    }

    #[test]
    fn test_unrecorded_store_state_keeps_published_report() {
        let dir = TempDir::new().unwrap();
        let mut store = checksummed_store(&dir);
        let publisher = Publisher::new("checked", default_requirements(), Arc::new(BreaksMetadata));
        let config = StaticConfiguration::new();
        let session = PublishSession::new(&config, distribution());

        let report = publisher.perform(&mut store, &session).unwrap();

        assert_eq!(report.state, PublishState::Published);
        assert_eq!(report.transferred.as_ref().unwrap().files, 3);
        assert!(report.failure.is_none());
    }

    #[test]
    fn test_registry_resolution() {
        let dir = TempDir::new().unwrap();
        let registry =
            PublisherRegistry::builtin(&CheckRegistry::with_defaults(Vec::new()), &BTreeMap::new(), dir.path())
                .unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["deploy", "install", "staged"]);
        assert!(registry.get(INSTALL).unwrap().requirements().is_none());
        assert_eq!(registry.get(STAGED).unwrap().requirements().name(), "release");

        let config = StaticConfiguration::new().with_property("stage.publisher", "staged");
        let session = PublishSession::new(&config, distribution());
        assert_eq!(registry.resolve(None, &session, RepositoryMode::Release).unwrap().name(), "staged");

        let empty = StaticConfiguration::new();
        let session = PublishSession::new(&empty, distribution());
        let err = registry.resolve(None, &session, RepositoryMode::Release).unwrap_err();
        assert!(matches!(err, PublishError::UnknownPublisher(name) if name == "central"));
    }
}
