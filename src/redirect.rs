//! Repository redirection
//!
//! Resolves, for a logical repository reference:
//! - the effective upload URL for a repository mode
//! - the repository whose credentials authenticate the upload, following
//!   `authRedirect` entries and failing on cycles
//! - the publisher to use for the project's distribution repository
//!
//! Every lookup is keyed by repository id and reads three sources, most
//! specific first: the id-suffixed property `stage.<key>.<id>`, the plain
//! property `stage.<key>`, then the id's service configuration `<key>`.
//! The auth redirect skips the plain property, since one global target
//! would redirect that target to itself.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ConfigurationSource;
use crate::store::RepositoryMode;

/// URL scheme of repositories served by this store; never redirected.
pub const STAGING_SCHEME: &str = "stage:";

/// Prefix of redirect properties.
pub const PROPERTY_PREFIX: &str = "stage.";

pub const RELEASE_URL: &str = "releaseUrl";
pub const SNAPSHOT_URL: &str = "snapshotUrl";
pub const AUTH_REDIRECT: &str = "authRedirect";
pub const PUBLISHER: &str = "publisher";

fn default_content_type() -> String {
    "default".to_string()
}

/// A remote repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepository {
    pub id: String,
    pub url: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

impl RemoteRepository {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            content_type: default_content_type(),
        }
    }

    /// Same URL and content type under another id.
    pub fn with_id(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..self.clone()
        }
    }

    pub fn is_staging(&self) -> bool {
        self.url.starts_with(STAGING_SCHEME)
    }
}

impl fmt::Display for RemoteRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.url)
    }
}

/// The project's distribution-management repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRepositories {
    #[serde(default)]
    pub release: Option<RemoteRepository>,
    #[serde(default)]
    pub snapshot: Option<RemoteRepository>,
}

impl ProjectRepositories {
    pub fn for_mode(&self, mode: RepositoryMode) -> Option<&RemoteRepository> {
        match mode {
            RepositoryMode::Release => self.release.as_ref(),
            RepositoryMode::Snapshot => self.snapshot.as_ref(),
        }
    }
}

/// Fatal redirect resolution errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedirectError {
    #[error(
        "auth redirect cycle detected: {} -> {}",
        .chain.join(" -> "),
        .chain.first().map(String::as_str).unwrap_or("?")
    )]
    Cycle { chain: Vec<String> },

    #[error("could not resolve publisher name for {mode} (looked up {key} and the distribution repository); check logs and settings")]
    PublisherUnresolved { key: String, mode: RepositoryMode },
}

/// Property key `stage.<key>`.
pub fn property_key(key: &str) -> String {
    format!("{}{}", PROPERTY_PREFIX, key)
}

/// Property key `stage.<key>.<id>`.
pub fn id_property_key(key: &str, id: &str) -> String {
    format!("{}{}.{}", PROPERTY_PREFIX, key, id)
}

fn url_key(mode: RepositoryMode) -> &'static str {
    match mode {
        RepositoryMode::Release => RELEASE_URL,
        RepositoryMode::Snapshot => SNAPSHOT_URL,
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

/// Redirect resolution over one configuration snapshot.
#[derive(Debug)]
pub struct ArtifactDeployerRedirector<'a, C: ConfigurationSource + ?Sized> {
    config: &'a C,
}

impl<'a, C: ConfigurationSource + ?Sized> ArtifactDeployerRedirector<'a, C> {
    pub fn new(config: &'a C) -> Self {
        Self { config }
    }

    fn id_property(&self, key: &str, id: &str) -> Option<&'a str> {
        non_empty(self.config.effective_properties().get(&id_property_key(key, id)))
    }

    fn plain_property(&self, key: &str) -> Option<&'a str> {
        non_empty(self.config.effective_properties().get(&property_key(key)))
    }

    fn service_value(&self, key: &str, id: &str) -> Option<&'a str> {
        self.config
            .service_configuration(id)
            .and_then(|service| non_empty(service.get(key)))
    }

    /// Most specific configured value of `key` for repository `id`.
    pub fn effective_value(&self, id: &str, key: &str) -> Option<&'a str> {
        self.id_property(key, id)
            .or_else(|| self.plain_property(key))
            .or_else(|| self.service_value(key, id))
    }

    /// Effective upload URL of `repository` for `mode`.
    pub fn redirect_url(&self, repository: &RemoteRepository, mode: RepositoryMode) -> String {
        if repository.is_staging() {
            return repository.url.clone();
        }
        match self.effective_value(&repository.id, url_key(mode)) {
            Some(url) => {
                debug!(repository = %repository.id, %mode, from = %repository.url, to = url, "redirecting url");
                url.to_string()
            }
            None => repository.url.clone(),
        }
    }

    /// `repository` with its URL redirected for `mode`.
    pub fn redirect_repository(&self, repository: &RemoteRepository, mode: RepositoryMode) -> RemoteRepository {
        RemoteRepository {
            url: self.redirect_url(repository, mode),
            ..repository.clone()
        }
    }

    /// Follow `authRedirect` entries from `repository` to the id whose
    /// credentials apply.
    pub fn auth_source(&self, repository: &RemoteRepository) -> Result<RemoteRepository, RedirectError> {
        let mut visited: Vec<String> = Vec::new();
        let mut current = repository.clone();
        loop {
            if visited.contains(&current.id) {
                warn!(chain = ?visited, "auth redirect cycle");
                return Err(RedirectError::Cycle { chain: visited });
            }
            visited.push(current.id.clone());

            let target = self
                .id_property(AUTH_REDIRECT, &current.id)
                .or_else(|| self.service_value(AUTH_REDIRECT, &current.id));
            match target {
                Some(target) => {
                    debug!(from = %current.id, to = target, "following auth redirect");
                    current = current.with_id(target);
                }
                None => return Ok(current),
            }
        }
    }

    /// Publisher name: `explicit`, then `stage.publisher`, then the
    /// distribution repository's own `publisher` entry, then its id.
    pub fn publisher_name(
        &self,
        explicit: Option<&str>,
        distribution: &ProjectRepositories,
        mode: RepositoryMode,
    ) -> Result<String, RedirectError> {
        if let Some(name) = explicit.filter(|n| !n.trim().is_empty()) {
            return Ok(name.to_string());
        }
        if let Some(name) = self.plain_property(PUBLISHER) {
            return Ok(name.to_string());
        }
        let Some(repository) = distribution.for_mode(mode) else {
            warn!(%mode, "no distribution repository to derive a publisher from");
            return Err(RedirectError::PublisherUnresolved {
                key: property_key(PUBLISHER),
                mode,
            });
        };
        let name = self
            .effective_value(&repository.id, PUBLISHER)
            .unwrap_or(repository.id.as_str());
        Ok(name.to_string())
    }
}

/// Whether `url` is one of the repositories that only accept direct
/// deployment. Matches ignore a trailing slash.
pub fn is_direct_only(url: &str, direct_only_urls: &[String]) -> bool {
    let url = url.trim_end_matches('/');
    let matched = direct_only_urls
        .iter()
        .any(|candidate| url == candidate.trim_end_matches('/'));
    if matched {
        warn!(url, "target only accepts direct deployment");
    }
    matched
}
