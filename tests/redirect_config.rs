//! Redirect resolution against layered configuration files.

use std::fs;
use std::path::PathBuf;

use serde_json::json;
use tempfile::TempDir;

use staging_store::config::{parse_overrides, ConfigurationSource};
use staging_store::redirect::is_direct_only;
use staging_store::store::RepositoryMode;
use staging_store::{ArtifactDeployerRedirector, EffectiveConfig, PublishSession, PublisherRegistry, RedirectError};

const PROJECT_TOML: &str = r#"
[distribution.release]
id = "central"
url = "https://repo.example.org/releases"

[distribution.snapshot]
id = "snapshots"
url = "https://repo.example.org/snapshots"

[properties]
"stage.releaseUrl.central" = "https://mirror.example.org/releases"

[servers.central]
authRedirect = "corp"

[servers.corp]
authRedirect = "vault"

[servers.vault]
username = "deployer"
password = "s3cret"

[servers.snapshots]
publisher = "deploy"
"#;

fn project_file(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_auth_chain_resolves_to_final_credentials() {
    let dir = TempDir::new().unwrap();
    let path = project_file(&dir, PROJECT_TOML);
    let config = EffectiveConfig::build(None, Some(&path), None).unwrap();
    let distribution = config.distribution().unwrap();
    let central = distribution.for_mode(RepositoryMode::Release).unwrap();

    let redirector = ArtifactDeployerRedirector::new(&config);
    let auth = redirector.auth_source(central).unwrap();

    assert_eq!(auth.id, "vault");
    assert_eq!(auth.url, central.url);
    let credentials = config.credentials(&auth.id).unwrap();
    assert_eq!(credentials.username.as_deref(), Some("deployer"));
    assert_eq!(credentials.password.as_deref(), Some("s3cret"));
    assert!(config.credentials("central").is_none());

    // Secrets never reach the serialised view.
    let rendered = config.to_json().unwrap();
    assert!(!rendered.contains("s3cret"));
    assert!(config.redactions.contains(&"servers.vault.password".to_string()));
}

#[test]
fn test_release_url_redirected_snapshot_untouched() {
    let dir = TempDir::new().unwrap();
    let path = project_file(&dir, PROJECT_TOML);
    let config = EffectiveConfig::build(None, Some(&path), None).unwrap();
    let distribution = config.distribution().unwrap();
    let redirector = ArtifactDeployerRedirector::new(&config);

    let release = distribution.release.as_ref().unwrap();
    let snapshot = distribution.snapshot.as_ref().unwrap();
    assert_eq!(
        redirector.redirect_url(release, RepositoryMode::Release),
        "https://mirror.example.org/releases"
    );
    assert_eq!(
        redirector.redirect_url(snapshot, RepositoryMode::Snapshot),
        "https://repo.example.org/snapshots"
    );
}

#[test]
fn test_cli_override_breaks_into_cycle() {
    let dir = TempDir::new().unwrap();
    let path = project_file(&dir, PROJECT_TOML);
    let overrides = parse_overrides(&["servers.vault.authRedirect=central"]).unwrap();
    assert_eq!(overrides, json!({"servers": {"vault": {"authRedirect": "central"}}}));

    let config = EffectiveConfig::build(None, Some(&path), Some(overrides)).unwrap();
    let distribution = config.distribution().unwrap();
    let redirector = ArtifactDeployerRedirector::new(&config);

    let err = redirector.auth_source(distribution.release.as_ref().unwrap()).unwrap_err();
    assert_eq!(
        err,
        RedirectError::Cycle {
            chain: vec!["central".to_string(), "corp".to_string(), "vault".to_string()]
        }
    );
    assert!(err.to_string().contains("central -> corp -> vault -> central"));
}

#[test]
fn test_publisher_follows_repository_configuration() {
    let dir = TempDir::new().unwrap();
    let path = project_file(&dir, PROJECT_TOML);
    let config = EffectiveConfig::build(None, Some(&path), None).unwrap();
    let publishers = PublisherRegistry::builtin(
        &Default::default(),
        &config.requirement_specs().unwrap(),
        &config.local_repository(),
    )
    .unwrap();
    let session = PublishSession::new(&config, config.distribution().unwrap());

    let snapshot = publishers.resolve(None, &session, RepositoryMode::Snapshot).unwrap();
    assert_eq!(snapshot.name(), "deploy");

    // central has no publisher entry; its id is not a registered publisher.
    let err = publishers.resolve(None, &session, RepositoryMode::Release).unwrap_err();
    assert_eq!(err.exit_code(), 40);

    let overrides = parse_overrides(&["properties.stage.publisher=staged"]).unwrap();
    let config = EffectiveConfig::build(None, Some(&path), Some(overrides)).unwrap();
    let session = PublishSession::new(&config, config.distribution().unwrap());
    let release = publishers.resolve(None, &session, RepositoryMode::Release).unwrap();
    assert_eq!(release.name(), "staged");
}

#[test]
fn test_direct_only_urls_from_config() {
    let dir = TempDir::new().unwrap();
    let path = project_file(
        &dir,
        &format!("direct_only_urls = [\"https://repo.example.org/releases/\"]\n{}", PROJECT_TOML),
    );
    let config = EffectiveConfig::build(None, Some(&path), None).unwrap();
    let urls = config.direct_only_urls();

    assert!(is_direct_only("https://repo.example.org/releases", &urls));
    assert!(!is_direct_only("https://mirror.example.org/releases", &urls));
}
