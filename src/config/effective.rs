//! Effective configuration with provenance
//!
//! The serialised form records where every layer came from and carries the
//! merged configuration with secrets redacted. The unredacted values stay in
//! memory for credential lookups and never reach the JSON output.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use super::source::{ConfigurationSource, Properties};
use crate::checks::parse_verifying_key;
use crate::redirect::ProjectRepositories;
use crate::requirements::RequirementsSpec;

/// Schema version for effective_config
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "staging-store/effective_config@1";

/// Upper bound for `parallelism`.
pub const MAX_PARALLELISM: u64 = 64;

pub(crate) const REDACTED: &str = "[REDACTED]";

/// Keys that contain secrets and are redacted
const SECRET_KEYS: &[&str] = &["password", "token", "secret", "private_key", "api_key", "credential"];

/// Origin of a configuration layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    User,
    Project,
    Cli,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged configuration with provenance
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub schema_version: u32,

    pub schema_id: String,

    /// When this config was computed
    pub created_at: DateTime<Utc>,

    /// The merged configuration, secrets redacted
    pub config: Value,

    /// Contributing layers in precedence order
    pub sources: Vec<ConfigSource>,

    /// Redacted key paths
    pub redactions: Vec<String>,

    #[serde(skip)]
    raw: Value,

    #[serde(skip)]
    properties: Properties,

    #[serde(skip)]
    services: BTreeMap<String, Properties>,
}

impl EffectiveConfig {
    /// Build from defaults, the user file, the project file and CLI
    /// overrides, in that order. Missing files are skipped.
    pub fn build(
        user_config_path: Option<&Path>,
        project_config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        for (origin, path) in [
            (ConfigOrigin::User, user_config_path),
            (ConfigOrigin::Project, project_config_path),
        ] {
            let Some(path) = path.filter(|p| p.exists()) else {
                continue;
            };
            let (value, digest) = Self::load_toml_file(path)?;
            debug!(path = %path.display(), origin = ?origin, "loaded config layer");
            layers.push(value);
            sources.push(ConfigSource {
                origin,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let raw = merge_layers(layers);
        Self::validate_config(&raw)?;

        let properties = string_map("properties", raw.get("properties"))?;
        let mut services = BTreeMap::new();
        if let Some(servers) = raw.get("servers").and_then(Value::as_object) {
            for (id, table) in servers {
                services.insert(id.clone(), string_map(&format!("servers.{}", id), Some(table))?);
            }
        }

        let mut config = raw.clone();
        let redactions = Self::redact_secrets(&mut config);

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config,
            sources,
            redactions,
            raw,
            properties,
            services,
        })
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path).map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let digest = hex::encode(Sha256::digest(&bytes));

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::Parse(format!("{}: invalid UTF-8: {}", path.display(), e)))?;
        let table: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

        Ok((toml_to_json(table), digest))
    }

    fn redact_secrets(value: &mut Value) -> Vec<String> {
        let mut redactions = Vec::new();
        redact_recursive(value, String::new(), &mut redactions);
        redactions
    }

    fn validate_config(config: &Value) -> Result<(), ConfigError> {
        match config.get("parallelism").map(Value::as_u64) {
            Some(Some(n)) if (1..=MAX_PARALLELISM).contains(&n) => {}
            Some(_) => {
                return Err(ConfigError::Validation(format!(
                    "parallelism must be in [1, {}]",
                    MAX_PARALLELISM
                )))
            }
            None => {}
        }

        for key in ["base_dir", "template", "local_repository"] {
            match config.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => {}
                Some(_) => {
                    return Err(ConfigError::Validation(format!("{} must be a non-empty string", key)))
                }
                None => {}
            }
        }

        for key in ["dry_run", "drop_after_publish"] {
            if let Some(value) = config.get(key) {
                if !value.is_boolean() {
                    return Err(ConfigError::Validation(format!("{} must be a boolean", key)));
                }
            }
        }

        Ok(())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }

    /// Get a config value by dotted path. Secrets read as `[REDACTED]`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.config, |current, part| current.get(part))
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(Value::as_u64)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    pub fn base_dir(&self) -> PathBuf {
        PathBuf::from(self.get_str("base_dir").unwrap_or(super::defaults::DEFAULT_BASE_DIR))
    }

    /// Template used by `create` when none is named.
    pub fn template(&self) -> &str {
        self.get_str("template").unwrap_or("release")
    }

    pub fn dry_run(&self) -> bool {
        self.get_bool("dry_run").unwrap_or(false)
    }

    pub fn parallelism(&self) -> usize {
        self.get_u64("parallelism").unwrap_or(1) as usize
    }

    pub fn drop_after_publish(&self) -> bool {
        self.get_bool("drop_after_publish").unwrap_or(true)
    }

    pub fn local_repository(&self) -> PathBuf {
        PathBuf::from(
            self.get_str("local_repository")
                .unwrap_or(super::defaults::DEFAULT_LOCAL_REPOSITORY),
        )
    }

    /// URLs of repositories that must be deployed to directly.
    pub fn direct_only_urls(&self) -> Vec<String> {
        self.raw
            .get("direct_only_urls")
            .and_then(Value::as_array)
            .map(|urls| urls.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// The project's distribution repositories.
    pub fn distribution(&self) -> Result<ProjectRepositories, ConfigError> {
        match self.raw.get("distribution") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| ConfigError::Validation(format!("distribution: {}", e))),
            None => Ok(ProjectRepositories::default()),
        }
    }

    /// Trusted Ed25519 public keys from `checks.ed25519.trusted_keys`.
    pub fn trusted_keys(&self) -> Result<Vec<VerifyingKey>, ConfigError> {
        let Some(keys) = self.raw.pointer("/checks/ed25519/trusted_keys") else {
            return Ok(Vec::new());
        };
        let keys = keys
            .as_array()
            .ok_or_else(|| ConfigError::Validation("checks.ed25519.trusted_keys must be an array".to_string()))?;
        keys.iter()
            .enumerate()
            .map(|(i, key)| {
                let encoded = key.as_str().ok_or_else(|| {
                    ConfigError::Validation(format!("checks.ed25519.trusted_keys[{}] must be a string", i))
                })?;
                parse_verifying_key(encoded)
                    .map_err(|e| ConfigError::Validation(format!("checks.ed25519.trusted_keys[{}]: {}", i, e)))
            })
            .collect()
    }

    /// Requirement sets defined under `requirements.<name>`.
    pub fn requirement_specs(&self) -> Result<BTreeMap<String, RequirementsSpec>, ConfigError> {
        match self.raw.get("requirements") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| ConfigError::Validation(format!("requirements: {}", e))),
            None => Ok(BTreeMap::new()),
        }
    }
}

impl ConfigurationSource for EffectiveConfig {
    fn effective_properties(&self) -> &Properties {
        &self.properties
    }

    fn service_configuration(&self, id: &str) -> Option<&Properties> {
        self.services.get(id)
    }
}

/// Flatten a table of scalars into strings.
fn string_map(path: &str, value: Option<&Value>) -> Result<Properties, ConfigError> {
    let Some(value) = value else {
        return Ok(Properties::new());
    };
    let table = value
        .as_object()
        .ok_or_else(|| ConfigError::Validation(format!("{} must be a table", path)))?;
    table
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Bool(_) | Value::Number(_) => value.to_string(),
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "{}.{} must be a string",
                        path, key
                    )))
                }
            };
            Ok((key.clone(), text))
        })
        .collect()
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn redact_recursive(value: &mut Value, path: String, redactions: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let current = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                let lower = key.to_lowercase();
                if SECRET_KEYS.iter().any(|s| lower.contains(s)) && !val.is_object() && !val.is_array() {
                    *val = Value::String(REDACTED.to_string());
                    redactions.push(current);
                } else {
                    redact_recursive(val, current, redactions);
                }
            }
        }
        Value::Array(items) => {
            for (i, val) in items.iter_mut().enumerate() {
                redact_recursive(val, format!("{}[{}]", path, i), redactions);
            }
        }
        _ => {}
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config IO error: {0}")]
    Io(String),

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("config validation error: {0}")]
    Validation(String),
}
