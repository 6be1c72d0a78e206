//! Read-only configuration view used by redirect resolution

use std::collections::BTreeMap;
use std::fmt;

use super::effective::REDACTED;

/// String key/value mapping.
pub type Properties = BTreeMap<String, String>;

/// Where redirect and publisher lookups read their settings.
pub trait ConfigurationSource {
    /// Flat session properties (`stage.releaseUrl`, `stage.releaseUrl.<id>`, ...).
    fn effective_properties(&self) -> &Properties;

    /// Per-repository service configuration, if the id has any.
    fn service_configuration(&self, id: &str) -> Option<&Properties>;

    /// `username`/`password` from the id's service configuration.
    fn credentials(&self, id: &str) -> Option<Credentials> {
        let service = self.service_configuration(id)?;
        let credentials = Credentials {
            username: service.get("username").cloned(),
            password: service.get("password").cloned(),
        };
        (credentials != Credentials::default()).then_some(credentials)
    }
}

/// Username and password for one repository id.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .finish()
    }
}

/// In-memory configuration, for hosts that assemble settings themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticConfiguration {
    properties: Properties,
    services: BTreeMap<String, Properties>,
}

impl StaticConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_service(mut self, id: &str, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.services
            .entry(id.to_string())
            .or_default()
            .insert(key.into(), value.into());
        self
    }
}

impl ConfigurationSource for StaticConfiguration {
    fn effective_properties(&self) -> &Properties {
        &self.properties
    }

    fn service_configuration(&self, id: &str) -> Option<&Properties> {
        self.services.get(id)
    }
}
