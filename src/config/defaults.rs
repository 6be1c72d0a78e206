//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Default store root, relative to the working directory.
pub const DEFAULT_BASE_DIR: &str = ".stage/stores";

/// Default local repository for the `install` publisher.
pub const DEFAULT_LOCAL_REPOSITORY: &str = ".stage/repository";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Directory holding one subdirectory per store
    pub base_dir: String,

    /// Template used by `create` when none is given (default: "release")
    pub template: String,

    /// Resolve and validate, but never transfer (default: false)
    pub dry_run: bool,

    /// Validation worker threads (default: 1)
    pub parallelism: u64,

    /// Delete a store once it has been published (default: true)
    pub drop_after_publish: bool,

    /// Target directory of the `install` publisher
    pub local_repository: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            base_dir: DEFAULT_BASE_DIR.to_string(),
            template: "release".to_string(),
            dry_run: false,
            parallelism: 1,
            drop_after_publish: true,
            local_repository: DEFAULT_LOCAL_REPOSITORY.to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "base_dir": self.base_dir,
            "template": self.template,
            "dry_run": self.dry_run,
            "parallelism": self.parallelism,
            "drop_after_publish": self.drop_after_publish,
            "local_repository": self.local_repository,
            "properties": {},
            "servers": {},
            "direct_only_urls": [],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.base_dir, ".stage/stores");
        assert_eq!(defaults.template, "release");
        assert_eq!(defaults.parallelism, 1);
        assert!(defaults.drop_after_publish);
        assert!(!defaults.dry_run);
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();
        assert_eq!(value["parallelism"], 1);
        assert!(value["properties"].as_object().unwrap().is_empty());
        assert!(value["direct_only_urls"].as_array().unwrap().is_empty());
    }
}
