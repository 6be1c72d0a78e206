//! Layered configuration
//!
//! Four layers, later ones winning:
//! 1. Built-in defaults
//! 2. User config (~/.config/stage/config.toml, or `--config`)
//! 3. Project config (.stage/config.toml)
//! 4. CLI overrides (`-D key=value`)

mod defaults;
mod effective;
mod merge;
mod source;

use std::path::PathBuf;

pub use defaults::{BuiltinDefaults, DEFAULT_BASE_DIR, DEFAULT_LOCAL_REPOSITORY};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers, parse_overrides};
pub use source::{ConfigurationSource, Credentials, Properties, StaticConfiguration};

/// Project config location, relative to the working directory.
pub const PROJECT_CONFIG_PATH: &str = ".stage/config.toml";

/// `~/.config/stage/config.toml`, if `HOME` is set.
pub fn user_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/stage/config.toml"))
}
