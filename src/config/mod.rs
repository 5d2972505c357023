//! Configuration merge system
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. Host config (~/.config/aosp-builder/config.toml)
//! 3. Project config (<base>/.aosp-builder.toml)
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{
    ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, HOST_CONFIG_PATH,
    PROJECT_CONFIG_FILE,
};
pub use merge::{deep_merge, merge_layers};
pub use settings::{DownloadSettings, PathSettings, Settings, TransportKind, TransportSettings};
