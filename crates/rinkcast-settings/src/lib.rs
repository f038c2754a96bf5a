//! # rinkcast-settings
//!
//! Settings types and loading for the Rinkcast pipeline.
//!
//! Loading flow:
//! 1. Start with compiled [`RinkcastSettings::default()`]
//! 2. If a settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path};
pub use types::{
    BroadcasterSettings, PipelineSettings, RinkcastSettings, ServerSettings, StorageSettings,
};
