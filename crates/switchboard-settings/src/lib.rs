//! # switchboard-settings
//!
//! Layered configuration for the switchboard gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SwitchboardSettings::default()`]
//! 2. **Settings file**: `~/.switchboard/settings.json` or an explicit path,
//!    deep-merged over the defaults
//! 3. **Environment variables**: `SWITCHBOARD_*` overrides
//!
//! There is no global instance; the binary loads settings once and hands
//! the pieces to whoever needs them.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, load_with_env, settings_path,
};
pub use types::{LoggingSettings, ReaperSettings, ServerSettings, SwitchboardSettings};
