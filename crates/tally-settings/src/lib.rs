//! # tally-settings
//!
//! Configuration for the tally database stack.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TallySettings::default()`]
//! 2. **Settings file**: `$TALLY_SETTINGS` or `~/.tally/settings.json`
//! 3. **Environment variables**: `TALLY_*` overrides (highest priority)
//!
//! The database section names a [`Driver`] and its [`ConnectionDetails`];
//! everything downstream (connection pool, migrations, audit backend) is
//! selected from that one value.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::*;
