//! Settings for the pairlink relay.
//!
//! Defaults, then `~/.pairlink/settings.json`, then environment variables.
//! Command-line flags are applied by the binary on top of the result.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, pairlink_home, settings_path};
pub use types::*;
