//! # easyws-settings
//!
//! Layered configuration for easyws.
//!
//! Later layers win: [`EasyWsSettings::default()`], then the JSON file
//! (`~/.easyws/settings.json` or `--config <path>`), then `EASYWS_*`
//! environment variables.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, merge_into, settings_path};
pub use types::{ClientSettings, EasyWsSettings, LogSettings, QueueSettings, ServerSettings};
