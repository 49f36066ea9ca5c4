//! Portal configuration: storage key names and preference defaults.
//!
//! SYSTEM CONTEXT
//! ==============
//! The portal shell may embed a JSON configuration blob in the page; it is
//! parsed once at startup and handed to the providers in `app`. Everything has
//! a default so an absent blob behaves like the stock branding.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use serde::Deserialize;

/// Storage keys recognized by the session/preference layer.
pub mod keys {
    /// Session-scoped flag recording that the identity migration ran.
    pub const MIGRATION_COMPLETED: &str = "migration_completed";
    /// Legacy user record key written by older portal builds.
    pub const USER_DATA: &str = "userData";
    /// Current user record key.
    pub const USER: &str = "user";
    /// Bearer token key.
    pub const AUTH_TOKEN: &str = "authToken";

    /// Keys that identify the logged-in user. Never kept in the persistent store.
    pub const IDENTITY_KEYS: [&str; 3] = [USER_DATA, USER, AUTH_TOKEN];

    pub const COMPANY_NAME: &str = "companyName";
    pub const COMPANY_TEXT_COLOR: &str = "companyTextColor";
    pub const NAVBAR_BG_COLOR: &str = "navbarBgColor";
    pub const BASE_FONT_SIZE: &str = "baseFontSize";
    pub const HEADING_FONT_SIZE: &str = "headingFontSize";
}

pub const DEFAULT_COMPANY_NAME: &str = "Empresa";
pub const DEFAULT_COMPANY_TEXT_COLOR: &str = "#000000";
pub const DEFAULT_NAVBAR_BG_COLOR: &str = "#ffffff";
pub const DEFAULT_BASE_FONT_SIZE: u32 = 16;
pub const DEFAULT_HEADING_FONT_SIZE: u32 = 24;

/// Errors produced while loading portal configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration blob was not valid JSON for `PortalConfig`.
    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field parsed but holds an unusable value.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Fallback values applied when a preference has never been stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreferenceDefaults {
    pub company_name: String,
    pub company_text_color: String,
    pub navbar_bg_color: String,
    pub base_font_size: u32,
    pub heading_font_size: u32,
}

impl Default for PreferenceDefaults {
    fn default() -> Self {
        Self {
            company_name: DEFAULT_COMPANY_NAME.to_owned(),
            company_text_color: DEFAULT_COMPANY_TEXT_COLOR.to_owned(),
            navbar_bg_color: DEFAULT_NAVBAR_BG_COLOR.to_owned(),
            base_font_size: DEFAULT_BASE_FONT_SIZE,
            heading_font_size: DEFAULT_HEADING_FONT_SIZE,
        }
    }
}

/// Top-level portal configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub preferences: PreferenceDefaults,
}

impl PortalConfig {
    /// Parse and validate a JSON configuration blob.
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] for values that would break rendering.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let prefs = &self.preferences;
        if prefs.company_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "preferences.companyName",
                reason: "must not be empty".into(),
            });
        }
        if prefs.base_font_size == 0 {
            return Err(ConfigError::Invalid {
                field: "preferences.baseFontSize",
                reason: "must be positive".into(),
            });
        }
        if prefs.heading_font_size == 0 {
            return Err(ConfigError::Invalid {
                field: "preferences.headingFontSize",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}
