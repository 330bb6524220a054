//! Configuration types for the EchoPod server.
//!
//! Configuration is read from an `echopod.json` file with serde-supplied
//! defaults for every field; a missing file yields the default configuration.
//! Values are validated after loading so misconfiguration fails fast with an
//! actionable message.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "echopod.json";

/// Default SQLite database path.
fn default_database() -> String {
    "echopod.db".to_string()
}

/// Default directory for uploaded audio and subtitle files.
fn default_upload_dir() -> String {
    "uploads".to_string()
}

/// Development-only signing secret; replace in production.
fn default_jwt_secret() -> String {
    "dev-mode-secret-not-for-production-use-123456".to_string()
}

/// Default access-token lifetime in hours.
const fn default_token_expiry_hours() -> u32 {
    24
}

/// Default CAPTCHA challenge lifetime in minutes.
const fn default_captcha_ttl_minutes() -> u32 {
    5
}

/// Default upload size cap (16 MiB).
const fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

/// Default heart regeneration ceiling for new accounts.
const fn default_max_hearts() -> u32 {
    echopod_core::hearts::DEFAULT_MAX_HEARTS
}

/// Main configuration for the EchoPod server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path to the SQLite database file.
    #[serde(default = "default_database")]
    pub database: String,

    /// Directory where uploaded course files are stored and served from.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// HS256 signing secret for access tokens. Must be at least 32
    /// characters.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Access-token lifetime in hours.
    #[serde(default = "default_token_expiry_hours")]
    pub token_expiry_hours: u32,

    /// CAPTCHA challenge lifetime in minutes.
    #[serde(default = "default_captcha_ttl_minutes")]
    pub captcha_ttl_minutes: u32,

    /// Maximum accepted request body size for uploads, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Heart regeneration ceiling assigned to new accounts.
    #[serde(default = "default_max_hearts")]
    pub max_hearts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            upload_dir: default_upload_dir(),
            jwt_secret: default_jwt_secret(),
            token_expiry_hours: default_token_expiry_hours(),
            captcha_ttl_minutes: default_captcha_ttl_minutes(),
            max_upload_bytes: default_max_upload_bytes(),
            max_hearts: default_max_hearts(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `echopod.json`; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON, or if
    /// the loaded values fail validation.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            ServerError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `echopod.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns (validated) defaults.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ConfigParseError` on unreadable or syntactically
    /// invalid files, and `ServerError::ConfigValidationError` on bad values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(ServerError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ServerError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(ServerError::config_validation(
                "database path must not be empty",
                "Provide a valid SQLite file path in your echopod.json",
            ));
        }

        if self.upload_dir.trim().is_empty() {
            return Err(ServerError::config_validation(
                "uploadDir must not be empty",
                "Provide a valid upload directory path in your echopod.json",
            ));
        }

        if self.jwt_secret.len() < 32 {
            return Err(ServerError::config_validation(
                "jwtSecret must be at least 32 characters",
                "Generate a long random string and set jwtSecret in your echopod.json",
            ));
        }

        if self.token_expiry_hours == 0 {
            return Err(ServerError::config_validation(
                "tokenExpiryHours must be greater than 0",
                "Set tokenExpiryHours to at least 1 in your echopod.json",
            ));
        }

        if self.captcha_ttl_minutes == 0 {
            return Err(ServerError::config_validation(
                "captchaTtlMinutes must be greater than 0",
                "Set captchaTtlMinutes to at least 1 in your echopod.json",
            ));
        }

        if self.max_upload_bytes == 0 {
            return Err(ServerError::config_validation(
                "maxUploadBytes must be greater than 0",
                "Set maxUploadBytes large enough for one audio file in your echopod.json",
            ));
        }

        if self.max_hearts == 0 {
            return Err(ServerError::config_validation(
                "maxHearts must be greater than 0",
                "Set maxHearts to at least 1 in your echopod.json",
            ));
        }

        Ok(())
    }
}
