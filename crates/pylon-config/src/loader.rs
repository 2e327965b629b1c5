//! Layered configuration loading.
//!
//! Later layers override earlier ones:
//! 1. Built-in defaults (or the development preset)
//! 2. A TOML or JSON file
//! 3. `PREFIX__SECTION__KEY` environment variables

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};
use crate::PylonConfig;

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "PYLON";

/// Builds a [`PylonConfig`] from defaults, files and the environment.
///
/// # Example
///
/// ```no_run
/// use pylon_config::ConfigLoader;
///
/// # fn main() -> Result<(), pylon_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("pylon.toml")?
///     .with_env_prefix("PYLON")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: PylonConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader seeded with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PylonConfig::default(),
            env_prefix: None,
        }
    }

    /// Resets to the built-in defaults.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = PylonConfig::default();
        self
    }

    /// Resets to the development preset.
    ///
    /// ```
    /// use pylon_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = PylonConfig::development();
        self
    }

    /// Loads a file, choosing the format from its extension.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> ConfigResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Loads a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> ConfigResult<Self> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration text in the named format (`toml` or `json`).
    ///
    /// ```
    /// use pylon_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\necho = true", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert!(config.server.echo);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> ConfigResult<Self> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        Ok(self)
    }

    /// Enables `PREFIX__SECTION__KEY` overrides, e.g. `PYLON__SERVER__ECHO=true`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Loads a `.env` file into the process environment if one is present.
    pub fn with_dotenv(self) -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Ok(self)
    }

    /// Applies environment overrides and validates.
    pub fn load(mut self) -> ConfigResult<PylonConfig> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> PylonConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> ConfigResult<PylonConfig> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> ConfigResult<()> {
        let marker = format!("{prefix}__");
        let env_vars: HashMap<String, String> =
            env::vars().filter(|(k, _)| k.starts_with(&marker)).collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> ConfigResult<()> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let server = &mut self.config.server;
        let logging = &mut self.config.logging;

        match parts.as_slice() {
            ["SERVER", "HOST"] => server.host = value.to_string(),
            ["SERVER", "MAX_PAYLOAD_SIZE"] => server.max_payload_size = parse_number(key, value)?,
            ["SERVER", "MAX_BACKPRESSURE"] => server.max_backpressure = parse_number(key, value)?,
            ["SERVER", "IDLE_TIMEOUT_SECS"] => server.idle_timeout_secs = parse_number(key, value)?,
            ["SERVER", "MAX_LIFETIME_MINUTES"] => {
                server.max_lifetime_minutes = parse_number(key, value)?;
            }
            ["SERVER", "SEND_PINGS_AUTOMATICALLY"] => {
                server.send_pings_automatically = parse_flag(key, value)?;
            }
            ["SERVER", "CLOSE_ON_BACKPRESSURE_LIMIT"] => {
                server.close_on_backpressure_limit = parse_flag(key, value)?;
            }
            ["SERVER", "RESET_IDLE_TIMEOUT_ON_SEND"] => {
                server.reset_idle_timeout_on_send = parse_flag(key, value)?;
            }
            ["SERVER", "COMPRESSION"] => server.compression = value.to_lowercase(),
            ["SERVER", "ECHO"] => server.echo = parse_flag(key, value)?,
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                server.shutdown_timeout_secs = parse_number(key, value)?;
            }

            ["LOGGING", "ENABLED"] => logging.enabled = parse_flag(key, value)?,
            ["LOGGING", "LEVEL"] => logging.level = value.to_string(),
            ["LOGGING", "JSON"] => logging.json = parse_flag(key, value)?,
            ["LOGGING", "FORMAT"] => {
                logging.json = match value.to_lowercase().as_str() {
                    "json" => true,
                    "pretty" | "text" => false,
                    _ => return Err(ConfigError::env_parse_error(key, "expected 'json' or 'pretty'")),
                };
            }

            // Unknown keys are ignored so unrelated PYLON__ variables do not break startup.
            _ => {}
        }

        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected non-negative integer"))
}

fn parse_flag(key: &str, value: &str) -> ConfigResult<bool> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parses common boolean spellings.
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_defaults() {
        let config = ConfigLoader::new().with_defaults().load().unwrap();
        assert_eq!(config, PylonConfig::default());
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"server": {"max_backpressure": 1024, "compression": "disabled"}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.max_backpressure, 1024);
        assert_eq!(config.server.compression, "disabled");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_loader_with_string_unsupported_format() {
        let result = ConfigLoader::new().with_string("host: x", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(f)) if f == "yaml"));
    }

    #[test]
    fn test_loader_rejects_unknown_section() {
        let result = ConfigLoader::new().with_string("[metrics]\nenabled = true", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_with_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nhost = \"127.0.0.1\"\nidle_timeout_secs = 30\n\n[logging]\njson = false"
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.idle_timeout_secs, 30);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_loader_with_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"server": {{"echo": true}}}}"#).unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert!(config.server.echo);
    }

    #[test]
    fn test_loader_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_loader_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/pylon.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));

        let loader = ConfigLoader::new()
            .with_optional_file("/nonexistent/pylon.toml")
            .unwrap();
        assert_eq!(loader.load_unvalidated(), PylonConfig::default());
    }

    #[test]
    fn test_load_validates() {
        let result = ConfigLoader::new()
            .with_string("[server]\nmax_payload_size = 0", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_bool() {
        for yes in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(yes), Some(true));
        }
        for no in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(no), Some(false));
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_apply_env_var_server() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("PYLON__SERVER__HOST", "10.0.0.1", "PYLON")
            .unwrap();
        loader
            .apply_env_var("PYLON__SERVER__MAX_BACKPRESSURE", "2048", "PYLON")
            .unwrap();
        loader
            .apply_env_var("PYLON__SERVER__ECHO", "yes", "PYLON")
            .unwrap();
        loader
            .apply_env_var("PYLON__SERVER__COMPRESSION", "DEDICATED", "PYLON")
            .unwrap();

        let config = loader.load().unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.max_backpressure, 2048);
        assert!(config.server.echo);
        assert_eq!(config.server.compression, "dedicated");
    }

    #[test]
    fn test_apply_env_var_logging() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("PYLON__LOGGING__LEVEL", "warn", "PYLON")
            .unwrap();
        loader
            .apply_env_var("PYLON__LOGGING__FORMAT", "pretty", "PYLON")
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.logging.level, "warn");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_apply_env_var_invalid_values() {
        let mut loader = ConfigLoader::new();
        let result = loader.apply_env_var("PYLON__SERVER__IDLE_TIMEOUT_SECS", "-5", "PYLON");
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));

        let result = loader.apply_env_var("PYLON__SERVER__ECHO", "maybe", "PYLON");
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));
    }

    #[test]
    fn test_apply_env_var_unknown_key_ignored() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("PYLON__SERVER__THREADS", "4", "PYLON")
            .unwrap();
        assert_eq!(loader.load_unvalidated(), PylonConfig::default());
    }
}
