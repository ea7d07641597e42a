//! Configuration for the authorization engine and the demo server.
//!
//! The engine itself only needs [`AuthzConfig`]. The demo binary reads the
//! full [`Config`] from a TOML file, with support for environment variable
//! interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 1337
//!
//! [authz]
//! mode = "async"
//! principal_field = "user"
//!
//! [observability.logging]
//! level = "debug"
//! format = "json"
//! ```

mod authz;
mod observability;
mod server;

pub use authz::*;
pub use observability::*;
use serde::{Deserialize, Serialize};
pub use server::*;

/// Root configuration.
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Authorization engine configuration.
    #[serde(default)]
    pub authz: AuthzConfig,

    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[cfg(feature = "server")]
impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Validate the configuration for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate().map_err(ConfigError::Validation)?;
        self.authz.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[cfg(feature = "server")]
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

static ENV_VAR: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").unwrap());

/// Expand `${VAR}` references, leaving anything after a `#` comment alone.
pub fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for (i, line) in input.lines().enumerate() {
        if i > 0 {
            result.push('\n');
        }
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in ENV_VAR.captures_iter(line) {
            let Some(whole) = cap.get(0) else { continue };
            if comment_pos.is_some_and(|pos| whole.start() >= pos) {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);
            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);
            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
    }

    if input.ends_with('\n') {
        result.push('\n');
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        temp_env::with_var("ROLECALL_TEST_FIELD", Some("account"), || {
            let expanded =
                expand_env_vars("principal_field = \"${ROLECALL_TEST_FIELD}\"\n").unwrap();
            assert_eq!(expanded, "principal_field = \"account\"\n");
        });
    }

    #[test]
    fn test_expand_env_vars_skips_comments() {
        let input = "port = 80 # was ${ROLECALL_UNSET_VAR}";
        assert_eq!(expand_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_expand_env_vars_missing() {
        temp_env::with_var_unset("ROLECALL_UNSET_VAR", || {
            let err = expand_env_vars("x = \"${ROLECALL_UNSET_VAR}\"").unwrap_err();
            assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "ROLECALL_UNSET_VAR"));
        });
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.authz.mode, EvaluationMode::Sync);
        assert_eq!(config.authz.principal_field, DEFAULT_PRINCIPAL_FIELD);
        assert!(!config.authz.match_relative_paths);
        assert_eq!(config.server.port, 1337);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_principal_field() {
        let mut config = Config::default();
        config.authz.principal_field = " ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[cfg(feature = "server")]
    #[test]
    fn test_from_str() {
        let config = Config::from_str(
            r#"
            [server]
            port = 8080
            mount_path = "/app"

            [authz]
            mode = "async"
            principal_field = "account"
            match_relative_paths = true

            [observability.logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.mount_path.as_deref(), Some("/app"));
        assert_eq!(config.authz.mode, EvaluationMode::Async);
        assert_eq!(config.authz.principal_field, "account");
        assert!(config.authz.match_relative_paths);
        assert_eq!(config.observability.logging.level, LogLevel::Debug);
        assert_eq!(config.observability.logging.format, LogFormat::Json);
    }

    #[cfg(feature = "server")]
    #[test]
    fn test_from_str_rejects_unknown_fields() {
        let err = Config::from_str("[authz]\nvoters = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[cfg(feature = "server")]
    #[test]
    fn test_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nmount_path = \"app/\"").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = Config::from_file("/nonexistent/rolecall.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }
}
