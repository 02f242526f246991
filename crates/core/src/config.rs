//! TOML-based configuration for docsync.
//!
//! Secrets are never stored in the file. The git access token is referenced
//! by the name of an environment variable (`token_env`) and resolved at
//! runtime via [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where documents live.
    pub storage: StorageConfig,

    /// Remote sync settings. Absent means local-only.
    #[serde(default)]
    pub git: Option<GitConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backing directory; also the git work tree when `[git]` is set.
    pub data_dir: PathBuf,

    /// Only files with this extension are listed as documents.
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    "json".into()
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// URL cloned into `data_dir` when it is not a repository yet.
    pub remote_url: String,

    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Environment variable holding an access token for the remote.
    #[serde(default)]
    pub token_env: Option<String>,

    #[serde(default = "default_author_name")]
    pub author_name: String,

    #[serde(default = "default_author_email")]
    pub author_email: String,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_remote() -> String {
    "origin".into()
}
fn default_branch() -> String {
    "main".into()
}
fn default_author_name() -> String {
    "docsync".into()
}
fn default_author_email() -> String {
    "docsync@localhost".into()
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve `*_env` fields from the environment.
    ///
    /// A missing variable only logs a warning; pushing to a public or local
    /// remote needs no token.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(git) = self.git.as_mut() {
            if let Some(ref env_name) = git.token_env {
                git.token = resolve_optional_env(env_name, "git.token_env");
            }
        }
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.data_dir".into(),
                detail: "data directory must not be empty".into(),
            });
        }
        if self.storage.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.extension".into(),
                detail: "extension must not be empty".into(),
            });
        }
        if let Some(git) = &self.git {
            for (field, value) in [
                ("git.remote_url", &git.remote_url),
                ("git.remote", &git.remote),
                ("git.branch", &git.branch),
                ("git.author_name", &git.author_name),
                ("git.author_email", &git.author_email),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: field.into(),
                        detail: "must not be empty".into(),
                    });
                }
            }
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".into(),
                detail: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Commented starter file written by `docsync init`.
    pub fn template(data_dir: &Path) -> String {
        format!(
            r#"# docsync configuration

[storage]
# Directory holding the documents (and the git work tree when syncing).
data_dir = "{}"
extension = "json"

# Uncomment to sync the data directory through a git remote.
# [git]
# remote_url = "https://example.com/notes.git"
# remote = "origin"
# branch = "main"
# token_env = "DOCSYNC_GIT_TOKEN"
# author_name = "docsync"
# author_email = "docsync@localhost"

[logging]
level = "warn"
"#,
            data_dir.display().to_string().replace('\\', "\\\\")
        )
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[storage]
data_dir = "/tmp/docsync"
extension = "json"

[git]
remote_url = "https://example.com/notes.git"
branch = "trunk"
token_env = "DOCSYNC_TEST_TOKEN"

[logging]
level = "debug"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/docsync"));
        let git = config.git.as_ref().unwrap();
        assert_eq!(git.remote, "origin");
        assert_eq!(git.branch, "trunk");
        assert_eq!(git.author_name, "docsync");
        assert_eq!(config.logging.level, "debug");
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.storage.extension, "json");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage\n").unwrap();
        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_branch() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        if let Some(git) = config.git.as_mut() {
            git.branch = String::new();
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "git.branch"
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_level() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.logging.level = "loud".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "logging.level"
        ));
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("DOCSYNC_TEST_TOKEN", "tok_abc");
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.resolve_env_vars().unwrap();
        assert_eq!(
            config.git.as_ref().and_then(|g| g.token.as_deref()),
            Some("tok_abc")
        );
        std::env::remove_var("DOCSYNC_TEST_TOKEN");
    }

    #[test]
    fn test_defaults() {
        let minimal = r#"
[storage]
data_dir = "/tmp/notes"
"#;
        let config: AppConfig = toml::from_str(minimal).unwrap();
        assert_eq!(config.storage.extension, "json");
        assert!(config.git.is_none());
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_template_parses() {
        let text = AppConfig::template(Path::new("/srv/notes"));
        let config: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/notes"));
        assert!(config.git.is_none());
        config.validate().unwrap();
    }
}
