//! Configuration for ferry
//!
//! Settings come from, in increasing priority: built-in defaults, a TOML
//! file, `FERRY_*` environment variables, and finally command line flags
//! (applied by the CLI on the loaded struct).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::transcode::TranscodeOptions;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FerryConfig {
    pub database: DatabaseConfig,
    pub import: ImportConfig,
    pub sources: SourcesConfig,
    pub flarum: FlarumConfig,
}

/// Database configuration for SQLite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the database file holding the identity map (and the
    /// reference forum).
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ferry")
                .join("ferry.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Identity map namespace; one per source system sharing a target.
    pub namespace: String,
    /// Records per batch. Affects memory and throughput only.
    pub batch_size: usize,
    /// Transcode post bodies into inspection files instead of importing them.
    pub dry_run: bool,
    /// Where dry runs write `ferry.before.txt` and `ferry.after.txt`.
    pub inspect_dir: PathBuf,
    /// Fail a post when a placeholder goes missing. Always on for dry runs.
    pub strict_markup: bool,
    /// Elements dropped with their content before transcoding.
    pub decorative_tags: Vec<String>,
    /// Title used for topics whose source has none.
    pub missing_title: String,
    /// Username of the user that unattributable content is assigned to.
    pub placeholder_username: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            batch_size: 1000,
            dry_run: false,
            inspect_dir: PathBuf::from("/tmp"),
            strict_markup: false,
            decorative_tags: TranscodeOptions::default().decorative_tags,
            missing_title: "Untitled".to_string(),
            placeholder_username: "anonymous".to_string(),
        }
    }
}

impl ImportConfig {
    pub fn transcode_options(&self) -> TranscodeOptions {
        TranscodeOptions {
            decorative_tags: self.decorative_tags.clone(),
            strict: self.strict_markup || self.dry_run,
        }
    }
}

/// Source file locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub json_file: Option<PathBuf>,
    pub csv_users: Option<PathBuf>,
    pub csv_emails: Option<PathBuf>,
    pub csv_categories: Option<PathBuf>,
    pub csv_topics: Option<PathBuf>,
    pub csv_sso: Option<PathBuf>,
}

/// Connection settings for a Flarum MySQL database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlarumConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for FlarumConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            database: "flarum".to_string(),
            user: "root".to_string(),
            password: None,
        }
    }
}

fn invalid(field: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(field: &str, value: &str) -> std::result::Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(invalid(field, format!("expected a boolean, got '{other}'"))),
    }
}

impl FerryConfig {
    /// Load from a TOML file, then apply the process environment.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_file(path).await?,
            None => match config_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::load_file(&path).await?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML file. Missing sections fall back to defaults.
    pub async fn load_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: FerryConfig =
            toml::from_str(content).map_err(|e| ConfigError::TomlParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FERRY_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let path = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        if let Some(p) = path("FERRY_DB_PATH") {
            self.database.path = p;
        }
        if let Some(ns) = lookup("FERRY_NAMESPACE") {
            self.import.namespace = ns;
        }
        if let Some(size) = lookup("FERRY_BATCH_SIZE") {
            self.import.batch_size = size
                .trim()
                .parse()
                .map_err(|e| invalid("FERRY_BATCH_SIZE", e))?;
        }
        if let Some(flag) = lookup("FERRY_DRY_RUN") {
            self.import.dry_run = parse_bool("FERRY_DRY_RUN", &flag)?;
        }
        if let Some(p) = path("FERRY_INSPECT_DIR") {
            self.import.inspect_dir = p;
        }
        if let Some(flag) = lookup("FERRY_STRICT_MARKUP") {
            self.import.strict_markup = parse_bool("FERRY_STRICT_MARKUP", &flag)?;
        }

        let sources = [
            ("FERRY_JSON_FILE", &mut self.sources.json_file),
            ("FERRY_CSV_USERS", &mut self.sources.csv_users),
            ("FERRY_CSV_EMAILS", &mut self.sources.csv_emails),
            ("FERRY_CSV_CATEGORIES", &mut self.sources.csv_categories),
            ("FERRY_CSV_TOPICS", &mut self.sources.csv_topics),
            ("FERRY_CSV_SSO", &mut self.sources.csv_sso),
        ];
        for (key, slot) in sources {
            if let Some(p) = path(key) {
                *slot = Some(p);
            }
        }

        if let Some(host) = lookup("FERRY_FLARUM_HOST") {
            self.flarum.host = host;
        }
        if let Some(port) = lookup("FERRY_FLARUM_PORT") {
            self.flarum.port = port
                .trim()
                .parse()
                .map_err(|e| invalid("FERRY_FLARUM_PORT", e))?;
        }
        if let Some(db) = lookup("FERRY_FLARUM_DB") {
            self.flarum.database = db;
        }
        if let Some(user) = lookup("FERRY_FLARUM_USER") {
            self.flarum.user = user;
        }
        if let Some(password) = lookup("FERRY_FLARUM_PASSWORD") {
            self.flarum.password = Some(password);
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.import.batch_size == 0 {
            return Err(invalid("import.batch_size", "must be at least 1").into());
        }
        if self.import.namespace.trim().is_empty() {
            return Err(invalid("import.namespace", "must not be blank").into());
        }
        if self.import.placeholder_username.trim().is_empty() {
            return Err(ConfigError::MissingField("import.placeholder_username".into()).into());
        }
        Ok(())
    }
}

/// Places a config file is looked for, in order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("ferry.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("ferry").join("config.toml"));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = FerryConfig::default();
        assert_eq!(config.import.batch_size, 1000);
        assert_eq!(config.import.namespace, "default");
        assert_eq!(config.import.inspect_dir, PathBuf::from("/tmp"));
        assert_eq!(config.import.missing_title, "Untitled");
        assert!(config.database.path.ends_with("ferry/ferry.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FerryConfig::from_toml(
            r#"
            [import]
            namespace = "flarum"
            batch_size = 50

            [sources]
            csv_users = "data/users.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.import.namespace, "flarum");
        assert_eq!(config.import.batch_size, 50);
        assert_eq!(config.import.placeholder_username, "anonymous");
        assert_eq!(config.sources.csv_users, Some(PathBuf::from("data/users.csv")));
        assert_eq!(config.flarum.port, 3306);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = FerryConfig::from_toml("[import]\nbatch_size = 50\n").unwrap();
        config
            .apply_env(env(&[
                ("FERRY_BATCH_SIZE", "7"),
                ("FERRY_DRY_RUN", "yes"),
                ("FERRY_CSV_TOPICS", "/data/topics.csv"),
                ("FERRY_FLARUM_PORT", "3307"),
            ]))
            .unwrap();
        assert_eq!(config.import.batch_size, 7);
        assert!(config.import.dry_run);
        assert!(config.import.transcode_options().strict);
        assert_eq!(config.sources.csv_topics, Some(PathBuf::from("/data/topics.csv")));
        assert_eq!(config.flarum.port, 3307);
    }

    #[test]
    fn test_invalid_env_values() {
        let mut config = FerryConfig::default();
        let err = config
            .apply_env(env(&[("FERRY_BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(ConfigError::InvalidValue { .. })));

        let mut config = FerryConfig::default();
        assert!(config.apply_env(env(&[("FERRY_BATCH_SIZE", "0")])).is_err());
    }
}
