//! Layered configuration for basketbot.
//!
//! Sources are merged in order, later sources overriding earlier ones:
//!
//! 1. built-in defaults ([`Config::default`]),
//! 2. `config.toml`, `config.yaml` and `config.json` in the platform config
//!    directory (e.g. `~/.config/basketbot/` on Linux),
//! 3. an explicit file passed on the command line,
//! 4. `BASKETBOT_`-prefixed environment variables, with `__` separating
//!    nested keys (`BASKETBOT_DATABASE__PATH=/tmp/bb.db`).

pub mod error;

use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ErrorKind, Result};

const APPLICATION: &str = "basketbot";
const ENV_PREFIX: &str = "BASKETBOT_";
const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub basket: BasketConfig,
    pub sites: SitesConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Location of the SQLite database file, created if missing.
    pub path: PathBuf,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasketConfig {
    /// Basket version given to newly created regions and retail sites.
    pub initial_version: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitesConfig {
    /// Protocol assumed for URLs given without a scheme: `https` when true.
    pub assume_https: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default tracing filter, overridden by `RUST_LOG`.
    pub level: String,
}

impl Default for BasketConfig {
    fn default() -> Self {
        Self { initial_version: 1 }
    }
}

impl Default for SitesConfig {
    fn default() -> Self {
        Self { assume_https: true }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = project_dirs()
            .map(|dirs| dirs.data_dir().join("basketbot.db"))
            .unwrap_or_else(|| PathBuf::from("basketbot.db"));
        Self { path, max_connections: 5 }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APPLICATION)
}

impl Config {
    /// Load configuration from every layered source.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(explicit)?)
    }

    /// Build the layered [`Figment`] without extracting it.
    pub fn figment(explicit: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dirs) = project_dirs() {
            let dir = dirs.config_dir();
            debug!(dir = %dir.display(), "looking for user configuration");
            figment = figment
                .merge(Toml::file(dir.join("config.toml")))
                .merge(Yaml::file(dir.join("config.yaml")))
                .merge(Json::file(dir.join("config.json")));
        }
        if let Some(path) = explicit {
            figment = merge_file(figment, path)?;
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate a configuration from an already-built figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            exn::bail!(ErrorKind::Invalid("database.max_connections must be at least 1"));
        }
        if self.basket.initial_version < 0 {
            exn::bail!(ErrorKind::Invalid("basket.initial_version must not be negative"));
        }
        if !LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            exn::bail!(ErrorKind::Invalid("log.level must be one of off, error, warn, info, debug, trace"));
        }
        Ok(())
    }

    /// Directory the database file lives in, so callers can create it.
    pub fn database_dir(&self) -> Result<&Path> {
        self.database.path.parent().ok_or_raise(|| ErrorKind::Invalid("database.path has no parent directory"))
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml") | Some("yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::Invalid("configuration file must be .toml, .yaml or .json")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;
    use std::io::Write;

    fn defaults_only() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::from_figment(defaults_only()).unwrap();
        assert_eq!(config.basket.initial_version, 1);
        assert!(config.sites.assume_https);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_missing_keys_fall_back_to_section_defaults() {
        let figment = Figment::from(Json::string(r#"{"sites": {}, "basket": {"initial_version": 3}}"#));
        let config = Config::from_figment(figment).unwrap();
        assert!(config.sites.assume_https);
        assert_eq!(config.basket.initial_version, 3);
        assert_eq!(config.log, LogConfig::default());
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_explicit_toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[database]\npath = \"/tmp/basket.db\"\n\n[sites]\nassume_https = false").unwrap();
        let config = Config::from_figment(merge_file(defaults_only(), file.path()).unwrap()).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/basket.db"));
        assert!(!config.sites.assume_https);
        // Untouched keys keep their defaults.
        assert_eq!(config.basket.initial_version, 1);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = merge_file(defaults_only(), Path::new("config.ini")).unwrap_err();
        assert!(matches!(*err, ErrorKind::Invalid(_)));
    }

    #[rstest]
    #[case(r#"{"database": {"max_connections": 0}}"#)]
    #[case(r#"{"basket": {"initial_version": -1}}"#)]
    #[case(r#"{"log": {"level": "loud"}}"#)]
    fn test_invalid_values_rejected(#[case] json: &str) {
        let figment = defaults_only().merge(Json::string(json));
        let err = Config::from_figment(figment).unwrap_err();
        assert!(matches!(*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_environment_overrides() {
        Jail::expect_with(|jail| {
            jail.set_env("BASKETBOT_BASKET__INITIAL_VERSION", "7");
            jail.set_env("BASKETBOT_LOG__LEVEL", "debug");
            let figment = defaults_only().merge(Env::prefixed(ENV_PREFIX).split("__"));
            let config = Config::from_figment(figment).map_err(|e| e.to_string())?;
            assert_eq!(config.basket.initial_version, 7);
            assert_eq!(config.log.level, "debug");
            Ok(())
        });
    }
}
