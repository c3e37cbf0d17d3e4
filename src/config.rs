//! Configuration file handling.
//!
//! The configuration file is stored at `$BUDGET_HOME/config.json`. It holds the reassignment batch
//! size, the half-month convention used by the allocator and the location of the calendar
//! catalog. The SQLite database lives next to it.

use crate::allocation::{Allocator, HalfMonthConvention};
use crate::db::Db;
use crate::error::Res;
use crate::model::InMemoryCatalog;
use crate::store::MAX_BATCH_SIZE;
use crate::utils;
use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "budget";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const BUDGET_SQLITE: &str = "budget.sqlite";
const CALENDAR_CSV: &str = "calendar.csv";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$BUDGET_HOME` and from there it loads `$BUDGET_HOME/config.json`.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the home directory, writes an initial `config.json` with default settings and
    /// initializes the SQLite database.
    ///
    /// # Errors
    /// - Returns an error if any file operations fail or if a database already exists.
    pub async fn create(dir: impl Into<PathBuf>) -> Res<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the budget home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        let config_file = ConfigFile::default();
        config_file.save(&config_path).await?;

        let sqlite_path = root.join(BUDGET_SQLITE);
        let db = Db::init(&sqlite_path)
            .await
            .context("Unable to create SQLite DB")?;

        Ok(Self {
            root,
            config_path,
            config_file,
            db,
            sqlite_path,
        })
    }

    /// Validates that `budget_home` and its config file exist, loads the config and opens the
    /// database, migrating it if needed.
    pub async fn load(budget_home: impl Into<PathBuf>) -> Res<Self> {
        let maybe_relative = budget_home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("Budget home is missing")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let sqlite_path = root.join(BUDGET_SQLITE);
        let db = Db::load(&sqlite_path)
            .await
            .context("Unable to load SQLite DB")?;

        Ok(Self {
            root,
            config_path,
            config_file,
            db,
            sqlite_path,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn max_batch_size(&self) -> usize {
        self.config_file.max_batch_size
    }

    pub fn half_month_convention(&self) -> HalfMonthConvention {
        self.config_file.half_month_convention
    }

    /// The configured catalog path if it is absolute, otherwise resolved against the home dir.
    pub fn catalog_path(&self) -> PathBuf {
        let p = self.config_file.catalog_path();
        if p.is_absolute() {
            return p;
        }
        self.root.join(p)
    }

    /// An allocator using the configured half-month convention.
    pub fn allocator(&self) -> Allocator {
        Allocator::new(self.half_month_convention())
    }

    /// Loads and validates the calendar catalog.
    pub async fn catalog(&self) -> Res<InMemoryCatalog> {
        let path = self.catalog_path();
        if !path.is_file() {
            bail!("The calendar catalog is missing '{}'", path.display())
        }
        InMemoryCatalog::load(&path).await
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "budget",
///   "config_version": 1,
///   "max_batch_size": 500,
///   "half_month_convention": "first_half",
///   "catalog_path": "calendar.csv"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "budget"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// The most transactions written in one batch during reassignment
    #[serde(default = "default_max_batch_size")]
    max_batch_size: usize,

    /// How half-month budgets are prorated into weekly periods
    #[serde(default)]
    half_month_convention: HalfMonthConvention,

    /// Path to the calendar catalog CSV (optional, relative to config.json or absolute)
    /// Defaults to $BUDGET_HOME/calendar.csv if not specified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    catalog_path: Option<PathBuf>,
}

fn default_max_batch_size() -> usize {
    MAX_BATCH_SIZE
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            max_batch_size: MAX_BATCH_SIZE,
            half_month_convention: HalfMonthConvention::default(),
            catalog_path: None,
        }
    }
}

impl ConfigFile {
    /// Loads and validates a ConfigFile.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, if `app_name` is wrong, or if
    /// `max_batch_size` is outside `1..=500`.
    async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path)
            .await
            .with_context(|| format!("Failed to load config file at {}", path.display()))?;

        ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        ensure!(
            (1..=MAX_BATCH_SIZE).contains(&config.max_batch_size),
            "Invalid max_batch_size in config file: {} is not between 1 and {MAX_BATCH_SIZE}",
            config.max_batch_size
        );

        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Res<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }

    fn catalog_path(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(CALENDAR_CSV))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_create_then_load() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("budget_home");
        let created = Config::create(&home).await.unwrap();
        assert!(created.config_path().is_file());
        assert!(created.sqlite_path().is_file());
        assert_eq!(created.max_batch_size(), 500);
        assert_eq!(created.catalog_path(), created.root().join("calendar.csv"));

        let loaded = Config::load(&home).await.unwrap();
        assert_eq!(loaded.root(), created.root());
        assert_eq!(
            loaded.half_month_convention(),
            HalfMonthConvention::FirstHalf
        );
        // The catalog has not been written yet.
        assert!(loaded.catalog().await.is_err());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let dir = TempDir::new().unwrap();
        Config::create(dir.path()).await.unwrap();
        assert!(Config::create(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_load_missing_home() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(dir.path().join("nope")).await.unwrap_err();
        assert!(format!("{err:#}").contains("Budget home is missing"));
    }

    #[tokio::test]
    async fn test_config_file_minimal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        utils::write(&path, r#"{"app_name": "budget", "config_version": 1}"#)
            .await
            .unwrap();
        let config = ConfigFile::load(&path).await.unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[tokio::test]
    async fn test_config_file_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let json = r#"{
            "app_name": "budget",
            "config_version": 1,
            "max_batch_size": 50,
            "half_month_convention": "by_day",
            "catalog_path": "/var/lib/calendar.csv"
        }"#;
        utils::write(&path, json).await.unwrap();
        let config = ConfigFile::load(&path).await.unwrap();
        assert_eq!(config.max_batch_size, 50);
        assert_eq!(config.half_month_convention, HalfMonthConvention::ByDay);
        assert_eq!(config.catalog_path(), PathBuf::from("/var/lib/calendar.csv"));
    }

    #[tokio::test]
    async fn test_config_file_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        utils::write(&path, r#"{"app_name": "ledger", "config_version": 1}"#)
            .await
            .unwrap();
        let err = ConfigFile::load(&path).await.unwrap_err();
        assert!(err.to_string().contains("Invalid app_name"));

        utils::write(
            &path,
            r#"{"app_name": "budget", "config_version": 1, "max_batch_size": 501}"#,
        )
        .await
        .unwrap();
        let err = ConfigFile::load(&path).await.unwrap_err();
        assert!(err.to_string().contains("Invalid max_batch_size"));
    }

    #[test]
    fn test_serialization_omits_default_catalog_path() {
        let json = serde_json::to_string(&ConfigFile::default()).unwrap();
        assert!(!json.contains("catalog_path"));
        assert!(json.contains("first_half"));
    }
}
