//! Configuration file handling for statsync.
//!
//! The configuration file is stored at `$STATSYNC_HOME/config.json` and holds the account the data
//! directory belongs to, the endpoints of the statement source and of the rate service, and a few
//! tuning values.

use crate::db::Db;
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "statsync";
const CONFIG_VERSION: u8 = 1;
const STATE: &str = ".state";
const CONFIG_JSON: &str = "config.json";
const STATSYNC_SQLITE: &str = "statsync.sqlite";

const API_URL: &str = "https://marketplace.envato.com/api/v3/";
const STATEMENT_URL: &str =
    "https://themeforest.net/user/{username}/download_statement_as_csv?month={month}&year={year}";
const STATEMENT_PAGE_URL: &str = "https://themeforest.net/user/{username}/statement";
const RATES_LATEST_URL: &str = "https://openexchangerates.org/api/latest.json";
const RATES_HISTORICAL_URL: &str = "https://openexchangerates.org/api/historical/{date}.json";
/// The statement source reports times in UTC+10.
const SOURCE_UTC_OFFSET_MINUTES: i32 = 600;
const DEBOUNCE_MS: u64 = 20;
const HTTP_TIMEOUT_SECS: u64 = 30;

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$STATSYNC_HOME` and from there it loads `$STATSYNC_HOME/config.json`. It provides
/// paths to the other items expected in the data directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    state: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the data directory, its `.state` subdirectory, an initial `config.json` for
    /// `username` with default endpoints, and the SQLite database.
    ///
    /// # Errors
    /// - Returns an error if any file operation fails or if the directory already holds a database.
    pub async fn create(dir: impl Into<PathBuf>, username: &str) -> Result<Self> {
        anyhow::ensure!(!username.trim().is_empty(), "The username must not be empty");
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the statsync home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let state = root.join(STATE);
        utils::make_dir(&state).await?;

        let config_path = root.join(CONFIG_JSON);
        let config_file = ConfigFile::new(username.trim());
        config_file.save(&config_path).await?;

        let sqlite_path = root.join(STATSYNC_SQLITE);
        let db = Db::init(&sqlite_path)
            .await
            .context("Unable to create SQLite DB")?;

        Ok(Self {
            root,
            state,
            config_path,
            config_file,
            db,
            sqlite_path,
        })
    }

    /// This will
    /// - validate that `statsync_home` and its config file exist
    /// - load the config file
    /// - validate that the state directory exists
    /// - open the database, migrating it if needed
    pub async fn load(statsync_home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = statsync_home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("statsync home is missing")?;
        if !root.is_dir() {
            bail!("statsync home is not a directory '{}'", root.display())
        }

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let state = root.join(STATE);
        if !state.is_dir() {
            bail!("The state directory is missing '{}'", state.display())
        }

        let sqlite_path = root.join(STATSYNC_SQLITE);
        let db = Db::load(&sqlite_path)
            .await
            .context("Unable to load SQLite DB")?;

        Ok(Self {
            root,
            state,
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

    /// Where the persisted settings and caches live.
    pub fn state_dir(&self) -> &Path {
        &self.state
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    pub fn username(&self) -> &str {
        &self.config_file.username
    }

    pub fn api_url(&self) -> &str {
        &self.config_file.api_url
    }

    pub fn statement_url(&self) -> &str {
        &self.config_file.statement_url
    }

    pub fn statement_page_url(&self) -> &str {
        &self.config_file.statement_page_url
    }

    pub fn rates_latest_url(&self) -> &str {
        &self.config_file.rates_latest_url
    }

    pub fn rates_historical_url(&self) -> &str {
        &self.config_file.rates_historical_url
    }

    pub fn source_utc_offset_minutes(&self) -> i32 {
        self.config_file.source_utc_offset_minutes
    }

    /// How long a query waits for more invalidations before reloading.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.config_file.debounce_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.config_file.http_timeout_secs)
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "statsync",
///   "config_version": 1,
///   "username": "someauthor",
///   "api_url": "https://marketplace.envato.com/api/v3/",
///   "statement_url": "https://themeforest.net/user/{username}/download_statement_as_csv?month={month}&year={year}",
///   "statement_page_url": "https://themeforest.net/user/{username}/statement",
///   "rates_latest_url": "https://openexchangerates.org/api/latest.json",
///   "rates_historical_url": "https://openexchangerates.org/api/historical/{date}.json",
///   "source_utc_offset_minutes": 600,
///   "debounce_ms": 20,
///   "http_timeout_secs": 30
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "statsync"
    app_name: String,

    config_version: u8,

    /// The marketplace account. It also scopes the persisted state files.
    username: String,

    #[serde(default = "default_api_url")]
    api_url: String,

    #[serde(default = "default_statement_url")]
    statement_url: String,

    #[serde(default = "default_statement_page_url")]
    statement_page_url: String,

    #[serde(default = "default_rates_latest_url")]
    rates_latest_url: String,

    #[serde(default = "default_rates_historical_url")]
    rates_historical_url: String,

    #[serde(default = "default_source_utc_offset_minutes")]
    source_utc_offset_minutes: i32,

    #[serde(default = "default_debounce_ms")]
    debounce_ms: u64,

    #[serde(default = "default_http_timeout_secs")]
    http_timeout_secs: u64,
}

fn default_api_url() -> String {
    API_URL.to_string()
}

fn default_statement_url() -> String {
    STATEMENT_URL.to_string()
}

fn default_statement_page_url() -> String {
    STATEMENT_PAGE_URL.to_string()
}

fn default_rates_latest_url() -> String {
    RATES_LATEST_URL.to_string()
}

fn default_rates_historical_url() -> String {
    RATES_HISTORICAL_URL.to_string()
}

fn default_source_utc_offset_minutes() -> i32 {
    SOURCE_UTC_OFFSET_MINUTES
}

fn default_debounce_ms() -> u64 {
    DEBOUNCE_MS
}

fn default_http_timeout_secs() -> u64 {
    HTTP_TIMEOUT_SECS
}

impl ConfigFile {
    fn new(username: &str) -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            username: username.to_string(),
            api_url: default_api_url(),
            statement_url: default_statement_url(),
            statement_page_url: default_statement_page_url(),
            rates_latest_url: default_rates_latest_url(),
            rates_historical_url: default_rates_historical_url(),
            source_utc_offset_minutes: SOURCE_UTC_OFFSET_MINUTES,
            debounce_ms: DEBOUNCE_MS,
            http_timeout_secs: HTTP_TIMEOUT_SECS,
        }
    }

    /// Loads a ConfigFile from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or names another application.
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path)
            .await
            .with_context(|| format!("Failed to load config file at {}", path.display()))?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            config.config_version <= CONFIG_VERSION,
            "Unsupported config_version {}, this build supports up to {}",
            config.config_version,
            CONFIG_VERSION
        );
        anyhow::ensure!(
            !config.username.is_empty(),
            "The config file has no username"
        );

        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }
}
