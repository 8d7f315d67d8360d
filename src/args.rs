//! These structs provide the CLI interface for the statsync CLI.

use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// statsync: keeps a local copy of your marketplace sales statements.
///
/// Statements are downloaded one month at a time into a local SQLite database and resumed from
/// where the last run stopped. Amounts can be converted to a second currency using historical
/// exchange rates from Open Exchange Rates, and the totals and charts you see are recomputed
/// whenever the data or your settings change.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory and initialize the configuration file and database.
    ///
    /// Decide what directory you want to store data in and pass this as --statsync-home. By
    /// default, it will be $HOME/statsync.
    Init(InitArgs),
    /// Download new statements and refresh converted amounts.
    Sync(SyncArgs),
    /// Choose the currency amounts are converted to and displayed in.
    Currency(CurrencyArgs),
    /// Store the Open Exchange Rates app id used to fetch exchange rates.
    RatesKey(RatesKeyArgs),
    /// Print sales totals for all time, this month and this week.
    Stats,
    /// Keep running, refreshing the date and (when enabled) the statements until Ctrl-C.
    Watch(WatchArgs),
    /// Forget all stored settings, cached documents, cached rates and the sync position.
    Reset,
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where statsync data and configuration is held. Defaults to ~/statsync
    #[arg(long, env = "STATSYNC_HOME", default_value_t = default_statsync_home())]
    statsync_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, statsync_home: PathBuf) -> Self {
        Self {
            log_level,
            statsync_home: statsync_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn statsync_home(&self) -> &DisplayPath {
        &self.statsync_home
    }
}

/// (Not shown): Args for the `statsync init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// Your marketplace username. Statements are downloaded for this account.
    #[arg(long)]
    username: String,
}

impl InitArgs {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

/// (Not shown): Args for the `statsync sync` command.
#[derive(Debug, Parser, Clone)]
pub struct SyncArgs {
    /// Discard the stored statements and download everything again.
    #[arg(long)]
    reload: bool,
}

impl SyncArgs {
    pub fn new(reload: bool) -> Self {
        Self { reload }
    }

    pub fn reload(&self) -> bool {
        self.reload
    }
}

/// (Not shown): Args for the `statsync currency` command.
#[derive(Debug, Parser, Clone)]
pub struct CurrencyArgs {
    /// A currency code such as EUR. Every stored amount is converted to it.
    #[arg(required_unless_present = "base", conflicts_with = "base")]
    code: Option<String>,

    /// Display amounts in the statement currency again.
    #[arg(long)]
    base: bool,
}

impl CurrencyArgs {
    pub fn new(code: Option<String>, base: bool) -> Self {
        Self { code, base }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn base(&self) -> bool {
        self.base
    }
}

/// (Not shown): Args for the `statsync rates-key` command.
#[derive(Debug, Parser, Clone)]
pub struct RatesKeyArgs {
    /// The app id from https://openexchangerates.org/signup/free
    key: String,
}

impl RatesKeyArgs {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// (Not shown): Args for the `statsync watch` command.
#[derive(Debug, Parser, Clone)]
pub struct WatchArgs {
    /// Turn automatic refresh on before watching.
    #[arg(long)]
    auto_refresh: bool,

    /// Minutes between automatic refreshes.
    #[arg(long)]
    every: Option<u64>,
}

impl WatchArgs {
    pub fn new(auto_refresh: bool, every: Option<u64>) -> Self {
        Self {
            auto_refresh,
            every,
        }
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub fn every(&self) -> Option<u64> {
        self.every
    }
}

fn default_statsync_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("statsync"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --statsync-home or STATSYNC_HOME instead of relying on the \
                default statsync home directory. If you continue using the program right now, you \
                may have problems!",
            );
            PathBuf::from("statsync")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}
