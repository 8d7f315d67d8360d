//! The remote collaborators: the marketplace statement source, the currency rate service and the
//! JSON fetcher used by remote resources.
//!
//! Each one is a trait so that the whole program can run against in-memory data. The in-memory
//! implementations are compiled into the production binary and selected with
//! `STATSYNC_IN_TEST_MODE`.

mod fetch;
mod rates;
mod statements;
mod test_source;

use crate::model::{Period, RawRecord};
use crate::{Config, Result};
use anyhow::Context;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub use fetch::HttpFetch;
pub use rates::OpenExchangeRates;
pub use statements::{normalize_header, parse_archive_hints, parse_statement_csv, HttpBatchSource};
pub use test_source::{rate_table, sales, TestBatchSource, TestFetch, TestRateSource};

/// When this environment variable is set and non-empty, every remote collaborator is replaced by
/// its in-memory counterpart.
pub const TEST_MODE_ENV: &str = "STATSYNC_IN_TEST_MODE";

/// Exchange rates keyed by currency code, relative to the base currency.
pub type RateTable = BTreeMap<String, f64>;

/// Supplies the monthly statement batches.
#[async_trait::async_trait]
pub trait BatchSource: Send + Sync {
    async fn fetch_period_batch(&self, period: Period) -> Result<Vec<RawRecord>>;

    /// Periods the source advertises as having archived statements. The earliest of them is where
    /// a first synchronization starts.
    async fn archive_hints(&self) -> Result<Vec<Period>>;
}

/// Supplies currency exchange rates.
#[async_trait::async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_latest_rates(&self, api_key: &str) -> Result<RateTable>;

    async fn fetch_historical_rates(&self, api_key: &str, date: NaiveDate) -> Result<RateTable>;
}

/// Fetches the JSON document behind a remote resource locator.
#[async_trait::async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch_json(&self, locator: &str) -> Result<serde_json::Value>;
}

/// Which implementations of the remote collaborators to use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Live,
    Testing,
}

impl Mode {
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !value.is_empty() => Mode::Testing,
            _ => Mode::Live,
        }
    }
}

/// The remote collaborators a `Library` is built with.
#[derive(Clone)]
pub struct Remotes {
    pub batch_source: Arc<dyn BatchSource>,
    pub rate_source: Arc<dyn RateSource>,
    pub fetch: Arc<dyn Fetch>,
}

impl Remotes {
    /// Builds the remotes for `mode`. Live remotes share one HTTP client configured from `config`.
    pub fn new(config: &Config, mode: Mode) -> Result<Self> {
        match mode {
            Mode::Testing => Ok(Self::testing()),
            Mode::Live => {
                let client = http_client(config.http_timeout())?;
                Ok(Self {
                    batch_source: Arc::new(HttpBatchSource::new(
                        client.clone(),
                        config.username(),
                        config.statement_url(),
                        config.statement_page_url(),
                    )),
                    rate_source: Arc::new(OpenExchangeRates::new(
                        client.clone(),
                        config.rates_latest_url(),
                        config.rates_historical_url(),
                    )),
                    fetch: Arc::new(HttpFetch::new(client, config.api_url())?),
                })
            }
        }
    }

    /// In-memory remotes seeded with a small amount of data.
    pub fn testing() -> Self {
        Self {
            batch_source: Arc::new(TestBatchSource::seeded()),
            rate_source: Arc::new(TestRateSource::default()),
            fetch: Arc::new(TestFetch::default()),
        }
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Unable to build the HTTP client")
}

/// GETs `url` and returns the body, failing on non-success statuses.
async fn get_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Request to {url} failed"))?
        .error_for_status()
        .with_context(|| format!("Request to {url} was rejected"))?;
    response
        .text()
        .await
        .with_context(|| format!("Unable to read the response from {url}"))
}
