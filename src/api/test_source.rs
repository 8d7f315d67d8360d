//! In-memory implementations of the remote collaborators.
//!
//! Note: these are compiled even in the production build so that the whole program can be run,
//! top-to-bottom, without touching the marketplace or the rates service.

use super::{BatchSource, Fetch, RateSource, RateTable};
use crate::model::{Period, RawRecord, DATE_FORMAT};
use crate::Result;
use anyhow::bail;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// Serves statement batches from memory. Periods without a batch yield an empty batch.
#[derive(Debug, Default)]
pub struct TestBatchSource {
    batches: Mutex<BTreeMap<Period, Vec<RawRecord>>>,
    hints: Mutex<Vec<Period>>,
    failing: Mutex<BTreeSet<Period>>,
    fetched: Mutex<Vec<Period>>,
}

impl TestBatchSource {
    /// An empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// A source with a few sales in January and February 2024, advertising January as its oldest
    /// archive.
    pub fn seeded() -> Self {
        let source = Self::new();
        if let Ok(jan) = Period::new(2024, 1) {
            source.set_batch(jan, sales(jan, 5, "10.00"));
            source.set_batch(jan.next(), sales(jan.next(), 3, "10.00"));
            source.set_hints(vec![jan]);
        }
        source
    }

    pub fn set_batch(&self, period: Period, records: Vec<RawRecord>) {
        self.batches.lock().insert(period, records);
    }

    pub fn set_hints(&self, hints: Vec<Period>) {
        *self.hints.lock() = hints;
    }

    /// Makes every fetch of `period` fail until `heal` is called.
    pub fn fail_period(&self, period: Period) {
        self.failing.lock().insert(period);
    }

    pub fn heal(&self, period: Period) {
        self.failing.lock().remove(&period);
    }

    /// Every period fetched so far, in order.
    pub fn fetched(&self) -> Vec<Period> {
        self.fetched.lock().clone()
    }
}

#[async_trait::async_trait]
impl BatchSource for TestBatchSource {
    async fn fetch_period_batch(&self, period: Period) -> Result<Vec<RawRecord>> {
        self.fetched.lock().push(period);
        if self.failing.lock().contains(&period) {
            bail!("Statement download for {period} failed");
        }
        Ok(self.batches.lock().get(&period).cloned().unwrap_or_default())
    }

    async fn archive_hints(&self) -> Result<Vec<Period>> {
        Ok(self.hints.lock().clone())
    }
}

/// `count` sales of `amount` each, one per day starting on the first day of `period`.
pub fn sales(period: Period, count: u32, amount: &str) -> Vec<RawRecord> {
    (0..count)
        .map(|i| RawRecord {
            date: period
                .day(i + 1)
                .and_hms_opt(10, 0, 0)
                .unwrap_or_default()
                .format(DATE_FORMAT)
                .to_string(),
            kind: "sale".to_string(),
            detail: Some(format!("Sale {i}")),
            item_id: Some((1000 + i % 3).to_string()),
            amount: amount.to_string(),
            rate: None,
            price: None,
        })
        .collect()
}

/// Serves exchange rates from memory.
#[derive(Debug)]
pub struct TestRateSource {
    latest: Mutex<Option<RateTable>>,
    historical: Mutex<HashMap<NaiveDate, RateTable>>,
    /// Used for dates without an explicit table.
    fallback: Mutex<Option<RateTable>>,
    delay: Mutex<Option<Duration>>,
    latest_calls: AtomicUsize,
    historical_calls: AtomicUsize,
}

impl Default for TestRateSource {
    /// Every date, and the latest rates, convert USD to EUR at 0.9 and to GBP at 0.8.
    fn default() -> Self {
        let table = rate_table(&[("EUR", 0.9), ("GBP", 0.8), ("JPY", 150.0)]);
        Self::new(Some(table.clone()), Some(table))
    }
}

impl TestRateSource {
    pub fn new(latest: Option<RateTable>, fallback: Option<RateTable>) -> Self {
        Self {
            latest: Mutex::new(latest),
            historical: Mutex::new(HashMap::new()),
            fallback: Mutex::new(fallback),
            delay: Mutex::new(None),
            latest_calls: AtomicUsize::new(0),
            historical_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_latest(&self, table: Option<RateTable>) {
        *self.latest.lock() = table;
    }

    pub fn set_historical(&self, date: NaiveDate, table: RateTable) {
        self.historical.lock().insert(date, table);
    }

    /// Makes every fetch wait `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    pub fn historical_calls(&self) -> usize {
        self.historical_calls.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl RateSource for TestRateSource {
    async fn fetch_latest_rates(&self, _api_key: &str) -> Result<RateTable> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        match self.latest.lock().clone() {
            Some(table) => Ok(table),
            None => bail!("Latest rates are unavailable"),
        }
    }

    async fn fetch_historical_rates(&self, _api_key: &str, date: NaiveDate) -> Result<RateTable> {
        self.historical_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let explicit = self.historical.lock().get(&date).cloned();
        match explicit.or_else(|| self.fallback.lock().clone()) {
            Some(table) => Ok(table),
            None => bail!("Rates for {date} are unavailable"),
        }
    }
}

pub fn rate_table(entries: &[(&str, f64)]) -> RateTable {
    entries
        .iter()
        .map(|(code, rate)| (code.to_string(), *rate))
        .collect()
}

/// Serves `item:{id}.json` documents from memory and can be told to fail a number of times first.
#[derive(Debug, Default)]
pub struct TestFetch {
    documents: Mutex<HashMap<String, Value>>,
    failures_left: AtomicU32,
    calls: AtomicUsize,
}

impl TestFetch {
    pub fn set_document(&self, locator: impl Into<String>, value: Value) {
        self.documents.lock().insert(locator.into(), value);
    }

    /// The next `n` fetches fail.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Fetch for TestFetch {
    async fn fetch_json(&self, locator: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            bail!("Fetching {locator} failed");
        }
        if let Some(document) = self.documents.lock().get(locator) {
            return Ok(document.clone());
        }
        match locator
            .strip_prefix("item:")
            .and_then(|rest| rest.strip_suffix(".json"))
        {
            Some(id) => Ok(json!({ "item": { "id": id, "name": format!("Item {id}") } })),
            None => bail!("No document at {locator}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_batch_source_failure_and_heal() {
        let source = TestBatchSource::seeded();
        let jan = Period::new(2024, 1).unwrap();
        assert_eq!(source.fetch_period_batch(jan).await.unwrap().len(), 5);
        source.fail_period(jan);
        assert!(source.fetch_period_batch(jan).await.is_err());
        source.heal(jan);
        assert!(source.fetch_period_batch(jan).await.is_ok());
        assert_eq!(source.fetched(), vec![jan, jan, jan]);
    }

    #[tokio::test]
    async fn test_fetch_fails_then_recovers() {
        let fetch = TestFetch::default();
        fetch.fail_next(2);
        assert!(fetch.fetch_json("item:1.json").await.is_err());
        assert!(fetch.fetch_json("item:1.json").await.is_err());
        let doc = fetch.fetch_json("item:1.json").await.unwrap();
        assert_eq!(doc["item"]["id"], "1");
        assert_eq!(fetch.calls(), 3);
    }
}
