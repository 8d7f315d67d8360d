//! Currency rate lookups on top of a `RateSource`.
//!
//! Latest rates are kept for two hours and historical rates forever, both in the `rates`
//! persistence object. Lookups of the same table that overlap share a single remote call.

use crate::api::{RateSource, RateTable};
use crate::clock::Clock;
use crate::currency::BASE_CURRENCY;
use crate::model::{decimal_from_store, Period};
use crate::persist::{Persistence, RATES};
use crate::settings::Settings;
use chrono::{Datelike, NaiveDate};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// How long the latest rates are trusted, in milliseconds.
pub const LATEST_TTL_MS: i64 = 2 * 60 * 60 * 1000;

const LATEST_KEY: &str = "current";

/// The rate that converts one month, and whether it will ever change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRate {
    pub rate: Option<Decimal>,
    pub is_final: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableKey {
    Latest,
    On(NaiveDate),
}

impl TableKey {
    fn name(&self) -> String {
        match self {
            TableKey::Latest => LATEST_KEY.to_string(),
            TableKey::On(date) => date.format("%Y-%m-%d").to_string(),
        }
    }
}

type Waiters = Vec<oneshot::Sender<Option<RateTable>>>;

pub struct Rates {
    source: Arc<dyn RateSource>,
    persistence: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    settings: Arc<Settings>,
    in_flight: Mutex<HashMap<String, Waiters>>,
}

impl Rates {
    pub fn new(
        source: Arc<dyn RateSource>,
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
        settings: Arc<Settings>,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            persistence,
            clock,
            settings,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// The latest rate of `currency` against the base currency.
    pub async fn current_rate(self: &Arc<Self>, currency: &str) -> Option<Decimal> {
        if currency == BASE_CURRENCY {
            return Some(Decimal::ONE);
        }
        lookup(&self.table(TableKey::Latest).await?, currency)
    }

    /// The rate of `currency` on `date`.
    pub async fn rate_on(self: &Arc<Self>, currency: &str, date: NaiveDate) -> Option<Decimal> {
        if currency == BASE_CURRENCY {
            return Some(Decimal::ONE);
        }
        lookup(&self.table(TableKey::On(date)).await?, currency)
    }

    /// The rate that converts the records of `period`.
    ///
    /// The current period, and the previous one until the conversion day of this month, use the
    /// latest rate and may be converted again later. Older periods use the rate of the conversion
    /// day of the following month and are final once that rate is known.
    pub async fn final_month_rate(self: &Arc<Self>, currency: &str, period: Period) -> MonthRate {
        let today = self.clock.today();
        let current = Period::from_date(today);
        let convert_day = self.settings.convert_day.get();
        let live = period >= current || (period == current.prev() && today.day() < convert_day);
        if live {
            return MonthRate {
                rate: self.current_rate(currency).await,
                is_final: false,
            };
        }
        let rate = self.rate_on(currency, period.next().day(convert_day)).await;
        MonthRate {
            rate,
            is_final: rate.is_some(),
        }
    }

    /// Loads the latest rates, which also refreshes `currency_current_rate`.
    pub async fn refresh_current_rate(self: &Arc<Self>) {
        let currency = self.settings.currency.get();
        if currency == BASE_CURRENCY {
            self.settings.currency_current_rate.set(None, false);
            return;
        }
        let rate = self.current_rate(&currency).await;
        self.settings.currency_current_rate.set(rate, false);
    }

    async fn table(self: &Arc<Self>, key: TableKey) -> Option<RateTable> {
        if let Some(table) = self.cached(key) {
            return Some(table);
        }
        let Some(api_key) = self.settings.oer_key.get() else {
            debug!("No rates API key, rates for {} are unavailable", key.name());
            return None;
        };

        let (tx, rx) = oneshot::channel();
        let first = {
            let mut in_flight = self.in_flight.lock();
            let waiters = in_flight.entry(key.name()).or_default();
            waiters.push(tx);
            waiters.len() == 1
        };
        if first {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let table = this.fetch(key, &api_key).await;
                let waiters = this.in_flight.lock().remove(&key.name()).unwrap_or_default();
                for waiter in waiters {
                    let _ = waiter.send(table.clone());
                }
            });
        } else {
            trace!("Joining the pending request for rates {}", key.name());
        }
        rx.await.ok().flatten()
    }

    fn cached(&self, key: TableKey) -> Option<RateTable> {
        let name = key.name();
        let entry = match self.persistence.get_entry(RATES, &name) {
            Ok(entry) => entry?,
            Err(e) => {
                debug!("Unable to read cached rates {name}: {e:#}");
                return None;
            }
        };
        let table = match key {
            TableKey::On(_) => entry,
            TableKey::Latest => {
                let fetched = entry.get("date").and_then(Value::as_i64).unwrap_or_default();
                if fetched + LATEST_TTL_MS <= self.clock.timestamp_millis() {
                    trace!("Latest rates expired");
                    self.store(&name, None);
                    return None;
                }
                entry.get("rates").cloned().unwrap_or(Value::Null)
            }
        };
        serde_json::from_value(table).ok()
    }

    async fn fetch(&self, key: TableKey, api_key: &str) -> Option<RateTable> {
        let result = match key {
            TableKey::Latest => self.source.fetch_latest_rates(api_key).await,
            TableKey::On(date) => self.source.fetch_historical_rates(api_key, date).await,
        };
        let table = match result {
            Ok(table) => table,
            Err(e) => {
                warn!("Unable to load rates {}: {e:#}", key.name());
                if key == TableKey::Latest {
                    self.settings.currency_current_rate.set(None, false);
                }
                return None;
            }
        };
        match key {
            TableKey::Latest => {
                let entry = json!({ "date": self.clock.timestamp_millis(), "rates": table });
                self.store(LATEST_KEY, Some(entry));
                let displayed = self.settings.currency.get();
                let rate = if displayed == BASE_CURRENCY {
                    None
                } else {
                    lookup(&table, &displayed)
                };
                self.settings.currency_current_rate.set(rate, false);
            }
            TableKey::On(_) => self.store(&key.name(), Some(json!(table))),
        }
        Some(table)
    }

    fn store(&self, name: &str, entry: Option<Value>) {
        if let Err(e) = self.persistence.set_entry(RATES, name, entry) {
            warn!("Unable to cache rates {name}: {e:#}");
        }
    }
}

fn lookup(table: &RateTable, currency: &str) -> Option<Decimal> {
    table.get(currency).copied().map(decimal_from_store)
}

impl std::fmt::Debug for Rates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rates")
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}
