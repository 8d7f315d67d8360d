//! The conversion backfill: rewrites `amount_converted` for every stored period when the alternate
//! currency changes, and for the periods that are not final yet after each synchronization.
//!
//! Only one walk runs at a time. A request that arrives during a walk waits; a later request
//! replaces it. The walk looks for a waiting request before each period and, if it finds one, stops
//! and starts over for that request.

use crate::clock::Clock;
use crate::currency::{self, BASE_CURRENCY};
use crate::db::statements;
use crate::model::{decimal_to_store, Period};
use crate::query::Store;
use crate::rates::{MonthRate, Rates};
use crate::settings::Settings;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// How a conversion request ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BackfillOutcome {
    /// Every stored period was converted to this currency.
    Completed(String),
    /// Nothing to do. Carries the alternate currency in effect.
    Unchanged(Option<String>),
    /// A newer request took over before this one finished.
    Superseded,
}

struct Request {
    currency: String,
    reply: oneshot::Sender<BackfillOutcome>,
}

impl Request {
    fn answer(self, outcome: BackfillOutcome) {
        let _ = self.reply.send(outcome);
    }
}

/// Where a walk starts.
enum Start {
    /// A new alternate currency: every period from the oldest stored one.
    Fresh,
    /// Reconversion of the same currency from the given period onwards.
    From(Option<Period>),
}

#[derive(Default)]
struct State {
    updating: bool,
    waiting: Option<Request>,
}

pub struct Backfill {
    store: Arc<dyn Store>,
    rates: Arc<Rates>,
    settings: Arc<Settings>,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl Backfill {
    pub fn new(
        store: Arc<dyn Store>,
        rates: Arc<Rates>,
        settings: Arc<Settings>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            rates,
            settings,
            clock,
            state: Mutex::new(State::default()),
        })
    }

    pub fn is_updating(&self) -> bool {
        self.state.lock().updating
    }

    /// Makes `code` the alternate currency and converts every stored period to it.
    pub async fn set_alt_currency(self: &Arc<Self>, code: &str) -> BackfillOutcome {
        let currency = code.trim().to_uppercase();
        if let Some(unchanged) = self.unchanged(&currency) {
            return unchanged;
        }
        let (reply, outcome) = oneshot::channel();
        let request = Request { currency, reply };
        let start = {
            let mut state = self.state.lock();
            if state.updating {
                debug!("Conversion to {} waits for the running walk", request.currency);
                if let Some(previous) = state.waiting.replace(request) {
                    previous.answer(BackfillOutcome::Superseded);
                }
                None
            } else {
                state.updating = true;
                Some(request)
            }
        };
        if let Some(request) = start {
            self.spawn(request, Start::Fresh);
        }
        outcome.await.unwrap_or(BackfillOutcome::Superseded)
    }

    /// Reconverts the periods after `last_finalized`, or all of them when nothing is final yet.
    /// Does nothing without an alternate currency or while a walk is running.
    pub async fn resume(self: &Arc<Self>) -> BackfillOutcome {
        self.resume_from(None).await
    }

    /// Like `resume`, but also reconverts every period from `rewritten` on. Records replaced by a
    /// synchronization carry unconverted amounts even when their period was final.
    pub async fn resume_from(self: &Arc<Self>, rewritten: Option<Period>) -> BackfillOutcome {
        let Some(currency) = self.settings.currency_alt.get() else {
            return BackfillOutcome::Unchanged(None);
        };
        {
            let mut state = self.state.lock();
            if state.updating {
                return BackfillOutcome::Unchanged(Some(currency));
            }
            state.updating = true;
        }
        // No final period means a walk over everything stored.
        let from = self
            .settings
            .last_finalized
            .get()
            .map(|last| match rewritten {
                Some(rewritten) => rewritten.min(last.next()),
                None => last.next(),
            });
        let (reply, outcome) = oneshot::channel();
        self.spawn(Request { currency, reply }, Start::From(from));
        outcome.await.unwrap_or(BackfillOutcome::Superseded)
    }

    /// `Some` when a request for `currency` has nothing to do.
    fn unchanged(&self, currency: &str) -> Option<BackfillOutcome> {
        let active = self.settings.currency_alt.get();
        if currency == BASE_CURRENCY || active.as_deref() == Some(currency) {
            return Some(BackfillOutcome::Unchanged(active));
        }
        if !currency::is_known(currency) {
            warn!("Ignoring unknown currency '{currency}'");
            return Some(BackfillOutcome::Unchanged(active));
        }
        None
    }

    fn spawn(self: &Arc<Self>, request: Request, start: Start) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(request, start).await });
    }

    /// Takes the waiting request, or marks the backfill idle when there is none.
    fn next_or_idle(&self) -> Option<Request> {
        let mut state = self.state.lock();
        let next = state.waiting.take();
        if next.is_none() {
            state.updating = false;
        }
        next
    }

    async fn run(self: Arc<Self>, mut request: Request, mut start: Start) {
        loop {
            let from = match start {
                Start::From(from) => from,
                Start::Fresh => {
                    if let Some(unchanged) = self.unchanged(&request.currency) {
                        request.answer(unchanged);
                        match self.next_or_idle() {
                            Some(next) => {
                                request = next;
                                continue;
                            }
                            None => return,
                        }
                    }
                    info!("Converting every period to {}", request.currency);
                    self.settings
                        .currency_alt
                        .set(Some(request.currency.clone()), false);
                    self.settings.last_finalized.set(None, false);
                    None
                }
            };
            let from = match from {
                Some(from) => Some(from),
                None => match statements::oldest_period(self.store.as_ref()).await {
                    Ok(oldest) => oldest,
                    Err(e) => {
                        warn!("Unable to find the oldest stored period: {e:#}");
                        None
                    }
                },
            };

            if let Some(next) = self.walk(&request.currency, from).await {
                debug!("Conversion to {} superseded by {}", request.currency, next.currency);
                request.answer(BackfillOutcome::Superseded);
                request = next;
                start = Start::Fresh;
                continue;
            }

            let done = BackfillOutcome::Completed(request.currency.clone());
            request.answer(done);
            match self.next_or_idle() {
                Some(next) => {
                    request = next;
                    start = Start::Fresh;
                }
                None => return,
            }
        }
    }

    /// Converts every period from `from` through the current one. Returns the waiting request if
    /// one shows up before the walk is over.
    async fn walk(&self, currency: &str, from: Option<Period>) -> Option<Request> {
        let Some(from) = from else {
            debug!("No stored periods to convert");
            return None;
        };
        let current = self.clock.period();
        for period in from.through(current) {
            if let Some(next) = self.state.lock().waiting.take() {
                return Some(next);
            }
            let MonthRate { rate, is_final } = self.rates.final_month_rate(currency, period).await;
            let rate = rate.unwrap_or_else(|| {
                debug!("No {currency} rate for {period}, leaving amounts unconverted");
                Decimal::ONE
            });
            match statements::update_converted(self.store.as_ref(), period, decimal_to_store(rate))
                .await
            {
                Ok(rows) => debug!("Converted {rows} records of {period} at {rate}"),
                Err(e) => warn!("{e:#}"),
            }
            if is_final {
                self.finalize(period);
            }
        }
        None
    }

    /// Moves `last_finalized` forward to `period`, never backwards.
    fn finalize(&self, period: Period) {
        let last = self.settings.last_finalized.get();
        if last.map_or(true, |last| period > last) {
            self.settings.last_finalized.set(Some(period), false);
        }
    }
}

impl std::fmt::Debug for Backfill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Backfill")
            .field("updating", &state.updating)
            .field("waiting", &state.waiting.as_ref().map(|r| r.currency.as_str()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{sales, TestRateSource};
    use crate::clock::FixedClock;
    use crate::db::Db;
    use crate::model::StatementRecord;
    use crate::persist::{MemoryPersistence, Persistence};
    use crate::query::{Param, QueryResult};
    use chrono::NaiveDate;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        db: Arc<Db>,
        source: Arc<TestRateSource>,
        clock: Arc<FixedClock>,
        settings: Arc<Settings>,
        rates: Arc<Rates>,
        backfill: Arc<Backfill>,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Db::init(dir.path().join("statsync.sqlite")).await.unwrap());
        let jan = Period::new(2024, 1).unwrap();
        for (period, count) in [(jan, 5), (jan.next(), 3)] {
            let records: Vec<StatementRecord> = sales(period, count, "10.00")
                .iter()
                .map(|raw| StatementRecord::from_raw(raw).unwrap())
                .collect();
            statements::replace_period(db.as_ref(), period, &records)
                .await
                .unwrap();
        }

        let persistence: Arc<dyn Persistence> = Arc::new(MemoryPersistence::new());
        let clock = Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2024, 2, 20)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        ));
        let settings = Arc::new(Settings::new(persistence.clone(), clock.as_ref()));
        settings.oer_key.set(Some("key".to_string()), false);
        let source = Arc::new(TestRateSource::default());
        let rates = Rates::new(source.clone(), persistence, clock.clone(), settings.clone());
        let backfill = Backfill::new(db.clone(), rates.clone(), settings.clone(), clock.clone());
        Fixture {
            _dir: dir,
            db,
            source,
            clock,
            settings,
            rates,
            backfill,
        }
    }

    /// `(period, SUM(amount_converted))` per stored period.
    async fn converted(db: &Db) -> Vec<(String, f64)> {
        let result = db
            .execute(
                "SELECT strftime('%Y-%m', date) AS period, SUM(amount_converted) AS total \
                FROM statements GROUP BY strftime('%Y-%m', date) ORDER BY period",
                &[],
            )
            .await
            .unwrap();
        result
            .rows
            .iter()
            .map(|row| {
                let total = (row.f64("total").unwrap() * 1000.0).round() / 1000.0;
                (row.str("period").unwrap().to_string(), total)
            })
            .collect()
    }

    /// Passes everything to the database and remembers each conversion as `(rate, period key)`.
    struct UpdateLog {
        db: Arc<Db>,
        updates: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl Store for UpdateLog {
        async fn execute(&self, sql: &str, params: &[Param]) -> crate::Result<QueryResult> {
            if let [Param::Real(rate), Param::Text(period)] = params {
                if sql.starts_with("UPDATE") {
                    self.updates.lock().push((format!("{rate:.2}"), period.clone()));
                }
            }
            self.db.execute(sql, params).await
        }
    }

    fn jan() -> Period {
        Period::new(2024, 1).unwrap()
    }

    #[tokio::test]
    async fn test_full_walk_converts_and_finalizes() {
        let f = fixture().await;
        let outcome = f.backfill.set_alt_currency("eur").await;
        assert_eq!(outcome, BackfillOutcome::Completed("EUR".to_string()));
        assert_eq!(
            converted(&f.db).await,
            vec![("2024-01".to_string(), 45.0), ("2024-02".to_string(), 27.0)]
        );
        assert_eq!(f.settings.currency_alt.get().as_deref(), Some("EUR"));
        assert_eq!(f.settings.last_finalized.get(), Some(jan()));
        assert!(!f.backfill.is_updating());
    }

    #[tokio::test]
    async fn test_requests_with_nothing_to_do() {
        let f = fixture().await;
        assert_eq!(
            f.backfill.set_alt_currency("USD").await,
            BackfillOutcome::Unchanged(None)
        );
        assert_eq!(
            f.backfill.set_alt_currency("ABC").await,
            BackfillOutcome::Unchanged(None)
        );
        f.backfill.set_alt_currency("EUR").await;
        let calls = f.source.historical_calls() + f.source.latest_calls();
        assert_eq!(
            f.backfill.set_alt_currency("EUR").await,
            BackfillOutcome::Unchanged(Some("EUR".to_string()))
        );
        assert_eq!(f.source.historical_calls() + f.source.latest_calls(), calls);
    }

    #[tokio::test]
    async fn test_newer_requests_supersede_older_ones() {
        let f = fixture().await;
        f.source.set_delay(Duration::from_millis(40));

        let first = {
            let backfill = f.backfill.clone();
            tokio::spawn(async move { backfill.set_alt_currency("EUR").await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(f.backfill.is_updating());
        let second = {
            let backfill = f.backfill.clone();
            tokio::spawn(async move { backfill.set_alt_currency("GBP").await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let third = f.backfill.set_alt_currency("JPY").await;

        assert_eq!(first.await.unwrap(), BackfillOutcome::Superseded);
        assert_eq!(second.await.unwrap(), BackfillOutcome::Superseded);
        assert_eq!(third, BackfillOutcome::Completed("JPY".to_string()));
        assert_eq!(f.settings.currency_alt.get().as_deref(), Some("JPY"));
        assert_eq!(
            converted(&f.db).await,
            vec![("2024-01".to_string(), 7500.0), ("2024-02".to_string(), 4500.0)]
        );
        assert!(!f.backfill.is_updating());
    }

    #[tokio::test]
    async fn test_superseded_walk_stops_at_a_period_boundary() {
        let f = fixture().await;
        let log = Arc::new(UpdateLog {
            db: f.db.clone(),
            updates: Mutex::new(Vec::new()),
        });
        let backfill = Backfill::new(log.clone(), f.rates.clone(), f.settings.clone(), f.clock.clone());
        f.source.set_delay(Duration::from_millis(40));

        let first = {
            let backfill = backfill.clone();
            tokio::spawn(async move { backfill.set_alt_currency("EUR").await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = backfill.set_alt_currency("GBP").await;

        assert_eq!(first.await.unwrap(), BackfillOutcome::Superseded);
        assert_eq!(second, BackfillOutcome::Completed("GBP".to_string()));
        // The EUR walk converted January only; February never saw a EUR rate.
        let key = |p: Period| p.sql_key();
        assert_eq!(
            log.updates.lock().clone(),
            vec![
                ("0.90".to_string(), key(jan())),
                ("0.80".to_string(), key(jan())),
                ("0.80".to_string(), key(jan().next())),
            ]
        );
        assert_eq!(
            converted(&f.db).await,
            vec![("2024-01".to_string(), 40.0), ("2024-02".to_string(), 24.0)]
        );
    }

    #[tokio::test]
    async fn test_resume_leaves_final_periods_alone() {
        let f = fixture().await;
        f.backfill.set_alt_currency("EUR").await;

        f.clock.advance(chrono::Duration::hours(3));
        f.source
            .set_latest(Some(crate::api::rate_table(&[("EUR", 0.5)])));
        let outcome = f.backfill.resume().await;
        assert_eq!(outcome, BackfillOutcome::Completed("EUR".to_string()));
        assert_eq!(
            converted(&f.db).await,
            vec![("2024-01".to_string(), 45.0), ("2024-02".to_string(), 15.0)]
        );
        assert_eq!(f.settings.last_finalized.get(), Some(jan()));
    }

    #[tokio::test]
    async fn test_resume_from_reconverts_replaced_final_periods() {
        let f = fixture().await;
        f.backfill.set_alt_currency("EUR").await;
        assert_eq!(f.settings.last_finalized.get(), Some(jan()));

        // Replacing January writes unconverted amounts again.
        let records: Vec<StatementRecord> = sales(jan(), 5, "10.00")
            .iter()
            .map(|raw| StatementRecord::from_raw(raw).unwrap())
            .collect();
        statements::replace_period(f.db.as_ref(), jan(), &records)
            .await
            .unwrap();
        f.backfill.resume().await;
        assert_eq!(converted(&f.db).await[0], ("2024-01".to_string(), 50.0));

        let outcome = f.backfill.resume_from(Some(jan())).await;
        assert_eq!(outcome, BackfillOutcome::Completed("EUR".to_string()));
        assert_eq!(
            converted(&f.db).await,
            vec![("2024-01".to_string(), 45.0), ("2024-02".to_string(), 27.0)]
        );
        assert_eq!(f.settings.last_finalized.get(), Some(jan()));
    }

    #[tokio::test]
    async fn test_resume_without_alternate_currency() {
        let f = fixture().await;
        assert_eq!(f.backfill.resume().await, BackfillOutcome::Unchanged(None));
    }

    #[tokio::test]
    async fn test_missing_rates_fall_back_to_one() {
        let f = fixture().await;
        f.settings.oer_key.set(None, false);
        let outcome = f.backfill.set_alt_currency("GBP").await;
        assert_eq!(outcome, BackfillOutcome::Completed("GBP".to_string()));
        assert_eq!(
            converted(&f.db).await,
            vec![("2024-01".to_string(), 50.0), ("2024-02".to_string(), 30.0)]
        );
        assert_eq!(f.settings.last_finalized.get(), None);
    }

    #[tokio::test]
    async fn test_finalize_never_moves_backwards() {
        let f = fixture().await;
        f.backfill.finalize(jan());
        f.backfill.finalize(jan().prev());
        assert_eq!(f.settings.last_finalized.get(), Some(jan()));
        f.backfill.finalize(jan().next());
        assert_eq!(f.settings.last_finalized.get(), Some(jan().next()));
    }
}
