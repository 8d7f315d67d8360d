//! The ingestion pipeline: downloads monthly statement batches into the local store.
//!
//! A run starts at the period of the sync cursor, or for a first run at the oldest archived period
//! the source advertises, and goes through the current period. Each period is replaced as a whole,
//! so running again over the same period changes nothing. The cursor only moves once every period
//! went in, which makes an interrupted run resume where it failed.

use crate::api::BatchSource;
use crate::backfill::{Backfill, BackfillOutcome};
use crate::clock::Clock;
use crate::db::statements;
use crate::hub::{Hub, Notifiable};
use crate::model::{Period, StatementRecord};
use crate::persist::{Persistence, STORAGE};
use crate::query::{Query, Store};
use crate::settings::Settings;
use crate::Result;
use anyhow::Context;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

const CURSOR_MONTH: &str = "last-month";
const CURSOR_YEAR: &str = "last-year";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestState {
    Idle,
    DeterminingRange,
    Downloading(Period),
    Finalizing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IngestEvent {
    Started { reload: bool },
    /// About to download `period`, the `current`th of `total`.
    Progress { current: u32, total: u32, period: Period },
    Finished(IngestReport),
    Failed(String),
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub periods: u32,
    pub inserted: u64,
    /// Rows that could not be parsed or stored.
    pub failed_rows: u64,
    /// The reconversion run after the download, when an alternate currency is active.
    pub backfill: Option<BackfillOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IngestOutcome {
    Completed(IngestReport),
    /// Another run was in progress.
    Skipped,
}

/// Puts the pipeline back to idle when a run ends, however it ends.
struct Running<'a> {
    state: &'a Mutex<IngestState>,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        *self.state.lock() = IngestState::Idle;
    }
}

pub struct Ingest {
    source: Arc<dyn BatchSource>,
    store: Arc<dyn Store>,
    persistence: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    settings: Arc<Settings>,
    backfill: Arc<Backfill>,
    state: Mutex<IngestState>,
    hub: Hub<IngestEvent>,
}

impl Ingest {
    pub fn new(
        source: Arc<dyn BatchSource>,
        store: Arc<dyn Store>,
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
        settings: Arc<Settings>,
        backfill: Arc<Backfill>,
    ) -> Self {
        Self {
            source,
            store,
            persistence,
            clock,
            settings,
            backfill,
            state: Mutex::new(IngestState::Idle),
            hub: Hub::new(),
        }
    }

    pub fn state(&self) -> IngestState {
        *self.state.lock()
    }

    /// The first period the next run will download again, if a run has completed.
    pub fn cursor(&self) -> Option<Period> {
        let read = |name: &str| match self.persistence.get_entry(STORAGE, name) {
            Ok(value) => value.and_then(|v| v.as_i64()),
            Err(e) => {
                debug!("Unable to read the sync cursor: {e:#}");
                None
            }
        };
        let month = u32::try_from(read(CURSOR_MONTH)?).ok()?;
        let year = i32::try_from(read(CURSOR_YEAR)?).ok()?;
        Period::new(year, month).ok()
    }

    fn save_cursor(&self, cursor: Option<Period>) -> Result<()> {
        self.persistence
            .update_object(STORAGE, &mut |storage| match cursor {
                Some(period) => {
                    storage.insert(CURSOR_MONTH.to_string(), json!(period.month()));
                    storage.insert(CURSOR_YEAR.to_string(), json!(period.year()));
                }
                None => {
                    storage.remove(CURSOR_MONTH);
                    storage.remove(CURSOR_YEAR);
                }
            })
            .context("Unable to save the sync cursor")
    }

    fn begin(&self) -> Option<Running<'_>> {
        let mut state = self.state.lock();
        if *state != IngestState::Idle {
            return None;
        }
        *state = IngestState::DeterminingRange;
        Some(Running { state: &self.state })
    }

    fn enter(&self, state: IngestState) {
        *self.state.lock() = state;
    }

    /// Downloads every period from the cursor through the current one. With `reload`, the store,
    /// the cursor and the finalization marker are cleared first. Loaded `queries` are re-executed
    /// once the download is over, and every replaced period is converted again.
    pub async fn run(&self, reload: bool, queries: &[Arc<Query>]) -> Result<IngestOutcome> {
        let Some(_running) = self.begin() else {
            info!("A synchronization is already running");
            return Ok(IngestOutcome::Skipped);
        };
        self.hub.notify(&IngestEvent::Started { reload });
        match self.download(reload, queries).await {
            Ok(report) => {
                self.hub.notify(&IngestEvent::Finished(report.clone()));
                Ok(IngestOutcome::Completed(report))
            }
            Err(e) => {
                warn!("Synchronization failed: {e:#}");
                self.hub.notify(&IngestEvent::Failed(format!("{e:#}")));
                Err(e)
            }
        }
    }

    async fn download(&self, reload: bool, queries: &[Arc<Query>]) -> Result<IngestReport> {
        if reload {
            info!("Reloading every statement");
            statements::clear(self.store.as_ref()).await?;
            self.save_cursor(None)?;
            self.settings.last_finalized.set(None, false);
        }

        let current = self.clock.period();
        let start = match self.cursor() {
            Some(cursor) => cursor,
            None => self.oldest_archive().await?.unwrap_or(current),
        }
        .min(current);
        let total = start.count_through(current).max(1);
        debug!("Synchronizing {total} periods from {start} through {current}");

        let mut report = IngestReport::default();
        for (period, index) in start.through(current).zip(1..) {
            self.enter(IngestState::Downloading(period));
            self.hub.notify(&IngestEvent::Progress {
                current: index,
                total,
                period,
            });
            let batch = self
                .source
                .fetch_period_batch(period)
                .await
                .with_context(|| format!("Unable to download the statement of {period}"))?;

            let mut records = Vec::with_capacity(batch.len());
            for raw in &batch {
                match StatementRecord::from_raw(raw) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!("Skipping a statement line of {period}: {e:#}");
                        report.failed_rows += 1;
                    }
                }
            }
            let replaced = statements::replace_period(self.store.as_ref(), period, &records).await?;
            report.periods += 1;
            report.inserted += replaced.inserted;
            report.failed_rows += replaced.failed;
        }

        self.enter(IngestState::Finalizing);
        self.save_cursor(Some(current))?;
        for query in queries {
            query.reload();
        }
        self.refresh_first_sale().await;
        if self.settings.currency_alt.get().is_some() {
            report.backfill = Some(self.backfill.resume_from(Some(start)).await);
        }
        info!(
            "Synchronized {} periods, {} records",
            report.periods, report.inserted
        );
        Ok(report)
    }

    async fn oldest_archive(&self) -> Result<Option<Period>> {
        let hints = self
            .source
            .archive_hints()
            .await
            .context("Unable to list the archived statements")?;
        Ok(hints.into_iter().min())
    }

    async fn refresh_first_sale(&self) {
        match statements::first_sale(self.store.as_ref()).await {
            Ok(first) => self.settings.first_sale.set(first, false),
            Err(e) => warn!("Unable to find the first sale: {e:#}"),
        }
    }
}

impl Notifiable for Ingest {
    type Event = IngestEvent;

    fn hub(&self) -> &Hub<IngestEvent> {
        &self.hub
    }
}

impl std::fmt::Debug for Ingest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingest")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{sales, TestBatchSource, TestRateSource};
    use crate::clock::FixedClock;
    use crate::db::Db;
    use crate::persist::MemoryPersistence;
    use crate::rates::Rates;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        db: Arc<Db>,
        source: Arc<TestBatchSource>,
        settings: Arc<Settings>,
        ingest: Ingest,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Db::init(dir.path().join("statsync.sqlite")).await.unwrap());
        let persistence: Arc<dyn Persistence> = Arc::new(MemoryPersistence::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2024, 2, 20)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        ));
        let settings = Arc::new(Settings::new(persistence.clone(), clock.as_ref()));
        let rates = Rates::new(
            Arc::new(TestRateSource::default()),
            persistence.clone(),
            clock.clone(),
            settings.clone(),
        );
        let backfill = Backfill::new(db.clone(), rates, settings.clone(), clock.clone());
        let source = Arc::new(TestBatchSource::seeded());
        let ingest = Ingest::new(
            source.clone(),
            db.clone(),
            persistence,
            clock,
            settings.clone(),
            backfill,
        );
        Fixture {
            _dir: dir,
            db,
            source,
            settings,
            ingest,
        }
    }

    fn jan() -> Period {
        Period::new(2024, 1).unwrap()
    }

    async fn completed(f: &Fixture, reload: bool) -> IngestReport {
        match f.ingest.run(reload, &[]).await.unwrap() {
            IngestOutcome::Completed(report) => report,
            IngestOutcome::Skipped => panic!("the run was skipped"),
        }
    }

    #[tokio::test]
    async fn test_first_run_starts_at_the_oldest_archive() {
        let f = fixture().await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        f.ingest.subscribe(move |e| {
            let _ = tx.send(e.clone());
        });

        let report = completed(&f, false).await;
        assert_eq!(report.periods, 2);
        assert_eq!(report.inserted, 8);
        assert_eq!(report.backfill, None);
        assert_eq!(f.source.fetched(), vec![jan(), jan().next()]);
        assert_eq!(f.ingest.cursor(), Some(jan().next()));
        assert_eq!(f.ingest.state(), IngestState::Idle);
        assert_eq!(f.settings.first_sale.get(), NaiveDate::from_ymd_opt(2024, 1, 1));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events[0], IngestEvent::Started { reload: false });
        assert_eq!(
            events[2],
            IngestEvent::Progress {
                current: 2,
                total: 2,
                period: jan().next()
            }
        );
        assert!(matches!(events.last(), Some(IngestEvent::Finished(_))));
    }

    #[tokio::test]
    async fn test_next_run_resumes_at_the_cursor() {
        let f = fixture().await;
        completed(&f, false).await;
        let report = completed(&f, false).await;
        assert_eq!(report.periods, 1);
        assert_eq!(f.source.fetched().last(), Some(&jan().next()));
        assert_eq!(statements::count(f.db.as_ref()).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_failed_download_keeps_the_cursor() {
        let f = fixture().await;
        f.source.fail_period(jan().next());
        assert!(f.ingest.run(false, &[]).await.is_err());
        assert_eq!(f.ingest.cursor(), None);
        assert_eq!(f.ingest.state(), IngestState::Idle);
        assert_eq!(statements::count(f.db.as_ref()).await.unwrap(), 5);

        f.source.heal(jan().next());
        let report = completed(&f, false).await;
        assert_eq!(report.periods, 2);
        assert_eq!(statements::count(f.db.as_ref()).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_reload_replaces_everything() {
        let f = fixture().await;
        completed(&f, false).await;
        f.settings.last_finalized.set(Some(jan()), false);
        f.source.set_batch(jan(), sales(jan(), 2, "5.00"));

        let report = completed(&f, true).await;
        assert_eq!(report.periods, 2);
        assert_eq!(statements::count(f.db.as_ref()).await.unwrap(), 5);
        assert_eq!(f.settings.last_finalized.get(), None);
    }

    #[tokio::test]
    async fn test_without_cursor_or_archive_only_the_current_period() {
        let f = fixture().await;
        f.source.set_hints(vec![]);
        let report = completed(&f, false).await;
        assert_eq!(report.periods, 1);
        assert_eq!(f.source.fetched(), vec![jan().next()]);
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() {
        let f = fixture().await;
        let (first, second) = tokio::join!(f.ingest.run(false, &[]), f.ingest.run(false, &[]));
        assert!(matches!(first.unwrap(), IngestOutcome::Completed(_)));
        assert_eq!(second.unwrap(), IngestOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_unparsable_lines_are_counted() {
        let f = fixture().await;
        let mut batch = sales(jan(), 2, "1.00");
        batch[0].date = "yesterday".to_string();
        f.source.set_batch(jan(), batch);
        let report = completed(&f, false).await;
        assert_eq!(report.failed_rows, 1);
        assert_eq!(report.inserted, 4);
    }
}
