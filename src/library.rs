//! The composition root: one `Library` owns the settings, the query queue and the standard
//! queries, the rate cache, the backfill, the ingestion pipeline and the item resources, all wired
//! to the collaborators it is given.

use crate::api::{Fetch, Mode, Remotes};
use crate::backfill::{Backfill, BackfillOutcome};
use crate::clock::{Clock, SystemClock};
use crate::ingest::{Ingest, IngestOutcome};
use crate::persist::{JsonFilePersistence, Persistence, OPTIONS, RATES, RESOURCES, STORAGE};
use crate::queries::StandardQueries;
use crate::query::{Query, QueryQueue, QuerySpec, Store};
use crate::rates::Rates;
use crate::resource::Resource;
use crate::settings::Settings;
use crate::{Config, Result};
use anyhow::Context;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How long an item document stays fresh.
pub const ITEM_TTL_DAYS: i64 = 7;

pub struct Library {
    store: Arc<dyn Store>,
    persistence: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    fetch: Arc<dyn Fetch>,
    settings: Arc<Settings>,
    queue: Arc<QueryQueue>,
    queries: StandardQueries,
    rates: Arc<Rates>,
    backfill: Arc<Backfill>,
    ingest: Ingest,
    items: Mutex<HashMap<i64, Arc<Resource>>>,
    debounce: Duration,
}

impl Library {
    pub fn new(
        store: Arc<dyn Store>,
        remotes: Remotes,
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
        debounce: Duration,
    ) -> Self {
        let settings = Arc::new(Settings::new(persistence.clone(), clock.as_ref()));
        let queue = QueryQueue::new();
        let queries = StandardQueries::new(&settings, &queue, &store, debounce);
        let rates = Rates::new(
            remotes.rate_source,
            persistence.clone(),
            clock.clone(),
            settings.clone(),
        );
        let backfill = Backfill::new(store.clone(), rates.clone(), settings.clone(), clock.clone());
        let ingest = Ingest::new(
            remotes.batch_source,
            store.clone(),
            persistence.clone(),
            clock.clone(),
            settings.clone(),
            backfill.clone(),
        );
        Self {
            store,
            persistence,
            clock,
            fetch: remotes.fetch,
            settings,
            queue,
            queries,
            rates,
            backfill,
            ingest,
            items: Mutex::new(HashMap::new()),
            debounce,
        }
    }

    /// Builds the library for the data directory described by `config`.
    pub fn open(config: &Config, mode: Mode) -> Result<Self> {
        let remotes = Remotes::new(config, mode)?;
        let persistence = Arc::new(JsonFilePersistence::new(config.state_dir(), config.username()));
        let clock = Arc::new(SystemClock::new(config.source_utc_offset_minutes()));
        Ok(Self::new(
            Arc::new(config.db().clone()),
            remotes,
            persistence,
            clock,
            config.debounce(),
        ))
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn queries(&self) -> &StandardQueries {
        &self.queries
    }

    pub fn rates(&self) -> &Arc<Rates> {
        &self.rates
    }

    pub fn backfill(&self) -> &Arc<Backfill> {
        &self.backfill
    }

    pub fn ingest(&self) -> &Ingest {
        &self.ingest
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// A query of its own that shares the queue of the standard queries. `dependencies` are setting
    /// names.
    pub fn query(&self, name: &str, spec: QuerySpec, dependencies: &[&str]) -> Arc<Query> {
        Query::new(
            name,
            spec,
            self.settings.dependencies(dependencies),
            self.queue.clone(),
            self.store.clone(),
            self.debounce,
        )
    }

    /// The `item:{id}.json` resource, created on first use.
    pub fn item(&self, id: i64) -> Arc<Resource> {
        self.items
            .lock()
            .entry(id)
            .or_insert_with(|| {
                Resource::new(
                    format!("item:{id}"),
                    format!("item:{id}.json"),
                    chrono::Duration::days(ITEM_TTL_DAYS),
                    self.fetch.clone(),
                    self.persistence.clone(),
                    self.clock.clone(),
                )
            })
            .clone()
    }

    /// Downloads new statements, then refreshes the loaded standard queries and reconverts what is
    /// not final yet. Failed queries and item resources get another chance first.
    pub async fn sync(&self, reload: bool) -> Result<IngestOutcome> {
        self.retry_failed();
        self.ingest.run(reload, &self.queries.all()).await
    }

    fn retry_failed(&self) {
        let items: Vec<_> = self.items.lock().values().cloned().collect();
        for item in items.iter().filter(|item| item.is_failed()) {
            debug!("Retrying resource '{}'", item.name());
            item.reset();
        }
        for query in self.queries.all().iter().filter(|query| query.is_failed()) {
            debug!("Retrying query '{}'", query.name());
            query.invalidate();
        }
    }

    pub async fn set_alt_currency(&self, code: &str) -> BackfillOutcome {
        self.backfill.set_alt_currency(code).await
    }

    /// Forgets every stored setting, cached resource, cached rate and the sync cursor, then puts
    /// the settings back to their defaults. Stored statements are kept.
    pub fn reset(&self) -> Result<()> {
        for key in [OPTIONS, RESOURCES, RATES, STORAGE] {
            self.persistence
                .clear(key)
                .with_context(|| format!("Unable to clear the {key} cache"))?;
        }
        self.settings.reset_all();
        let items: Vec<_> = self.items.lock().drain().map(|(_, item)| item).collect();
        for item in items {
            item.reset();
        }
        for query in self.queries.all() {
            query.reset();
        }
        debug!("Library reset");
        Ok(())
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("settings", &self.settings)
            .field("queue", &self.queue)
            .field("ingest", &self.ingest)
            .field("backfill", &self.backfill)
            .finish()
    }
}
