//! Derived query cells.
//!
//! A `Query` caches the result of one store query whose text and parameters are computed from the
//! current values of its dependencies. When a dependency changes the cached result is dropped and a
//! single re-execution is scheduled after a short debounce, however many changes arrive in the
//! meantime. Executions of every query sharing a `QueryQueue` run one at a time, first come first
//! served.

use crate::hub::{Hub, Notifiable, SubscriptionId};
use crate::model::decimal_from_store;
use crate::setting::Dependency;
use crate::Result;
use anyhow::bail;
use chrono::NaiveDate;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// The default delay between a dependency change and the re-execution it causes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(20);

/// A positional SQL parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Param {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<u32> for Param {
    fn from(value: u32) -> Self {
        Param::Int(i64::from(value))
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Param::Real(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Param::Null)
    }
}

/// One result row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn i64(&self, column: &str) -> Option<i64> {
        let value = self.get(column)?;
        value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
    }

    pub fn f64(&self, column: &str) -> Option<f64> {
        self.get(column)?.as_f64()
    }

    pub fn str(&self, column: &str) -> Option<&str> {
        self.get(column)?.as_str()
    }

    /// A money column. `NULL`, which is what `SUM` yields over no rows, reads as `None`.
    pub fn decimal(&self, column: &str) -> Option<Decimal> {
        self.f64(column).map(decimal_from_store)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Row(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
}

impl QueryResult {
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }
}

/// Executes SQL against the local statement store.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn execute(&self, sql: &str, params: &[Param]) -> Result<QueryResult>;
}

/// The values of a query's dependencies at the moment it executes, keyed by dependency name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot(BTreeMap<String, Value>);

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name)?.as_bool()
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name)?.as_i64()
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name)?.as_str()
    }

    /// A dependency holding a `YYYY-MM-DD` date.
    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.str(name)?, "%Y-%m-%d").ok()
    }
}

type SqlFn = Arc<dyn Fn(&Snapshot) -> String + Send + Sync>;
type ParamsFn = Arc<dyn Fn(&Snapshot) -> Vec<Param> + Send + Sync>;

/// How a query computes its SQL text and parameters.
#[derive(Clone)]
pub struct QuerySpec {
    sql: SqlFn,
    params: ParamsFn,
}

impl QuerySpec {
    pub fn fixed(sql: impl Into<String>, params: Vec<Param>) -> Self {
        let sql = sql.into();
        Self {
            sql: Arc::new(move |_| sql.clone()),
            params: Arc::new(move |_| params.clone()),
        }
    }

    pub fn dynamic<S, P>(sql: S, params: P) -> Self
    where
        S: Fn(&Snapshot) -> String + Send + Sync + 'static,
        P: Fn(&Snapshot) -> Vec<Param> + Send + Sync + 'static,
    {
        Self {
            sql: Arc::new(sql),
            params: Arc::new(params),
        }
    }

    pub fn sql(&self, snapshot: &Snapshot) -> String {
        (self.sql)(snapshot)
    }

    pub fn params(&self, snapshot: &Snapshot) -> Vec<Param> {
        (self.params)(snapshot)
    }
}

#[derive(Debug, Clone)]
pub enum QueryEvent {
    Loaded(Arc<QueryResult>),
    Failed(String),
}

/// The FIFO through which queries execute, one at a time.
#[derive(Default)]
pub struct QueryQueue {
    entries: Mutex<VecDeque<Weak<Query>>>,
}

impl Debug for QueryQueue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryQueue")
            .field("len", &self.len())
            .finish()
    }
}

impl QueryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `query` and starts draining if the queue was empty.
    fn push(self: &Arc<Self>, query: Weak<Query>) {
        let start = {
            let mut entries = self.entries.lock();
            entries.push_back(query);
            entries.len() == 1
        };
        if !start {
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(Arc::clone(self).drain());
            }
            Err(_) => {
                warn!("Query queue used outside of a runtime, dropping its entries");
                let dropped: Vec<Weak<Query>> = self.entries.lock().drain(..).collect();
                for query in dropped.iter().filter_map(Weak::upgrade) {
                    query.state.lock().loading = false;
                }
            }
        }
    }

    /// Executes the front entry, removes it once its observers have been told, and moves on until
    /// the queue is empty.
    async fn drain(self: Arc<Self>) {
        loop {
            let front = self.entries.lock().front().cloned();
            let Some(front) = front else {
                return;
            };
            if let Some(query) = front.upgrade() {
                query.execute().await;
            }
            let done = {
                let mut entries = self.entries.lock();
                entries.pop_front();
                entries.is_empty()
            };
            if done {
                return;
            }
        }
    }
}

#[derive(Default)]
struct State {
    result: Option<Arc<QueryResult>>,
    loading: bool,
    failed: bool,
    /// Bumped on every invalidation so that an execution that raced with one is discarded.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

pub struct Query {
    name: String,
    spec: QuerySpec,
    dependencies: Vec<Arc<dyn Dependency>>,
    subscriptions: Vec<SubscriptionId>,
    queue: Arc<QueryQueue>,
    store: Arc<dyn Store>,
    debounce: Duration,
    state: Mutex<State>,
    hub: Hub<QueryEvent>,
    this: Weak<Query>,
}

impl Query {
    /// Creates the query and subscribes it to every dependency. Nothing executes until `get` or
    /// `load` is called.
    pub fn new(
        name: impl Into<String>,
        spec: QuerySpec,
        dependencies: Vec<Arc<dyn Dependency>>,
        queue: Arc<QueryQueue>,
        store: Arc<dyn Store>,
        debounce: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Query>| {
            let subscriptions = dependencies
                .iter()
                .map(|dependency| {
                    let this = this.clone();
                    dependency.changes().subscribe(move |_| {
                        if let Some(query) = this.upgrade() {
                            query.invalidate();
                        }
                    })
                })
                .collect();
            Query {
                name: name.into(),
                spec,
                dependencies,
                subscriptions,
                queue,
                store,
                debounce,
                state: Mutex::new(State::default()),
                hub: Hub::new(),
                this: this.clone(),
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cached result, or `None` after starting a load.
    pub fn get(&self) -> Option<Arc<QueryResult>> {
        let cached = self.state.lock().result.clone();
        if cached.is_none() {
            self.load();
        }
        cached
    }

    /// Queues an execution unless one is already pending or the query has failed.
    pub fn load(&self) {
        {
            let mut state = self.state.lock();
            if state.loading || state.failed {
                return;
            }
            state.loading = true;
        }
        trace!("Queueing query '{}'", self.name);
        self.queue.push(self.this.clone());
    }

    /// Re-executes the query if it currently holds a result.
    pub fn reload(&self) {
        if self.is_loaded() {
            self.load();
        }
    }

    /// Drops the cached result and the failure flag, then schedules a debounced load.
    pub fn invalidate(&self) {
        {
            let mut state = self.state.lock();
            state.result = None;
            state.failed = false;
            state.generation += 1;
        }
        self.delay_load();
    }

    /// Drops the cached result and the failure flag without scheduling anything.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.result = None;
        state.failed = false;
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().result.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.state.lock().failed
    }

    /// Waits for the result, loading it first if needed.
    pub async fn result(&self) -> Result<Arc<QueryResult>> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let id = self.hub.subscribe(move |event: &QueryEvent| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(event.clone());
            }
        });
        let outcome = self.wait_for(rx).await;
        self.hub.unsubscribe(id);
        outcome
    }

    async fn wait_for(&self, rx: oneshot::Receiver<QueryEvent>) -> Result<Arc<QueryResult>> {
        {
            let state = self.state.lock();
            if let Some(result) = &state.result {
                return Ok(Arc::clone(result));
            }
            if state.failed {
                bail!("Query '{}' has failed", self.name);
            }
        }
        self.load();
        match rx.await {
            Ok(QueryEvent::Loaded(result)) => Ok(result),
            Ok(QueryEvent::Failed(message)) => bail!("Query '{}' failed: {message}", self.name),
            Err(_) => bail!("Query '{}' went away", self.name),
        }
    }

    /// Restarts the debounce timer.
    fn delay_load(&self) {
        let Ok(handle) = Handle::try_current() else {
            warn!("Query '{}' invalidated outside of a runtime", self.name);
            return;
        };
        let this = self.this.clone();
        let debounce = self.debounce;
        let mut state = self.state.lock();
        let timer = handle.spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Some(query) = this.upgrade() {
                query.debounce_elapsed();
            }
        });
        if let Some(previous) = state.timer.replace(timer) {
            previous.abort();
        }
    }

    fn debounce_elapsed(&self) {
        {
            let mut state = self.state.lock();
            state.timer = None;
            // An execution queued before the change already ran with the new values.
            if state.result.is_some() {
                return;
            }
        }
        self.load();
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot(
            self.dependencies
                .iter()
                .map(|d| (d.name().to_string(), d.json_value()))
                .collect(),
        )
    }

    async fn execute(&self) {
        let generation = self.state.lock().generation;
        let snapshot = self.snapshot();
        let sql = self.spec.sql(&snapshot);
        let params = self.spec.params(&snapshot);
        trace!("Executing query '{}': {sql}", self.name);
        let outcome = self.store.execute(&sql, &params).await;

        let (event, stale, rerun) = {
            let mut state = self.state.lock();
            state.loading = false;
            let stale = state.generation != generation;
            // A pending timer re-executes the query itself; one that already fired found it busy.
            let rerun = stale && state.timer.is_none();
            let event = match outcome {
                Ok(result) => {
                    let result = Arc::new(result);
                    if !stale {
                        state.result = Some(Arc::clone(&result));
                    }
                    QueryEvent::Loaded(result)
                }
                Err(e) => {
                    warn!("Query '{}' failed: {e:#}", self.name);
                    if !stale {
                        state.failed = true;
                    }
                    QueryEvent::Failed(format!("{e:#}"))
                }
            };
            (event, stale, rerun)
        };

        if stale {
            if rerun {
                debug!("Query '{}' changed while executing, running it again", self.name);
                self.load();
            }
            return;
        }
        self.hub.notify(&event);
    }
}

impl Drop for Query {
    fn drop(&mut self) {
        for (dependency, id) in self.dependencies.iter().zip(&self.subscriptions) {
            dependency.changes().unsubscribe(*id);
        }
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.abort();
        }
    }
}

impl Notifiable for Query {
    type Event = QueryEvent;

    fn hub(&self) -> &Hub<QueryEvent> {
        &self.hub
    }
}

impl Debug for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Query")
            .field("name", &self.name)
            .field("loaded", &state.result.is_some())
            .field("loading", &state.loading)
            .field("failed", &state.failed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryPersistence;
    use crate::setting::Setting;
    use anyhow::bail;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
    use tokio::time::timeout;

    /// Records every execution and how many ran at the same time.
    struct RecordingStore {
        log: Mutex<Vec<(String, Vec<Param>)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl Default for RecordingStore {
        fn default() -> Self {
            Self::slow(Duration::from_millis(5))
        }
    }

    impl RecordingStore {
        fn slow(delay: Duration) -> Self {
            Self {
                log: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay,
            }
        }

        fn params(&self) -> Vec<Vec<Param>> {
            self.log.lock().iter().map(|(_, p)| p.clone()).collect()
        }

        fn executions(&self) -> Vec<(String, Vec<Param>)> {
            self.log.lock().clone()
        }
    }

    #[async_trait::async_trait]
    impl Store for RecordingStore {
        async fn execute(&self, sql: &str, params: &[Param]) -> Result<QueryResult> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.log.lock().push((sql.to_string(), params.to_vec()));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if sql.contains("missing_table") {
                bail!("no such table: missing_table");
            }
            let row: Row = [("sql".to_string(), json!(sql))].into_iter().collect();
            Ok(QueryResult {
                rows: vec![row],
                rows_affected: 0,
            })
        }
    }

    fn events(query: &Query) -> UnboundedReceiver<(String, QueryEvent)> {
        let (tx, rx) = unbounded_channel();
        let name = query.name().to_string();
        query.subscribe(move |e| {
            let _ = tx.send((name.clone(), e.clone()));
        });
        rx
    }

    async fn next(rx: &mut UnboundedReceiver<(String, QueryEvent)>) -> (String, QueryEvent) {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a query event")
            .expect("event channel closed")
    }

    fn fixed(name: &str, sql: &str, queue: &Arc<QueryQueue>, store: &Arc<RecordingStore>) -> Arc<Query> {
        Query::new(
            name,
            QuerySpec::fixed(sql, vec![]),
            vec![],
            queue.clone(),
            store.clone(),
            DEFAULT_DEBOUNCE,
        )
    }

    #[tokio::test]
    async fn test_queue_runs_one_at_a_time_in_order() {
        let queue = QueryQueue::new();
        let store = Arc::new(RecordingStore::default());
        let a = fixed("a", "SELECT 1", &queue, &store);
        let b = fixed("b", "SELECT 2", &queue, &store);
        let c = fixed("c", "SELECT 3", &queue, &store);
        let (tx, mut rx) = unbounded_channel();
        for q in [&a, &b, &c] {
            let tx = tx.clone();
            let name = q.name().to_string();
            q.subscribe(move |e| {
                let _ = tx.send((name.clone(), e.clone()));
            });
        }

        a.load();
        b.load();
        c.load();
        // A second load of a queued query does not queue it twice.
        a.load();

        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(next(&mut rx).await.0);
        }
        assert_eq!(order, vec!["a", "b", "c"]);
        let sql: Vec<String> = store.executions().into_iter().map(|(s, _)| s).collect();
        assert_eq!(sql, vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
        assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
    }

    fn ranged(
        name: &str,
        range: &Arc<Setting<i64>>,
        queue: &Arc<QueryQueue>,
        store: &Arc<RecordingStore>,
        debounce: Duration,
    ) -> Arc<Query> {
        Query::new(
            name,
            QuerySpec::dynamic(
                |_| "SELECT COUNT(*) FROM statements WHERE date >= ?".to_string(),
                |s| vec![Param::from(s.i64("chart_range"))],
            ),
            vec![range.clone() as Arc<dyn Dependency>],
            queue.clone(),
            store.clone(),
            debounce,
        )
    }

    fn chart_range() -> Arc<Setting<i64>> {
        Arc::new(Setting::new(
            "chart_range",
            30i64,
            Arc::new(MemoryPersistence::new()),
        ))
    }

    #[tokio::test]
    async fn test_queue_order_holds_when_a_queued_dependency_changes() {
        let queue = QueryQueue::new();
        let store = Arc::new(RecordingStore::slow(Duration::from_millis(30)));
        let range = chart_range();
        let a = fixed("a", "SELECT 1", &queue, &store);
        let b = ranged("b", &range, &queue, &store, DEFAULT_DEBOUNCE);
        let c = fixed("c", "SELECT 3", &queue, &store);
        let (tx, mut rx) = unbounded_channel();
        for q in [&a, &b, &c] {
            let tx = tx.clone();
            let name = q.name().to_string();
            q.subscribe(move |e| {
                let _ = tx.send((name.clone(), e.clone()));
            });
        }

        a.load();
        b.load();
        c.load();
        tokio::time::sleep(Duration::from_millis(10)).await;
        range.set(31, false);

        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(next(&mut rx).await.0);
        }
        assert_eq!(order, vec!["a", "b", "c"]);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(
            store.params(),
            vec![vec![], vec![Param::Int(31)], vec![]]
        );
        assert!(b.is_loaded());
        assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
    }

    /// Changes the dependency of a query while its execution is in flight and returns the
    /// parameters of every execution that followed.
    async fn change_during_execution(debounce: Duration) -> Vec<Vec<Param>> {
        let queue = QueryQueue::new();
        let store = Arc::new(RecordingStore::slow(Duration::from_millis(50)));
        let range = chart_range();
        let q = ranged("ranged", &range, &queue, &store, debounce);
        q.load();
        tokio::time::sleep(Duration::from_millis(10)).await;
        range.set(31, false);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(q.is_loaded());
        store.params()
    }

    #[tokio::test]
    async fn test_change_during_execution_reruns_once() {
        // The timer fires while the first execution is still running.
        assert_eq!(
            change_during_execution(DEFAULT_DEBOUNCE).await,
            vec![vec![Param::Int(30)], vec![Param::Int(31)]]
        );
        // The timer is still pending when the first execution ends.
        assert_eq!(
            change_during_execution(Duration::from_millis(150)).await,
            vec![vec![Param::Int(30)], vec![Param::Int(31)]]
        );
    }

    #[test]
    fn test_load_outside_of_a_runtime_can_be_retried() {
        let queue = QueryQueue::new();
        let store = Arc::new(RecordingStore::default());
        let q = fixed("q", "SELECT 1", &queue, &store);
        q.load();
        assert!(queue.is_empty());
        assert!(!q.state.lock().loading);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let result = runtime.block_on(q.result()).unwrap();
        assert_eq!(result.first().unwrap().str("sql"), Some("SELECT 1"));
    }

    #[tokio::test]
    async fn test_result_waits_for_the_execution() {
        let queue = QueryQueue::new();
        let store = Arc::new(RecordingStore::default());
        let q = fixed("q", "SELECT 1", &queue, &store);
        let result = q.result().await.unwrap();
        assert_eq!(result.first().unwrap().str("sql"), Some("SELECT 1"));
        // The second call is served from the cache.
        q.result().await.unwrap();
        assert_eq!(store.executions().len(), 1);
        assert!(q.hub().is_empty());

        let broken = fixed("broken", "SELECT * FROM missing_table", &queue, &store);
        assert!(broken.result().await.is_err());
        assert!(broken.is_failed());
        assert!(broken.result().await.is_err());
    }

    #[tokio::test]
    async fn test_get_loads_then_caches() {
        let queue = QueryQueue::new();
        let store = Arc::new(RecordingStore::default());
        let q = fixed("q", "SELECT 1", &queue, &store);
        let mut rx = events(&q);
        assert!(q.get().is_none());
        let (_, event) = next(&mut rx).await;
        assert!(matches!(event, QueryEvent::Loaded(_)));
        let result = q.get().unwrap();
        assert_eq!(result.first().unwrap().str("sql"), Some("SELECT 1"));
        assert_eq!(store.executions().len(), 1);
    }

    #[tokio::test]
    async fn test_dependency_changes_are_debounced() {
        let queue = QueryQueue::new();
        let store = Arc::new(RecordingStore::default());
        let range = chart_range();
        let q = ranged("ranged", &range, &queue, &store, DEFAULT_DEBOUNCE);
        let mut rx = events(&q);
        q.load();
        next(&mut rx).await;

        for days in 31..=35 {
            range.set(days, false);
        }
        assert!(!q.is_loaded());
        next(&mut rx).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        let executions = store.executions();
        assert_eq!(executions.len(), 2);
        assert_eq!(executions[1].1, vec![Param::Int(35)]);
        assert!(q.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_query_waits_for_a_dependency_change() {
        let queue = QueryQueue::new();
        let store = Arc::new(RecordingStore::default());
        let broken = Arc::new(Setting::transient("broken", true));
        let q = Query::new(
            "flaky",
            QuerySpec::dynamic(
                |s| {
                    if s.bool("broken").unwrap_or(false) {
                        "SELECT * FROM missing_table".to_string()
                    } else {
                        "SELECT 1".to_string()
                    }
                },
                |_| vec![],
            ),
            vec![broken.clone() as Arc<dyn Dependency>],
            queue.clone(),
            store.clone(),
            DEFAULT_DEBOUNCE,
        );
        let mut rx = events(&q);
        assert!(q.get().is_none());
        assert!(matches!(next(&mut rx).await.1, QueryEvent::Failed(_)));
        assert!(q.is_failed());

        assert!(q.get().is_none());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.executions().len(), 1);

        broken.set(false, false);
        assert!(!q.is_failed());
        assert!(matches!(next(&mut rx).await.1, QueryEvent::Loaded(_)));
        assert_eq!(store.executions().len(), 2);
    }

    #[tokio::test]
    async fn test_dropping_a_query_unsubscribes_it() {
        let queue = QueryQueue::new();
        let store = Arc::new(RecordingStore::default());
        let setting = Arc::new(Setting::transient("today", "2024-02-20".to_string()));
        let q = Query::new(
            "q",
            QuerySpec::fixed("SELECT 1", vec![]),
            vec![setting.clone() as Arc<dyn Dependency>],
            queue,
            store,
            DEFAULT_DEBOUNCE,
        );
        assert_eq!(setting.changes().len(), 1);
        drop(q);
        assert!(setting.changes().is_empty());
    }

    #[test]
    fn test_snapshot_accessors() {
        let s = Snapshot::new()
            .with("today", json!("2024-02-20"))
            .with("use_chart_range", json!(true))
            .with("chart_range", json!(30));
        assert_eq!(s.date("today"), NaiveDate::from_ymd_opt(2024, 2, 20));
        assert_eq!(s.bool("use_chart_range"), Some(true));
        assert_eq!(s.i64("chart_range"), Some(30));
        assert_eq!(s.str("missing"), None);
    }

    #[test]
    fn test_row_accessors() {
        let row: Row = [
            ("total".to_string(), json!(8)),
            ("totalAmount".to_string(), json!(80.0)),
            ("totalPrice".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();
        assert_eq!(row.i64("total"), Some(8));
        assert_eq!(row.decimal("totalAmount"), Some(Decimal::from(80)));
        assert_eq!(row.decimal("totalPrice"), None);
    }
}
