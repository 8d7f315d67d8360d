//! Remote resources: JSON documents fetched from the marketplace API and cached for a while, both in
//! memory and in the `resources` persistence object.

use crate::api::Fetch;
use crate::clock::Clock;
use crate::error::is_invalid_payload;
use crate::hub::{Hub, Notifiable};
use crate::persist::{Persistence, RESOURCES};
use chrono::Duration;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Consecutive failed fetches after which a resource stops retrying on its own.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    Loaded(Value),
    /// The retry budget is exhausted. Only `reset` allows new attempts.
    Failed { failures: u32 },
}

#[derive(Debug, Default)]
struct State {
    data: Option<Value>,
    /// Milliseconds since the epoch, from the reference clock.
    fetched_at: Option<i64>,
    loading: bool,
    failures: u32,
    failed: bool,
}

pub struct Resource {
    name: String,
    locator: String,
    ttl: Duration,
    fetch: Arc<dyn Fetch>,
    persistence: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    hub: Hub<ResourceEvent>,
}

impl Resource {
    /// Creates the resource, adopting a persisted entry that is still fresh and dropping one that
    /// has expired.
    pub fn new(
        name: impl Into<String>,
        locator: impl Into<String>,
        ttl: Duration,
        fetch: Arc<dyn Fetch>,
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let resource = Self {
            name: name.into(),
            locator: locator.into(),
            ttl,
            fetch,
            persistence,
            clock,
            state: Mutex::new(State::default()),
            hub: Hub::new(),
        };
        resource.restore();
        Arc::new(resource)
    }

    fn restore(&self) {
        let entry = match self.persistence.get_entry(RESOURCES, &self.name) {
            Ok(Some(entry)) => entry,
            Ok(None) => return,
            Err(e) => {
                debug!("Unable to read cached resource '{}': {e:#}", self.name);
                return;
            }
        };
        let date = entry.get("date").and_then(Value::as_i64);
        match (entry.get("data"), date) {
            (Some(data), Some(date)) if self.is_fresh(date) => {
                trace!("Using cached resource '{}'", self.name);
                let mut state = self.state.lock();
                state.data = Some(data.clone());
                state.fetched_at = Some(date);
            }
            _ => {
                trace!("Dropping expired resource '{}'", self.name);
                if let Err(e) = self.persistence.set_entry(RESOURCES, &self.name, None) {
                    debug!("Unable to drop cached resource '{}': {e:#}", self.name);
                }
            }
        }
    }

    fn is_fresh(&self, fetched_at: i64) -> bool {
        fetched_at + self.ttl.num_milliseconds() > self.clock.timestamp_millis()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Returns fresh data. Otherwise stale data is dropped, a load is started in the background and
    /// `None` is returned; observers hear about the outcome.
    pub fn get(self: &Arc<Self>) -> Option<Value> {
        {
            let mut state = self.state.lock();
            if let (Some(data), Some(at)) = (&state.data, state.fetched_at) {
                if self.is_fresh(at) {
                    return Some(data.clone());
                }
            }
            state.data = None;
            state.fetched_at = None;
        }
        let this = Arc::clone(self);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { this.load().await });
            }
            Err(_) => warn!("Resource '{}' requested outside of a runtime", self.name),
        }
        None
    }

    /// Fetches the resource, retrying immediately until `MAX_ATTEMPTS` consecutive failures. Does
    /// nothing while a load is running or after the resource has failed permanently.
    pub async fn load(&self) {
        {
            let mut state = self.state.lock();
            if state.loading || state.failed {
                return;
            }
            state.loading = true;
        }
        loop {
            match self.fetch.fetch_json(&self.locator).await {
                Ok(data) => {
                    self.loaded(data);
                    return;
                }
                Err(e) => {
                    if is_invalid_payload(&e) {
                        warn!("Resource '{}' returned an invalid payload: {e:#}", self.name);
                    } else {
                        debug!("Unable to load resource '{}': {e:#}", self.name);
                    }
                    let failures = {
                        let mut state = self.state.lock();
                        state.failures += 1;
                        if state.failures >= MAX_ATTEMPTS {
                            state.failed = true;
                            state.loading = false;
                        }
                        state.failures
                    };
                    if failures >= MAX_ATTEMPTS {
                        warn!("Giving up on resource '{}' after {failures} attempts", self.name);
                        self.hub.notify(&ResourceEvent::Failed { failures });
                        return;
                    }
                }
            }
        }
    }

    fn loaded(&self, data: Value) {
        let now = self.clock.timestamp_millis();
        {
            let mut state = self.state.lock();
            state.data = Some(data.clone());
            state.fetched_at = Some(now);
            state.failures = 0;
            state.failed = false;
            state.loading = false;
        }
        let entry = json!({ "data": data, "date": now });
        if let Err(e) = self.persistence.set_entry(RESOURCES, &self.name, Some(entry)) {
            warn!("Unable to cache resource '{}': {e:#}", self.name);
        }
        debug!("Resource '{}' loaded", self.name);
        self.hub.notify(&ResourceEvent::Loaded(data));
    }

    /// Whether data is held, fresh or not.
    pub fn is_loaded(&self) -> bool {
        self.state.lock().data.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.state.lock().failed
    }

    pub fn failures(&self) -> u32 {
        self.state.lock().failures
    }

    /// Clears the failure state so that the next `get` or `load` tries again.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.failures = 0;
        state.failed = false;
    }
}

impl Notifiable for Resource {
    type Event = ResourceEvent;

    fn hub(&self) -> &Hub<ResourceEvent> {
        &self.hub
    }
}
