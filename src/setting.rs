//! Setting cells: named values that notify their observers when they change and, when cacheable,
//! survive restarts through the `options` object of the persistence layer.

use crate::hub::{Hub, Notifiable};
use crate::persist::{Persistence, OPTIONS};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Published by a setting after its value changed, or when a change is forced.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingChange {
    pub name: String,
    pub value: Value,
}

/// Something a derived query can depend on: it notifies on change and exposes its current value as
/// JSON so that query text and parameters can be computed from a snapshot.
pub trait Dependency: Send + Sync {
    fn name(&self) -> &str;

    fn json_value(&self) -> Value;

    fn changes(&self) -> &Hub<SettingChange>;
}

pub struct Setting<T> {
    name: String,
    default: T,
    value: Mutex<T>,
    /// `None` for settings that are never persisted.
    persistence: Option<Arc<dyn Persistence>>,
    hub: Hub<SettingChange>,
}

impl<T> Setting<T>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates a cacheable setting, adopting its persisted value if there is a readable one.
    pub fn new(name: impl Into<String>, default: T, persistence: Arc<dyn Persistence>) -> Self {
        let name = name.into();
        let value = load_persisted(persistence.as_ref(), &name).unwrap_or_else(|| default.clone());
        Self {
            name,
            default,
            value: Mutex::new(value),
            persistence: Some(persistence),
            hub: Hub::new(),
        }
    }

    /// Creates a setting that lives in memory only.
    pub fn transient(name: impl Into<String>, default: T) -> Self {
        Self {
            name: name.into(),
            value: Mutex::new(default.clone()),
            default,
            persistence: None,
            hub: Hub::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> T {
        self.value.lock().clone()
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    pub fn is_cacheable(&self) -> bool {
        self.persistence.is_some()
    }

    /// Stores `value`, persists it and notifies observers if it differs from the current value.
    /// With `force`, an unchanged value is still announced (but not persisted again).
    pub fn set(&self, value: T, force: bool) {
        let changed = {
            let mut current = self.value.lock();
            if *current == value {
                false
            } else {
                *current = value.clone();
                true
            }
        };
        if !changed && !force {
            return;
        }
        if changed {
            self.persist(&value);
        }
        trace!("Setting '{}' changed", self.name);
        self.hub.notify(&SettingChange {
            name: self.name.clone(),
            value: to_json(&value),
        });
    }

    pub fn reset(&self) {
        self.set(self.default.clone(), false)
    }

    /// Announces the current value without changing it.
    pub fn touch(&self) {
        self.set(self.get(), true)
    }

    fn persist(&self, value: &T) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let entry = if *value == self.default {
            None
        } else {
            Some(json!({ "value": to_json(value) }))
        };
        if let Err(e) = persistence.set_entry(OPTIONS, &self.name, entry) {
            warn!("Unable to persist setting '{}': {e:#}", self.name);
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn load_persisted<T: DeserializeOwned>(persistence: &dyn Persistence, name: &str) -> Option<T> {
    let entry = match persistence.get_entry(OPTIONS, name) {
        Ok(entry) => entry?,
        Err(e) => {
            debug!("Unable to read persisted setting '{name}': {e:#}");
            return None;
        }
    };
    let value = entry.get("value")?.clone();
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!("Ignoring corrupt persisted setting '{name}': {e}");
            None
        }
    }
}

impl<T> Notifiable for Setting<T> {
    type Event = SettingChange;

    fn hub(&self) -> &Hub<SettingChange> {
        &self.hub
    }
}

impl<T> Dependency for Setting<T>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn json_value(&self) -> Value {
        to_json(&self.get())
    }

    fn changes(&self) -> &Hub<SettingChange> {
        &self.hub
    }
}

impl<T: Debug> Debug for Setting<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setting")
            .field("name", &self.name)
            .field("value", &*self.value.lock())
            .field("cacheable", &self.persistence.is_some())
            .finish()
    }
}
