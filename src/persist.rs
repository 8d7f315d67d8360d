//! Key/value persistence of small JSON objects.
//!
//! Each logical key (`storage`, `options`, `resources`, `rates`) maps to one JSON object. The file
//! backed implementation keeps one file per key under `$STATSYNC_HOME/.state`, scoped by account.

use crate::Result;
use anyhow::Context;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, trace};

/// Ingestion bookkeeping such as the sync cursor.
pub const STORAGE: &str = "storage";
/// Persisted setting values.
pub const OPTIONS: &str = "options";
/// Remote resource cache entries.
pub const RESOURCES: &str = "resources";
/// Currency rate caches.
pub const RATES: &str = "rates";

pub type Object = Map<String, Value>;

pub trait Persistence: Debug + Send + Sync {
    /// Returns the object stored under `key`, or an empty object.
    fn get_object(&self, key: &str) -> Result<Object>;

    fn set_object(&self, key: &str, value: Object) -> Result<()>;

    /// Applies `f` to the object stored under `key` and stores the result. Implementations make the
    /// read and the write atomic with respect to other calls on the same instance.
    fn update_object(&self, key: &str, f: &mut dyn FnMut(&mut Object)) -> Result<()>;

    fn get_entry(&self, key: &str, name: &str) -> Result<Option<Value>> {
        Ok(self.get_object(key)?.remove(name))
    }

    /// Stores `value` as the entry `name` of the object under `key`, or removes the entry when
    /// `value` is `None`.
    fn set_entry(&self, key: &str, name: &str, value: Option<Value>) -> Result<()> {
        let mut value = value;
        self.update_object(key, &mut |object| match value.take() {
            Some(v) => {
                object.insert(name.to_string(), v);
            }
            None => {
                object.remove(name);
            }
        })
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.set_object(key, Object::new())
    }
}

/// Stores each key as `{dir}/{username}-{key}.json`.
#[derive(Debug)]
pub struct JsonFilePersistence {
    dir: PathBuf,
    username: String,
    cache: Mutex<HashMap<String, Object>>,
}

impl JsonFilePersistence {
    /// The directory must exist.
    pub fn new(dir: impl Into<PathBuf>, username: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            username: username.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}-{key}.json", self.username))
    }

    /// Reads the file for `key`. A missing file is an empty object, and so is a corrupt one.
    fn read(&self, key: &str) -> Result<Object> {
        let path = self.path(key);
        if !path.is_file() {
            return Ok(Object::new());
        }
        let content = blocking(|| std::fs::read_to_string(&path))
            .with_context(|| format!("Unable to read {}", path.display()))?;
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(object)) => Ok(object),
            Ok(_) | Err(_) => {
                debug!("Ignoring unreadable state file {}", path.display());
                Ok(Object::new())
            }
        }
    }

    fn write(&self, key: &str, object: &Object) -> Result<()> {
        let path = self.path(key);
        let data = serde_json::to_vec(object).context("Unable to serialize state")?;
        blocking(|| std::fs::write(&path, data))
            .with_context(|| format!("Unable to write {}", path.display()))
    }

    fn load<'a>(&self, cache: &'a mut HashMap<String, Object>, key: &str) -> Result<&'a mut Object> {
        if !cache.contains_key(key) {
            let object = self.read(key)?;
            cache.insert(key.to_string(), object);
        }
        cache
            .get_mut(key)
            .with_context(|| format!("State for '{key}' is not cached"))
    }
}

/// Runs file I/O for the synchronous `Persistence` calls. On a multi-threaded runtime the worker
/// hands its other tasks off first.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl Persistence for JsonFilePersistence {
    fn get_object(&self, key: &str) -> Result<Object> {
        let mut cache = self.cache.lock();
        Ok(self.load(&mut cache, key)?.clone())
    }

    fn set_object(&self, key: &str, value: Object) -> Result<()> {
        let mut cache = self.cache.lock();
        self.write(key, &value)?;
        trace!("Stored '{key}' for {}", self.username);
        cache.insert(key.to_string(), value);
        Ok(())
    }

    fn update_object(&self, key: &str, f: &mut dyn FnMut(&mut Object)) -> Result<()> {
        let mut cache = self.cache.lock();
        let mut object = self.load(&mut cache, key)?.clone();
        f(&mut object);
        self.write(key, &object)?;
        cache.insert(key.to_string(), object);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryPersistence {
    objects: Mutex<HashMap<String, Object>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn get_object(&self, key: &str) -> Result<Object> {
        Ok(self.objects.lock().get(key).cloned().unwrap_or_default())
    }

    fn set_object(&self, key: &str, value: Object) -> Result<()> {
        self.objects.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn update_object(&self, key: &str, f: &mut dyn FnMut(&mut Object)) -> Result<()> {
        let mut objects = self.objects.lock();
        f(objects.entry(key.to_string()).or_default());
        Ok(())
    }
}
