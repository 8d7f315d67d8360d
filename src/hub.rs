//! The notification hub that every stateful entity embeds to broadcast change events.
//!
//! Observers are plain closures. Because closures have no identity, `subscribe` hands back a
//! `SubscriptionId` which is later used to `unsubscribe`.

use parking_lot::Mutex;
use std::sync::Arc;

/// Identifies one registration of an observer on a `Hub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// An observer of events of type `E`.
pub type Observer<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A publish/subscribe channel.
///
/// `notify` calls the observers that were subscribed when the pass started, in subscription
/// order. An observer that subscribes during a pass is first called on the next pass. An observer
/// that is unsubscribed during a pass, before its turn, is skipped. The internal lock is released
/// while observers run, so observers may freely subscribe, unsubscribe or notify again.
pub struct Hub<E> {
    inner: Mutex<Inner<E>>,
}

struct Inner<E> {
    next_id: u64,
    observers: Vec<(SubscriptionId, Observer<E>)>,
}

impl<E> Default for Hub<E> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 0,
                observers: Vec::new(),
            }),
        }
    }
}

impl<E> std::fmt::Debug for Hub<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("observers", &self.len())
            .finish()
    }
}

impl<E> Hub<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` and return the id needed to remove it again.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.observers.push((id, Arc::new(observer)));
        id
    }

    /// Remove the observer registered as `id`. Returns `false` when there was no such observer.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.observers.len();
        inner.observers.retain(|(existing, _)| *existing != id);
        inner.observers.len() != before
    }

    /// Call every currently subscribed observer with `event`.
    pub fn notify(&self, event: &E) {
        let snapshot: Vec<(SubscriptionId, Observer<E>)> = self.inner.lock().observers.clone();
        for (id, observer) in snapshot {
            if self.is_subscribed(id) {
                observer(event);
            }
        }
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.inner
            .lock()
            .observers
            .iter()
            .any(|(existing, _)| *existing == id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The capability of broadcasting events through an embedded `Hub`.
pub trait Notifiable {
    type Event;

    fn hub(&self) -> &Hub<Self::Event>;

    fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Self::Event) + Send + Sync + 'static,
    {
        self.hub().subscribe(observer)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.hub().unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Observer<u32>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |label: &str| -> Observer<u32> {
            let log = log_clone.clone();
            let label = label.to_string();
            Arc::new(move |value: &u32| log.lock().push(format!("{label}:{value}")))
        };
        (log, make)
    }

    #[test]
    fn test_notify_in_subscription_order() {
        let hub: Hub<u32> = Hub::new();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");
        hub.subscribe(move |v| a(v));
        hub.subscribe(move |v| b(v));
        hub.notify(&7);
        assert_eq!(*log.lock(), vec!["a:7", "b:7"]);
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let hub: Hub<u32> = Hub::new();
        let id = hub.subscribe(|_| {});
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert!(hub.is_empty());
    }

    #[test]
    fn test_observer_added_during_notify_waits_for_next_pass() {
        let hub: Arc<Hub<u32>> = Arc::new(Hub::new());
        let (log, make) = recorder();
        let late = make("late");
        let hub_clone = hub.clone();
        let added = Arc::new(Mutex::new(false));
        hub.subscribe(move |_| {
            let mut added = added.lock();
            if !*added {
                *added = true;
                let late = late.clone();
                hub_clone.subscribe(move |v| late(v));
            }
        });
        hub.notify(&1);
        assert!(log.lock().is_empty());
        hub.notify(&2);
        assert_eq!(*log.lock(), vec!["late:2"]);
    }

    #[test]
    fn test_observer_removed_during_notify_is_skipped() {
        let hub: Arc<Hub<u32>> = Arc::new(Hub::new());
        let (log, make) = recorder();
        let victim_id = Arc::new(Mutex::new(None));

        let hub_clone = hub.clone();
        let victim_clone = victim_id.clone();
        let first = make("first");
        hub.subscribe(move |v| {
            first(v);
            if let Some(id) = *victim_clone.lock() {
                hub_clone.unsubscribe(id);
            }
        });
        let victim = make("victim");
        let id = hub.subscribe(move |v| victim(v));
        *victim_id.lock() = Some(id);

        hub.notify(&3);
        assert_eq!(*log.lock(), vec!["first:3"]);
        assert_eq!(hub.len(), 1);
    }
}
