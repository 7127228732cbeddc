//! Reactive values observed over live channels.

use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::trace;

/// Callback receiving the serialized new state of a value.
pub type ObserverFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Stops an observation when run.
pub struct Teardown(Box<dyn FnOnce() + Send>);

impl Teardown {
    /// Wrap a teardown closure.
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Stop the observation.
    pub fn run(self) {
        (self.0)();
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Teardown")
    }
}

/// A value clients can observe.
pub trait ObservableValue: Send + Sync {
    /// Identifier of the value.
    fn id(&self) -> &str;

    /// Serialized current state.
    fn current(&self) -> String;

    /// Register `observer`, returning `None` if the value cannot be observed.
    fn observe(&self, observer: ObserverFn) -> Option<Teardown>;
}

/// Lookup of observable values by id.
pub trait ValueRegistry: Send + Sync {
    /// Find a value.
    fn lookup(&self, id: &str) -> Option<Arc<dyn ObservableValue>>;
}

/// An observable value holding serialized JSON.
pub struct LiveValue {
    id: String,
    state: RwLock<String>,
    observers: Arc<DashMap<u64, ObserverFn>>,
    next_observer: AtomicU64,
}

impl LiveValue {
    /// Create a value with an initial serialized state.
    #[must_use]
    pub fn new(id: impl Into<String>, initial: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: RwLock::new(initial.into()),
            observers: Arc::new(DashMap::new()),
            next_observer: AtomicU64::new(0),
        }
    }

    /// Replace the state and notify observers.
    pub fn set(&self, serialized: impl Into<String>) {
        let serialized = serialized.into();
        {
            let mut state = self
                .state
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state.clone_from(&serialized);
        }

        // observers may tear down while being notified
        let observers = self
            .observers
            .iter()
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        trace!(id = %self.id, observers = observers.len(), "Notifying observers");
        for observer in observers {
            observer(&serialized);
        }
    }

    /// Number of active observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl ObservableValue for LiveValue {
    fn id(&self) -> &str {
        &self.id
    }

    fn current(&self) -> String {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn observe(&self, observer: ObserverFn) -> Option<Teardown> {
        let key = self.next_observer.fetch_add(1, Ordering::Relaxed);
        self.observers.insert(key, observer);
        let observers = self.observers.clone();
        Some(Teardown::new(move || {
            observers.remove(&key);
        }))
    }
}

impl fmt::Debug for LiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveValue")
            .field("id", &self.id)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// In-memory [`ValueRegistry`].
#[derive(Debug, Default)]
pub struct ValueStore {
    values: DashMap<String, Arc<LiveValue>>,
}

impl ValueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn set<T: Serialize>(&self, id: &str, value: &T) -> Result<(), serde_json::Error> {
        let serialized = serde_json::to_string(value)?;
        let live = self
            .values
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(LiveValue::new(id, "null")))
            .value()
            .clone();
        live.set(serialized);
        Ok(())
    }

    /// Get a value.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<LiveValue>> {
        self.values.get(id).map(|entry| entry.value().clone())
    }

    /// Remove a value.
    pub fn remove(&self, id: &str) -> Option<Arc<LiveValue>> {
        self.values.remove(id).map(|(_, value)| value)
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ValueRegistry for ValueStore {
    fn lookup(&self, id: &str) -> Option<Arc<dyn ObservableValue>> {
        self.get(id).map(|value| value as Arc<dyn ObservableValue>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_observe_and_teardown() {
        let value = LiveValue::new("counter", "0");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let teardown = value
            .observe(Arc::new(move |state: &str| sink.lock().unwrap().push(state.to_string())))
            .unwrap();
        value.set("1");
        teardown.run();
        value.set("2");

        assert_eq!(*seen.lock().unwrap(), vec!["1".to_string()]);
        assert_eq!(value.current(), "2");
        assert_eq!(value.observer_count(), 0);
    }

    #[test]
    fn test_observer_may_tear_down_itself() {
        let value = Arc::new(LiveValue::new("x", "null"));
        let slot: Arc<Mutex<Option<Teardown>>> = Arc::new(Mutex::new(None));
        let inner = slot.clone();

        let teardown = value
            .observe(Arc::new(move |_: &str| {
                if let Some(teardown) = inner.lock().unwrap().take() {
                    teardown.run();
                }
            }))
            .unwrap();
        *slot.lock().unwrap() = Some(teardown);

        value.set("1");
        assert_eq!(value.observer_count(), 0);
    }

    #[test]
    fn test_store() {
        let store = ValueStore::new();
        store.set("user", &serde_json::json!({"name": "ada"})).unwrap();
        store.set("user", &serde_json::json!({"name": "grace"})).unwrap();

        assert_eq!(store.len(), 1);
        let found = store.lookup("user").unwrap();
        assert_eq!(found.current(), r#"{"name":"grace"}"#);
        assert!(store.lookup("missing").is_none());
    }
}
