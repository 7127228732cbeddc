//! Live update broker.
//!
//! The broker keeps track of open live channels, fans out commands to them
//! and forwards reactive value updates to the channels observing them. A
//! channel that fails to accept a command is removed together with all of
//! its observations.

use crate::sender::{EventSender, LiveError, SenderId};
use crate::values::{ObserverFn, Teardown, ValueRegistry};
use dashmap::DashMap;
use ferry_protocol::{Command, StartId, StartIdCheck};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Message sent to clients that ask for hot reloading without an id.
pub const EMPTY_USID_MESSAGE: &str = "Cannot enable hot reloading, empty app usid";

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Window in which reloads are summed up into one log line.
    pub reload_window: Duration,
    /// Keep-alive interval of live channels.
    pub ping_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            reload_window: Duration::from_millis(200),
            ping_interval: Duration::from_millis(5000),
        }
    }
}

/// Parameters a client presents when opening a live channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParams {
    /// Start id the client's page was rendered with.
    pub usid: Option<String>,
    /// Ids of values to observe.
    pub observe: Vec<String>,
}

impl SessionParams {
    /// Build parameters from raw query values. `observe` is a JSON array of
    /// ids; anything else is ignored with a warning.
    #[must_use]
    pub fn from_query(usid: Option<&str>, observe: Option<&str>) -> Self {
        let observe = match observe {
            None | Some("") => Vec::new(),
            Some(raw) => serde_json::from_str::<Vec<String>>(raw).unwrap_or_else(|e| {
                warn!(error = %e, "Ignoring malformed observe parameter");
                Vec::new()
            }),
        };
        Self {
            usid: usid.map(str::to_string),
            observe,
        }
    }
}

/// Result of [`Broker::attach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The channel is registered.
    Registered {
        /// Number of values now observed.
        observed: usize,
    },
    /// The client runs an outdated page and was told to reload.
    Reloading,
}

/// Broker statistics.
#[derive(Debug, Clone, Default)]
pub struct BrokerStats {
    /// Number of open channels.
    pub sender_count: usize,
    /// Number of active value observations.
    pub observation_count: usize,
    /// Commands delivered since start.
    pub commands_sent: u64,
    /// Channels removed after a send failure.
    pub send_failures: u64,
}

struct Session {
    sender: Arc<dyn EventSender>,
    alive: AtomicBool,
    teardowns: Mutex<HashMap<String, Teardown>>,
}

impl Session {
    fn teardowns(&self) -> std::sync::MutexGuard<'_, HashMap<String, Teardown>> {
        self.teardowns
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

struct Inner {
    sessions: DashMap<SenderId, Arc<Session>>,
    registry: Option<Arc<dyn ValueRegistry>>,
    start_id: StartId,
    config: BrokerConfig,
    pending_reloads: AtomicUsize,
    commands_sent: AtomicU64,
    send_failures: AtomicU64,
}

/// Fans out live commands to open channels.
///
/// Cloning is cheap; clones share the same channels.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<Inner>,
}

impl Broker {
    /// Create a broker for the given server start.
    #[must_use]
    pub fn new(start_id: StartId, config: BrokerConfig) -> Self {
        Self::build(start_id, config, None)
    }

    /// Create a broker that resolves observed values through `registry`.
    #[must_use]
    pub fn with_registry(
        start_id: StartId,
        config: BrokerConfig,
        registry: Arc<dyn ValueRegistry>,
    ) -> Self {
        Self::build(start_id, config, Some(registry))
    }

    fn build(
        start_id: StartId,
        config: BrokerConfig,
        registry: Option<Arc<dyn ValueRegistry>>,
    ) -> Self {
        debug!(start_id = %start_id, "Creating live broker");
        Self {
            inner: Arc::new(Inner {
                sessions: DashMap::new(),
                registry,
                start_id,
                config,
                pending_reloads: AtomicUsize::new(0),
                commands_sent: AtomicU64::new(0),
                send_failures: AtomicU64::new(0),
            }),
        }
    }

    /// The current server start id.
    #[must_use]
    pub fn start_id(&self) -> &StartId {
        &self.inner.start_id
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Register a channel.
    pub fn add_sender(&self, id: SenderId, sender: Arc<dyn EventSender>) {
        debug!(sender = %id, "Live channel registered");
        self.inner.sessions.insert(
            id,
            Arc::new(Session {
                sender,
                alive: AtomicBool::new(true),
                teardowns: Mutex::new(HashMap::new()),
            }),
        );
    }

    /// Remove a channel and stop all of its observations.
    ///
    /// Returns `false` if the channel was not registered.
    pub fn remove_sender(&self, id: &SenderId) -> bool {
        self.inner.remove(id)
    }

    /// Check if a channel is registered.
    #[must_use]
    pub fn contains(&self, id: &SenderId) -> bool {
        self.inner.sessions.contains_key(id)
    }

    /// Send a command to one channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is unknown or the send fails, in which
    /// case the channel is removed.
    pub fn send_to(&self, id: &SenderId, command: &Command) -> Result<(), LiveError> {
        let session = self
            .inner
            .sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LiveError::UnknownSender(id.clone()))?;
        self.inner.deliver(id, &session, command)
    }

    /// Send a command to every channel. Returns the number of channels that
    /// accepted it.
    pub fn broadcast(&self, command: &Command) -> usize {
        let sessions = self
            .inner
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect::<Vec<_>>();

        let reached = sessions
            .iter()
            .filter(|(id, session)| self.inner.deliver(id, session, command).is_ok())
            .count();
        trace!(command = command.name(), reached, "Broadcast command");

        if *command == Command::Reload {
            self.register_reload(reached);
        }
        reached
    }

    /// Forward updates of value `value_id` to channel `id`.
    ///
    /// Returns `false` without error for unknown channels and for values that
    /// are unknown or cannot be observed.
    pub fn observe(&self, id: &SenderId, value_id: &str) -> bool {
        let Some(session) = self.inner.sessions.get(id).map(|entry| entry.value().clone()) else {
            return false;
        };
        if session.teardowns().contains_key(value_id) {
            return true;
        }
        let Some(value) = self
            .inner
            .registry
            .as_ref()
            .and_then(|registry| registry.lookup(value_id))
        else {
            debug!(sender = %id, value = value_id, "Cannot observe unknown value");
            return false;
        };

        let observer: ObserverFn = {
            let inner = Arc::downgrade(&self.inner);
            let session = Arc::downgrade(&session);
            let sender_id = id.clone();
            let value_id = value_id.to_string();
            Arc::new(move |state: &str| {
                forward_update(&inner, &session, &sender_id, &value_id, state);
            })
        };
        let Some(teardown) = value.observe(observer) else {
            return false;
        };

        let mut teardowns = session.teardowns();
        if !session.alive.load(Ordering::SeqCst) {
            drop(teardowns);
            teardown.run();
            return false;
        }
        teardowns.insert(value_id.to_string(), teardown);
        trace!(sender = %id, value = value_id, "Observing value");
        true
    }

    /// Run the hot-reload handshake for a new channel.
    ///
    /// A client presenting an empty start id gets an error but is registered.
    /// A client presenting an outdated id is told to reload once and is not
    /// registered.
    pub fn attach(
        &self,
        id: SenderId,
        sender: Arc<dyn EventSender>,
        params: &SessionParams,
    ) -> AttachOutcome {
        match self.inner.start_id.check(params.usid.as_deref()) {
            StartIdCheck::Outdated => {
                debug!(sender = %id, "Outdated client, requesting reload");
                if sender.send(&Command::Reload).is_ok() {
                    self.register_reload(1);
                }
                return AttachOutcome::Reloading;
            }
            StartIdCheck::Empty => {
                let _ = sender.send(&Command::Error(EMPTY_USID_MESSAGE.to_string()));
            }
            StartIdCheck::Absent | StartIdCheck::Current => {}
        }

        self.add_sender(id.clone(), sender);
        let observed = params
            .observe
            .iter()
            .filter(|value_id| self.observe(&id, value_id))
            .count();
        AttachOutcome::Registered { observed }
    }

    /// Send `PING` to channel `id` every `interval` until it is gone.
    pub fn spawn_keepalive(&self, id: SenderId, interval: Duration) -> JoinHandle<()> {
        let broker = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                if broker.send_to(&id, &Command::Ping).is_err() {
                    trace!(sender = %id, "Keep-alive stopped");
                    break;
                }
            }
        })
    }

    /// Get broker statistics.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            sender_count: self.inner.sessions.len(),
            observation_count: self
                .inner
                .sessions
                .iter()
                .map(|entry| entry.teardowns().len())
                .sum(),
            commands_sent: self.inner.commands_sent.load(Ordering::Relaxed),
            send_failures: self.inner.send_failures.load(Ordering::Relaxed),
        }
    }

    fn register_reload(&self, count: usize) {
        if count == 0 {
            return;
        }
        let previous = self.inner.pending_reloads.fetch_add(count, Ordering::SeqCst);
        if previous > 0 {
            return;
        }

        let inner = self.inner.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(inner.config.reload_window).await;
                    inner.flush_reloads();
                });
            }
            Err(_) => inner.flush_reloads(),
        }
    }
}

impl Inner {
    fn deliver(&self, id: &SenderId, session: &Session, command: &Command) -> Result<(), LiveError> {
        if !session.alive.load(Ordering::SeqCst) {
            return Err(LiveError::SenderClosed);
        }
        match session.sender.send(command) {
            Ok(()) => {
                self.commands_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                debug!(sender = %id, error = %e, "Live send failed, removing channel");
                self.send_failures.fetch_add(1, Ordering::Relaxed);
                self.remove(id);
                Err(e)
            }
        }
    }

    fn remove(&self, id: &SenderId) -> bool {
        let Some((_, session)) = self.sessions.remove(id) else {
            return false;
        };
        session.alive.store(false, Ordering::SeqCst);
        let teardowns = std::mem::take(&mut *session.teardowns());
        let observations = teardowns.len();
        for teardown in teardowns.into_values() {
            teardown.run();
        }
        debug!(sender = %id, observations, "Live channel removed");
        true
    }

    fn flush_reloads(&self) {
        let count = self.pending_reloads.swap(0, Ordering::SeqCst);
        if count > 0 {
            info!("Hot reloaded {} client{}", count, if count == 1 { "" } else { "s" });
        }
    }
}

fn forward_update(
    inner: &Weak<Inner>,
    session: &Weak<Session>,
    sender_id: &SenderId,
    value_id: &str,
    state: &str,
) {
    let (Some(inner), Some(session)) = (inner.upgrade(), session.upgrade()) else {
        return;
    };
    let command = Command::Update {
        id: value_id.to_string(),
        data: state.to_string(),
    };
    let _ = inner.deliver(sender_id, &session, &command);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::ValueStore;

    #[derive(Default)]
    struct Recorder {
        commands: Mutex<Vec<Command>>,
        broken: AtomicBool,
    }

    impl Recorder {
        fn lines(&self) -> Vec<String> {
            self.commands
                .lock()
                .unwrap()
                .iter()
                .map(Command::to_line)
                .collect()
        }
    }

    impl EventSender for Recorder {
        fn send(&self, command: &Command) -> Result<(), LiveError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(LiveError::SenderClosed);
            }
            self.commands.lock().unwrap().push(command.clone());
            Ok(())
        }
    }

    fn broker() -> (Broker, Arc<ValueStore>) {
        let store = Arc::new(ValueStore::new());
        let broker = Broker::with_registry(
            StartId::new("abc"),
            BrokerConfig::default(),
            store.clone(),
        );
        (broker, store)
    }

    fn connect(broker: &Broker, id: &str) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        broker.add_sender(SenderId::from(id), recorder.clone());
        recorder
    }

    #[tokio::test]
    async fn test_broadcast_and_failure_removal() {
        let (broker, _) = broker();
        let a = connect(&broker, "a");
        let b = connect(&broker, "b");
        b.broken.store(true, Ordering::SeqCst);

        assert_eq!(broker.broadcast(&Command::Ping), 1);
        assert_eq!(a.lines(), vec!["PING"]);
        assert!(!broker.contains(&SenderId::from("b")));
        assert_eq!(broker.stats().send_failures, 1);
    }

    #[tokio::test]
    async fn test_send_to_unknown() {
        let (broker, _) = broker();
        assert!(matches!(
            broker.send_to(&SenderId::from("ghost"), &Command::Ping),
            Err(LiveError::UnknownSender(_))
        ));
    }

    #[tokio::test]
    async fn test_observe_forwards_updates() {
        let (broker, store) = broker();
        store.set("counter", &0).unwrap();
        let a = connect(&broker, "a");

        assert!(broker.observe(&SenderId::from("a"), "counter"));
        assert!(!broker.observe(&SenderId::from("a"), "missing"));
        assert!(!broker.observe(&SenderId::from("ghost"), "counter"));

        store.set("counter", &1).unwrap();
        assert_eq!(a.lines(), vec!["UPDATE counter 1"]);
        assert_eq!(broker.stats().observation_count, 1);
    }

    #[tokio::test]
    async fn test_no_callbacks_after_remove() {
        let (broker, store) = broker();
        store.set("counter", &0).unwrap();
        let a = connect(&broker, "a");
        broker.observe(&SenderId::from("a"), "counter");

        assert!(broker.remove_sender(&SenderId::from("a")));
        store.set("counter", &1).unwrap();

        assert!(a.lines().is_empty());
        assert_eq!(store.get("counter").map(|v| v.observer_count()), Some(0));
    }

    #[tokio::test]
    async fn test_update_failure_tears_down() {
        let (broker, store) = broker();
        store.set("x", &"a").unwrap();
        let a = connect(&broker, "a");
        broker.observe(&SenderId::from("a"), "x");
        a.broken.store(true, Ordering::SeqCst);

        store.set("x", &"b").unwrap();
        assert!(!broker.contains(&SenderId::from("a")));
        assert_eq!(store.get("x").map(|v| v.observer_count()), Some(0));
    }

    #[tokio::test]
    async fn test_attach_handshake() {
        let (broker, store) = broker();
        store.set("v", &true).unwrap();

        let empty = Arc::new(Recorder::default());
        let outcome = broker.attach(
            SenderId::from("e"),
            empty.clone(),
            &SessionParams::from_query(Some(""), None),
        );
        assert_eq!(outcome, AttachOutcome::Registered { observed: 0 });
        assert_eq!(
            empty.lines(),
            vec!["ERROR Cannot enable hot reloading, empty app usid"]
        );

        let old = Arc::new(Recorder::default());
        let outcome = broker.attach(
            SenderId::from("o"),
            old.clone(),
            &SessionParams::from_query(Some("zzz"), Some(r#"["v"]"#)),
        );
        assert_eq!(outcome, AttachOutcome::Reloading);
        assert_eq!(old.lines(), vec!["RELOAD"]);
        assert!(!broker.contains(&SenderId::from("o")));

        let current = Arc::new(Recorder::default());
        let outcome = broker.attach(
            SenderId::from("c"),
            current,
            &SessionParams::from_query(Some("abc"), Some(r#"["v", "nope"]"#)),
        );
        assert_eq!(outcome, AttachOutcome::Registered { observed: 1 });
    }

    #[test]
    fn test_session_params() {
        let params = SessionParams::from_query(None, Some("not json"));
        assert_eq!(params, SessionParams::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_stops_with_sender() {
        let (broker, _) = broker();
        let a = connect(&broker, "a");
        let handle = broker.spawn_keepalive(SenderId::from("a"), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(a.lines(), vec!["PING", "PING"]);

        broker.remove_sender(&SenderId::from("a"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_coalescing() {
        let (broker, _) = broker();
        connect(&broker, "a");
        connect(&broker, "b");

        assert_eq!(broker.broadcast(&Command::Reload), 2);
        assert_eq!(broker.broadcast(&Command::Reload), 2);
        assert_eq!(broker.inner.pending_reloads.load(Ordering::SeqCst), 4);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(broker.inner.pending_reloads.load(Ordering::SeqCst), 0);
    }
}
