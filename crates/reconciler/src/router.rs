//! Event router dispatching resource lifecycle events to handlers.
//!
//! Every resource identity gets its own lane: a task draining an ordered
//! queue, so events for one identity are handled one at a time in arrival
//! order while different identities proceed concurrently.
//!
//! A create or update that was deferred, or that gave up after its retries,
//! leaves its identity unsettled. The next sighting of that identity, even
//! with an unchanged desired state, dispatches it again as a create.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::types::{Declared, ObjectKey};

/// Default upper bound for one handler invocation.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

/// Event reported by a resource watch.
#[derive(Debug, Clone)]
pub enum WatchEvent<K> {
    /// Object was created or modified.
    Applied(K),
    /// Object was removed.
    Deleted(K),
    /// A full relist begins.
    ResyncStarted,
    /// Object present in the relist.
    Listed(K),
    /// The relist is complete.
    ResyncDone,
}

/// Lifecycle transition a handler is invoked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventAction {
    /// First sighting of an identity.
    Create,
    /// Desired state of a known identity changed.
    Update,
    /// Identity disappeared.
    Delete,
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Handlers for the lifecycle of one resource kind.
#[async_trait]
pub trait EventHandler<K>: Send + Sync {
    /// Resource was created.
    async fn on_create(&self, obj: &K) -> Result<()>;

    /// Resource desired state changed from `old` to `new`.
    async fn on_update(&self, old: &K, new: &K) -> Result<()>;

    /// Resource was deleted; `obj` is its last known state.
    async fn on_delete(&self, obj: &K) -> Result<()>;
}

/// Final result of handling one event.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    /// Identity of the resource.
    pub key: ObjectKey,
    /// Transition that was handled.
    pub action: EventAction,
    /// Number of handler invocations.
    pub attempts: u32,
    /// Terminal error, if the event failed.
    pub error: Option<Error>,
}

impl EventOutcome {
    /// Whether the handler eventually succeeded.
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Whether the handler postponed the event until the object is seen again.
    pub fn deferred(&self) -> bool {
        self.error.as_ref().is_some_and(Error::is_deferred)
    }
}

/// Configuration for the router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Backoff applied to transient handler failures.
    pub retry: RetryPolicy,
    /// Upper bound for one handler invocation.
    pub handler_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }
}

enum Dispatch<K> {
    Create(K),
    Update { old: K, new: K },
    Delete(K),
}

impl<K> Dispatch<K> {
    const fn action(&self) -> EventAction {
        match self {
            Self::Create(_) => EventAction::Create,
            Self::Update { .. } => EventAction::Update,
            Self::Delete(_) => EventAction::Delete,
        }
    }
}

struct Lane<K> {
    tx: mpsc::UnboundedSender<Dispatch<K>>,
    handle: JoinHandle<()>,
}

/// Identities whose last create or update did not take effect.
#[derive(Clone, Default)]
struct Unsettled(Arc<Mutex<HashSet<ObjectKey>>>);

impl Unsettled {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<ObjectKey>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, key: &ObjectKey) {
        self.lock().insert(key.clone());
    }

    fn remove(&self, key: &ObjectKey) -> bool {
        self.lock().remove(key)
    }
}

/// Routes watch events of one resource kind to an [`EventHandler`].
pub struct EventRouter<K: Declared> {
    handler: Arc<dyn EventHandler<K>>,
    config: RouterConfig,
    kind: String,
    known: HashMap<ObjectKey, K>,
    lanes: HashMap<ObjectKey, Lane<K>>,
    retiring: HashMap<ObjectKey, JoinHandle<()>>,
    listed: Option<HashSet<ObjectKey>>,
    unsettled: Unsettled,
    outcomes: Option<mpsc::UnboundedSender<EventOutcome>>,
}

impl<K: Declared> EventRouter<K> {
    /// Create a router for a handler.
    pub fn new(handler: Arc<dyn EventHandler<K>>, config: RouterConfig) -> Self {
        Self {
            handler,
            config,
            kind: K::kind(&()).to_string(),
            known: HashMap::new(),
            lanes: HashMap::new(),
            retiring: HashMap::new(),
            listed: None,
            unsettled: Unsettled::default(),
            outcomes: None,
        }
    }

    /// Report every finished event on `tx`.
    #[must_use]
    pub fn with_outcomes(mut self, tx: mpsc::UnboundedSender<EventOutcome>) -> Self {
        self.outcomes = Some(tx);
        self
    }

    /// Consume events until the stream ends, then wait for in-flight handlers.
    pub async fn run<S>(mut self, events: S)
    where
        S: Stream<Item = WatchEvent<K>> + Send,
    {
        info!(kind = %self.kind, "Event router started");
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            self.handle(event);
        }
        self.drain().await;
        info!(kind = %self.kind, "Event router stopped");
    }

    fn handle(&mut self, event: WatchEvent<K>) {
        self.retiring.retain(|_, handle| !handle.is_finished());

        match event {
            WatchEvent::Applied(obj) => self.applied(obj),
            WatchEvent::Deleted(obj) => self.deleted(obj),
            WatchEvent::ResyncStarted => {
                debug!(kind = %self.kind, "Relist started");
                self.listed = Some(HashSet::new());
            }
            WatchEvent::Listed(obj) => {
                if let Some(listed) = self.listed.as_mut() {
                    listed.insert(ObjectKey::of(&obj));
                }
                self.applied(obj);
            }
            WatchEvent::ResyncDone => self.resync_done(),
        }
    }

    fn applied(&mut self, obj: K) {
        let key = ObjectKey::of(&obj);
        if obj.meta().deletion_timestamp.is_some() {
            debug!(kind = %self.kind, %key, "Deletion pending, waiting for removal");
            return;
        }

        match self.known.insert(key.clone(), obj.clone()) {
            None => self.dispatch(key, Dispatch::Create(obj)),
            Some(old) if old.declared() != obj.declared() => {
                self.dispatch(key, Dispatch::Update { old, new: obj });
            }
            Some(_) if self.unsettled.remove(&key) => {
                info!(kind = %self.kind, %key, "Seen again while unsettled, dispatching anew");
                self.dispatch(key, Dispatch::Create(obj));
            }
            Some(_) => debug!(kind = %self.kind, %key, "Desired state unchanged"),
        }
    }

    fn deleted(&mut self, obj: K) {
        let key = ObjectKey::of(&obj);
        self.known.remove(&key);
        self.unsettled.remove(&key);
        self.dispatch(key.clone(), Dispatch::Delete(obj));
        self.retire(&key);
    }

    fn resync_done(&mut self) {
        let Some(listed) = self.listed.take() else {
            return;
        };
        let vanished: Vec<ObjectKey> = self
            .known
            .keys()
            .filter(|key| !listed.contains(key))
            .cloned()
            .collect();

        debug!(kind = %self.kind, listed = listed.len(), vanished = vanished.len(), "Relist done");
        for key in vanished {
            if let Some(obj) = self.known.remove(&key) {
                self.unsettled.remove(&key);
                info!(kind = %self.kind, %key, "Removed while unobserved");
                self.dispatch(key.clone(), Dispatch::Delete(obj));
                self.retire(&key);
            }
        }
    }

    fn dispatch(&mut self, key: ObjectKey, dispatch: Dispatch<K>) {
        debug!(kind = %self.kind, %key, action = %dispatch.action(), "Dispatching event");

        if !self.lanes.contains_key(&key) {
            let lane = self.spawn_lane(key.clone());
            self.lanes.insert(key.clone(), lane);
        }
        let sent = self
            .lanes
            .get(&key)
            .map(|lane| lane.tx.send(dispatch).is_ok())
            .unwrap_or(false);
        if !sent {
            error!(kind = %self.kind, %key, "Lane closed, event dropped");
        }
    }

    fn retire(&mut self, key: &ObjectKey) {
        // Dropping the sender lets the lane finish its queue and exit.
        if let Some(lane) = self.lanes.remove(key) {
            self.retiring.insert(key.clone(), lane.handle);
        }
    }

    fn spawn_lane(&mut self, key: ObjectKey) -> Lane<K> {
        let (tx, rx) = mpsc::unbounded_channel();
        let predecessor = self.retiring.remove(&key);
        let worker = LaneWorker {
            handler: Arc::clone(&self.handler),
            config: self.config.clone(),
            key: key.clone(),
            unsettled: self.unsettled.clone(),
            outcomes: self.outcomes.clone(),
        };
        let span = info_span!("lane", kind = %self.kind, %key);
        let handle = tokio::spawn(worker.run(rx, predecessor).instrument(span));
        Lane { tx, handle }
    }

    async fn drain(&mut self) {
        let handles: Vec<JoinHandle<()>> = self
            .lanes
            .drain()
            .map(|(_, lane)| lane.handle)
            .chain(self.retiring.drain().map(|(_, handle)| handle))
            .collect();

        for handle in handles {
            if let Err(err) = handle.await {
                error!(kind = %self.kind, error = %err, "Lane task failed");
            }
        }
    }
}

struct LaneWorker<K> {
    handler: Arc<dyn EventHandler<K>>,
    config: RouterConfig,
    key: ObjectKey,
    unsettled: Unsettled,
    outcomes: Option<mpsc::UnboundedSender<EventOutcome>>,
}

impl<K: Declared> LaneWorker<K> {
    async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<Dispatch<K>>,
        predecessor: Option<JoinHandle<()>>,
    ) {
        // A re-created identity must not overtake the lane handling its deletion.
        if let Some(previous) = predecessor {
            if let Err(err) = previous.await {
                warn!(error = %err, "Previous lane failed");
            }
        }

        while let Some(dispatch) = rx.recv().await {
            let outcome = self.process(&dispatch).await;
            self.record(&outcome);
            if let Some(tx) = &self.outcomes {
                // Nobody listening is fine.
                let _ = tx.send(outcome);
            }
        }
    }

    async fn process(&self, dispatch: &Dispatch<K>) -> EventOutcome {
        let action = dispatch.action();
        let mut retry = self.config.retry.state();
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            let result =
                match tokio::time::timeout(self.config.handler_timeout, self.invoke(dispatch)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::transient(format!(
                        "handler timed out after {:?}",
                        self.config.handler_timeout
                    ))),
                };

            let err = match result {
                Ok(()) => {
                    info!(%action, attempts, "Event handled");
                    return self.outcome(action, attempts, None);
                }
                Err(err) => err,
            };

            if err.is_deferred() {
                info!(%action, attempts, reason = %err, "Event deferred");
                return self.outcome(action, attempts, Some(err));
            }

            if !self.config.retry.should_retry(&err) {
                error!(%action, attempts, error = %err, "Event failed permanently");
                return self.outcome(action, attempts, Some(err));
            }

            match retry.next_retry() {
                Some(delay) => {
                    warn!(%action, attempts, error = %err, ?delay, "Event failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!(%action, attempts, error = %err, "Event failed, retries exhausted");
                    return self.outcome(action, attempts, Some(err));
                }
            }
        }
    }

    /// Remember whether a create or update still has to take effect.
    fn record(&self, outcome: &EventOutcome) {
        if outcome.action == EventAction::Delete {
            return;
        }
        match &outcome.error {
            Some(err) if err.is_deferred() || err.is_transient() => self.unsettled.insert(&self.key),
            _ => {
                self.unsettled.remove(&self.key);
            }
        }
    }

    async fn invoke(&self, dispatch: &Dispatch<K>) -> Result<()> {
        match dispatch {
            Dispatch::Create(obj) => self.handler.on_create(obj).await,
            Dispatch::Update { old, new } => self.handler.on_update(old, new).await,
            Dispatch::Delete(obj) => self.handler.on_delete(obj).await,
        }
    }

    fn outcome(&self, action: EventAction, attempts: u32, error: Option<Error>) -> EventOutcome {
        EventOutcome {
            key: self.key.clone(),
            action,
            attempts,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::indexing_slicing)]
    #![allow(clippy::arithmetic_side_effects)]

    use super::*;
    use crate::types::{KeyValuePair, KeyValuePairSpec};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    fn kvp(name: &str, key: &str, value: serde_json::Value) -> KeyValuePair {
        let mut kvp = KeyValuePair::new(
            name,
            KeyValuePairSpec {
                config: "svc-a".to_string(),
                key: key.to_string(),
                value,
            },
        );
        kvp.metadata.namespace = Some("ns".to_string());
        kvp
    }

    struct Recorder {
        calls: Mutex<Vec<String>>,
        failures_left: AtomicU32,
        failure: Error,
    }

    impl Default for Recorder {
        fn default() -> Self {
            Self::failing(0, Error::transient("api unavailable"))
        }
    }

    impl Recorder {
        fn failing(times: u32, failure: Error) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failures_left: AtomicU32::new(times),
                failure,
            }
        }

        async fn record(&self, entry: String) -> Result<()> {
            self.calls.lock().await.push(entry);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(self.failure.clone());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl EventHandler<KeyValuePair> for Recorder {
        async fn on_create(&self, obj: &KeyValuePair) -> Result<()> {
            self.record(format!("create {} {}", obj.metadata.name.clone().unwrap_or_default(), obj.spec.value))
                .await
        }

        async fn on_update(&self, old: &KeyValuePair, new: &KeyValuePair) -> Result<()> {
            self.record(format!(
                "update {} {}->{}",
                new.metadata.name.clone().unwrap_or_default(),
                old.spec.value,
                new.spec.value
            ))
            .await
        }

        async fn on_delete(&self, obj: &KeyValuePair) -> Result<()> {
            self.record(format!("delete {}", obj.metadata.name.clone().unwrap_or_default()))
                .await
        }
    }

    fn fast_config() -> RouterConfig {
        RouterConfig {
            retry: RetryPolicy::new(3, 1, 5).with_jitter(0.0),
            handler_timeout: Duration::from_secs(5),
        }
    }

    async fn route(
        recorder: Arc<Recorder>,
        events: Vec<WatchEvent<KeyValuePair>>,
    ) -> Vec<EventOutcome> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = EventRouter::<KeyValuePair>::new(recorder, fast_config()).with_outcomes(tx);
        router.run(futures::stream::iter(events)).await;

        let mut outcomes = Vec::new();
        while let Ok(outcome) = rx.try_recv() {
            outcomes.push(outcome);
        }
        outcomes
    }

    #[tokio::test]
    async fn test_classifies_create_update_and_noop() {
        let recorder = Arc::new(Recorder::default());
        let outcomes = route(
            recorder.clone(),
            vec![
                WatchEvent::Applied(kvp("a", "x", json!(1))),
                WatchEvent::Applied(kvp("a", "x", json!(1))),
                WatchEvent::Applied(kvp("a", "x", json!(2))),
                WatchEvent::Deleted(kvp("a", "x", json!(2))),
            ],
        )
        .await;

        let calls = recorder.calls.lock().await.clone();
        assert_eq!(calls, vec!["create a 1", "update a 1->2", "delete a"]);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(EventOutcome::succeeded));
    }

    #[tokio::test]
    async fn test_events_for_one_identity_stay_ordered() {
        let recorder = Arc::new(Recorder::default());
        let mut events = Vec::new();
        for i in 0..20 {
            events.push(WatchEvent::Applied(kvp("a", "x", json!(i))));
        }
        route(recorder.clone(), events).await;

        let calls = recorder.calls.lock().await.clone();
        assert_eq!(calls.len(), 20);
        assert_eq!(calls[0], "create a 0");
        for (i, call) in calls.iter().enumerate().skip(1) {
            assert_eq!(call, &format!("update a {}->{}", i - 1, i));
        }
    }

    #[tokio::test]
    async fn test_recreated_identity_waits_for_deletion() {
        let recorder = Arc::new(Recorder::default());
        route(
            recorder.clone(),
            vec![
                WatchEvent::Applied(kvp("a", "x", json!(1))),
                WatchEvent::Deleted(kvp("a", "x", json!(1))),
                WatchEvent::Applied(kvp("a", "x", json!(3))),
            ],
        )
        .await;

        let calls = recorder.calls.lock().await.clone();
        assert_eq!(calls, vec!["create a 1", "delete a", "create a 3"]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let recorder = Arc::new(Recorder::failing(2, Error::transient("api unavailable")));
        let outcomes = route(recorder.clone(), vec![WatchEvent::Applied(kvp("a", "x", json!(1)))]).await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].succeeded());
        assert_eq!(outcomes[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_retries_exhaust() {
        let recorder = Arc::new(Recorder::failing(10, Error::transient("api unavailable")));
        let outcomes = route(recorder.clone(), vec![WatchEvent::Applied(kvp("a", "x", json!(1)))]).await;

        assert!(!outcomes[0].succeeded());
        assert_eq!(outcomes[0].attempts, 4);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let recorder = Arc::new(Recorder::failing(1, Error::permanent("bad spec")));
        let outcomes = route(recorder.clone(), vec![WatchEvent::Applied(kvp("a", "x", json!(1)))]).await;

        assert_eq!(outcomes[0].attempts, 1);
        let err = outcomes[0].error.clone().expect("terminal error");
        assert!(!err.is_transient());
        assert_eq!(recorder.calls.lock().await.len(), 1);
    }

    /// Feed events one at a time, waiting for the paired number of outcomes
    /// after each.
    async fn route_stepwise(
        recorder: Arc<Recorder>,
        steps: Vec<(WatchEvent<KeyValuePair>, usize)>,
    ) -> Vec<EventOutcome> {
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = futures::channel::mpsc::unbounded();
        let router = EventRouter::<KeyValuePair>::new(recorder, fast_config()).with_outcomes(outcome_tx);

        let drive = async move {
            let mut outcomes = Vec::new();
            for (event, expected) in steps {
                event_tx.unbounded_send(event).unwrap();
                for _ in 0..expected {
                    outcomes.push(outcome_rx.recv().await.expect("outcome"));
                }
            }
            drop(event_tx);
            outcomes
        };
        let ((), outcomes) = tokio::join!(router.run(event_rx), drive);
        outcomes
    }

    #[tokio::test]
    async fn test_deferred_event_is_dispatched_again_on_relist() {
        let recorder = Arc::new(Recorder::failing(1, Error::deferred("no backing store")));
        let outcomes = route_stepwise(
            recorder.clone(),
            vec![
                (WatchEvent::Applied(kvp("a", "x", json!(1))), 1),
                (WatchEvent::ResyncStarted, 0),
                (WatchEvent::Listed(kvp("a", "x", json!(1))), 1),
                (WatchEvent::ResyncDone, 0),
                (WatchEvent::Listed(kvp("a", "x", json!(1))), 0),
            ],
        )
        .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].deferred());
        assert_eq!(outcomes[0].attempts, 1);
        assert!(outcomes[1].succeeded());

        let calls = recorder.calls.lock().await.clone();
        assert_eq!(calls, vec!["create a 1", "create a 1"]);
    }

    #[tokio::test]
    async fn test_exhausted_event_is_dispatched_again_when_seen() {
        let recorder = Arc::new(Recorder::failing(4, Error::transient("api unavailable")));
        let outcomes = route_stepwise(
            recorder.clone(),
            vec![
                (WatchEvent::Applied(kvp("a", "x", json!(1))), 1),
                (WatchEvent::Applied(kvp("a", "x", json!(1))), 1),
            ],
        )
        .await;

        assert!(!outcomes[0].succeeded());
        assert!(!outcomes[0].deferred());
        assert!(outcomes[1].succeeded());
        assert_eq!(recorder.calls.lock().await.len(), 5);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_dispatched_again() {
        let recorder = Arc::new(Recorder::failing(1, Error::permanent("bad spec")));
        let outcomes = route_stepwise(
            recorder.clone(),
            vec![
                (WatchEvent::Applied(kvp("a", "x", json!(1))), 1),
                (WatchEvent::Applied(kvp("a", "x", json!(1))), 0),
            ],
        )
        .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(recorder.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_relist_deletes_vanished_identities() {
        let recorder = Arc::new(Recorder::default());
        route(
            recorder.clone(),
            vec![
                WatchEvent::Applied(kvp("a", "x", json!(1))),
                WatchEvent::Applied(kvp("b", "y", json!(1))),
                WatchEvent::ResyncStarted,
                WatchEvent::Listed(kvp("a", "x", json!(1))),
                WatchEvent::ResyncDone,
            ],
        )
        .await;

        let calls = recorder.calls.lock().await.clone();
        assert!(calls.contains(&"delete b".to_string()));
        assert!(!calls.contains(&"delete a".to_string()));
        assert_eq!(calls.iter().filter(|c| c.starts_with("create a")).count(), 1);
    }

    #[tokio::test]
    async fn test_slow_handler_times_out_as_transient() {
        struct Stuck;

        #[async_trait]
        impl EventHandler<KeyValuePair> for Stuck {
            async fn on_create(&self, _: &KeyValuePair) -> Result<()> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            async fn on_update(&self, _: &KeyValuePair, _: &KeyValuePair) -> Result<()> {
                Ok(())
            }
            async fn on_delete(&self, _: &KeyValuePair) -> Result<()> {
                Ok(())
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = RouterConfig {
            retry: RetryPolicy::new(1, 1, 1).with_jitter(0.0),
            handler_timeout: Duration::from_millis(20),
        };
        EventRouter::<KeyValuePair>::new(Arc::new(Stuck), config)
            .with_outcomes(tx)
            .run(futures::stream::iter(vec![WatchEvent::Applied(kvp("a", "x", json!(1)))]))
            .await;

        let outcome = rx.try_recv().expect("outcome");
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.error.expect("timeout error").is_transient());
    }
}
