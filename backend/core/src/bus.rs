//! In-process publish/subscribe bus shared by every plugin.
//!
//! Publishers push into a bounded Tokio mpsc channel; a single dispatch
//! worker drains it and fans each event out to the topic's subscribers, one
//! Tokio task per handler. Closing the bus drains everything already buffered
//! and waits for every handler task before returning.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::cancel::CancelScope;
use crate::error::BusError;
use crate::event::Event;

/// Default channel buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default deadline applied by [`EventBus::publish_within_default`].
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub buffer_size: usize,
    pub publish_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

/// A subscriber callback. Errors are logged by the dispatcher and never reach
/// the publisher.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "handler"
    }

    async fn handle(&self, event: &Event) -> Result<()>;
}

struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        (self.f)(event.clone()).await
    }
}

struct Subscriber {
    id: Uuid,
    handler: Arc<dyn EventHandler>,
}

type SubscriberMap = HashMap<String, Vec<Subscriber>>;

struct BusInner {
    config: BusConfig,
    closed: AtomicBool,
    sender: RwLock<Option<mpsc::Sender<Event>>>,
    subscribers: Arc<RwLock<SubscriberMap>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Cheaply cloneable handle to a running bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus with default settings. Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus and spawn its dispatch worker. Must be called inside a
    /// Tokio runtime.
    pub fn with_config(config: BusConfig) -> Self {
        let buffer = config.buffer_size.max(1);
        let (tx, rx) = mpsc::channel(buffer);
        let subscribers: Arc<RwLock<SubscriberMap>> = Arc::default();
        let worker = tokio::spawn(dispatch_loop(rx, Arc::clone(&subscribers)));

        info!(buffer_size = buffer, "Event bus started");

        Self {
            inner: Arc::new(BusInner {
                config,
                closed: AtomicBool::new(false),
                sender: RwLock::new(Some(tx)),
                subscribers,
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Publish an event.
    ///
    /// Tries a non-blocking send first. When the buffer is full the call waits
    /// for space until `scope` is cancelled or its deadline passes, in which
    /// case it returns [`BusError::PublishTimeout`].
    pub async fn publish(&self, scope: &CancelScope, mut event: Event) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let sender = self
            .inner
            .sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(BusError::Closed)?;

        event.stamp_if_unset();
        let topic = event.name.clone();

        let event = match sender.try_send(event) {
            Ok(()) => {
                trace!(topic = %topic, "Event buffered");
                return Ok(());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return Err(BusError::Closed),
            Err(mpsc::error::TrySendError::Full(event)) => event,
        };

        debug!(topic = %topic, "Event buffer full; waiting for space");
        tokio::select! {
            sent = sender.send(event) => sent.map_err(|_| BusError::Closed),
            reason = scope.cancelled() => {
                warn!(topic = %topic, %reason, "Publish gave up waiting for buffer space");
                Err(BusError::PublishTimeout { topic })
            }
        }
    }

    /// Publish with a deadline of `timeout` for the blocking fallback.
    pub async fn publish_within(&self, event: Event, timeout: Duration) -> Result<(), BusError> {
        self.publish(&CancelScope::timeout(timeout), event).await
    }

    /// Publish using the configured default publish timeout.
    pub async fn publish_within_default(&self, event: Event) -> Result<(), BusError> {
        self.publish_within(event, self.inner.config.publish_timeout).await
    }

    /// Register `handler` for the exact topic `topic`.
    pub fn subscribe(&self, topic: impl Into<String>, handler: Arc<dyn EventHandler>) -> Subscription {
        let topic = topic.into();
        let id = Uuid::new_v4();
        debug!(topic = %topic, handler = handler.name(), "Subscribing handler");
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.clone())
            .or_default()
            .push(Subscriber { id, handler });

        Subscription {
            id,
            topic,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Register an async closure as a handler.
    pub fn subscribe_fn<F, Fut>(&self, topic: impl Into<String>, f: F) -> Subscription
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let topic = topic.into();
        let handler = FnHandler {
            name: format!("fn:{topic}"),
            f,
        };
        self.subscribe(topic, Arc::new(handler))
    }

    /// Number of live handlers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Topics with at least one handler, sorted.
    pub fn topics(&self) -> Vec<String> {
        let map = self.inner.subscribers.read().unwrap_or_else(PoisonError::into_inner);
        let mut topics: Vec<String> = map
            .iter()
            .filter(|(_, subs)| !subs.is_empty())
            .map(|(topic, _)| topic.clone())
            .collect();
        topics.sort();
        topics
    }

    /// Stop accepting events, drain the buffer, and wait for every handler
    /// invoked for a buffered event to finish. Only the first call does work.
    pub async fn close(&self) {
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        info!("Closing event bus");
        // The worker sees end-of-stream once this sender and any clones held
        // by in-flight publishers are gone and the buffer is empty.
        self.inner
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let worker = self.inner.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Event bus dispatch worker terminated abnormally");
            }
        }
        info!("Event bus closed");
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    topic: String,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove this handler. A no-op once the bus is closed or dropped.
    pub fn unsubscribe(&self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        if bus.closed.load(Ordering::Acquire) {
            return;
        }
        let mut map = bus.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(subs) = map.get_mut(&self.topic) {
            subs.retain(|s| s.id != self.id);
            if subs.is_empty() {
                map.remove(&self.topic);
            }
        }
        debug!(topic = %self.topic, "Handler unsubscribed");
    }
}

async fn dispatch_loop(mut rx: mpsc::Receiver<Event>, subscribers: Arc<RwLock<SubscriberMap>>) {
    let mut in_flight: JoinSet<()> = JoinSet::new();

    while let Some(event) = rx.recv().await {
        let handlers: Vec<Arc<dyn EventHandler>> = subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.name)
            .map(|subs| subs.iter().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            trace!(topic = %event.name, "No subscribers for event");
        } else {
            let event = Arc::new(event);
            for handler in handlers {
                let event = Arc::clone(&event);
                in_flight.spawn(async move {
                    if let Err(e) = handler.handle(&event).await {
                        warn!(topic = %event.name, handler = handler.name(), error = %e, "Event handler failed");
                    }
                });
            }
        }

        while let Some(finished) = in_flight.try_join_next() {
            report_join(finished);
        }
    }

    debug!(pending = in_flight.len(), "Dispatch worker draining in-flight handlers");
    while let Some(finished) = in_flight.join_next().await {
        report_join(finished);
    }
    debug!("Dispatch worker stopped");
}

fn report_join(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Event handler panicked");
        } else {
            warn!(error = %e, "Event handler task cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    async fn wait_for_count(counter: &AtomicUsize, expected: usize) -> bool {
        let started = Instant::now();
        while started.elapsed() < Duration::from_secs(2) {
            if counter.load(Ordering::SeqCst) >= expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    fn counting(counter: &Arc<AtomicUsize>) -> impl Fn(Event) -> std::future::Ready<Result<()>> {
        let counter = Arc::clone(counter);
        move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _a = bus.subscribe_fn("user.created", counting(&counter));
        let _b = bus.subscribe_fn("user.created", counting(&counter));

        bus.publish(&CancelScope::new(), Event::new("user.created", serde_json::json!({})))
            .await
            .unwrap();

        assert!(wait_for_count(&counter, 2).await);
        bus.close().await;
    }

    #[tokio::test]
    async fn test_topics_are_exact_match() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _sub = bus.subscribe_fn("user.created", counting(&counter));

        let scope = CancelScope::new();
        bus.publish(&scope, Event::new("user", serde_json::Value::Null)).await.unwrap();
        bus.publish(&scope, Event::new("user.created.v2", serde_json::Value::Null)).await.unwrap();
        bus.close().await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let sub = bus.subscribe_fn("tick", counting(&counter));
        let scope = CancelScope::new();

        bus.publish(&scope, Event::new("tick", serde_json::Value::Null)).await.unwrap();
        assert!(wait_for_count(&counter, 1).await);

        sub.unsubscribe();
        assert_eq!(bus.subscriber_count("tick"), 0);

        bus.publish(&scope, Event::new("tick", serde_json::Value::Null)).await.unwrap();
        bus.close().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_only_its_handler() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let first = bus.subscribe_fn("tick", counting(&counter));
        let _second = bus.subscribe_fn("tick", counting(&counter));

        first.unsubscribe();
        first.unsubscribe();
        assert_eq!(bus.subscriber_count("tick"), 1);
        bus.close().await;
    }

    #[tokio::test]
    async fn test_publish_after_close_fails() {
        let bus = EventBus::new();
        bus.close().await;

        let err = bus
            .publish(&CancelScope::new(), Event::new("tick", serde_json::Value::Null))
            .await
            .unwrap_err();
        assert_eq!(err, BusError::Closed);
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_unsubscribe_after_close_is_noop() {
        let bus = EventBus::new();
        let sub = bus.subscribe_fn("tick", |_event| async { Ok(()) });
        bus.close().await;
        bus.close().await;

        sub.unsubscribe();
        assert!(bus.is_closed());
        assert_eq!(bus.subscriber_count("tick"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_waits_for_in_flight_handlers() {
        let bus = EventBus::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let _sub = bus.subscribe_fn("slow", move |_event| {
            let flag = Arc::clone(&flag);
            async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        bus.publish(&CancelScope::new(), Event::new("slow", serde_json::Value::Null))
            .await
            .unwrap();
        bus.close().await;

        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_drains_buffered_events() {
        let bus = EventBus::with_config(BusConfig {
            buffer_size: 64,
            ..BusConfig::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));
        let _sub = bus.subscribe_fn("burst", counting(&counter));

        let scope = CancelScope::new();
        for i in 0..50 {
            bus.publish(&scope, Event::new("burst", serde_json::json!(i))).await.unwrap();
        }
        bus.close().await;

        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle(&self, _event: &Event) -> Result<()> {
            anyhow::bail!("boom")
        }
    }

    struct Panicking;

    #[async_trait]
    impl EventHandler for Panicking {
        async fn handle(&self, _event: &Event) -> Result<()> {
            panic!("handler panic")
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handler_errors_do_not_stop_dispatch() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _failing = bus.subscribe("job", Arc::new(Failing));
        let _panicking = bus.subscribe("job", Arc::new(Panicking));
        let _counting = bus.subscribe_fn("job", counting(&counter));

        let scope = CancelScope::new();
        bus.publish(&scope, Event::new("job", serde_json::Value::Null)).await.unwrap();
        bus.publish(&scope, Event::new("job", serde_json::Value::Null)).await.unwrap();
        bus.close().await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_publish_timeout_on_full_buffer_with_stalled_worker() {
        // Build a bus whose dispatcher cannot run: a current-thread runtime
        // only polls the worker when this task yields, and try_send plus an
        // already-expired scope never yields before giving up.
        let bus = EventBus::with_config(BusConfig {
            buffer_size: 1,
            ..BusConfig::default()
        });
        let expired = CancelScope::new();
        expired.cancel();

        bus.publish(&expired, Event::new("a", serde_json::Value::Null)).await.unwrap();
        let err = bus
            .publish(&expired, Event::new("b", serde_json::Value::Null))
            .await
            .unwrap_err();
        assert_eq!(err, BusError::PublishTimeout { topic: "b".into() });
        bus.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_publish_on_full_buffer_waits_for_space() {
        let bus = EventBus::with_config(BusConfig {
            buffer_size: 1,
            ..BusConfig::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));
        let _sub = bus.subscribe_fn("burst", counting(&counter));

        let scope = CancelScope::new();
        for i in 0..200 {
            bus.publish(&scope, Event::new("burst", serde_json::json!({ "seq": i })))
                .await
                .unwrap();
        }
        bus.close().await;

        assert_eq!(counter.load(Ordering::SeqCst), 200);
    }
}
