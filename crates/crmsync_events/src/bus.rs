//! Topic-based publish/subscribe.
//!
//! Every subscription owns an unbounded queue and a dispatcher task. The
//! dispatcher hands each queued event to the listener on a worker pool of
//! fixed size, so publishing never blocks and a slow listener never grows
//! an unbounded number of tasks. Listeners must be reentrant when the pool
//! has more than one worker. With a single worker, a listener observes
//! events in publish order.
//!
//! A panicking listener is isolated: the panic is caught by the worker,
//! logged, and the subscription keeps running.

use crate::error::{EventError, EventResult};
use crate::event::Event;
use crate::topic::TopicPattern;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, Semaphore};

/// Default number of concurrent invocations per subscription.
pub const DEFAULT_LISTENER_WORKERS: usize = 4;

/// Receives events from the bus.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Handles one event.
    async fn handle(&self, event: Event);
}

/// Adapts a synchronous closure into a [`Listener`].
pub struct FnListener<F> {
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn(Event) + Send + Sync + 'static,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Listener for FnListener<F>
where
    F: Fn(Event) + Send + Sync + 'static,
{
    async fn handle(&self, event: Event) {
        (self.f)(event);
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    pattern: TopicPattern,
    sender: mpsc::UnboundedSender<Event>,
}

struct BusInner {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    in_flight: AtomicUsize,
    idle: Notify,
    closed: AtomicBool,
    default_workers: usize,
}

impl BusInner {
    fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// The event bus.
///
/// Cloning is cheap; clones share subscriptions.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a bus whose subscriptions use [`DEFAULT_LISTENER_WORKERS`].
    pub fn new() -> Self {
        Self::with_workers(DEFAULT_LISTENER_WORKERS)
    }

    /// Creates a bus with a custom default worker pool size.
    ///
    /// A size of zero is raised to one.
    pub fn with_workers(default_workers: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscriptions: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                closed: AtomicBool::new(false),
                default_workers: default_workers.max(1),
            }),
        }
    }

    /// Subscribes `listener` to `pattern` with the default worker pool.
    pub fn subscribe<L: Listener>(
        &self,
        pattern: impl Into<TopicPattern>,
        listener: L,
    ) -> EventResult<SubscriptionId> {
        self.subscribe_with(pattern, self.inner.default_workers, Arc::new(listener))
    }

    /// Subscribes a synchronous closure to `pattern`.
    pub fn subscribe_fn<F>(
        &self,
        pattern: impl Into<TopicPattern>,
        f: F,
    ) -> EventResult<SubscriptionId>
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.subscribe(pattern, FnListener::new(f))
    }

    /// Subscribes a shared listener with a worker pool of `workers`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe_with(
        &self,
        pattern: impl Into<TopicPattern>,
        workers: usize,
        listener: Arc<dyn Listener>,
    ) -> EventResult<SubscriptionId> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(EventError::Closed);
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| EventError::NoRuntime)?;

        let pattern = pattern.into();
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = mpsc::unbounded_channel();
        handle.spawn(dispatch(
            receiver,
            listener,
            Arc::new(Semaphore::new(workers.max(1))),
            Arc::clone(&self.inner),
        ));

        self.inner.subscriptions.write().push(Subscription {
            id,
            pattern,
            sender,
        });
        tracing::debug!(subscription = id.0, %pattern, workers, "listener subscribed");
        Ok(id)
    }

    /// Removes a subscription. Events already queued for it are still
    /// delivered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.inner.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Publishes `event` to every matching subscription.
    ///
    /// Never blocks on listeners. Returns the number of subscriptions the
    /// event was queued for; events published after [`close`](Self::close)
    /// are dropped.
    pub fn publish(&self, event: Event) -> usize {
        if self.inner.closed.load(Ordering::SeqCst) {
            tracing::trace!(topic = %event.topic, "event dropped, bus closed");
            return 0;
        }

        let subscriptions = self.inner.subscriptions.read();
        let mut delivered = 0;
        for subscription in subscriptions
            .iter()
            .filter(|s| s.pattern.matches(&event.topic))
        {
            self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
            if subscription.sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                self.inner.finish_one();
            }
        }
        delivered
    }

    /// Waits until every queued and running listener invocation, including
    /// ones for events published by listeners meanwhile, has finished.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stops accepting events and subscriptions. Queued events are still
    /// delivered; call [`drain`](Self::drain) to wait for them.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.subscriptions.write().clear();
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    /// Number of listener invocations queued or running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("in_flight", &self.in_flight())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<Event>,
    listener: Arc<dyn Listener>,
    workers: Arc<Semaphore>,
    inner: Arc<BusInner>,
) {
    while let Some(event) = receiver.recv().await {
        let permit = match Arc::clone(&workers).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                inner.finish_one();
                continue;
            }
        };

        let listener = Arc::clone(&listener);
        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let topic = event.topic;
            let invocation = tokio::spawn(async move { listener.handle(event).await });
            if let Err(err) = invocation.await {
                if err.is_panic() {
                    tracing::error!(%topic, "event listener panicked");
                } else {
                    tracing::warn!(%topic, error = %err, "event listener aborted");
                }
            }
            drop(permit);
            inner.finish_one();
        });
    }
}
