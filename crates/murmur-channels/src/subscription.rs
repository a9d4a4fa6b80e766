//! Listener fan-out over a gateway live query.
//!
//! A [`LiveFeed`] owns at most one gateway [`LiveQuery`] at a time and fans
//! every snapshot it yields out to the registered listeners. The query is
//! opened when the first listener arrives and dropped when the last one
//! leaves, so any number of subscribers to the same collection share one
//! gateway subscription.
//!
//! # State machine
//!
//! ```text
//! Unsubscribed -> Subscribing -> Live -> (Error | Unsubscribed)
//! ```
//!
//! `Live` re-enters itself on every snapshot. A failed or closed query moves
//! the feed to `Error`, delivers the error to every listener and stops. No
//! retry happens until the caller asks for one with `resubscribe` or a new
//! listener subscribes.
//!
//! # Delivery
//!
//! Each snapshot carries a version number. A listener only ever receives a
//! version newer than the last one it saw, and calls into one listener never
//! overlap. Once [`Subscription::unsubscribe`] returns, no new call starts;
//! a call already running may finish.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use murmur_gateway::{GatewayError, LiveQuery};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::ChannelError;

/// What a listener receives.
#[derive(Debug)]
pub enum Delivery<'a, T> {
    /// The full current snapshot.
    Snapshot(&'a [T]),
    /// The subscription failed; the feed is now in [`SubscriptionState::Error`].
    Failed(&'a ChannelError),
}

/// Callback registered with a feed.
pub type Listener<T> = Arc<dyn Fn(Delivery<'_, T>) + Send + Sync>;

/// Lifecycle of a feed's gateway subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Live,
    Error,
}

impl SubscriptionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unsubscribed => "unsubscribed",
            Self::Subscribing => "subscribing",
            Self::Live => "live",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a registered listener.
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// Removes the listener. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        let release = lock(&self.release).take();
        if let Some(release) = release {
            release();
        }
    }

    /// Whether [`unsubscribe`](Self::unsubscribe) has not run yet.
    pub fn is_active(&self) -> bool {
        lock(&self.release).is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Where a feed gets its snapshots from.
#[async_trait]
pub(crate) trait FeedSource: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Opens a fresh gateway live query.
    async fn open(&self) -> Result<LiveQuery<Self::Item>, GatewayError>;

    /// Turns a gateway snapshot into what listeners see.
    fn project(&self, items: Vec<Self::Item>) -> Vec<Self::Item> {
        items
    }

    /// Snapshot known before the gateway answers, if any.
    fn initial(&self) -> Option<Vec<Self::Item>> {
        None
    }
}

enum Payload<T> {
    Snapshot(Arc<[T]>),
    Failed(Arc<ChannelError>),
}

struct ListenerEntry<T> {
    active: AtomicBool,
    // Last version handed to the callback; held for the duration of a call.
    delivered: Mutex<u64>,
    callback: Listener<T>,
}

impl<T> ListenerEntry<T> {
    fn new(callback: Listener<T>) -> Self {
        Self {
            active: AtomicBool::new(true),
            delivered: Mutex::new(0),
            callback,
        }
    }

    fn deliver(&self, version: u64, payload: &Payload<T>) {
        let mut delivered = lock(&self.delivered);
        if !self.active.load(Ordering::Acquire) || version <= *delivered {
            return;
        }
        *delivered = version;
        match payload {
            Payload::Snapshot(items) => (self.callback)(Delivery::Snapshot(items)),
            Payload::Failed(error) => (self.callback)(Delivery::Failed(error)),
        }
    }
}

struct FeedInner<T> {
    state: SubscriptionState,
    snapshot: Option<(u64, Arc<[T]>)>,
    error: Option<Arc<ChannelError>>,
    version: u64,
    generation: u64,
    next_listener: u64,
    listeners: HashMap<u64, Arc<ListenerEntry<T>>>,
    task: Option<JoinHandle<()>>,
}

struct FeedShared<S: FeedSource> {
    source: S,
    inner: Mutex<FeedInner<S::Item>>,
}

impl<S: FeedSource> FeedShared<S> {
    fn lock(&self) -> MutexGuard<'_, FeedInner<S::Item>> {
        lock(&self.inner)
    }

    fn start(self: &Arc<Self>, inner: &mut FeedInner<S::Item>) {
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.generation += 1;
        inner.state = SubscriptionState::Subscribing;
        inner.error = None;
        tracing::debug!(
            feed = self.source.name(),
            generation = inner.generation,
            "opening live subscription"
        );
        inner.task = Some(tokio::spawn(Self::run(Arc::clone(self), inner.generation)));
    }

    async fn run(self: Arc<Self>, generation: u64) {
        let mut query = match self.source.open().await {
            Ok(query) => query,
            Err(e) => {
                self.fail(generation, e);
                return;
            }
        };

        loop {
            match query.next().await {
                Some(Ok(items)) => {
                    let items = self.source.project(items);
                    self.publish(generation, items);
                }
                Some(Err(e)) => {
                    self.fail(generation, e);
                    return;
                }
                None => {
                    self.fail(generation, GatewayError::Closed);
                    return;
                }
            }
        }
    }

    fn publish(&self, generation: u64, items: Vec<S::Item>) {
        let items: Arc<[S::Item]> = items.into();
        let (version, listeners) = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            if inner.state != SubscriptionState::Live {
                tracing::info!(feed = self.source.name(), "live subscription established");
            }
            inner.state = SubscriptionState::Live;
            inner.version += 1;
            let version = inner.version;
            inner.snapshot = Some((version, Arc::clone(&items)));
            let listeners: Vec<_> = inner.listeners.values().cloned().collect();
            (version, listeners)
        };

        let payload = Payload::Snapshot(items);
        for listener in listeners {
            listener.deliver(version, &payload);
        }
    }

    fn fail(&self, generation: u64, error: GatewayError) {
        let error = Arc::new(ChannelError::PersistenceSubscriptionFailed(error));
        let (version, listeners) = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            tracing::warn!(feed = self.source.name(), error = %error, "live subscription failed");
            inner.state = SubscriptionState::Error;
            inner.error = Some(Arc::clone(&error));
            // The failing task is the caller; let it finish on its own.
            inner.task = None;
            inner.version += 1;
            let listeners: Vec<_> = inner.listeners.values().cloned().collect();
            (inner.version, listeners)
        };

        let payload = Payload::Failed(error);
        for listener in listeners {
            listener.deliver(version, &payload);
        }
    }

    fn detach(&self, id: u64) {
        let mut inner = self.lock();
        if inner.listeners.remove(&id).is_none() || !inner.listeners.is_empty() {
            return;
        }

        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.generation += 1;
        inner.state = SubscriptionState::Unsubscribed;
        inner.error = None;
        inner.version += 1;
        let version = inner.version;
        inner.snapshot = self
            .source
            .initial()
            .map(|items| (version, Arc::from(items)));
        tracing::debug!(feed = self.source.name(), "last listener left, subscription closed");
    }
}

/// Shared gateway subscription with any number of listeners.
pub(crate) struct LiveFeed<S: FeedSource> {
    shared: Arc<FeedShared<S>>,
}

impl<S: FeedSource> LiveFeed<S> {
    pub(crate) fn new(source: S) -> Self {
        // Listeners start at version 0, so the first real version is 1.
        let snapshot = source.initial().map(|items| (1, Arc::from(items)));
        let inner = FeedInner {
            state: SubscriptionState::Unsubscribed,
            snapshot,
            error: None,
            version: 1,
            generation: 0,
            next_listener: 0,
            listeners: HashMap::new(),
            task: None,
        };
        Self {
            shared: Arc::new(FeedShared {
                source,
                inner: Mutex::new(inner),
            }),
        }
    }

    pub(crate) fn source(&self) -> &S {
        &self.shared.source
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        self.shared.lock().state
    }

    pub(crate) fn snapshot(&self) -> Option<Vec<S::Item>> {
        self.shared
            .lock()
            .snapshot
            .as_ref()
            .map(|(_, items)| items.to_vec())
    }

    pub(crate) fn last_error(&self) -> Option<Arc<ChannelError>> {
        self.shared.lock().error.clone()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.shared.lock().listeners.len()
    }

    /// Registers a listener and hands it the cached snapshot, if any, before
    /// returning. Opens the gateway query when the feed is not running.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn subscribe(&self, listener: Listener<S::Item>) -> Subscription {
        let entry = Arc::new(ListenerEntry::new(listener));
        let (id, cached) = {
            let mut inner = self.shared.lock();
            let id = inner.next_listener;
            inner.next_listener += 1;
            inner.listeners.insert(id, Arc::clone(&entry));
            if matches!(
                inner.state,
                SubscriptionState::Unsubscribed | SubscriptionState::Error
            ) {
                self.shared.start(&mut inner);
            }
            (id, inner.snapshot.clone())
        };

        if let Some((version, items)) = cached {
            entry.deliver(version, &Payload::Snapshot(items));
        }

        let shared = Arc::clone(&self.shared);
        Subscription::new(move || {
            entry.active.store(false, Ordering::Release);
            shared.detach(id);
        })
    }

    /// Reopens the gateway query for the current listeners.
    pub(crate) fn resubscribe(&self) {
        let mut inner = self.shared.lock();
        if inner.listeners.is_empty() {
            return;
        }
        self.shared.start(&mut inner);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Source fed by hand through the returned senders.
    struct ManualSource {
        queries: Mutex<Vec<mpsc::Receiver<Result<Vec<u32>, GatewayError>>>>,
        initial: Option<Vec<u32>>,
    }

    impl ManualSource {
        fn new(
            opens: usize,
            initial: Option<Vec<u32>>,
        ) -> (Self, Vec<mpsc::Sender<Result<Vec<u32>, GatewayError>>>) {
            let mut senders = Vec::new();
            let mut receivers = Vec::new();
            for _ in 0..opens {
                let (tx, rx) = mpsc::channel(8);
                senders.push(tx);
                receivers.push(rx);
            }
            receivers.reverse();
            let source = Self {
                queries: Mutex::new(receivers),
                initial,
            };
            (source, senders)
        }
    }

    #[async_trait]
    impl FeedSource for ManualSource {
        type Item = u32;

        fn name(&self) -> &str {
            "manual"
        }

        async fn open(&self) -> Result<LiveQuery<u32>, GatewayError> {
            lock(&self.queries)
                .pop()
                .map(LiveQuery::new)
                .ok_or_else(|| GatewayError::Unavailable("no more queries".to_string()))
        }

        fn initial(&self) -> Option<Vec<u32>> {
            self.initial.clone()
        }
    }

    type Seen = Arc<Mutex<Vec<Result<Vec<u32>, String>>>>;

    fn recorder() -> (Seen, Listener<u32>) {
        let seen: Seen = Arc::default();
        let sink = Arc::clone(&seen);
        let listener: Listener<u32> = Arc::new(move |delivery: Delivery<'_, u32>| {
            let entry = match delivery {
                Delivery::Snapshot(items) => Ok(items.to_vec()),
                Delivery::Failed(e) => Err(e.to_string()),
            };
            lock(&sink).push(entry);
        });
        (seen, listener)
    }

    fn snap(items: &[u32]) -> Result<Vec<u32>, String> {
        Ok(items.to_vec())
    }

    async fn wait_for(seen: &Seen, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while lock(seen).len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for deliveries");
    }

    #[tokio::test]
    async fn initial_snapshot_is_delivered_immediately() {
        let (source, _senders) = ManualSource::new(1, Some(vec![7, 8]));
        let feed = LiveFeed::new(source);
        let (seen, listener) = recorder();

        let _sub = feed.subscribe(listener);
        assert_eq!(*lock(&seen), vec![snap(&[7, 8])]);
        assert_eq!(feed.state(), SubscriptionState::Subscribing);
    }

    #[tokio::test]
    async fn snapshots_fan_out_and_state_goes_live() {
        let (source, senders) = ManualSource::new(1, None);
        let feed = LiveFeed::new(source);
        let (first, l1) = recorder();
        let (second, l2) = recorder();
        let _a = feed.subscribe(l1);
        let _b = feed.subscribe(l2);

        senders[0].send(Ok(vec![1])).await.unwrap();
        senders[0].send(Ok(vec![1, 2])).await.unwrap();
        wait_for(&first, 2).await;
        wait_for(&second, 2).await;

        assert_eq!(feed.state(), SubscriptionState::Live);
        assert_eq!(*lock(&first), vec![snap(&[1]), snap(&[1, 2])]);
        assert_eq!(feed.snapshot(), Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn closed_query_moves_to_error_until_resubscribe() {
        let (source, mut senders) = ManualSource::new(2, None);
        let feed = LiveFeed::new(source);
        let (seen, listener) = recorder();
        let _sub = feed.subscribe(listener);

        senders[0].send(Ok(vec![1])).await.unwrap();
        wait_for(&seen, 1).await;
        drop(senders.remove(0));
        wait_for(&seen, 2).await;

        assert_eq!(feed.state(), SubscriptionState::Error);
        assert!(lock(&seen)[1].is_err());
        assert!(feed.last_error().is_some());

        feed.resubscribe();
        assert_eq!(feed.state(), SubscriptionState::Subscribing);
        senders[0].send(Ok(vec![1, 2])).await.unwrap();
        wait_for(&seen, 3).await;
        assert_eq!(feed.state(), SubscriptionState::Live);
        assert_eq!(lock(&seen)[2], snap(&[1, 2]));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_stops_delivery() {
        let (source, senders) = ManualSource::new(1, Some(vec![]));
        let feed = LiveFeed::new(source);
        let (seen, listener) = recorder();
        let sub = feed.subscribe(listener);
        let (other, other_listener) = recorder();
        let _keep = feed.subscribe(other_listener);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(feed.listener_count(), 1);

        senders[0].send(Ok(vec![5])).await.unwrap();
        wait_for(&other, 2).await;
        assert_eq!(*lock(&seen), vec![snap(&[])]);
    }

    #[tokio::test]
    async fn last_listener_leaving_resets_the_feed() {
        let (source, senders) = ManualSource::new(1, Some(vec![0]));
        let feed = LiveFeed::new(source);
        let (seen, listener) = recorder();
        let sub = feed.subscribe(listener);

        senders[0].send(Ok(vec![0, 1])).await.unwrap();
        wait_for(&seen, 2).await;
        drop(sub);

        assert_eq!(feed.state(), SubscriptionState::Unsubscribed);
        assert_eq!(feed.listener_count(), 0);
        assert_eq!(feed.snapshot(), Some(vec![0]));
    }

    #[tokio::test]
    async fn failed_open_is_reported() {
        let (source, _senders) = ManualSource::new(0, None);
        let feed = LiveFeed::new(source);
        let (seen, listener) = recorder();
        let _sub = feed.subscribe(listener);

        wait_for(&seen, 1).await;
        assert_eq!(feed.state(), SubscriptionState::Error);
        let failure = lock(&seen)[0].clone().unwrap_err();
        assert!(failure.contains("no more queries"));
    }
}
