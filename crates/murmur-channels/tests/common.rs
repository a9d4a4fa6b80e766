use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use murmur_channels::{Delivery, KeywordFilter, Session};
use murmur_db::{create_pool, run_migrations, DbRuntimeSettings};
use murmur_gateway::{GatewayError, LiveQuery, PersistenceGateway, SqliteGateway};
use murmur_identity::{IdentityResolver, LocalStore, LookupError, LookupService, StoreError};
use murmur_types::{Message, NewMessage, NewTopic, Topic};
use tempfile::TempDir;
use tokio::sync::mpsc;

pub fn sqlite_gateway() -> (SqliteGateway, TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("channels.db");
    let pool = create_pool(
        path.to_str().expect("temp path should be utf-8"),
        DbRuntimeSettings::default(),
    )
    .expect("failed to create pool");
    {
        let conn = pool.get().expect("failed to get connection");
        run_migrations(&conn).expect("failed to run migrations");
    }
    (SqliteGateway::new(pool), dir)
}

type Injector<T> = mpsc::Sender<Result<Vec<T>, GatewayError>>;

/// Gateway wrapper that can refuse writes, refuse to open live queries, and
/// inject failures into live queries that are already open.
pub struct FlakyGateway {
    inner: SqliteGateway,
    pub fail_writes: AtomicBool,
    pub fail_opens: AtomicBool,
    pub writes: AtomicUsize,
    pub opens: AtomicUsize,
    topic_feeds: Mutex<Vec<Injector<Topic>>>,
    message_feeds: Mutex<Vec<Injector<Message>>>,
}

impl FlakyGateway {
    pub fn new(inner: SqliteGateway) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_opens: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            topic_feeds: Mutex::new(Vec::new()),
            message_feeds: Mutex::new(Vec::new()),
        })
    }

    pub fn inner(&self) -> &SqliteGateway {
        &self.inner
    }

    /// Breaks every open message query.
    pub async fn break_message_feeds(&self) {
        let feeds: Vec<_> = self.message_feeds.lock().unwrap().drain(..).collect();
        for feed in feeds {
            let _ = feed
                .send(Err(GatewayError::Unavailable("connection lost".to_string())))
                .await;
        }
    }

    /// Breaks every open topic query.
    pub async fn break_topic_feeds(&self) {
        let feeds: Vec<_> = self.topic_feeds.lock().unwrap().drain(..).collect();
        for feed in feeds {
            let _ = feed
                .send(Err(GatewayError::Unavailable("connection lost".to_string())))
                .await;
        }
    }

    fn check_open(&self) -> Result<(), GatewayError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("offline".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), GatewayError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("offline".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn relay<T: Send + 'static>(mut upstream: LiveQuery<T>, feeds: &Mutex<Vec<Injector<T>>>) -> LiveQuery<T> {
    let (tx, rx) = mpsc::channel(16);
    feeds.lock().unwrap().push(tx.clone());
    tokio::spawn(async move {
        while let Some(item) = upstream.next().await {
            if tx.send(item).await.is_err() {
                return;
            }
        }
    });
    LiveQuery::new(rx)
}

#[async_trait]
impl PersistenceGateway for FlakyGateway {
    async fn create_topic(&self, topic: NewTopic) -> Result<Topic, GatewayError> {
        self.check_write()?;
        self.inner.create_topic(topic).await
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, GatewayError> {
        self.check_write()?;
        self.inner.create_message(message).await
    }

    async fn live_topics(&self) -> Result<LiveQuery<Topic>, GatewayError> {
        self.check_open()?;
        let upstream = self.inner.live_topics().await?;
        Ok(relay(upstream, &self.topic_feeds))
    }

    async fn live_messages(&self, topic_id: &str) -> Result<LiveQuery<Message>, GatewayError> {
        self.check_open()?;
        let upstream = self.inner.live_messages(topic_id).await?;
        Ok(relay(upstream, &self.message_feeds))
    }
}

pub struct UnreachableLookup;

#[async_trait]
impl LookupService for UnreachableLookup {
    async fn lookup(&self) -> Result<String, LookupError> {
        Err(LookupError::Malformed("unreachable".to_string()))
    }
}

pub struct FixedLookup(pub &'static str);

#[async_trait]
impl LookupService for FixedLookup {
    async fn lookup(&self) -> Result<String, LookupError> {
        Ok(self.0.to_string())
    }
}

#[derive(Default)]
pub struct MemoryStore(Mutex<HashMap<String, String>>);

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.0.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.0
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub fn session(gateway: Arc<dyn PersistenceGateway>) -> Session {
    let identity = IdentityResolver::new(
        Arc::new(FixedLookup("203.0.113.7")),
        Arc::new(MemoryStore::default()),
    );
    Session::new(gateway, identity, Arc::new(KeywordFilter::default()))
}

/// What a recording listener saw, in order.
pub type Seen<T> = Arc<Mutex<Vec<Result<Vec<T>, String>>>>;

pub fn recorder<T: Clone + Send + 'static>(
) -> (Seen<T>, impl Fn(Delivery<'_, T>) + Send + Sync + 'static) {
    let seen: Seen<T> = Arc::default();
    let sink = Arc::clone(&seen);
    let listener = move |delivery: Delivery<'_, T>| {
        let entry = match delivery {
            Delivery::Snapshot(items) => Ok(items.to_vec()),
            Delivery::Failed(e) => Err(e.to_string()),
        };
        sink.lock().unwrap().push(entry);
    };
    (seen, listener)
}

/// Waits until the recorder holds at least `count` deliveries.
pub async fn wait_for<T>(seen: &Seen<T>, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while seen.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for deliveries");
}

/// The most recent successful snapshot.
pub fn latest<T: Clone>(seen: &Seen<T>) -> Vec<T> {
    seen.lock()
        .unwrap()
        .iter()
        .rev()
        .find_map(|entry| entry.as_ref().ok().cloned())
        .expect("no snapshot delivered")
}
