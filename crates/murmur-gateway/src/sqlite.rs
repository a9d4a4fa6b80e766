//! SQLite-backed gateway.
//!
//! Writes go through [`insert_topic`] and [`insert_message`], which assign
//! every gateway-owned field inside a single `INSERT ... RETURNING`
//! statement. After a successful write the gateway publishes a change on an
//! in-process broadcast feed; each live query task listens to that feed and
//! re-reads its full snapshot when a relevant change arrives.

use std::sync::Arc;

use async_trait::async_trait;
use murmur_db::DbPool;
use murmur_types::{Message, MessageKind, NewMessage, NewTopic, Topic};
use rusqlite::{params, Connection, Row};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::live::LiveQuery;
use crate::PersistenceGateway;

/// Capacity of the in-process change feed.
const CHANGE_FEED_CAPACITY: usize = 256;

/// Snapshots buffered per live query before the producer waits.
const LIVE_QUERY_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    Topics,
    Messages { topic_id: String },
}

/// [`PersistenceGateway`] over a pooled SQLite database.
///
/// Change notification is in-process only: live queries see writes made
/// through this gateway (or its clones), not writes from other processes
/// sharing the database file.
#[derive(Clone)]
pub struct SqliteGateway {
    pool: DbPool,
    changes: broadcast::Sender<Change>,
}

impl SqliteGateway {
    /// Creates a gateway over an already-migrated pool.
    pub fn new(pool: DbPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, changes }
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn notify(&self, change: Change) {
        // No receivers just means no live query is open.
        if self.changes.send(change).is_err() {
            tracing::trace!("change published with no open live queries");
        }
    }

    fn spawn_live<T, L, M>(&self, query: &'static str, matches: M, load: L) -> LiveQuery<T>
    where
        T: Send + 'static,
        L: Fn(&Connection) -> Result<Vec<T>, GatewayError> + Send + Sync + 'static,
        M: Fn(&Change) -> bool + Send + 'static,
    {
        // Subscribe before the first read so no write can slip between them.
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(LIVE_QUERY_BUFFER);
        let pool = self.pool.clone();
        let load = Arc::new(load);

        let task = tokio::spawn(async move {
            loop {
                let snapshot = {
                    let load = Arc::clone(&load);
                    run_blocking(pool.clone(), move |conn| load(conn)).await
                };
                if let Err(ref e) = snapshot {
                    tracing::warn!(query, error = %e, "live query snapshot failed");
                }
                let failed = snapshot.is_err();
                if tx.send(snapshot).await.is_err() || failed {
                    return;
                }

                loop {
                    match changes.recv().await {
                        Ok(change) if matches(&change) => break,
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(query, skipped, "live query lagged, reloading");
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        });

        LiveQuery::with_task(rx, task)
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn create_topic(&self, topic: NewTopic) -> Result<Topic, GatewayError> {
        let created = run_blocking(self.pool.clone(), move |conn| insert_topic(conn, &topic)).await?;
        tracing::debug!(topic_id = %created.id, "stored custom topic");
        self.notify(Change::Topics);
        Ok(created)
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, GatewayError> {
        let created =
            run_blocking(self.pool.clone(), move |conn| insert_message(conn, &message)).await?;
        tracing::debug!(
            topic_id = %created.topic_id,
            message_id = %created.id,
            seq = created.seq,
            "stored message"
        );
        self.notify(Change::Messages {
            topic_id: created.topic_id.clone(),
        });
        Ok(created)
    }

    async fn live_topics(&self) -> Result<LiveQuery<Topic>, GatewayError> {
        Ok(self.spawn_live("topics", |change| *change == Change::Topics, list_topics))
    }

    async fn live_messages(&self, topic_id: &str) -> Result<LiveQuery<Message>, GatewayError> {
        let topic_id = topic_id.to_string();
        let wanted = topic_id.clone();
        Ok(self.spawn_live(
            "messages",
            move |change| matches!(change, Change::Messages { topic_id } if *topic_id == wanted),
            move |conn| list_messages(conn, &topic_id),
        ))
    }
}

async fn run_blocking<R, F>(pool: DbPool, f: F) -> Result<R, GatewayError>
where
    F: FnOnce(&Connection) -> Result<R, GatewayError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        f(&conn)
    })
    .await
    .map_err(|e| GatewayError::Task(e.to_string()))?
}

/// Inserts a custom topic with a fresh UUID.
pub fn insert_topic(conn: &Connection, topic: &NewTopic) -> Result<Topic, GatewayError> {
    let topic_id = Uuid::new_v4().to_string();
    let created = conn.query_row(
        "INSERT INTO topics (topic_id, title, description, color, created_at)
         VALUES (?1, ?2, ?3, ?4, CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER))
         RETURNING topic_id, title, description, color",
        params![topic_id, topic.title, topic.description, topic.color],
        map_row_to_topic,
    )?;
    Ok(created)
}

/// Lists all custom topics in creation order.
pub fn list_topics(conn: &Connection) -> Result<Vec<Topic>, GatewayError> {
    let mut stmt = conn.prepare(
        "SELECT topic_id, title, description, color FROM topics ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], map_row_to_topic)?;
    let mut topics = Vec::new();
    for row in rows {
        topics.push(row?);
    }
    Ok(topics)
}

fn map_row_to_topic(row: &Row) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        color: row.get(3)?,
        is_custom: true,
    })
}

/// Appends a message to its topic.
///
/// `seq` is one past the topic's current maximum and `created_at` is the
/// current time in milliseconds, clamped so it never falls below the
/// topic's latest message. Both are computed by the same statement that
/// inserts the row.
pub fn insert_message(conn: &Connection, message: &NewMessage) -> Result<Message, GatewayError> {
    let message_id = Uuid::new_v4().to_string();
    let created = conn.query_row(
        "INSERT INTO messages (
            message_id, topic_id, seq, kind, text, media_url,
            author_id, author_name, moderated, created_at
        ) VALUES (
            ?1, ?2,
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE topic_id = ?2),
            ?3, ?4, ?5, ?6, ?7, ?8,
            MAX(
                CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER),
                (SELECT COALESCE(MAX(created_at), 0) FROM messages WHERE topic_id = ?2)
            )
        )
        RETURNING message_id, topic_id, seq, kind, text, media_url,
                  author_id, author_name, created_at, moderated",
        params![
            message_id,
            message.topic_id,
            message.kind.as_str(),
            message.text,
            message.media_url,
            message.author_id,
            message.author_name,
            message.moderated,
        ],
        map_row_to_message,
    )?;
    Ok(created)
}

/// Lists a topic's messages ordered by `created_at`, then `seq`.
pub fn list_messages(conn: &Connection, topic_id: &str) -> Result<Vec<Message>, GatewayError> {
    let mut stmt = conn.prepare(
        "SELECT message_id, topic_id, seq, kind, text, media_url,
                author_id, author_name, created_at, moderated
         FROM messages
         WHERE topic_id = ?1
         ORDER BY created_at ASC, seq ASC",
    )?;
    let rows = stmt.query_map([topic_id], map_row_to_message)?;
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

fn map_row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let kind_str: String = row.get(3)?;
    let kind: MessageKind = kind_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        seq: row.get(2)?,
        kind,
        text: row.get(4)?,
        media_url: row.get(5)?,
        author_id: row.get(6)?,
        author_name: row.get(7)?,
        created_at: row.get(8)?,
        moderated: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_db::run_migrations;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().expect("failed to open in-memory db");
        run_migrations(&conn).expect("failed to run migrations");
        conn
    }

    fn text_message(topic_id: &str, text: &str) -> NewMessage {
        NewMessage {
            topic_id: topic_id.to_string(),
            kind: MessageKind::Text,
            text: Some(text.to_string()),
            media_url: None,
            author_id: "anon_k2j4h5g6f".to_string(),
            author_name: "anon_k2j4h5g6f".to_string(),
            moderated: false,
        }
    }

    #[test]
    fn topics_list_in_creation_order() {
        let conn = setup_db();
        for title in ["first", "second", "third"] {
            insert_topic(
                &conn,
                &NewTopic {
                    title: title.to_string(),
                    description: "about it".to_string(),
                    color: "bg-rose-500/10 text-rose-400".to_string(),
                },
            )
            .expect("insert topic failed");
        }

        let topics = list_topics(&conn).expect("list topics failed");
        let titles: Vec<_> = topics.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["first", "second", "third"]);
        assert!(topics.iter().all(|t| t.is_custom));
        assert_ne!(topics[0].id, topics[1].id);
    }

    #[test]
    fn message_sequence_is_per_topic() {
        let conn = setup_db();

        let a1 = insert_message(&conn, &text_message("a", "one")).unwrap();
        let b1 = insert_message(&conn, &text_message("b", "one")).unwrap();
        let a2 = insert_message(&conn, &text_message("a", "two")).unwrap();

        assert_eq!(a1.seq, 1);
        assert_eq!(b1.seq, 1);
        assert_eq!(a2.seq, 2);
        assert!(a2.created_at >= a1.created_at);

        let messages = list_messages(&conn, "a").expect("list messages failed");
        let texts: Vec<_> = messages.iter().filter_map(|m| m.text.as_deref()).collect();
        assert_eq!(texts, ["one", "two"]);
    }

    #[test]
    fn created_at_never_goes_backwards_within_topic() {
        let conn = setup_db();

        // A row stamped far in the future stands in for a clock step backwards.
        let future = 4_102_444_800_000i64;
        conn.execute(
            "INSERT INTO messages (message_id, topic_id, seq, kind, text, author_id, author_name, created_at)
             VALUES ('skewed', 'a', 1, 'text', 'early', 'x', 'x', ?1)",
            [future],
        )
        .unwrap();

        let next = insert_message(&conn, &text_message("a", "later")).unwrap();
        assert_eq!(next.seq, 2);
        assert_eq!(next.created_at, future);

        let messages = list_messages(&conn, "a").unwrap();
        assert_eq!(messages[0].id, "skewed");
        assert_eq!(messages[1].id, next.id);
    }

    #[test]
    fn stored_fields_round_trip() {
        let conn = setup_db();
        let created = insert_message(
            &conn,
            &NewMessage {
                topic_id: "7".to_string(),
                kind: MessageKind::Image,
                text: None,
                media_url: Some("https://example.com/a.jpg".to_string()),
                author_id: "198.51.100.4".to_string(),
                author_name: "moth".to_string(),
                moderated: true,
            },
        )
        .unwrap();

        let fetched = list_messages(&conn, "7").unwrap();
        assert_eq!(fetched, vec![created.clone()]);
        assert_eq!(created.kind, MessageKind::Image);
        assert!(created.moderated);
        assert_eq!(created.author_name, "moth");
    }
}
