//! `SQLite`-backed [`SessionStore`] implementation.
//!
//! All writes run inside `BEGIN IMMEDIATE` transactions so concurrent
//! connections serialize at the database. The partial unique index on
//! active sessions is the backstop for the one-active-session invariant.
//!
//! rusqlite and the pool checkout both block the calling thread (busy
//! timeout, pool wait), so every operation runs under
//! [`tokio::task::spawn_blocking`]. A stalled write holds a blocking-pool
//! thread, never a runtime worker.

pub mod connection;
pub mod migrations;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use ecochat_core::ids::new_session_id;

use crate::errors::{Result, StoreError};
use crate::store::SessionStore;
use crate::types::{ChatMessage, ChatSession, StoredMessage};

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection};
pub use migrations::run_migrations;

/// Session store over a pooled `SQLite` database.
pub struct SqliteSessionStore {
    pool: ConnectionPool,
}

impl SqliteSessionStore {
    /// Open a file-backed store and run migrations.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        Self::from_pool(connection::new_file(path, config)?)
    }

    /// Create an in-memory store and run migrations.
    pub fn in_memory() -> Result<Self> {
        Self::from_pool(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    /// Wrap an existing pool, running migrations first.
    pub fn from_pool(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self { pool })
    }

    /// Run a storage operation on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            op(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("storage task failed: {e}")))?
    }

    fn get_or_create_sync(conn: &mut Connection, user_id: &str) -> Result<ChatSession> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = tx
            .query_row(
                "SELECT id, user_id, created_at, is_active FROM chat_sessions
                 WHERE user_id = ?1 AND is_active = 1",
                params![user_id],
                map_session,
            )
            .optional()?;
        if let Some(session) = existing {
            tx.commit()?;
            return Ok(session);
        }

        let session = ChatSession {
            id: new_session_id(),
            user_id: user_id.to_owned(),
            created_at: chrono::Utc::now().to_rfc3339(),
            is_active: true,
        };
        let _ = tx.execute(
            "INSERT INTO chat_sessions (id, user_id, created_at, is_active)
             VALUES (?1, ?2, ?3, 1)",
            params![session.id, session.user_id, session.created_at],
        )?;
        tx.commit()?;
        Ok(session)
    }

    fn append_sync(
        conn: &mut Connection,
        session_id: &str,
        from_user_id: &str,
        text: &str,
        from_admin: bool,
    ) -> Result<StoredMessage> {
        if text.trim().is_empty() {
            return Err(StoreError::EmptyMessage);
        }
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !session_exists(&tx, session_id)? {
            return Err(StoreError::SessionNotFound(session_id.to_owned()));
        }
        let prior: i64 = tx.query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE chat_session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        let sent_at = chrono::Utc::now().to_rfc3339();
        let _ = tx.execute(
            "INSERT INTO chat_messages (chat_session_id, from_user_id, text, sent_at, from_admin, is_read)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![session_id, from_user_id, text, sent_at, from_admin],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(StoredMessage {
            message: ChatMessage {
                id,
                session_id: session_id.to_owned(),
                from_user_id: from_user_id.to_owned(),
                text: text.to_owned(),
                sent_at,
                from_admin,
                is_read: false,
            },
            was_first: prior == 0,
        })
    }
}

fn session_exists(conn: &Connection, session_id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM chat_sessions WHERE id = ?1)",
        params![session_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn map_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSession> {
    Ok(ChatSession {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        created_at: row.get("created_at")?,
        is_active: row.get("is_active")?,
    })
}

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get("id")?,
        session_id: row.get("chat_session_id")?,
        from_user_id: row.get("from_user_id")?,
        text: row.get("text")?,
        sent_at: row.get("sent_at")?,
        from_admin: row.get("from_admin")?,
        is_read: row.get("is_read")?,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get_or_create_session(&self, user_id: &str) -> Result<ChatSession> {
        let user_id = user_id.to_owned();
        self.with_conn(move |conn| Self::get_or_create_sync(conn, &user_id))
            .await
    }

    async fn get_session_by_id(&self, session_id: &str) -> Result<ChatSession> {
        let session_id = session_id.to_owned();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, user_id, created_at, is_active FROM chat_sessions WHERE id = ?1",
                params![session_id],
                map_session,
            )
            .optional()?
            .ok_or_else(|| StoreError::SessionNotFound(session_id.clone()))
        })
        .await
    }

    async fn list_sessions(&self, include_inactive: bool) -> Result<Vec<ChatSession>> {
        self.with_conn(move |conn| {
            let sql = if include_inactive {
                "SELECT id, user_id, created_at, is_active FROM chat_sessions
                 ORDER BY created_at DESC"
            } else {
                "SELECT id, user_id, created_at, is_active FROM chat_sessions
                 WHERE is_active = 1 ORDER BY created_at DESC"
            };
            let mut stmt = conn.prepare(sql)?;
            let sessions = stmt
                .query_map([], map_session)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(sessions)
        })
        .await
    }

    async fn append_message(
        &self,
        session_id: &str,
        from_user_id: &str,
        text: &str,
        from_admin: bool,
    ) -> Result<StoredMessage> {
        let session_id = session_id.to_owned();
        let from_user_id = from_user_id.to_owned();
        let text = text.to_owned();
        self.with_conn(move |conn| {
            Self::append_sync(conn, &session_id, &from_user_id, &text, from_admin)
        })
        .await
    }

    async fn session_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let session_id = session_id.to_owned();
        self.with_conn(move |conn| {
            if !session_exists(conn, &session_id)? {
                return Err(StoreError::SessionNotFound(session_id));
            }
            let mut stmt = conn.prepare(
                "SELECT id, chat_session_id, from_user_id, text, sent_at, from_admin, is_read
                 FROM chat_messages WHERE chat_session_id = ?1 ORDER BY id",
            )?;
            let messages = stmt
                .query_map(params![session_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
    }

    async fn mark_read(&self, session_id: &str, admin_viewer: bool) -> Result<u64> {
        let session_id = session_id.to_owned();
        self.with_conn(move |conn| {
            if !session_exists(conn, &session_id)? {
                return Err(StoreError::SessionNotFound(session_id));
            }
            // An admin viewer has read the customer's messages and vice versa.
            let changed = conn.execute(
                "UPDATE chat_messages SET is_read = 1
                 WHERE chat_session_id = ?1 AND from_admin = ?2 AND is_read = 0",
                params![session_id, !admin_viewer],
            )?;
            Ok(changed as u64)
        })
        .await
    }

    async fn close_session(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_owned();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE chat_sessions SET is_active = 0 WHERE id = ?1",
                params![session_id],
            )?;
            if changed == 0 {
                return Err(StoreError::SessionNotFound(session_id));
            }
            Ok(())
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> SqliteSessionStore {
        SqliteSessionStore::in_memory().unwrap()
    }

    #[tokio::test]
    async fn creates_session_on_first_lookup() {
        let s = store();
        let session = s.get_or_create_session("u1").await.unwrap();
        assert!(session.id.starts_with("chat_"));
        assert_eq!(session.user_id, "u1");
        assert!(session.is_active);
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let s = store();
        let a = s.get_or_create_session("u1").await.unwrap();
        let b = s.get_or_create_session("u1").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn different_users_get_different_sessions() {
        let s = store();
        let a = s.get_or_create_session("u1").await.unwrap();
        let b = s.get_or_create_session("u2").await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_get_or_create_yields_one_session() {
        let s = Arc::new(store());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let s = Arc::clone(&s);
            handles.push(tokio::spawn(async move {
                s.get_or_create_session("racer").await.unwrap().id
            }));
        }
        let ids: Vec<String> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]), "split brain: {ids:?}");

        let sessions = s.list_sessions(true).await.unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocked_writes_do_not_starve_other_tasks() {
        let s = Arc::new(store());
        let session = s.get_or_create_session("u1").await.unwrap();

        // Check out the pool's only connection and hold it on a plain thread
        // so every write queues at the pool for a while.
        let held = s.pool.get().unwrap();
        let holder = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(300));
            drop(held);
        });

        let mut writes = Vec::new();
        for i in 0..4 {
            let s = Arc::clone(&s);
            let id = session.id.clone();
            writes.push(tokio::spawn(async move {
                s.append_message(&id, "u1", &format!("m{i}"), false).await
            }));
        }

        // A trivial timer task must still get scheduled while the writes
        // wait on the pool.
        let canary = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            tokio::time::sleep(std::time::Duration::from_millis(50)),
        )
        .await;
        assert!(canary.is_ok(), "runtime starved while storage was blocked");

        for write in writes {
            assert!(write.await.unwrap().is_ok());
        }
        holder.join().unwrap();
    }

    #[tokio::test]
    async fn closed_session_is_replaced_on_next_lookup() {
        let s = store();
        let a = s.get_or_create_session("u1").await.unwrap();
        s.close_session(&a.id).await.unwrap();
        let b = s.get_or_create_session("u1").await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(b.is_active);
    }

    #[tokio::test]
    async fn get_session_by_id_not_found() {
        let s = store();
        let err = s.get_session_by_id("chat_missing").await.unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn list_sessions_filters_inactive() {
        let s = store();
        let a = s.get_or_create_session("u1").await.unwrap();
        let _ = s.get_or_create_session("u2").await.unwrap();
        s.close_session(&a.id).await.unwrap();

        assert_eq!(s.list_sessions(false).await.unwrap().len(), 1);
        assert_eq!(s.list_sessions(true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids_and_timestamps() {
        let s = store();
        let session = s.get_or_create_session("u1").await.unwrap();
        let mut last_id = 0;
        let mut last_sent_at = String::new();
        for i in 0..5 {
            let stored = s
                .append_message(&session.id, "u1", &format!("msg {i}"), false)
                .await
                .unwrap();
            assert!(stored.message.id > last_id);
            assert!(stored.message.sent_at >= last_sent_at);
            last_id = stored.message.id;
            last_sent_at = stored.message.sent_at;
        }
    }

    #[tokio::test]
    async fn replaying_history_never_reorders() {
        let s = store();
        let session = s.get_or_create_session("u1").await.unwrap();
        for i in 0..4 {
            s.append_message(&session.id, "u1", &format!("m{i}"), false)
                .await
                .unwrap();
        }
        let first = s.session_messages(&session.id).await.unwrap();
        let second = s.session_messages(&session.id).await.unwrap();
        assert_eq!(first, second);
        let ids: Vec<i64> = first.iter().map(|m| m.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn was_first_only_on_first_message() {
        let s = store();
        let session = s.get_or_create_session("u1").await.unwrap();
        let first = s
            .append_message(&session.id, "u1", "hello", false)
            .await
            .unwrap();
        assert!(first.was_first);
        let second = s
            .append_message(&session.id, "u1", "again", false)
            .await
            .unwrap();
        assert!(!second.was_first);
    }

    #[tokio::test]
    async fn append_rejects_empty_text() {
        let s = store();
        let session = s.get_or_create_session("u1").await.unwrap();
        let err = s
            .append_message(&session.id, "u1", "   ", false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmptyMessage));
        assert!(s.session_messages(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_to_unknown_session_fails() {
        let s = store();
        let err = s
            .append_message("chat_missing", "u1", "hi", false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn mark_read_flips_counterparty_messages_only() {
        let s = store();
        let session = s.get_or_create_session("u1").await.unwrap();
        s.append_message(&session.id, "u1", "customer msg", false)
            .await
            .unwrap();
        s.append_message(&session.id, "a1", "admin msg", true)
            .await
            .unwrap();

        // Admin reads the conversation: the customer's message flips.
        let flipped = s.mark_read(&session.id, true).await.unwrap();
        assert_eq!(flipped, 1);

        let messages = s.session_messages(&session.id).await.unwrap();
        let customer = messages.iter().find(|m| !m.from_admin).unwrap();
        let admin = messages.iter().find(|m| m.from_admin).unwrap();
        assert!(customer.is_read);
        assert!(!admin.is_read);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let s = store();
        let session = s.get_or_create_session("u1").await.unwrap();
        s.append_message(&session.id, "u1", "hi", false)
            .await
            .unwrap();
        assert_eq!(s.mark_read(&session.id, true).await.unwrap(), 1);
        assert_eq!(s.mark_read(&session.id, true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn close_unknown_session_fails() {
        let s = store();
        let err = s.close_session("chat_missing").await.unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }
}
