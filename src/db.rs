//! Session store
//!
//! Durable, append-only message log per chat session, backed by SQLite.

mod schema;

pub use schema::*;

use crate::runtime::recovery::find_orphan_gaps;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Content of the synthetic result injected for interrupted tool calls
pub const INTERRUPTED_TOOL_RESULT: &str = "[Tool execution interrupted before a result was recorded]";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> DbResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // ==================== Session Operations ====================

    /// Create a session seeded with its system message.
    ///
    /// Fails with a constraint error if the id is already in use.
    pub fn create_session(&self, id: &str, system_prompt: &str) -> DbResult<SessionSummary> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        tx.execute(
            "INSERT INTO sessions (id, title, created_at, updated_at) VALUES (?1, NULL, ?2, ?2)",
            params![id, now.to_rfc3339()],
        )?;
        insert_messages(&tx, id, &[MessageContent::system(system_prompt)], &now)?;
        tx.commit()?;

        Ok(SessionSummary {
            id: id.to_string(),
            title: None,
            message_count: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a session summary by id
    pub fn get_session(&self, id: &str) -> DbResult<SessionSummary> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT s.id, s.title, s.created_at, s.updated_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id) AS message_count
             FROM sessions s WHERE s.id = ?1",
            params![id],
            parse_session_row,
        )
        .optional()?
        .ok_or_else(|| DbError::SessionNotFound(id.to_string()))
    }

    /// Ids of every session that has received at least one append
    pub fn list_sessions(&self) -> DbResult<BTreeSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT session_id FROM messages")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<BTreeSet<_>, _>>().map_err(DbError::from)
    }

    /// Sessions with at least one message, most recently updated first
    pub fn list_session_summaries(&self) -> DbResult<Vec<SessionSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.title, s.created_at, s.updated_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id) AS message_count
             FROM sessions s
             WHERE EXISTS (SELECT 1 FROM messages m WHERE m.session_id = s.id)
             ORDER BY s.updated_at DESC, s.id ASC",
        )?;

        let rows = stmt.query_map([], parse_session_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Set the display title of a session
    pub fn set_title(&self, id: &str, title: &str) -> DbResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE sessions SET title = ?1 WHERE id = ?2",
            params![title, id],
        )?;

        if updated == 0 {
            return Err(DbError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }

    // ==================== Message Operations ====================

    /// Append messages as the new tail of a session's history.
    ///
    /// All messages land in one transaction: either every message is durable
    /// or none is. The session row is created on first append.
    pub fn append_messages(
        &self,
        session_id: &str,
        messages: &[MessageContent],
    ) -> DbResult<Vec<Message>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        tx.execute(
            "INSERT INTO sessions (id, title, created_at, updated_at) VALUES (?1, NULL, ?2, ?2)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
            params![session_id, now.to_rfc3339()],
        )?;
        let stored = insert_messages(&tx, session_id, messages, &now)?;
        tx.commit()?;

        Ok(stored)
    }

    /// Full history of a session, oldest first. Empty for an unknown session.
    pub fn get_messages(&self, session_id: &str) -> DbResult<Vec<Message>> {
        self.get_messages_after(session_id, 0)
    }

    /// Messages with a sequence id greater than `after_sequence`
    pub fn get_messages_after(
        &self,
        session_id: &str,
        after_sequence: i64,
    ) -> DbResult<Vec<Message>> {
        let conn = self.lock()?;
        read_messages(&conn, session_id, after_sequence)
    }

    /// Answer every tool call that has no recorded result.
    ///
    /// Appends run in a single transaction, so this only finds anything when
    /// a database was written by something other than `append_messages`.
    /// Synthetic results go right after the batch they answer, and the
    /// messages behind them move down, so a second pass finds nothing.
    /// Returns the number of synthetic results injected.
    pub fn repair_orphaned_tool_calls(&self) -> DbResult<usize> {
        let session_ids = self.list_sessions()?;
        let mut repaired = 0;

        for session_id in session_ids {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let injected = repair_session(&tx, &session_id)?;
            tx.commit()?;
            repaired += injected;
        }

        Ok(repaired)
    }
}

fn read_messages(
    conn: &Connection,
    session_id: &str,
    after_sequence: i64,
) -> DbResult<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT message_id, session_id, sequence_id, content, created_at
         FROM messages WHERE session_id = ?1 AND sequence_id > ?2 ORDER BY sequence_id ASC",
    )?;

    let rows = stmt.query_map(params![session_id, after_sequence], |row| {
        Ok(RawMessage {
            message_id: row.get(0)?,
            session_id: row.get(1)?,
            sequence_id: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;

    let mut messages = Vec::new();
    for raw in rows {
        messages.push(raw?.into_message()?);
    }
    Ok(messages)
}

/// Fill one session's orphan gaps in place, renumbering what follows
fn repair_session(tx: &Transaction<'_>, session_id: &str) -> DbResult<usize> {
    let messages = read_messages(tx, session_id, 0)?;
    let history: Vec<MessageContent> = messages.iter().map(|m| m.content.clone()).collect();
    let gaps = find_orphan_gaps(&history);
    if gaps.is_empty() {
        return Ok(0);
    }

    // Negate first so renumbering never collides with UNIQUE(session_id, sequence_id)
    tx.execute(
        "UPDATE messages SET sequence_id = -sequence_id WHERE session_id = ?1",
        params![session_id],
    )?;

    let now = Utc::now();
    let mut next_sequence = messages.first().map_or(1, |m| m.sequence_id);
    let mut injected = 0;
    let mut gaps = gaps.into_iter().peekable();

    for index in 0..=messages.len() {
        while let Some(gap) = gaps.next_if(|g| g.position == index) {
            for call in &gap.calls {
                let content = MessageContent::tool_result(ToolResultContent::error(
                    &call.call_id,
                    &call.tool_name,
                    INTERRUPTED_TOOL_RESULT,
                ));
                insert_message(tx, session_id, next_sequence, &content, &now)?;
                next_sequence += 1;
                injected += 1;
                tracing::info!(
                    session_id = %session_id,
                    call_id = %call.call_id,
                    tool = %call.tool_name,
                    "Injected synthetic tool_result for orphaned tool call"
                );
            }
        }

        if let Some(message) = messages.get(index) {
            tx.execute(
                "UPDATE messages SET sequence_id = ?1 WHERE message_id = ?2",
                params![next_sequence, message.message_id],
            )?;
            next_sequence += 1;
        }
    }

    Ok(injected)
}

fn insert_messages(
    tx: &Transaction<'_>,
    session_id: &str,
    messages: &[MessageContent],
    now: &DateTime<Utc>,
) -> DbResult<Vec<Message>> {
    let last: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sequence_id), 0) FROM messages WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;

    let mut stored = Vec::with_capacity(messages.len());
    let mut sequence_id = last;
    for content in messages {
        sequence_id += 1;
        stored.push(insert_message(tx, session_id, sequence_id, content, now)?);
    }

    Ok(stored)
}

fn insert_message(
    tx: &Transaction<'_>,
    session_id: &str,
    sequence_id: i64,
    content: &MessageContent,
    now: &DateTime<Utc>,
) -> DbResult<Message> {
    let message_id = uuid::Uuid::new_v4().to_string();
    let content_str = serde_json::to_string(content)?;

    tx.execute(
        "INSERT INTO messages (message_id, session_id, sequence_id, role, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            message_id,
            session_id,
            sequence_id,
            content.role().to_string(),
            content_str,
            now.to_rfc3339(),
        ],
    )?;

    Ok(Message {
        message_id,
        session_id: session_id.to_string(),
        sequence_id,
        content: content.clone(),
        created_at: *now,
    })
}

struct RawMessage {
    message_id: String,
    session_id: String,
    sequence_id: i64,
    content: String,
    created_at: String,
}

impl RawMessage {
    fn into_message(self) -> DbResult<Message> {
        Ok(Message {
            message_id: self.message_id,
            session_id: self.session_id,
            sequence_id: self.sequence_id,
            content: serde_json::from_str(&self.content)?,
            created_at: parse_datetime(&self.created_at),
        })
    }
}

fn parse_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionSummary> {
    Ok(SessionSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: parse_datetime(&row.get::<_, String>(2)?),
        updated_at: parse_datetime(&row.get::<_, String>(3)?),
        message_count: row.get(4)?,
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_call(id: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, "add", json!({"a": 2, "b": 3}).as_object().cloned().unwrap())
    }

    #[test]
    fn test_create_session_seeds_system_message() {
        let db = Database::open_in_memory().unwrap();

        let session = db.create_session("s-1", "ground rules").unwrap();
        assert_eq!(session.id, "s-1");
        assert_eq!(session.message_count, 1);

        let messages = db.get_messages("s-1").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role(), Role::System);
        assert_eq!(messages[0].content.text(), "ground rules");
        assert_eq!(messages[0].sequence_id, 1);
    }

    #[test]
    fn test_create_duplicate_session_fails() {
        let db = Database::open_in_memory().unwrap();
        db.create_session("s-1", "rules").unwrap();
        assert!(db.create_session("s-1", "rules").is_err());
        assert_eq!(db.get_messages("s-1").unwrap().len(), 1);
    }

    #[test]
    fn test_append_and_read_in_order() {
        let db = Database::open_in_memory().unwrap();
        db.create_session("s-1", "rules").unwrap();

        let first = db
            .append_messages(
                "s-1",
                &[
                    MessageContent::human("add 2 and 3"),
                    MessageContent::assistant("", vec![add_call("call-1")]),
                ],
            )
            .unwrap();
        assert_eq!(first[0].sequence_id, 2);
        assert_eq!(first[1].sequence_id, 3);

        db.append_messages(
            "s-1",
            &[MessageContent::tool_result(ToolResultContent {
                call_id: "call-1".into(),
                tool_name: "add".into(),
                content: "5".into(),
                is_error: false,
                kind: ResultKind::Text,
            })],
        )
        .unwrap();

        let messages = db.get_messages("s-1").unwrap();
        let roles: Vec<Role> = messages.iter().map(Message::role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::Human, Role::Assistant, Role::ToolResult]
        );
        assert_eq!(messages[2].content.tool_calls()[0].call_id, "call-1");

        let after = db.get_messages_after("s-1", 2).unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].role(), Role::Assistant);
    }

    #[test]
    fn test_read_unknown_session_is_empty() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_messages("nope").unwrap().is_empty());
        assert!(matches!(
            db.get_session("nope"),
            Err(DbError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_list_sessions_only_appended() {
        let db = Database::open_in_memory().unwrap();
        db.append_messages("b", &[MessageContent::human("hi")]).unwrap();
        db.append_messages("a", &[MessageContent::human("hi")]).unwrap();
        db.append_messages("c", &[]).unwrap();

        let ids = db.list_sessions().unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(db.list_session_summaries().unwrap().len(), 2);
    }

    #[test]
    fn test_sessions_are_independent() {
        let db = Database::open_in_memory().unwrap();
        db.append_messages("a", &[MessageContent::human("one")]).unwrap();
        db.append_messages("b", &[MessageContent::human("two")]).unwrap();
        db.append_messages("a", &[MessageContent::human("three")]).unwrap();

        let a = db.get_messages("a").unwrap();
        let b = db.get_messages("b").unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[1].sequence_id, 2);
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].content.text(), "two");
    }

    #[test]
    fn test_set_title() {
        let db = Database::open_in_memory().unwrap();
        db.create_session("s-1", "rules").unwrap();
        db.set_title("s-1", "Adding Numbers").unwrap();
        assert_eq!(
            db.get_session("s-1").unwrap().title.as_deref(),
            Some("Adding Numbers")
        );
        assert!(db.set_title("missing", "x").is_err());
    }

    #[test]
    fn test_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");

        {
            let db = Database::open(&path).unwrap();
            db.create_session("s-1", "rules").unwrap();
            db.append_messages(
                "s-1",
                &[
                    MessageContent::human("add"),
                    MessageContent::assistant("", vec![add_call("call-1")]),
                    MessageContent::tool_result(ToolResultContent {
                        call_id: "call-1".into(),
                        tool_name: "add".into(),
                        content: "5".into(),
                        is_error: false,
                        kind: ResultKind::Text,
                    }),
                ],
            )
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let messages = db.get_messages("s-1").unwrap();
        assert_eq!(messages.len(), 4);
        match &messages[3].content {
            MessageContent::ToolResult(result) => {
                assert_eq!(result.call_id, "call-1");
                assert_eq!(result.content, "5");
            }
            other => panic!("Expected tool result, got {other:?}"),
        }
        assert!(db.list_sessions().unwrap().contains("s-1"));
    }

    #[test]
    fn test_repair_orphaned_tool_calls() {
        let db = Database::open_in_memory().unwrap();
        db.append_messages(
            "s-1",
            &[
                MessageContent::human("run things"),
                MessageContent::assistant("", vec![add_call("call-1"), add_call("call-2")]),
                MessageContent::tool_result(ToolResultContent {
                    call_id: "call-1".into(),
                    tool_name: "add".into(),
                    content: "5".into(),
                    is_error: false,
                    kind: ResultKind::Text,
                }),
            ],
        )
        .unwrap();

        assert_eq!(db.repair_orphaned_tool_calls().unwrap(), 1);

        let messages = db.get_messages("s-1").unwrap();
        assert_eq!(messages.len(), 4);
        match &messages[3].content {
            MessageContent::ToolResult(result) => {
                assert_eq!(result.call_id, "call-2");
                assert!(result.is_error);
                assert!(result.content.contains("interrupted"));
            }
            other => panic!("Expected tool result, got {other:?}"),
        }

        // Idempotent
        assert_eq!(db.repair_orphaned_tool_calls().unwrap(), 0);
    }

    #[test]
    fn test_repair_fills_gap_before_later_messages() {
        let db = Database::open_in_memory().unwrap();
        db.append_messages(
            "s-1",
            &[
                MessageContent::human("add"),
                MessageContent::assistant("", vec![add_call("c1")]),
                MessageContent::human("still there?"),
                MessageContent::assistant("yes", vec![]),
            ],
        )
        .unwrap();

        assert_eq!(db.repair_orphaned_tool_calls().unwrap(), 1);
        assert_eq!(db.repair_orphaned_tool_calls().unwrap(), 0);
        assert_eq!(db.repair_orphaned_tool_calls().unwrap(), 0);

        let messages = db.get_messages("s-1").unwrap();
        let roles: Vec<Role> = messages.iter().map(Message::role).collect();
        assert_eq!(
            roles,
            vec![
                Role::Human,
                Role::Assistant,
                Role::ToolResult,
                Role::Human,
                Role::Assistant
            ]
        );
        let sequence_ids: Vec<i64> = messages.iter().map(|m| m.sequence_id).collect();
        assert_eq!(sequence_ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(messages[3].content.text(), "still there?");

        let history: Vec<MessageContent> = messages.into_iter().map(|m| m.content).collect();
        assert!(find_orphan_gaps(&history).is_empty());

        // New appends continue after the renumbered tail
        let appended = db
            .append_messages("s-1", &[MessageContent::human("again")])
            .unwrap();
        assert_eq!(appended[0].sequence_id, 6);
    }
}
