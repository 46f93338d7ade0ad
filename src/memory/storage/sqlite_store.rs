//! `SQLite` message store backed by sqlite-vec distance functions.

use std::str::FromStr;

use chrono::{TimeZone, Utc};
use tokio_rusqlite::Connection;

use crate::memory::core::config::StorageConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::{ConversationId, MessageId};
use crate::memory::core::message::{Message, NewMessage, RankedMessage, Role};
use crate::memory::embedding::vector::Embedding;
use crate::memory::storage::message_store::{MessageStore, StoreFuture};
use crate::memory::storage::sqlite_vec_loader::init_sqlite_vec_extension;

/// Raw column tuple: id, conversation, role, content, created (ms), embedding.
type MessageRow = (i64, i64, String, String, i64, Option<Vec<u8>>);

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, created_at, embedding";

/// `SQLite` implementation of [`MessageStore`].
pub struct SqliteMessageStore {
    conn: Connection,
    conversations: String,
    messages: String,
}

impl SqliteMessageStore {
    /// Open (or create) the store at the configured path.
    ///
    /// # Errors
    /// Returns an error if a table name is invalid or the database cannot be
    /// opened or migrated.
    pub async fn new(config: &StorageConfig) -> MemoryResult<Self> {
        validate_table_name(&config.conversations_table)?;
        validate_table_name(&config.messages_table)?;
        init_sqlite_vec_extension();

        let conn = Connection::open(&config.sqlite_path).await?;
        let conversations = config.conversations_table.clone();
        let messages = config.messages_table.clone();
        let (conv_table, msg_table) = (conversations.clone(), messages.clone());

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                CREATE TABLE IF NOT EXISTS {conv_table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT,
                    created_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS {msg_table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id INTEGER NOT NULL REFERENCES {conv_table}(id),
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    embedding BLOB
                );
                CREATE INDEX IF NOT EXISTS idx_{msg_table}_conversation
                    ON {msg_table} (conversation_id, id);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            conversations,
            messages,
        })
    }
}

fn validate_table_name(name: &str) -> MemoryResult<()> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MemoryError::InvalidConfig(format!(
            "invalid table name: {name:?}"
        )))
    }
}

fn limit_to_i64(limit: usize) -> MemoryResult<i64> {
    i64::try_from(limit).map_err(|_| MemoryError::InvalidRecord("limit exceeds i64".to_string()))
}

fn message_from_row(row: MessageRow) -> MemoryResult<Message> {
    let (id, conversation_id, role, content, created_ms, embedding) = row;
    let created_at = Utc
        .timestamp_millis_opt(created_ms)
        .single()
        .ok_or_else(|| MemoryError::InvalidRecord("invalid timestamp".to_string()))?;
    let role = Role::from_str(&role)
        .map_err(|err| MemoryError::InvalidRecord(format!("invalid role: {err}")))?;
    let embedding = embedding
        .as_deref()
        .map(Embedding::from_blob)
        .transpose()?;

    Ok(Message {
        id: MessageId::new(id),
        conversation_id: ConversationId::new(conversation_id),
        role,
        content,
        created_at,
        embedding,
    })
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

impl MessageStore for SqliteMessageStore {
    fn conversation_exists(&self, id: ConversationId) -> StoreFuture<'_, MemoryResult<bool>> {
        Box::pin(async move {
            let table = self.conversations.clone();
            let exists = self
                .conn
                .call(move |conn| {
                    let exists: i64 = conn.query_row(
                        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)"),
                        rusqlite::params![id.get()],
                        |row| row.get(0),
                    )?;
                    Ok(exists != 0)
                })
                .await?;
            Ok(exists)
        })
    }

    fn create_conversation(
        &self,
        owner: Option<String>,
    ) -> StoreFuture<'_, MemoryResult<ConversationId>> {
        Box::pin(async move {
            let table = self.conversations.clone();
            let created_at = Utc::now().timestamp_millis();
            let id = self
                .conn
                .call(move |conn| {
                    conn.execute(
                        &format!("INSERT INTO {table} (user_id, created_at) VALUES (?1, ?2)"),
                        rusqlite::params![owner, created_at],
                    )?;
                    Ok(conn.last_insert_rowid())
                })
                .await?;
            Ok(ConversationId::new(id))
        })
    }

    fn append_message(&self, message: NewMessage) -> StoreFuture<'_, MemoryResult<MessageId>> {
        Box::pin(async move {
            let conv_table = self.conversations.clone();
            let msg_table = self.messages.clone();
            let conversation_id = message.conversation_id;
            let created_at = Utc::now().timestamp_millis();
            let blob = message.embedding.as_ref().map(Embedding::to_blob);

            let inserted = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let exists: i64 = tx.query_row(
                        &format!("SELECT EXISTS(SELECT 1 FROM {conv_table} WHERE id = ?1)"),
                        rusqlite::params![conversation_id.get()],
                        |row| row.get(0),
                    )?;
                    if exists == 0 {
                        return Ok(None);
                    }

                    tx.execute(
                        &format!(
                            "INSERT INTO {msg_table}
                            (conversation_id, role, content, created_at, embedding)
                            VALUES (?1, ?2, ?3, ?4, ?5)"
                        ),
                        rusqlite::params![
                            conversation_id.get(),
                            message.role.as_str(),
                            message.content,
                            created_at,
                            blob
                        ],
                    )?;
                    let id = tx.last_insert_rowid();
                    tx.commit()?;
                    Ok(Some(id))
                })
                .await?;

            inserted
                .map(MessageId::new)
                .ok_or(MemoryError::UnknownConversation(conversation_id))
        })
    }

    fn recent_messages(
        &self,
        id: ConversationId,
        limit: usize,
    ) -> StoreFuture<'_, MemoryResult<Vec<Message>>> {
        Box::pin(async move {
            let table = self.messages.clone();
            let limit = limit_to_i64(limit)?;
            let mut rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MESSAGE_COLUMNS}
                         FROM {table}
                         WHERE conversation_id = ?1
                         ORDER BY id DESC
                         LIMIT ?2"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![id.get(), limit], read_row)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            rows.reverse();
            rows.into_iter().map(message_from_row).collect()
        })
    }

    fn similar_messages<'a>(
        &'a self,
        id: ConversationId,
        query: &'a Embedding,
        top_n: usize,
    ) -> StoreFuture<'a, MemoryResult<Vec<RankedMessage>>> {
        Box::pin(async move {
            if top_n == 0 || query.ndims() == 0 {
                return Ok(Vec::new());
            }

            let table = self.messages.clone();
            let limit = limit_to_i64(top_n)?;
            let blob = query.to_blob();
            let blob_len = limit_to_i64(blob.len())?;
            let rows = self
                .conn
                .call(move |conn| {
                    // Stored vectors of another dimension cannot be compared.
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MESSAGE_COLUMNS}, vec_distance_l2(embedding, ?2) AS distance
                         FROM {table}
                         WHERE conversation_id = ?1
                           AND embedding IS NOT NULL
                           AND length(embedding) = ?3
                         ORDER BY distance ASC, id ASC
                         LIMIT ?4"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![id.get(), blob, blob_len, limit], |row| {
                            let distance: f64 = row.get(6)?;
                            Ok((read_row(row)?, distance))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            rows.into_iter()
                .map(|(row, distance)| {
                    Ok(RankedMessage {
                        distance,
                        message: message_from_row(row)?,
                    })
                })
                .collect()
        })
    }

    fn list_messages(&self, id: ConversationId) -> StoreFuture<'_, MemoryResult<Vec<Message>>> {
        Box::pin(async move {
            let table = self.messages.clone();
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MESSAGE_COLUMNS}
                         FROM {table}
                         WHERE conversation_id = ?1
                         ORDER BY id ASC"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![id.get()], read_row)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            rows.into_iter().map(message_from_row).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(dir: &tempfile::TempDir) -> MemoryResult<SqliteMessageStore> {
        let config = StorageConfig {
            sqlite_path: dir.path().join("store.sqlite"),
            ..StorageConfig::default()
        };
        SqliteMessageStore::new(&config).await
    }

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("chat_messages").is_ok());
        assert!(validate_table_name("_t1").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1abc").is_err());
        assert!(validate_table_name("x; DROP TABLE y").is_err());
    }

    #[tokio::test]
    async fn test_invalid_table_name_is_config_error() {
        let config = StorageConfig {
            messages_table: "bad name".to_string(),
            ..StorageConfig::default()
        };
        let result = SqliteMessageStore::new(&config).await;
        assert!(matches!(result, Err(MemoryError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_messages_survive_reopen() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let Ok(store) = open(&dir).await else {
            panic!("store should open");
        };
        let Ok(id) = store.create_conversation(None).await else {
            panic!("create conversation");
        };
        let appended = store
            .append_message(NewMessage::user(id, "persisted", Some(Embedding::zeros(2))))
            .await;
        assert!(appended.is_ok());
        drop(store);

        let Ok(reopened) = open(&dir).await else {
            panic!("store should reopen");
        };
        let messages = reopened.list_messages(id).await.unwrap_or_default();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "persisted");
        assert!(reopened.conversation_exists(id).await.unwrap_or(false));

        let next = reopened.create_conversation(None).await;
        assert!(next.is_ok_and(|next| next > id));
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_rejected() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let Ok(store) = open(&dir).await else {
            panic!("store should open");
        };
        let result = store
            .append_message(NewMessage::assistant(ConversationId::new(42), "x", None))
            .await;
        assert!(matches!(result, Err(MemoryError::UnknownConversation(id)) if id.get() == 42));
    }

    #[tokio::test]
    async fn test_similarity_distance_matches_l2() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let Ok(store) = open(&dir).await else {
            panic!("store should open");
        };
        let Ok(id) = store.create_conversation(None).await else {
            panic!("create conversation");
        };
        let stored = Embedding::new(vec![3.0, 4.0]);
        let appended = store
            .append_message(NewMessage::user(id, "far", Some(stored)))
            .await;
        assert!(appended.is_ok());

        let hits = store
            .similar_messages(id, &Embedding::zeros(2), 5)
            .await
            .unwrap_or_default();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].distance - 5.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_sql_failure_surfaces_as_store_error() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let Ok(store) = open(&dir).await else {
            panic!("store should open");
        };
        let Ok(id) = store.create_conversation(None).await else {
            panic!("create conversation");
        };

        let Ok(side) = rusqlite::Connection::open(dir.path().join("store.sqlite")) else {
            panic!("side connection");
        };
        assert!(side.execute_batch("DROP TABLE chat_messages;").is_ok());
        drop(side);

        let result = store.list_messages(id).await;
        assert!(matches!(result, Err(MemoryError::TokioSqlite(_))));
    }
}
