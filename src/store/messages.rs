// src/store/messages.rs

//! Message CRUD: ingest inserts, soft deletes, edits, vector bindings.
//!
//! Deletes are soft (Right to be Forgotten): content is replaced with the
//! sentinel and the row stays for referential integrity. Hard removal of the
//! derived vectors happens via the purge task.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::debug;

use super::{DELETED_SENTINEL, Store};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: i64,
    pub channel_id: i64,
    pub tenant_id: i64,
    pub author_id: i64,
    pub content: String,
    pub reply_target_id: Option<i64>,
    pub thread_id: Option<i64>,
    pub attachment_count: i64,
    pub embed_count: i64,
    pub mention_count: i64,
    pub authored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub channel_id: i64,
    pub tenant_id: i64,
    pub author_id: i64,
    pub content: String,
    pub reply_target_id: Option<i64>,
    pub authored_at: DateTime<Utc>,
    pub deleted: bool,
    pub vector_point_id: Option<String>,
    pub indexed_at: Option<i64>,
    pub updated_at: i64,
}

fn row_to_message(row: sqlx::sqlite::SqliteRow) -> MessageRow {
    let authored_raw: i64 = row.get("authored_at");
    MessageRow {
        id: row.get("id"),
        channel_id: row.get("channel_id"),
        tenant_id: row.get("tenant_id"),
        author_id: row.get("author_id"),
        content: row.get("content"),
        reply_target_id: row.get("reply_target_id"),
        authored_at: DateTime::from_timestamp(authored_raw, 0).unwrap_or_else(Utc::now),
        deleted: row.get("deleted"),
        vector_point_id: row.get("vector_point_id"),
        indexed_at: row.get("indexed_at"),
        updated_at: row.get("updated_at"),
    }
}

const MESSAGE_COLUMNS: &str = "id, channel_id, tenant_id, author_id, content, reply_target_id, \
     authored_at, deleted, vector_point_id, indexed_at, updated_at";

impl Store {
    /// Insert a message. Redelivered events are a no-op (id collision).
    /// Returns true when a new row was written.
    pub async fn insert_message(&self, msg: &NewMessage) -> Result<bool> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO messages (
                id, channel_id, tenant_id, author_id, content, reply_target_id,
                thread_id, attachment_count, embed_count, mention_count,
                authored_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(msg.id)
        .bind(msg.channel_id)
        .bind(msg.tenant_id)
        .bind(msg.author_id)
        .bind(&msg.content)
        .bind(msg.reply_target_id)
        .bind(msg.thread_id)
        .bind(msg.attachment_count)
        .bind(msg.embed_count)
        .bind(msg.mention_count)
        .bind(msg.authored_at.timestamp())
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Soft-delete: sentinel content, deleted flag, timestamp. Also nulls out
    /// reply targets that pointed at the removed rows (referential cleanup,
    /// not a cascade).
    pub async fn mark_messages_deleted(&self, tenant_id: i64, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now().timestamp();
        let placeholders = vec!["?"; ids.len()].join(", ");

        let sql = format!(
            "UPDATE messages
             SET content = ?, deleted = 1, deleted_at = ?, updated_at = ?
             WHERE tenant_id = ? AND id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql)
            .bind(DELETED_SENTINEL)
            .bind(now)
            .bind(now)
            .bind(tenant_id);
        for id in ids {
            query = query.bind(id);
        }
        let result = query.execute(self.pool()).await?;

        let cleanup_sql = format!(
            "UPDATE messages SET reply_target_id = NULL
             WHERE tenant_id = ? AND reply_target_id IN ({placeholders})"
        );
        let mut cleanup = sqlx::query(&cleanup_sql).bind(tenant_id);
        for id in ids {
            cleanup = cleanup.bind(id);
        }
        cleanup.execute(self.pool()).await?;

        debug!("Soft-deleted {} messages in tenant {}", result.rows_affected(), tenant_id);
        Ok(result.rows_affected())
    }

    /// Edit: replace content and bump `updated_at`, which flips the row to
    /// STALE relative to `indexed_at`. Re-indexing is picked up by the sweep.
    pub async fn mark_message_edited(&self, tenant_id: i64, id: i64, content: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE messages SET content = ?, updated_at = ?
             WHERE id = ? AND tenant_id = ? AND deleted = 0",
        )
        .bind(content)
        .bind(Utc::now().timestamp())
        .bind(id)
        .bind(tenant_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bind messages to the vector point that now carries them. Written only
    /// after the index upsert acknowledged success.
    pub async fn record_vector_binding(
        &self,
        tenant_id: i64,
        message_ids: &[i64],
        vector_point_id: &str,
    ) -> Result<u64> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now().timestamp();
        let placeholders = vec!["?"; message_ids.len()].join(", ");
        let sql = format!(
            "UPDATE messages SET vector_point_id = ?, indexed_at = ?
             WHERE tenant_id = ? AND id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(vector_point_id).bind(now).bind(tenant_id);
        for id in message_ids {
            query = query.bind(id);
        }
        let result = query.execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    /// Fetch live rows for a set of ids, chronological. Deleted rows are
    /// excluded so a purged message can never re-enter an enriched session.
    pub async fn messages_by_ids(&self, tenant_id: i64, ids: &[i64]) -> Result<Vec<MessageRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE tenant_id = ? AND deleted = 0 AND id IN ({placeholders})
             ORDER BY authored_at ASC, id ASC"
        );
        let mut query = sqlx::query(&sql).bind(tenant_id);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(row_to_message).collect())
    }

    pub async fn get_message(&self, tenant_id: i64, id: i64) -> Result<Option<MessageRow>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE tenant_id = ? AND id = ?");
        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(row_to_message))
    }

    /// Last `limit` non-deleted messages of a channel, oldest first.
    pub async fn recent_messages(
        &self,
        tenant_id: i64,
        channel_id: i64,
        limit: i64,
    ) -> Result<Vec<MessageRow>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE tenant_id = ? AND channel_id = ? AND deleted = 0 AND LENGTH(content) > 0
             ORDER BY authored_at DESC, id DESC
             LIMIT ?"
        );
        let mut rows: Vec<MessageRow> = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(channel_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?
            .into_iter()
            .map(row_to_message)
            .collect();
        rows.reverse();
        Ok(rows)
    }

    /// Rows never bound to a vector point, restricted to indexed channels.
    pub async fn find_unbound(&self, tenant_id: i64, limit: i64) -> Result<Vec<MessageRow>> {
        let sql = format!(
            "SELECT m.{} FROM messages m
             JOIN channels c ON m.channel_id = c.id
             WHERE m.tenant_id = ? AND m.deleted = 0
               AND m.vector_point_id IS NULL
               AND c.indexed = 1
               AND LENGTH(m.content) > 0
             ORDER BY m.authored_at ASC
             LIMIT ?",
            MESSAGE_COLUMNS.replace(", ", ", m."),
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(row_to_message).collect())
    }

    /// Channel-scoped unbound rows, oldest first. Used by the bulk backfill.
    pub async fn find_unbound_in_channel(
        &self,
        tenant_id: i64,
        channel_id: i64,
        limit: i64,
    ) -> Result<Vec<MessageRow>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE tenant_id = ? AND channel_id = ? AND deleted = 0
               AND vector_point_id IS NULL
               AND LENGTH(content) > 0
             ORDER BY authored_at ASC
             LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(channel_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(row_to_message).collect())
    }

    /// Rows edited after their last indexing (STALE).
    pub async fn find_stale(&self, tenant_id: i64, limit: i64) -> Result<Vec<MessageRow>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE tenant_id = ? AND deleted = 0
               AND vector_point_id IS NOT NULL
               AND indexed_at IS NOT NULL
               AND updated_at > indexed_at
             LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(row_to_message).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: i64) -> NewMessage {
        NewMessage {
            id,
            channel_id: 10,
            tenant_id: 1,
            author_id: 100,
            content: format!("message {id}"),
            reply_target_id: None,
            thread_id: None,
            attachment_count: 0,
            embed_count: 0,
            mention_count: 0,
            authored_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_noop() {
        let store = Store::connect_in_memory().await.unwrap();
        assert!(store.insert_message(&sample(1)).await.unwrap());
        assert!(!store.insert_message(&sample(1)).await.unwrap());

        let row = store.get_message(1, 1).await.unwrap().unwrap();
        assert_eq!(row.content, "message 1");
    }

    #[tokio::test]
    async fn soft_delete_replaces_content_and_clears_reply_targets() {
        let store = Store::connect_in_memory().await.unwrap();
        store.insert_message(&sample(1)).await.unwrap();
        let mut reply = sample(2);
        reply.reply_target_id = Some(1);
        store.insert_message(&reply).await.unwrap();

        let deleted = store.mark_messages_deleted(1, &[1]).await.unwrap();
        assert_eq!(deleted, 1);

        let row = store.get_message(1, 1).await.unwrap().unwrap();
        assert!(row.deleted);
        assert_eq!(row.content, DELETED_SENTINEL);

        let reply_row = store.get_message(1, 2).await.unwrap().unwrap();
        assert_eq!(reply_row.reply_target_id, None);

        // Deleted rows never come back from the by-ids read.
        let live = store.messages_by_ids(1, &[1, 2]).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, 2);
    }

    #[tokio::test]
    async fn edit_after_binding_goes_stale() {
        let store = Store::connect_in_memory().await.unwrap();
        store.insert_message(&sample(1)).await.unwrap();
        store
            .record_vector_binding(1, &[1], "00000000-0000-0000-0000-000000000001")
            .await
            .unwrap();
        assert!(store.find_stale(1, 10).await.unwrap().is_empty());

        // updated_at must strictly exceed indexed_at for the STALE rule
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        store.mark_message_edited(1, 1, "edited").await.unwrap();

        let stale = store.find_stale(1, 10).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].content, "edited");
    }
}
