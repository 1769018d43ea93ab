// src/store/sessions.rs

//! Sessionizer output rows. A session owns an ordered list of message ids;
//! messages do not point back (the relation is derivable by index).

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::Store;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: Uuid,
    pub tenant_id: i64,
    pub channel_id: i64,
    pub message_ids: Vec<i64>,
    pub participant_ids: Vec<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub preview: Option<String>,
    pub vector_point_id: Option<String>,
}

fn row_to_session(row: sqlx::sqlite::SqliteRow) -> Result<SessionRow> {
    let id_raw: String = row.get("id");
    let message_ids_json: String = row.get("message_ids");
    let participant_ids_json: String = row.get("participant_ids");
    let start_raw: i64 = row.get("start_time");
    let end_raw: i64 = row.get("end_time");

    Ok(SessionRow {
        id: Uuid::parse_str(&id_raw).unwrap_or_else(|_| Uuid::nil()),
        tenant_id: row.get("tenant_id"),
        channel_id: row.get("channel_id"),
        message_ids: serde_json::from_str(&message_ids_json)?,
        participant_ids: serde_json::from_str(&participant_ids_json)?,
        start_time: DateTime::from_timestamp(start_raw, 0).unwrap_or_else(Utc::now),
        end_time: DateTime::from_timestamp(end_raw, 0).unwrap_or_else(Utc::now),
        preview: row.get("preview"),
        vector_point_id: row.get("vector_point_id"),
    })
}

impl Store {
    pub async fn insert_session(&self, session: &SessionRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, tenant_id, channel_id, message_ids, message_count,
                participant_ids, start_time, end_time, preview, vector_point_id, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                message_ids = excluded.message_ids,
                message_count = excluded.message_count,
                participant_ids = excluded.participant_ids,
                preview = excluded.preview,
                vector_point_id = excluded.vector_point_id
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.tenant_id)
        .bind(session.channel_id)
        .bind(serde_json::to_string(&session.message_ids)?)
        .bind(session.message_ids.len() as i64)
        .bind(serde_json::to_string(&session.participant_ids)?)
        .bind(session.start_time.timestamp())
        .bind(session.end_time.timestamp())
        .bind(&session.preview)
        .bind(&session.vector_point_id)
        .bind(Utc::now().timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn bind_session_point(&self, session_id: Uuid, vector_point_id: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET vector_point_id = ? WHERE id = ?")
            .bind(vector_point_id)
            .bind(session_id.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRow>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, channel_id, message_ids, participant_ids,
                    start_time, end_time, preview, vector_point_id
             FROM sessions WHERE id = ?",
        )
        .bind(session_id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.map(row_to_session).transpose()
    }

    /// Sessions whose id set intersects the given message ids. Used by the
    /// deletion pipeline to find points that must be purged.
    pub async fn sessions_containing_messages(
        &self,
        tenant_id: i64,
        message_ids: &[i64],
    ) -> Result<Vec<SessionRow>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, channel_id, message_ids, participant_ids,
                    start_time, end_time, preview, vector_point_id
             FROM sessions WHERE tenant_id = ?",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;

        let mut hits = Vec::new();
        for row in rows {
            let session = row_to_session(row)?;
            if session.message_ids.iter().any(|id| message_ids.contains(id)) {
                hits.push(session);
            }
        }
        Ok(hits)
    }

    pub async fn delete_sessions(&self, session_ids: &[Uuid]) -> Result<u64> {
        if session_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; session_ids.len()].join(", ");
        let sql = format!("DELETE FROM sessions WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in session_ids {
            query = query.bind(id.to_string());
        }
        let result = query.execute(self.pool()).await?;
        Ok(result.rows_affected())
    }
}
