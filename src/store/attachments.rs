// src/store/attachments.rs

//! Attachment metadata and extracted document chunks.
//!
//! The ingest path stores only CDN metadata; payload bytes are fetched by
//! workers. Processing state machine: pending -> processing -> completed|failed.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::Store;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Pending => "pending",
            ProcessingState::Processing => "processing",
            ProcessingState::Completed => "completed",
            ProcessingState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub id: i64,
    pub message_id: i64,
    pub tenant_id: i64,
    pub channel_id: i64,
    pub url: String,
    pub proxy_url: Option<String>,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
}

#[derive(Debug, Clone)]
pub struct AttachmentRow {
    pub id: i64,
    pub message_id: i64,
    pub tenant_id: i64,
    pub channel_id: i64,
    pub url: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub source_type: String,
    pub processing_state: String,
    pub vector_point_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewDocumentChunk {
    pub id: Uuid,
    pub attachment_id: i64,
    pub tenant_id: i64,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub chunk_kind: String,
    pub heading_context: Option<String>,
}

impl Store {
    pub async fn insert_attachment(&self, att: &NewAttachment) -> Result<bool> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO attachments (
                id, message_id, tenant_id, channel_id, url, proxy_url,
                filename, content_type, size_bytes, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(att.id)
        .bind(att.message_id)
        .bind(att.tenant_id)
        .bind(att.channel_id)
        .bind(&att.url)
        .bind(&att.proxy_url)
        .bind(&att.filename)
        .bind(&att.content_type)
        .bind(att.size_bytes)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_attachment(&self, tenant_id: i64, id: i64) -> Result<Option<AttachmentRow>> {
        let row = sqlx::query(
            "SELECT id, message_id, tenant_id, channel_id, url, filename, content_type,
                    size_bytes, source_type, processing_state, vector_point_ids
             FROM attachments WHERE tenant_id = ? AND id = ? AND deleted = 0",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| {
            let points_json: Option<String> = r.get("vector_point_ids");
            AttachmentRow {
                id: r.get("id"),
                message_id: r.get("message_id"),
                tenant_id: r.get("tenant_id"),
                channel_id: r.get("channel_id"),
                url: r.get("url"),
                filename: r.get("filename"),
                content_type: r.get("content_type"),
                size_bytes: r.get("size_bytes"),
                source_type: r.get("source_type"),
                processing_state: r.get("processing_state"),
                vector_point_ids: points_json
                    .and_then(|j| serde_json::from_str(&j).ok())
                    .unwrap_or_default(),
            }
        }))
    }

    pub async fn set_attachment_state(
        &self,
        attachment_id: i64,
        state: ProcessingState,
        error: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        let processed_at = matches!(state, ProcessingState::Completed | ProcessingState::Failed)
            .then_some(now);
        sqlx::query(
            "UPDATE attachments
             SET processing_state = ?, processing_error = ?, processed_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(state.as_str())
        .bind(error)
        .bind(processed_at)
        .bind(now)
        .bind(attachment_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Record the completed extraction: source type, text/caption, chunk count
    /// and the set of vector points now carrying the chunks.
    pub async fn complete_attachment(
        &self,
        attachment_id: i64,
        source_type: &str,
        extracted_text: Option<&str>,
        description: Option<&str>,
        vector_point_ids: &[String],
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            "UPDATE attachments
             SET processing_state = 'completed', source_type = ?, extracted_text = ?,
                 description = ?, vector_point_ids = ?, chunk_count = ?,
                 indexed_at = ?, processed_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(source_type)
        .bind(extracted_text)
        .bind(description)
        .bind(serde_json::to_string(vector_point_ids)?)
        .bind(vector_point_ids.len() as i64)
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(attachment_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn insert_document_chunk(&self, chunk: &NewDocumentChunk) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO document_chunks (
                id, attachment_id, tenant_id, chunk_index, chunk_text,
                chunk_kind, heading_context, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(chunk.id.to_string())
        .bind(chunk.attachment_id)
        .bind(chunk.tenant_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.chunk_text)
        .bind(&chunk.chunk_kind)
        .bind(&chunk.heading_context)
        .bind(Utc::now().timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn bind_chunk_point(&self, chunk_id: Uuid, vector_point_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE document_chunks SET vector_point_id = ?, indexed_at = ? WHERE id = ?",
        )
        .bind(vector_point_id)
        .bind(Utc::now().timestamp())
        .bind(chunk_id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Idempotent re-processing support: drop previous chunks for an attachment.
    pub async fn delete_chunks_for_attachment(&self, attachment_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE attachment_id = ?")
            .bind(attachment_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_attachment() -> NewAttachment {
        NewAttachment {
            id: 555,
            message_id: 1,
            tenant_id: 1,
            channel_id: 10,
            url: "https://cdn.example/file.pdf".into(),
            proxy_url: None,
            filename: "file.pdf".into(),
            content_type: Some("application/pdf".into()),
            size_bytes: 2048,
        }
    }

    #[tokio::test]
    async fn attachment_state_machine() {
        let store = Store::connect_in_memory().await.unwrap();
        assert!(store.insert_attachment(&sample_attachment()).await.unwrap());
        // Redelivery is a no-op
        assert!(!store.insert_attachment(&sample_attachment()).await.unwrap());

        store
            .set_attachment_state(555, ProcessingState::Processing, None)
            .await
            .unwrap();
        store
            .complete_attachment(555, "pdf", Some("body text"), None, &["p1".into(), "p2".into()])
            .await
            .unwrap();

        let row = store.get_attachment(1, 555).await.unwrap().unwrap();
        assert_eq!(row.processing_state, "completed");
        assert_eq!(row.source_type, "pdf");
        assert_eq!(row.vector_point_ids, vec!["p1".to_string(), "p2".to_string()]);
    }
}
