// src/queue/handlers.rs

//! Task handlers executed by the worker pool.
//!
//! Every handler is idempotent: redelivery after a crash or lease expiry
//! converges to the same terminal state. Vector writes happen only after the
//! corresponding store rows exist, and store bindings are written only after
//! the index acknowledged the upsert.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::worker::TaskHandler;
use super::{ClaimedItem, TaskPayload, WorkQueue};
use crate::answer::{AnswerRouter, AskRequest};
use crate::config::IngestConfig;
use crate::documents::DocumentProcessor;
use crate::embeddings::{SparseEncoder, TextEmbedder};
use crate::error::Result;
use crate::ingest::enrich::{self, EnrichedLine};
use crate::ingest::sessionizer::{self, SessionMessage};
use crate::llm::LlmClient;
use crate::store::attachments::ProcessingState;
use crate::store::messages::MessageRow;
use crate::store::sessions::SessionRow;
use crate::store::Store;
use crate::vector::{self, HYBRID_COLLECTION, LEGACY_COLLECTION, VectorIndex};

pub struct TaskContext {
    pub store: Store,
    pub queue: WorkQueue,
    pub index: Arc<VectorIndex>,
    pub embedder: Arc<TextEmbedder>,
    pub sparse: SparseEncoder,
    pub documents: DocumentProcessor,
    pub vision: Arc<LlmClient>,
    pub router: Arc<AnswerRouter>,
    pub ingest_config: IngestConfig,
}

#[async_trait]
impl TaskHandler for TaskContext {
    async fn handle(&self, item: &ClaimedItem) -> Result<()> {
        match &item.payload {
            TaskPayload::SingleMessageIndex {
                tenant_id,
                channel_id,
                message_id,
            } => {
                self.index_single_message(*tenant_id, *channel_id, *message_id)
                    .await
            }
            TaskPayload::SessionIndex {
                tenant_id,
                channel_id,
                message_ids,
                ..
            } => self.index_session(*tenant_id, *channel_id, message_ids).await,
            TaskPayload::PurgeSessions {
                tenant_id,
                message_ids,
            } => self.purge_sessions(*tenant_id, message_ids).await,
            TaskPayload::PurgeVector { point_ids, .. } => {
                self.index.delete_points(HYBRID_COLLECTION, point_ids).await?;
                self.index.delete_points(LEGACY_COLLECTION, point_ids).await?;
                Ok(())
            }
            TaskPayload::ProcessAttachment {
                tenant_id,
                attachment_id,
            } => self.process_attachment(*tenant_id, *attachment_id).await,
            TaskPayload::BulkChannelIndex {
                tenant_id,
                channel_id,
                batch_size,
            } => self.bulk_index(*tenant_id, *channel_id, *batch_size).await,
            TaskPayload::QueryAsk {
                tenant_id,
                query,
                channel_ids,
                channel_id,
            } => {
                let response = self
                    .router
                    .ask(&AskRequest {
                        tenant_id: *tenant_id,
                        query: query.clone(),
                        channel_ids: channel_ids.clone(),
                        channel_id: *channel_id,
                    })
                    .await?;
                // The platform adapter's follow-up hook posts the answer
                // into the deferred interaction.
                info!(
                    tenant = tenant_id,
                    routed_to = response.routed_to.as_str(),
                    elapsed_ms = response.elapsed_ms,
                    "deferred query answered"
                );
                Ok(())
            }
        }
    }
}

impl TaskContext {
    async fn mention_names(&self, rows: &[MessageRow]) -> Result<HashMap<i64, String>> {
        let mut names = HashMap::new();
        for row in rows {
            if let std::collections::hash_map::Entry::Vacant(entry) = names.entry(row.author_id) {
                if let Some(name) = self.store.member_name(row.author_id).await? {
                    entry.insert(name.best().to_string());
                }
            }
        }
        Ok(names)
    }

    async fn enriched_text(
        &self,
        channel_id: i64,
        rows: &[MessageRow],
    ) -> Result<(String, Vec<i64>)> {
        let channel_name = self
            .store
            .channel_name(channel_id)
            .await?
            .unwrap_or_else(|| channel_id.to_string());
        let names = self.mention_names(rows).await?;

        let mut participants: Vec<i64> = Vec::new();
        let lines: Vec<EnrichedLine<'_>> = rows
            .iter()
            .map(|row| {
                if !participants.contains(&row.author_id) {
                    participants.push(row.author_id);
                }
                EnrichedLine {
                    author_name: names
                        .get(&row.author_id)
                        .map(String::as_str)
                        .unwrap_or("unknown"),
                    content: &row.content,
                    timestamp: row.authored_at,
                }
            })
            .collect();

        Ok((enrich::enrich_session(&lines, &channel_name, &names), participants))
    }

    /// Index one message as its own point on the hybrid collection.
    async fn index_single_message(
        &self,
        tenant_id: i64,
        channel_id: i64,
        message_id: i64,
    ) -> Result<()> {
        let Some(row) = self.store.get_message(tenant_id, message_id).await? else {
            debug!("Message {} gone, skipping index", message_id);
            return Ok(());
        };
        if row.deleted {
            return Ok(());
        }
        // Already bound and not stale: redelivery is a no-op.
        if row.vector_point_id.is_some()
            && row.indexed_at.is_some_and(|indexed| row.updated_at <= indexed)
        {
            return Ok(());
        }

        let rows = vec![row];
        let (text, participants) = self.enriched_text(channel_id, &rows).await?;
        let row = &rows[0];

        let dense = self.embedder.embed_one(&text).await?;
        let sparse = self.sparse.encode_passage(&text);

        // Replace a stale point in place by reusing its id.
        let point_id = row
            .vector_point_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let payload = vector::session_payload(
            tenant_id,
            channel_id,
            &point_id,
            &[message_id],
            &participants,
            &row.authored_at.to_rfc3339(),
            &row.authored_at.to_rfc3339(),
            &text,
        );
        self.index
            .upsert_hybrid(&point_id, dense, Some(&sparse), payload)
            .await?;

        self.store
            .record_vector_binding(tenant_id, &[message_id], &point_id)
            .await?;
        Ok(())
    }

    /// Index a sessionized group as one point; bind messages and the session
    /// row only after the upsert acknowledges.
    async fn index_session(
        &self,
        tenant_id: i64,
        channel_id: i64,
        message_ids: &[i64],
    ) -> Result<()> {
        let rows = self.store.messages_by_ids(tenant_id, message_ids).await?;
        if rows.is_empty() {
            debug!("Session has no live messages, skipping");
            return Ok(());
        }

        let (text, participants) = self.enriched_text(channel_id, &rows).await?;
        let dense = self.embedder.embed_one(&text).await?;
        let sparse = self.sparse.encode_passage(&text);

        let live_ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let start = rows.first().map(|r| r.authored_at).unwrap_or_else(Utc::now);
        let end = rows.last().map(|r| r.authored_at).unwrap_or_else(Utc::now);

        let session_id = uuid::Uuid::new_v4();
        let point_id = session_id.to_string();
        let payload = vector::session_payload(
            tenant_id,
            channel_id,
            &point_id,
            &live_ids,
            &participants,
            &start.to_rfc3339(),
            &end.to_rfc3339(),
            &text,
        );
        self.index
            .upsert_hybrid(&point_id, dense, Some(&sparse), payload)
            .await?;

        let preview = crate::util::truncate_chars(&text, 1000);
        self.store
            .insert_session(&SessionRow {
                id: session_id,
                tenant_id,
                channel_id,
                message_ids: live_ids.clone(),
                participant_ids: participants,
                start_time: start,
                end_time: end,
                preview: Some(preview),
                vector_point_id: Some(point_id.clone()),
            })
            .await?;
        self.store
            .record_vector_binding(tenant_id, &live_ids, &point_id)
            .await?;

        info!(
            "Indexed session {} ({} messages) for tenant {}",
            session_id,
            live_ids.len(),
            tenant_id
        );
        Ok(())
    }

    /// Right to be forgotten: remove every point whose payload references a
    /// deleted message, across both collections, plus the session rows.
    async fn purge_sessions(&self, tenant_id: i64, message_ids: &[i64]) -> Result<()> {
        let mut purged = 0usize;

        for collection in [HYBRID_COLLECTION, LEGACY_COLLECTION] {
            let points = self.index.scroll_tenant(collection, tenant_id).await?;
            let hit_ids: Vec<String> = points
                .iter()
                .filter(|p| {
                    p.message_ids()
                        .iter()
                        .any(|id| message_ids.contains(id))
                })
                .map(|p| p.id.clone())
                .collect();
            if !hit_ids.is_empty() {
                self.index.delete_points(collection, &hit_ids).await?;
                purged += hit_ids.len();
            }
        }

        let sessions = self
            .store
            .sessions_containing_messages(tenant_id, message_ids)
            .await?;
        let session_ids: Vec<uuid::Uuid> = sessions.iter().map(|s| s.id).collect();
        self.store.delete_sessions(&session_ids).await?;

        info!(
            "Purged {} vector points and {} session rows for {} deleted messages",
            purged,
            session_ids.len(),
            message_ids.len()
        );
        Ok(())
    }

    async fn process_attachment(&self, tenant_id: i64, attachment_id: i64) -> Result<()> {
        let Some(attachment) = self.store.get_attachment(tenant_id, attachment_id).await? else {
            debug!("Attachment {} gone, skipping", attachment_id);
            return Ok(());
        };
        if attachment.processing_state == "completed" {
            return Ok(());
        }

        self.store
            .set_attachment_state(attachment_id, ProcessingState::Processing, None)
            .await?;

        let processed = match self.documents.process(&attachment, &self.vision).await {
            Ok(processed) => processed,
            Err(e) => {
                // Never partial: the whole item fails.
                self.store
                    .set_attachment_state(
                        attachment_id,
                        ProcessingState::Failed,
                        Some(&e.to_string()),
                    )
                    .await?;
                return Err(e);
            }
        };

        // Re-processing replaces prior chunks wholesale.
        self.store.delete_chunks_for_attachment(attachment_id).await?;

        let texts: Vec<String> = processed.chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_many(&texts).await?;

        let mut point_ids = Vec::new();
        for (chunk, dense) in processed.chunks.iter().zip(embeddings) {
            let chunk_id = uuid::Uuid::new_v4();
            let point_id = chunk_id.to_string();

            self.store
                .insert_document_chunk(&crate::store::attachments::NewDocumentChunk {
                    id: chunk_id,
                    attachment_id,
                    tenant_id,
                    chunk_index: chunk.index,
                    chunk_text: chunk.text.clone(),
                    chunk_kind: chunk.kind.to_string(),
                    heading_context: chunk.heading_context.clone(),
                })
                .await?;

            let sparse = self.sparse.encode_passage(&chunk.text);
            let payload = vector::chunk_payload(
                tenant_id,
                attachment.channel_id,
                attachment_id,
                &point_id,
                chunk.index,
                processed.source_type.as_str(),
                &attachment.filename,
                chunk.heading_context.as_deref(),
                &chunk.text,
            );
            self.index
                .upsert_hybrid(&point_id, dense, Some(&sparse), payload)
                .await?;
            self.store.bind_chunk_point(chunk_id, &point_id).await?;
            point_ids.push(point_id);
        }

        self.store
            .complete_attachment(
                attachment_id,
                processed.source_type.as_str(),
                processed.extracted_text.as_deref(),
                processed.description.as_deref(),
                &point_ids,
            )
            .await?;

        info!(
            "Attachment {} processed into {} chunks",
            attachment_id,
            point_ids.len()
        );
        Ok(())
    }

    /// Backfill a channel: sessionize unbound history batch by batch and
    /// index each session within this run. The run is bounded by the
    /// bulk-index hard deadline, not by attempts; indexed rows become bound,
    /// so the next batch query makes progress.
    async fn bulk_index(&self, tenant_id: i64, channel_id: i64, batch_size: i64) -> Result<()> {
        let mut total_messages = 0usize;
        let mut total_sessions = 0usize;

        loop {
            let batch = self
                .store
                .find_unbound_in_channel(tenant_id, channel_id, batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            total_messages += batch.len();

            let messages: Vec<SessionMessage> = batch
                .iter()
                .map(|m| SessionMessage {
                    id: m.id,
                    channel_id: m.channel_id,
                    author_id: m.author_id,
                    content: m.content.clone(),
                    timestamp: m.authored_at,
                    reply_target_id: m.reply_target_id,
                })
                .collect();

            let sessions =
                sessionizer::sessionize(messages, self.ingest_config.session_gap_minutes);
            for session in sessions {
                self.index_session(tenant_id, channel_id, &session.message_ids())
                    .await?;
                total_sessions += 1;
            }
        }

        info!(
            "Bulk index of channel {}: {} messages into {} sessions",
            channel_id, total_messages, total_sessions
        );
        Ok(())
    }
}
