// src/ingest/mod.rs

//! Ingest pipeline: platform events -> store writes -> queue work.
//!
//! Handlers stay thin: the minimal store write plus an enqueue, then return.
//! No downloads, no embeddings, no LLM work here - the platform event loop
//! must never block on those.

pub mod enrich;
pub mod semantic;
pub mod sessionizer;

use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::error::Result;
use crate::platform::PlatformEvent;
use crate::queue::{TaskPayload, WorkQueue};
use crate::store::Store;
use crate::store::attachments::NewAttachment;
use crate::store::messages::NewMessage;

pub struct IngestService {
    store: Store,
    queue: WorkQueue,
    config: IngestConfig,
}

impl IngestService {
    pub fn new(store: Store, queue: WorkQueue, config: IngestConfig) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    pub async fn handle_event(&self, event: PlatformEvent) -> Result<()> {
        match event {
            PlatformEvent::MessageCreated {
                tenant_id,
                tenant_name,
                channel_id,
                channel_name,
                message_id,
                author_id,
                author_username,
                author_display_name,
                author_is_bot,
                content,
                reply_target_id,
                thread_id,
                attachment_count,
                embed_count,
                mention_count,
                authored_at,
            } => {
                if author_is_bot && !self.config.ingest_bot_messages {
                    debug!("Skipping bot message {} (ingest_bot_messages off)", message_id);
                    return Ok(());
                }

                self.store.upsert_tenant(tenant_id, &tenant_name).await?;
                self.store
                    .upsert_channel(channel_id, tenant_id, &channel_name)
                    .await?;
                self.store
                    .upsert_member(
                        author_id,
                        &author_username,
                        author_display_name.as_deref(),
                        author_is_bot,
                    )
                    .await?;

                let inserted = self
                    .store
                    .insert_message(&NewMessage {
                        id: message_id,
                        channel_id,
                        tenant_id,
                        author_id,
                        content: content.clone(),
                        reply_target_id,
                        thread_id,
                        attachment_count,
                        embed_count,
                        mention_count,
                        authored_at,
                    })
                    .await?;

                // Redelivered event: the row exists, nothing new to index.
                if !inserted {
                    return Ok(());
                }

                self.store.touch_tenant_member(tenant_id, author_id).await?;

                // Store write committed; only now may index work be enqueued.
                if !content.trim().is_empty() && self.store.channel_is_indexed(channel_id).await? {
                    self.queue
                        .enqueue(&TaskPayload::SingleMessageIndex {
                            tenant_id,
                            channel_id,
                            message_id,
                        })
                        .await?;
                }
                Ok(())
            }

            PlatformEvent::MessageEdited {
                tenant_id,
                message_id,
                content,
            } => {
                // Bump updated_at; the stale sweep re-indexes lazily.
                let edited = self
                    .store
                    .mark_message_edited(tenant_id, message_id, &content)
                    .await?;
                if edited {
                    debug!("Message {} edited, now stale", message_id);
                }
                Ok(())
            }

            PlatformEvent::MessageDeleted {
                tenant_id,
                message_id,
            } => self.delete_messages(tenant_id, vec![message_id]).await,

            PlatformEvent::MessagesBulkDeleted {
                tenant_id,
                message_ids,
            } => self.delete_messages(tenant_id, message_ids).await,

            PlatformEvent::AttachmentAdded {
                tenant_id,
                channel_id,
                message_id,
                attachment_id,
                url,
                proxy_url,
                filename,
                content_type,
                size_bytes,
            } => {
                // Metadata only; workers fetch the bytes later.
                let inserted = self
                    .store
                    .insert_attachment(&NewAttachment {
                        id: attachment_id,
                        message_id,
                        tenant_id,
                        channel_id,
                        url,
                        proxy_url,
                        filename,
                        content_type,
                        size_bytes,
                    })
                    .await?;
                if inserted {
                    self.queue
                        .enqueue(&TaskPayload::ProcessAttachment {
                            tenant_id,
                            attachment_id,
                        })
                        .await?;
                }
                Ok(())
            }

            PlatformEvent::CommandInvoked {
                tenant_id,
                channel_id,
                query,
            } => {
                // The platform adapter already deferred the interaction; the
                // answer is produced by a worker and posted later.
                self.queue
                    .enqueue(&TaskPayload::QueryAsk {
                        tenant_id,
                        query,
                        channel_ids: vec![],
                        channel_id: Some(channel_id),
                    })
                    .await?;
                Ok(())
            }
        }
    }

    /// Soft-delete first, then a high-priority purge of every session point
    /// containing the ids. Deleted content may be visible in the index only
    /// for the queue-drain interval.
    async fn delete_messages(&self, tenant_id: i64, message_ids: Vec<i64>) -> Result<()> {
        let deleted = self
            .store
            .mark_messages_deleted(tenant_id, &message_ids)
            .await?;
        info!(
            "Soft-deleted {} messages in tenant {}, purge enqueued",
            deleted, tenant_id
        );

        self.queue
            .enqueue(&TaskPayload::PurgeSessions {
                tenant_id,
                message_ids,
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Priority;
    use chrono::Utc;

    fn created(message_id: i64, content: &str) -> PlatformEvent {
        PlatformEvent::MessageCreated {
            tenant_id: 1,
            tenant_name: "guild".into(),
            channel_id: 10,
            channel_name: "general".into(),
            message_id,
            author_id: 100,
            author_username: "ada".into(),
            author_display_name: Some("Ada".into()),
            author_is_bot: false,
            content: content.into(),
            reply_target_id: None,
            thread_id: None,
            attachment_count: 0,
            embed_count: 0,
            mention_count: 0,
            authored_at: Utc::now(),
        }
    }

    async fn service() -> IngestService {
        let store = Store::connect_in_memory().await.unwrap();
        let queue = WorkQueue::connect_in_memory().await.unwrap();
        store.upsert_tenant(1, "guild").await.unwrap();
        store.upsert_channel(10, 1, "general").await.unwrap();
        store.set_channel_indexed(1, 10, true).await.unwrap();
        IngestService::new(
            store,
            queue,
            IngestConfig {
                ingest_bot_messages: true,
                session_gap_minutes: 15,
                semantic_split_threshold: 15,
                min_session_size: 2,
                max_session_size: 30,
            },
        )
    }

    #[tokio::test]
    async fn create_persists_then_enqueues_index_work() {
        let service = service().await;
        service.handle_event(created(1, "hello world")).await.unwrap();

        assert!(service.store.get_message(1, 1).await.unwrap().is_some());
        let stats = service.queue.stats().await.unwrap();
        assert_eq!(stats.default, 1);
    }

    #[tokio::test]
    async fn duplicate_event_yields_one_row_and_one_work_item() {
        let service = service().await;
        service.handle_event(created(1, "hello")).await.unwrap();
        service.handle_event(created(1, "hello")).await.unwrap();

        let stats = service.queue.stats().await.unwrap();
        assert_eq!(stats.default, 1);
    }

    #[tokio::test]
    async fn unindexed_channel_persists_without_enqueue() {
        let service = service().await;
        service
            .store
            .set_channel_indexed(1, 10, false)
            .await
            .unwrap();
        service.handle_event(created(1, "hello")).await.unwrap();

        assert!(service.store.get_message(1, 1).await.unwrap().is_some());
        assert_eq!(service.queue.stats().await.unwrap().default, 0);
    }

    #[tokio::test]
    async fn delete_soft_deletes_and_enqueues_high_priority_purge() {
        let service = service().await;
        service.handle_event(created(1, "secret token hunter2")).await.unwrap();
        service
            .handle_event(PlatformEvent::MessageDeleted {
                tenant_id: 1,
                message_id: 1,
            })
            .await
            .unwrap();

        let row = service.store.get_message(1, 1).await.unwrap().unwrap();
        assert!(row.deleted);
        assert_eq!(row.content, crate::store::DELETED_SENTINEL);

        let purge = service
            .queue
            .claim_one(Priority::High, 60)
            .await
            .unwrap()
            .expect("purge item enqueued");
        assert_eq!(purge.payload.kind(), "purge_sessions");
    }

    #[tokio::test]
    async fn edit_marks_stale_without_immediate_reindex() {
        let service = service().await;
        service.handle_event(created(1, "v1")).await.unwrap();
        // Drain the index item so the queue is empty.
        let item = service.queue.claim_one(Priority::Default, 60).await.unwrap().unwrap();
        service.queue.ack(item.id).await.unwrap();

        service
            .handle_event(PlatformEvent::MessageEdited {
                tenant_id: 1,
                message_id: 1,
                content: "v2".into(),
            })
            .await
            .unwrap();

        let row = service.store.get_message(1, 1).await.unwrap().unwrap();
        assert_eq!(row.content, "v2");
        // Edits do not enqueue; the sweep picks staleness up.
        assert_eq!(service.queue.stats().await.unwrap().default, 0);
    }
}
