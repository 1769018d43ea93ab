// src/consistency/mod.rs

//! Consistency subsystem: stale-row sweep and orphan detection.
//!
//! The sweep re-enqueues STALE rows (edited after indexing) so the index
//! converges back to the store. The orphan scan walks the vector index and
//! removes points with no live referent row (the store is the source of
//! truth in both directions).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::Row;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::queue::{TaskPayload, WorkQueue};
use crate::store::Store;
use crate::vector::{HYBRID_COLLECTION, LEGACY_COLLECTION, VectorIndex};

const SWEEP_BATCH: i64 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct OrphanReport {
    pub checked: usize,
    pub orphans_found: usize,
    pub orphans_deleted: usize,
}

/// One stale-sweep pass for a tenant: every STALE row gets a re-index item;
/// its previous point is replaced in place by the indexer.
pub async fn sweep_stale(store: &Store, queue: &WorkQueue, tenant_id: i64) -> Result<usize> {
    let stale = store.find_stale(tenant_id, SWEEP_BATCH).await?;
    for row in &stale {
        queue
            .enqueue(&TaskPayload::SingleMessageIndex {
                tenant_id,
                channel_id: row.channel_id,
                message_id: row.id,
            })
            .await?;
    }
    if !stale.is_empty() {
        info!(
            "Stale sweep enqueued {} re-index items for tenant {}",
            stale.len(),
            tenant_id
        );
    }
    Ok(stale.len())
}

/// Unbound rows in indexed channels are also picked up, so a backlog drains
/// even when an enqueue was lost.
pub async fn sweep_unbound(store: &Store, queue: &WorkQueue, tenant_id: i64) -> Result<usize> {
    let unbound = store.find_unbound(tenant_id, SWEEP_BATCH).await?;
    for row in &unbound {
        queue
            .enqueue(&TaskPayload::SingleMessageIndex {
                tenant_id,
                channel_id: row.channel_id,
                message_id: row.id,
            })
            .await?;
    }
    Ok(unbound.len())
}

pub struct ConsistencyService {
    store: Store,
    queue: WorkQueue,
    index: Arc<VectorIndex>,
}

impl ConsistencyService {
    pub fn new(store: Store, queue: WorkQueue, index: Arc<VectorIndex>) -> Self {
        Self {
            store,
            queue,
            index,
        }
    }

    /// Scan a tenant's points and delete those without a live referent.
    /// With `dry_run` the report counts but nothing is removed.
    pub async fn scan_orphans(&self, tenant_id: i64, dry_run: bool) -> Result<OrphanReport> {
        let mut report = OrphanReport {
            checked: 0,
            orphans_found: 0,
            orphans_deleted: 0,
        };

        for collection in [HYBRID_COLLECTION, LEGACY_COLLECTION] {
            let points = self.index.scroll_tenant(collection, tenant_id).await?;
            report.checked += points.len();
            if points.is_empty() {
                continue;
            }

            let point_ids: Vec<String> = points.iter().map(|p| p.id.clone()).collect();
            let live = self.store.live_point_ids(tenant_id, &point_ids).await?;
            let orphans: Vec<String> = point_ids
                .into_iter()
                .filter(|id| !live.contains(id))
                .collect();

            report.orphans_found += orphans.len();
            if !orphans.is_empty() && !dry_run {
                self.index.delete_points(collection, &orphans).await?;
                report.orphans_deleted += orphans.len();
            }
        }

        if report.orphans_found > 0 {
            warn!(
                "Orphan scan for tenant {}: {} checked, {} orphans, {} deleted",
                tenant_id, report.checked, report.orphans_found, report.orphans_deleted
            );
        }
        Ok(report)
    }

    async fn tenant_ids(&self) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT id FROM tenants")
            .fetch_all(self.store.pool())
            .await?;
        Ok(rows.into_iter().map(|r| r.get("id")).collect())
    }

    /// Periodic stale/unbound sweep across all tenants.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Consistency sweeper started (interval: {:?})", interval);
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let tenants = match self.tenant_ids().await {
                    Ok(tenants) => tenants,
                    Err(e) => {
                        error!("Sweeper could not list tenants: {}", e);
                        continue;
                    }
                };

                for tenant_id in tenants {
                    if let Err(e) = sweep_stale(&self.store, &self.queue, tenant_id).await {
                        error!("Stale sweep failed for tenant {}: {}", tenant_id, e);
                    }
                    if let Err(e) = sweep_unbound(&self.store, &self.queue, tenant_id).await {
                        error!("Unbound sweep failed for tenant {}: {}", tenant_id, e);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Priority;
    use crate::store::messages::NewMessage;
    use chrono::Utc;

    async fn seeded() -> (Store, WorkQueue) {
        let store = Store::connect_in_memory().await.unwrap();
        let queue = WorkQueue::connect_in_memory().await.unwrap();
        store.upsert_tenant(1, "guild").await.unwrap();
        store.upsert_channel(10, 1, "general").await.unwrap();
        store.set_channel_indexed(1, 10, true).await.unwrap();
        store
            .insert_message(&NewMessage {
                id: 1,
                channel_id: 10,
                tenant_id: 1,
                author_id: 100,
                content: "original".into(),
                reply_target_id: None,
                thread_id: None,
                attachment_count: 0,
                embed_count: 0,
                mention_count: 0,
                authored_at: Utc::now(),
            })
            .await
            .unwrap();
        (store, queue)
    }

    #[tokio::test]
    async fn stale_rows_are_enqueued_for_reindex() {
        let (store, queue) = seeded().await;
        store.record_vector_binding(1, &[1], "pt-1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        store.mark_message_edited(1, 1, "edited").await.unwrap();

        let swept = sweep_stale(&store, &queue, 1).await.unwrap();
        assert_eq!(swept, 1);

        let item = queue.claim_one(Priority::Default, 60).await.unwrap().unwrap();
        assert_eq!(item.payload.kind(), "single_message_index");
    }

    #[tokio::test]
    async fn unbound_rows_are_swept_too() {
        let (store, queue) = seeded().await;
        let swept = sweep_unbound(&store, &queue, 1).await.unwrap();
        assert_eq!(swept, 1);
    }

    #[tokio::test]
    async fn bound_rows_are_left_alone() {
        let (store, queue) = seeded().await;
        store.record_vector_binding(1, &[1], "pt-1").await.unwrap();

        assert_eq!(sweep_stale(&store, &queue, 1).await.unwrap(), 0);
        assert_eq!(sweep_unbound(&store, &queue, 1).await.unwrap(), 0);
        assert_eq!(queue.stats().await.unwrap().default, 0);
    }
}
