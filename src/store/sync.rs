// src/store/sync.rs

//! Sync-health projection over the store, and binding resets.
//!
//! Classification over indexed channels only:
//!   bound   = vector_point_id set and updated_at <= indexed_at
//!   unbound = vector_point_id null
//!   stale   = vector_point_id set and updated_at > indexed_at

use serde::Serialize;
use sqlx::Row;
use tracing::info;

use super::Store;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTier {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncHealth {
    pub tenant_id: i64,
    pub total: i64,
    pub bound: i64,
    pub unbound: i64,
    pub stale: i64,
    pub bound_percentage: f64,
    pub tier: HealthTier,
}

/// Which bindings a reset clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    StaleOnly,
    All,
}

pub fn classify(bound_percentage: f64) -> HealthTier {
    if bound_percentage >= 95.0 {
        HealthTier::Healthy
    } else if bound_percentage >= 80.0 {
        HealthTier::Degraded
    } else {
        HealthTier::Critical
    }
}

impl Store {
    pub async fn sync_health(&self, tenant_id: i64) -> Result<SyncHealth> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                SUM(CASE WHEN m.vector_point_id IS NOT NULL
                          AND m.indexed_at IS NOT NULL
                          AND m.updated_at <= m.indexed_at THEN 1 ELSE 0 END) AS bound,
                SUM(CASE WHEN m.vector_point_id IS NULL THEN 1 ELSE 0 END) AS unbound,
                SUM(CASE WHEN m.vector_point_id IS NOT NULL
                          AND m.indexed_at IS NOT NULL
                          AND m.updated_at > m.indexed_at THEN 1 ELSE 0 END) AS stale
            FROM messages m
            JOIN channels c ON m.channel_id = c.id
            WHERE m.tenant_id = ? AND m.deleted = 0 AND c.indexed = 1
            "#,
        )
        .bind(tenant_id)
        .fetch_one(self.pool())
        .await?;

        let total: i64 = row.get("total");
        let bound: i64 = row.get::<Option<i64>, _>("bound").unwrap_or(0);
        let unbound: i64 = row.get::<Option<i64>, _>("unbound").unwrap_or(0);
        let stale: i64 = row.get::<Option<i64>, _>("stale").unwrap_or(0);

        let bound_percentage = if total > 0 {
            bound as f64 / total as f64 * 100.0
        } else {
            100.0
        };

        Ok(SyncHealth {
            tenant_id,
            total,
            bound,
            unbound,
            stale,
            bound_percentage: (bound_percentage * 100.0).round() / 100.0,
            tier: classify(bound_percentage),
        })
    }

    /// Clear bindings so the indexer re-processes rows. `StaleOnly` keeps
    /// healthy bindings; `All` forces a full rebuild.
    pub async fn reset_vector_bindings(&self, tenant_id: i64, mode: ResetMode) -> Result<u64> {
        let result = match mode {
            ResetMode::All => {
                sqlx::query(
                    "UPDATE messages SET vector_point_id = NULL, indexed_at = NULL
                     WHERE tenant_id = ? AND deleted = 0",
                )
                .bind(tenant_id)
                .execute(self.pool())
                .await?
            }
            ResetMode::StaleOnly => {
                sqlx::query(
                    "UPDATE messages SET vector_point_id = NULL, indexed_at = NULL
                     WHERE tenant_id = ? AND deleted = 0
                       AND (vector_point_id IS NULL OR updated_at > indexed_at)",
                )
                .bind(tenant_id)
                .execute(self.pool())
                .await?
            }
        };

        info!(
            "Reset vector bindings for {} messages in tenant {} ({:?})",
            result.rows_affected(),
            tenant_id,
            mode
        );
        Ok(result.rows_affected())
    }

    /// Channel-scoped reset, used when a channel is re-enabled for indexing.
    pub async fn reset_channel_bindings(&self, tenant_id: i64, channel_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE messages SET vector_point_id = NULL, indexed_at = NULL
             WHERE tenant_id = ? AND channel_id = ? AND deleted = 0",
        )
        .bind(tenant_id)
        .bind(channel_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Which of the given point ids have a live (non-deleted) referent row.
    /// Points without one are orphans and purge candidates.
    pub async fn live_point_ids(
        &self,
        tenant_id: i64,
        point_ids: &[String],
    ) -> Result<Vec<String>> {
        if point_ids.is_empty() {
            return Ok(vec![]);
        }
        let placeholders = vec!["?"; point_ids.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT vector_point_id FROM messages
             WHERE tenant_id = ? AND deleted = 0 AND vector_point_id IN ({placeholders})
             UNION
             SELECT DISTINCT vector_point_id FROM sessions
             WHERE tenant_id = ? AND vector_point_id IN ({placeholders})
             UNION
             SELECT DISTINCT vector_point_id FROM document_chunks
             WHERE tenant_id = ? AND vector_point_id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(tenant_id);
        for id in point_ids {
            query = query.bind(id);
        }
        query = query.bind(tenant_id);
        for id in point_ids {
            query = query.bind(id);
        }
        query = query.bind(tenant_id);
        for id in point_ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.get::<Option<String>, _>("vector_point_id"))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::messages::NewMessage;
    use chrono::Utc;

    #[test]
    fn tier_thresholds() {
        assert_eq!(classify(100.0), HealthTier::Healthy);
        assert_eq!(classify(95.0), HealthTier::Healthy);
        assert_eq!(classify(94.99), HealthTier::Degraded);
        assert_eq!(classify(80.0), HealthTier::Degraded);
        assert_eq!(classify(79.9), HealthTier::Critical);
    }

    async fn seed(store: &Store, count: i64) {
        store.upsert_tenant(1, "guild").await.unwrap();
        store.upsert_channel(10, 1, "general").await.unwrap();
        store.set_channel_indexed(1, 10, true).await.unwrap();
        for id in 1..=count {
            store
                .insert_message(&NewMessage {
                    id,
                    channel_id: 10,
                    tenant_id: 1,
                    author_id: 100,
                    content: format!("hello {id}"),
                    reply_target_id: None,
                    thread_id: None,
                    attachment_count: 0,
                    embed_count: 0,
                    mention_count: 0,
                    authored_at: Utc::now(),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn sync_health_counts_bound_and_unbound() {
        let store = Store::connect_in_memory().await.unwrap();
        seed(&store, 4).await;

        store.record_vector_binding(1, &[1, 2, 3], "pt-1").await.unwrap();

        let health = store.sync_health(1).await.unwrap();
        assert_eq!(health.total, 4);
        assert_eq!(health.bound, 3);
        assert_eq!(health.unbound, 1);
        assert_eq!(health.stale, 0);
        assert_eq!(health.tier, HealthTier::Critical); // 75% bound

        store.record_vector_binding(1, &[4], "pt-2").await.unwrap();
        let health = store.sync_health(1).await.unwrap();
        assert_eq!(health.bound, 4);
        assert_eq!(health.tier, HealthTier::Healthy);
    }

    #[tokio::test]
    async fn reset_stale_only_preserves_bound_rows() {
        let store = Store::connect_in_memory().await.unwrap();
        seed(&store, 2).await;
        store.record_vector_binding(1, &[1, 2], "pt-1").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        store.mark_message_edited(1, 2, "edited").await.unwrap();

        let reset = store
            .reset_vector_bindings(1, ResetMode::StaleOnly)
            .await
            .unwrap();
        assert_eq!(reset, 1);

        let health = store.sync_health(1).await.unwrap();
        assert_eq!(health.bound, 1);
        assert_eq!(health.unbound, 1);
        assert_eq!(health.stale, 0);
    }
}
