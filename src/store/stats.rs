// src/store/stats.rs

//! Read-only analytics projections backing the stats API.

use chrono::Utc;
use serde::Serialize;
use sqlx::Row;

use super::Store;
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct TenantStats {
    pub tenant_id: i64,
    pub message_count: i64,
    pub member_count: i64,
    pub channel_count: i64,
    pub indexed_channel_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayCount {
    pub day: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelCount {
    pub channel_id: i64,
    pub name: String,
    pub count: i64,
}

impl Store {
    pub async fn tenant_stats(&self, tenant_id: i64) -> Result<TenantStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM messages WHERE tenant_id = ? AND deleted = 0) AS message_count,
                (SELECT COUNT(*) FROM tenant_members WHERE tenant_id = ?) AS member_count,
                (SELECT COUNT(*) FROM channels WHERE tenant_id = ? AND deleted = 0) AS channel_count,
                (SELECT COUNT(*) FROM channels WHERE tenant_id = ? AND deleted = 0 AND indexed = 1)
                    AS indexed_channel_count
            "#,
        )
        .bind(tenant_id)
        .bind(tenant_id)
        .bind(tenant_id)
        .bind(tenant_id)
        .fetch_one(self.readonly_pool())
        .await?;

        Ok(TenantStats {
            tenant_id,
            message_count: row.get("message_count"),
            member_count: row.get("member_count"),
            channel_count: row.get("channel_count"),
            indexed_channel_count: row.get("indexed_channel_count"),
        })
    }

    pub async fn messages_timeseries(&self, tenant_id: i64, days: i64) -> Result<Vec<DayCount>> {
        let since = Utc::now().timestamp() - days * 86_400;
        let rows = sqlx::query(
            r#"
            SELECT date(authored_at, 'unixepoch') AS day, COUNT(*) AS count
            FROM messages
            WHERE tenant_id = ? AND deleted = 0 AND authored_at >= ?
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(tenant_id)
        .bind(since)
        .fetch_all(self.readonly_pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| DayCount {
                day: r.get("day"),
                count: r.get("count"),
            })
            .collect())
    }

    pub async fn top_channels(&self, tenant_id: i64, limit: i64) -> Result<Vec<ChannelCount>> {
        let rows = sqlx::query(
            r#"
            SELECT m.channel_id, c.name, COUNT(*) AS count
            FROM messages m
            JOIN channels c ON m.channel_id = c.id
            WHERE m.tenant_id = ? AND m.deleted = 0
            GROUP BY m.channel_id, c.name
            ORDER BY count DESC
            LIMIT ?
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(self.readonly_pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ChannelCount {
                channel_id: r.get("channel_id"),
                name: r.get("name"),
                count: r.get("count"),
            })
            .collect())
    }

    /// Bounded sample of recent message content for topic clustering.
    pub async fn recent_content_sample(
        &self,
        tenant_id: i64,
        limit: i64,
        min_length: i64,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT content FROM messages
             WHERE tenant_id = ? AND deleted = 0 AND LENGTH(content) > ?
             ORDER BY authored_at DESC
             LIMIT ?",
        )
        .bind(tenant_id)
        .bind(min_length)
        .bind(limit)
        .fetch_all(self.readonly_pool())
        .await?;

        Ok(rows.into_iter().map(|r| r.get("content")).collect())
    }
}
