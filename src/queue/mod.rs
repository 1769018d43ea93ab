// src/queue/mod.rs

//! Persistent priority queue on the broker database.
//!
//! At-least-once delivery: a claim takes a lease; items whose lease expires
//! (worker died mid-run) become claimable again. An item is removed only on
//! ack. Permanent failures move to the dead-letter table with full context.

pub mod handlers;
pub mod tasks;
pub mod worker;

use std::str::FromStr;

use chrono::Utc;
use serde::Serialize;
use sqlx::Row;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{debug, info};

use crate::error::Result;
pub use tasks::{Priority, TaskPayload, backoff_seconds};

const QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS work_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    attempt INTEGER NOT NULL DEFAULT 0,
    first_enqueued_at INTEGER NOT NULL,
    available_at INTEGER NOT NULL,
    lease_expires_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_work_items_claim
    ON work_items(queue, available_at, lease_expires_at);

CREATE TABLE IF NOT EXISTS dead_letters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    error TEXT NOT NULL,
    attempts INTEGER NOT NULL,
    first_enqueued_at INTEGER NOT NULL,
    failed_at INTEGER NOT NULL
);
"#;

/// A claimed item. The claim holds a lease until acked or released.
#[derive(Debug, Clone)]
pub struct ClaimedItem {
    pub id: i64,
    pub queue: String,
    pub payload: TaskPayload,
    /// 1-based attempt number of this run.
    pub attempt: u32,
    pub first_enqueued_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub high: i64,
    pub default: i64,
    pub low: i64,
    pub dead_letters: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub id: i64,
    pub kind: String,
    pub payload: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: i64,
}

#[derive(Clone)]
pub struct WorkQueue {
    pool: SqlitePool,
}

impl WorkQueue {
    pub async fn connect(broker_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(broker_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        sqlx::raw_sql(QUEUE_SCHEMA).execute(&pool).await?;
        info!("Queue broker connected: {}", broker_url);
        Ok(Self { pool })
    }

    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::raw_sql(QUEUE_SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Enqueue at the payload's default priority.
    pub async fn enqueue(&self, payload: &TaskPayload) -> Result<i64> {
        self.enqueue_with_priority(payload, payload.default_priority())
            .await
    }

    pub async fn enqueue_with_priority(
        &self,
        payload: &TaskPayload,
        priority: Priority,
    ) -> Result<i64> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO work_items (queue, kind, payload, first_enqueued_at, available_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(priority.as_str())
        .bind(payload.kind())
        .bind(serde_json::to_string(payload)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Enqueued {} item {} on {}", payload.kind(), id, priority.as_str());
        Ok(id)
    }

    /// Claim the oldest available item of a queue, taking a lease. Items with
    /// an expired lease (dead worker) are claimable again.
    pub async fn claim_one(&self, priority: Priority, lease_secs: i64) -> Result<Option<ClaimedItem>> {
        let now = Utc::now().timestamp();
        let row = sqlx::query(
            r#"
            UPDATE work_items
            SET lease_expires_at = ?, attempt = attempt + 1
            WHERE id = (
                SELECT id FROM work_items
                WHERE queue = ?
                  AND available_at <= ?
                  AND (lease_expires_at IS NULL OR lease_expires_at <= ?)
                ORDER BY id
                LIMIT 1
            )
            RETURNING id, queue, payload, attempt, first_enqueued_at
            "#,
        )
        .bind(now + lease_secs)
        .bind(priority.as_str())
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload_json: String = row.get("payload");
        let payload: TaskPayload = serde_json::from_str(&payload_json)?;

        Ok(Some(ClaimedItem {
            id: row.get("id"),
            queue: row.get("queue"),
            payload,
            attempt: row.get::<i64, _>("attempt") as u32,
            first_enqueued_at: row.get("first_enqueued_at"),
        }))
    }

    /// Acknowledge: the task terminated (success or permanent failure that
    /// was dead-lettered). Removes the item.
    pub async fn ack(&self, item_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM work_items WHERE id = ?")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Release for retry after a transient failure, with backoff delay.
    pub async fn release_for_retry(&self, item_id: i64, delay_secs: u64) -> Result<()> {
        sqlx::query(
            "UPDATE work_items SET lease_expires_at = NULL, available_at = ? WHERE id = ?",
        )
        .bind(Utc::now().timestamp() + delay_secs as i64)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Append to the dead-letter list and remove the item.
    pub async fn dead_letter(&self, item: &ClaimedItem, error: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO dead_letters (kind, payload, error, attempts, first_enqueued_at, failed_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(item.payload.kind())
        .bind(serde_json::to_string(&item.payload)?)
        .bind(error)
        .bind(item.attempt as i64)
        .bind(item.first_enqueued_at)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        self.ack(item.id).await?;
        info!(
            "Dead-lettered {} item {} after {} attempts: {}",
            item.payload.kind(),
            item.id,
            item.attempt,
            error
        );
        Ok(())
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let mut stats = QueueStats {
            high: 0,
            default: 0,
            low: 0,
            dead_letters: 0,
        };
        let rows = sqlx::query("SELECT queue, COUNT(*) AS count FROM work_items GROUP BY queue")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let queue: String = row.get("queue");
            let count: i64 = row.get("count");
            match queue.as_str() {
                "high" => stats.high = count,
                "default" => stats.default = count,
                "low" => stats.low = count,
                _ => {}
            }
        }
        let dl = sqlx::query("SELECT COUNT(*) AS count FROM dead_letters")
            .fetch_one(&self.pool)
            .await?;
        stats.dead_letters = dl.get("count");
        Ok(stats)
    }

    /// Drain up to `limit` dead letters. When `requeue` is set, payloads are
    /// re-enqueued at their default priority before removal.
    pub async fn drain_dead_letters(&self, limit: i64, requeue: bool) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query(
            "SELECT id, kind, payload, error, attempts, failed_at
             FROM dead_letters ORDER BY id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut drained = Vec::new();
        for row in rows {
            let entry = DeadLetter {
                id: row.get("id"),
                kind: row.get("kind"),
                payload: row.get("payload"),
                error: row.get("error"),
                attempts: row.get::<i64, _>("attempts") as u32,
                failed_at: row.get("failed_at"),
            };
            if requeue {
                if let Ok(payload) = serde_json::from_str::<TaskPayload>(&entry.payload) {
                    self.enqueue(&payload).await?;
                }
            }
            sqlx::query("DELETE FROM dead_letters WHERE id = ?")
                .bind(entry.id)
                .execute(&self.pool)
                .await?;
            drained.push(entry);
        }
        Ok(drained)
    }
}
