// src/queue/tasks.rs

//! Task kinds, payloads, and per-kind retry/deadline policy.

use serde::{Deserialize, Serialize};

/// Named queues, polled in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Default,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Default => "default",
            Priority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    SingleMessageIndex {
        tenant_id: i64,
        channel_id: i64,
        message_id: i64,
    },
    SessionIndex {
        tenant_id: i64,
        channel_id: i64,
        message_ids: Vec<i64>,
        start_time: String,
        end_time: String,
    },
    /// Right-to-be-forgotten: purge every session point containing any of
    /// these message ids, then the messages' own points.
    PurgeSessions {
        tenant_id: i64,
        message_ids: Vec<i64>,
    },
    PurgeVector {
        tenant_id: i64,
        point_ids: Vec<String>,
    },
    ProcessAttachment {
        tenant_id: i64,
        attachment_id: i64,
    },
    BulkChannelIndex {
        tenant_id: i64,
        channel_id: i64,
        batch_size: i64,
    },
    QueryAsk {
        tenant_id: i64,
        query: String,
        channel_ids: Vec<i64>,
        channel_id: Option<i64>,
    },
}

impl TaskPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskPayload::SingleMessageIndex { .. } => "single_message_index",
            TaskPayload::SessionIndex { .. } => "session_index",
            TaskPayload::PurgeSessions { .. } => "purge_sessions",
            TaskPayload::PurgeVector { .. } => "purge_vector",
            TaskPayload::ProcessAttachment { .. } => "process_attachment",
            TaskPayload::BulkChannelIndex { .. } => "bulk_channel_index",
            TaskPayload::QueryAsk { .. } => "query_ask",
        }
    }

    /// Default queue for the kind. Deletions are priority; backfill is low.
    pub fn default_priority(&self) -> Priority {
        match self {
            TaskPayload::PurgeSessions { .. } | TaskPayload::PurgeVector { .. } => Priority::High,
            TaskPayload::BulkChannelIndex { .. } => Priority::Low,
            _ => Priority::Default,
        }
    }

    /// Max attempts before the dead-letter list. `None` = retry until the
    /// hard deadline kills the run.
    pub fn max_attempts(&self) -> Option<u32> {
        match self {
            TaskPayload::PurgeSessions { .. } | TaskPayload::PurgeVector { .. } => Some(3),
            TaskPayload::SingleMessageIndex { .. } | TaskPayload::SessionIndex { .. } => Some(5),
            TaskPayload::QueryAsk { .. } => Some(3),
            TaskPayload::ProcessAttachment { .. } => Some(5),
            TaskPayload::BulkChannelIndex { .. } => None,
        }
    }

    /// Hard per-run time limit in seconds; the worker kills the run past it.
    pub fn hard_limit_s(&self, default_hard: u64) -> u64 {
        match self {
            TaskPayload::BulkChannelIndex { .. } => 3600,
            TaskPayload::ProcessAttachment { .. } => 300,
            _ => default_hard,
        }
    }
}

/// Exponential backoff with jitter:
/// `min(base * 2^attempt + rand[0, base), cap)` with base 5s, cap 600s.
pub fn backoff_seconds(attempt: u32, jitter: f64) -> u64 {
    const BASE: f64 = 5.0;
    const CAP: f64 = 600.0;
    let exp = BASE * 2f64.powi(attempt.min(16) as i32) + jitter.clamp(0.0, 1.0) * BASE;
    exp.min(CAP) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_seconds(0, 0.0), 5);
        assert_eq!(backoff_seconds(1, 0.0), 10);
        assert_eq!(backoff_seconds(2, 0.0), 20);
        assert_eq!(backoff_seconds(10, 0.0), 600);
        assert_eq!(backoff_seconds(30, 0.99), 600);
    }

    #[test]
    fn jitter_adds_at_most_base() {
        let low = backoff_seconds(3, 0.0);
        let high = backoff_seconds(3, 1.0);
        assert!(high - low <= 5);
    }

    #[test]
    fn purge_outranks_indexing() {
        let purge = TaskPayload::PurgeSessions { tenant_id: 1, message_ids: vec![1] };
        let index = TaskPayload::SingleMessageIndex { tenant_id: 1, channel_id: 1, message_id: 1 };
        assert_eq!(purge.default_priority(), Priority::High);
        assert_eq!(index.default_priority(), Priority::Default);
    }

    #[test]
    fn payload_round_trips_through_json() {
        let payload = TaskPayload::SessionIndex {
            tenant_id: 7,
            channel_id: 9,
            message_ids: vec![1, 2, 3],
            start_time: "2026-01-01T00:00:00Z".into(),
            end_time: "2026-01-01T00:10:00Z".into(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"kind\":\"session_index\""));
        let back: TaskPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), "session_index");
    }
}
