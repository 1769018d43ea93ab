// src/platform/mod.rs

//! Chat-platform adapter contract.
//!
//! The platform client library is an external collaborator; this module
//! defines the typed events the ingest runtime consumes and the deferral
//! contract for slash commands (acknowledge immediately, post the result
//! later through the queue).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::Result;
use crate::ingest::IngestService;

/// Inbound events, already resolved to plain values by the adapter.
/// Edited/deleted events are raw: they may reference messages the cache
/// never saw, so they carry ids only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlatformEvent {
    MessageCreated {
        tenant_id: i64,
        tenant_name: String,
        channel_id: i64,
        channel_name: String,
        message_id: i64,
        author_id: i64,
        author_username: String,
        author_display_name: Option<String>,
        author_is_bot: bool,
        content: String,
        reply_target_id: Option<i64>,
        thread_id: Option<i64>,
        attachment_count: i64,
        embed_count: i64,
        mention_count: i64,
        authored_at: DateTime<Utc>,
    },
    MessageEdited {
        tenant_id: i64,
        message_id: i64,
        content: String,
    },
    MessageDeleted {
        tenant_id: i64,
        message_id: i64,
    },
    MessagesBulkDeleted {
        tenant_id: i64,
        message_ids: Vec<i64>,
    },
    AttachmentAdded {
        tenant_id: i64,
        channel_id: i64,
        message_id: i64,
        attachment_id: i64,
        url: String,
        proxy_url: Option<String>,
        filename: String,
        content_type: Option<String>,
        size_bytes: i64,
    },
    /// A query command. The adapter MUST have deferred the interaction
    /// before emitting this (15-minute response window); the answer is
    /// produced by a worker and posted via the adapter's follow-up hook.
    CommandInvoked {
        tenant_id: i64,
        channel_id: i64,
        query: String,
    },
}

/// Ingest runtime: drains adapter events into the ingest service. Returns
/// when the sender side closes (platform connection shut down).
pub async fn run_ingest_loop(
    service: IngestService,
    mut events: mpsc::Receiver<PlatformEvent>,
) -> Result<()> {
    info!("Ingest loop started");
    while let Some(event) = events.recv().await {
        if let Err(e) = service.handle_event(event).await {
            // One bad event must not stall the stream.
            error!("Ingest event failed: {}", e);
        }
    }
    info!("Ingest loop stopped (event stream closed)");
    Ok(())
}
