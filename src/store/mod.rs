// src/store/mod.rs

//! Source-of-truth relational store.
//!
//! Every row is tenant-scoped. All writes land here before any vector-index
//! work is enqueued; queries that read messages filter `deleted = 0` unless
//! they explicitly ask for deleted rows.

pub mod attachments;
pub mod messages;
pub mod sessions;
pub mod stats;
pub mod sync;
pub mod tenants;

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::config::StoreConfig;
use crate::error::Result;

/// Content sentinel written over soft-deleted messages.
pub const DELETED_SENTINEL: &str = "[deleted]";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tenants (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    personality_directive TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS channels (
    id INTEGER PRIMARY KEY,
    tenant_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    indexed INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_channels_tenant ON channels(tenant_id);

CREATE TABLE IF NOT EXISTS members (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL,
    display_name TEXT,
    bot INTEGER NOT NULL DEFAULT 0,
    first_seen_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tenant_members (
    tenant_id INTEGER NOT NULL,
    member_id INTEGER NOT NULL,
    nickname TEXT,
    message_count INTEGER NOT NULL DEFAULT 0,
    last_message_at INTEGER,
    PRIMARY KEY (tenant_id, member_id)
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY,
    channel_id INTEGER NOT NULL,
    tenant_id INTEGER NOT NULL,
    author_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    reply_target_id INTEGER,
    thread_id INTEGER,
    attachment_count INTEGER NOT NULL DEFAULT 0,
    embed_count INTEGER NOT NULL DEFAULT 0,
    mention_count INTEGER NOT NULL DEFAULT 0,
    vector_point_id TEXT,
    indexed_at INTEGER,
    deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at INTEGER,
    authored_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_tenant_channel
    ON messages(tenant_id, channel_id, authored_at);
CREATE INDEX IF NOT EXISTS idx_messages_binding
    ON messages(tenant_id, vector_point_id);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    tenant_id INTEGER NOT NULL,
    channel_id INTEGER NOT NULL,
    message_ids TEXT NOT NULL,
    message_count INTEGER NOT NULL,
    participant_ids TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL,
    preview TEXT,
    vector_point_id TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_tenant ON sessions(tenant_id, channel_id);

CREATE TABLE IF NOT EXISTS attachments (
    id INTEGER PRIMARY KEY,
    message_id INTEGER NOT NULL,
    tenant_id INTEGER NOT NULL,
    channel_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    proxy_url TEXT,
    filename TEXT NOT NULL,
    content_type TEXT,
    size_bytes INTEGER NOT NULL,
    source_type TEXT NOT NULL DEFAULT 'unknown',
    processing_state TEXT NOT NULL DEFAULT 'pending',
    processing_error TEXT,
    processed_at INTEGER,
    description TEXT,
    extracted_text TEXT,
    vector_point_ids TEXT,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    indexed_at INTEGER,
    deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attachments_message ON attachments(message_id);

CREATE TABLE IF NOT EXISTS document_chunks (
    id TEXT PRIMARY KEY,
    attachment_id INTEGER NOT NULL,
    tenant_id INTEGER NOT NULL,
    chunk_index INTEGER NOT NULL,
    chunk_text TEXT NOT NULL,
    chunk_kind TEXT NOT NULL DEFAULT 'text',
    heading_context TEXT,
    vector_point_id TEXT,
    indexed_at INTEGER,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_attachment ON document_chunks(attachment_id);

CREATE TABLE IF NOT EXISTS dm_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    vector_point_id TEXT,
    authored_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_dm_user ON dm_messages(user_id, authored_at);
"#;

/// Handle over the primary (read-write) and read-only pools.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    readonly: SqlitePool,
}

impl Store {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        // Analytics SQL runs against the replica when one is configured.
        let readonly = match &config.readonly_url {
            Some(url) => {
                let options = SqliteConnectOptions::from_str(url)?.read_only(true);
                SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect_with(options)
                    .await?
            }
            None => pool.clone(),
        };

        let store = Self { pool, readonly };
        store.init_schema().await?;
        info!("Store connected: {}", config.url);
        Ok(store)
    }

    /// In-memory store for tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self {
            readonly: pool.clone(),
            pool,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Read-only pool for guarded analytics SQL.
    pub fn readonly_pool(&self) -> &SqlitePool {
        &self.readonly
    }
}
