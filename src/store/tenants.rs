// src/store/tenants.rs

//! Tenant, channel, and member upserts plus personality directives.

use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use super::Store;
use crate::error::Result;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChannelRow {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub indexed: bool,
}

#[derive(Debug, Clone)]
pub struct MemberName {
    pub username: String,
    pub display_name: Option<String>,
}

impl MemberName {
    /// Display name with username fallback, matching the enrichment format.
    pub fn best(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

impl Store {
    pub async fn upsert_tenant(&self, tenant_id: i64, name: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn upsert_channel(&self, channel_id: i64, tenant_id: i64, name: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO channels (id, tenant_id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at
            "#,
        )
        .bind(channel_id)
        .bind(tenant_id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn upsert_member(
        &self,
        member_id: i64,
        username: &str,
        display_name: Option<&str>,
        bot: bool,
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO members (id, username, display_name, bot, first_seen_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                display_name = excluded.display_name,
                bot = excluded.bot,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(member_id)
        .bind(username)
        .bind(display_name)
        .bind(bot)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Bump the per-tenant analytics cache for a member.
    pub async fn touch_tenant_member(&self, tenant_id: i64, member_id: i64) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO tenant_members (tenant_id, member_id, message_count, last_message_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(tenant_id, member_id) DO UPDATE SET
                message_count = message_count + 1,
                last_message_at = excluded.last_message_at
            "#,
        )
        .bind(tenant_id)
        .bind(member_id)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn member_name(&self, member_id: i64) -> Result<Option<MemberName>> {
        let row = sqlx::query("SELECT username, display_name FROM members WHERE id = ?")
            .bind(member_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.map(|r| MemberName {
            username: r.get("username"),
            display_name: r.get("display_name"),
        }))
    }

    pub async fn channel_name(&self, channel_id: i64) -> Result<Option<String>> {
        let row = sqlx::query("SELECT name FROM channels WHERE id = ?")
            .bind(channel_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|r| r.get("name")))
    }

    pub async fn list_channels(&self, tenant_id: i64) -> Result<Vec<ChannelRow>> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            "SELECT id, tenant_id, name, indexed FROM channels
             WHERE tenant_id = ? AND deleted = 0
             ORDER BY name",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Flip the control-plane flag; only indexed channels feed the vector store.
    pub async fn set_channel_indexed(
        &self,
        tenant_id: i64,
        channel_id: i64,
        indexed: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE channels SET indexed = ?, updated_at = ? WHERE id = ? AND tenant_id = ?",
        )
        .bind(indexed)
        .bind(Utc::now().timestamp())
        .bind(channel_id)
        .bind(tenant_id)
        .execute(self.pool())
        .await?;

        debug!(
            "Channel {} indexed flag set to {} ({} rows)",
            channel_id,
            indexed,
            result.rows_affected()
        );
        Ok(result.rows_affected() > 0)
    }

    pub async fn channel_is_indexed(&self, channel_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT indexed FROM channels WHERE id = ?")
            .bind(channel_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|r| r.get::<bool, _>("indexed")).unwrap_or(false))
    }

    pub async fn personality_directive(&self, tenant_id: i64) -> Result<Option<String>> {
        let row = sqlx::query("SELECT personality_directive FROM tenants WHERE id = ?")
            .bind(tenant_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.and_then(|r| r.get::<Option<String>, _>("personality_directive")))
    }

    pub async fn set_personality_directive(
        &self,
        tenant_id: i64,
        directive: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tenants SET personality_directive = ?, updated_at = ? WHERE id = ?",
        )
        .bind(directive)
        .bind(Utc::now().timestamp())
        .bind(tenant_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
