// src/answer/analytics.rs

//! Text-to-SQL analytics over the read-only store.
//!
//! The LLM drafts a single SELECT from a fixed schema preamble; the SQL
//! guard validates it and pins the tenant predicate before execution.
//! Template generation covers the common shapes when no LLM is available.

use sqlx::{Column, Row, TypeInfo};
use tracing::debug;

use super::guard;
use crate::error::{HivemindError, Result};
use crate::llm::LlmClient;
use crate::store::Store;

const SCHEMA_CONTEXT: &str = "\
You have access to a SQLite database with the following tables:

TABLE: messages
- id (INTEGER): platform message snowflake ID
- channel_id (INTEGER): channel ID
- tenant_id (INTEGER): community ID (ALWAYS filter by this)
- author_id (INTEGER): member ID of the author
- content (TEXT): message text
- reply_target_id (INTEGER, nullable): ID of the message replied to
- authored_at (INTEGER): unix timestamp of sending
- deleted (INTEGER): soft delete flag (0 or 1)

TABLE: channels
- id (INTEGER), tenant_id (INTEGER), name (TEXT), indexed (INTEGER)

TABLE: members
- id (INTEGER), username (TEXT), display_name (TEXT, nullable)

TABLE: tenant_members
- tenant_id (INTEGER), member_id (INTEGER), message_count (INTEGER),
  last_message_at (INTEGER, nullable)

IMPORTANT RULES:
1. ALWAYS filter by tenant_id = {tenant_id}
2. Only generate SELECT statements
3. Use authored_at for time-based questions (unix seconds)
4. Join members to show usernames
5. Exclude deleted = 1 messages";

/// Deadline for executing a guarded analytics query.
const SQL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// A guarded, executed analytics query.
#[derive(Debug)]
pub struct AnalyticsResult {
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub async fn generate_sql(llm: &LlmClient, query: &str, tenant_id: i64) -> String {
    if !llm.is_available() {
        return template_sql(query, tenant_id);
    }

    let system = format!(
        "You are a SQL query generator for community analytics.\n{}\n\n\
         Generate a single SELECT query to answer the user's question.\n\
         Respond with ONLY the SQL query, no explanation or markdown.",
        SCHEMA_CONTEXT.replace("{tenant_id}", &tenant_id.to_string())
    );

    match llm.generate(&system, query).await {
        Ok(raw) => raw
            .trim()
            .trim_matches('`')
            .trim_start_matches("sql")
            .trim()
            .to_string(),
        Err(_) => template_sql(query, tenant_id),
    }
}

/// Template generation for the common question shapes.
pub fn template_sql(query: &str, tenant_id: i64) -> String {
    let q = query.to_lowercase();

    if q.contains("who spoke") || q.contains("most active") || q.contains("most messages") {
        return format!(
            "SELECT mb.username, COUNT(m.id) AS message_count \
             FROM messages m JOIN members mb ON m.author_id = mb.id \
             WHERE m.tenant_id = {tenant_id} AND m.deleted = 0 \
             GROUP BY mb.id, mb.username \
             ORDER BY COUNT(*) DESC LIMIT 10"
        );
    }

    if q.contains("how many messages") {
        if q.contains("last week") {
            return format!(
                "SELECT COUNT(*) AS message_count FROM messages \
                 WHERE tenant_id = {tenant_id} AND deleted = 0 \
                 AND authored_at >= strftime('%s', 'now', '-7 days')"
            );
        }
        return format!(
            "SELECT COUNT(*) AS message_count FROM messages \
             WHERE tenant_id = {tenant_id} AND deleted = 0"
        );
    }

    if q.contains("active channel") {
        return format!(
            "SELECT c.name AS channel_name, COUNT(m.id) AS message_count \
             FROM messages m JOIN channels c ON m.channel_id = c.id \
             WHERE m.tenant_id = {tenant_id} AND m.deleted = 0 \
             GROUP BY c.id, c.name ORDER BY COUNT(*) DESC LIMIT 10"
        );
    }

    format!(
        "SELECT COUNT(*) AS total_messages FROM messages \
         WHERE tenant_id = {tenant_id} AND deleted = 0"
    )
}

/// Generate, guard, and execute. Guard rejections surface unchanged so the
/// router can produce a refusal answer.
pub async fn run_analytics(
    store: &Store,
    llm: &LlmClient,
    query: &str,
    tenant_id: i64,
) -> Result<AnalyticsResult> {
    let candidate = generate_sql(llm, query, tenant_id).await;
    let guarded = guard::enforce_tenant_filter(&candidate, tenant_id)?;
    debug!("Guarded analytics SQL: {}", guarded);

    let rows = tokio::time::timeout(
        SQL_TIMEOUT,
        sqlx::query(&guarded).fetch_all(store.readonly_pool()),
    )
    .await
    .map_err(|_| HivemindError::Timeout {
        service: "sql",
        seconds: SQL_TIMEOUT.as_secs(),
    })?
    .map_err(|e| HivemindError::Validation(format!("query execution failed: {e}")))?;

    let columns: Vec<String> = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let mut rendered = Vec::new();
    for row in &rows {
        let mut values = Vec::new();
        for (i, column) in row.columns().iter().enumerate() {
            values.push(render_value(row, i, column.type_info().name()));
        }
        rendered.push(values);
    }

    Ok(AnalyticsResult {
        sql: guarded,
        columns,
        rows: rendered,
    })
}

fn render_value(row: &sqlx::sqlite::SqliteRow, index: usize, type_name: &str) -> String {
    match type_name {
        "INTEGER" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(|v| v.to_string())
            .unwrap_or_default(),
        "REAL" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(|v| format!("{v:.2}"))
            .unwrap_or_default(),
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .unwrap_or_default(),
    }
}

/// Human-readable rendering: single value as a labeled line, tabular output
/// as an enumerated list (up to 10 rows).
pub fn format_result(result: &AnalyticsResult) -> String {
    if result.rows.is_empty() {
        return "No matching data found.".to_string();
    }

    if result.rows.len() == 1 && result.rows[0].len() == 1 {
        let label = result
            .columns
            .first()
            .map(|c| c.replace('_', " "))
            .unwrap_or_else(|| "result".to_string());
        return format!("**{}**: {}", label, result.rows[0][0]);
    }

    let mut lines = Vec::new();
    for (i, row) in result.rows.iter().take(10).enumerate() {
        lines.push(format!("{}. {}", i + 1, row.join(" - ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::messages::NewMessage;
    use chrono::Utc;

    #[test]
    fn who_spoke_most_template_has_expected_shape() {
        let sql = template_sql("who spoke most?", 42);
        assert!(sql.contains("FROM messages"));
        assert!(sql.contains("GROUP BY"));
        assert!(sql.contains("ORDER BY COUNT(*) DESC"));
        assert!(sql.contains("tenant_id = 42"));
    }

    #[tokio::test]
    async fn analytics_runs_template_sql_end_to_end() {
        let store = Store::connect_in_memory().await.unwrap();
        store.upsert_tenant(1, "guild").await.unwrap();
        store.upsert_channel(10, 1, "general").await.unwrap();
        store.upsert_member(100, "ada", Some("Ada"), false).await.unwrap();
        store.upsert_member(101, "lin", None, false).await.unwrap();
        for (i, author) in [100, 100, 100, 101].iter().enumerate() {
            store
                .insert_message(&NewMessage {
                    id: i as i64 + 1,
                    channel_id: 10,
                    tenant_id: 1,
                    author_id: *author,
                    content: "hello".into(),
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

        let result = run_analytics(&store, &LlmClient::Disabled, "who spoke most?", 1)
            .await
            .unwrap();
        assert_eq!(result.rows[0][0], "ada");
        assert_eq!(result.rows[0][1], "3");

        let formatted = format_result(&result);
        assert!(formatted.starts_with("1. ada - 3"));
    }

    #[test]
    fn injection_attempt_is_refused_before_execution() {
        let err = guard::enforce_tenant_filter("SELECT 1; DROP TABLE messages", 1).unwrap_err();
        assert!(matches!(err, HivemindError::Security(_)));
    }

    #[test]
    fn single_value_formats_as_labeled_line() {
        let result = AnalyticsResult {
            sql: String::new(),
            columns: vec!["message_count".into()],
            rows: vec![vec!["1234".into()]],
        };
        assert_eq!(format_result(&result), "**message count**: 1234");
    }
}
