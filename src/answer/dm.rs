// src/answer/dm.rs

//! Direct-message conversation with long-term memory.
//!
//! Every exchange persists to `dm_messages`. Context for a reply combines
//! the recent turn history with semantically similar older exchanges, scored
//! in-process against the configured embedder.

use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use crate::embeddings::{TextEmbedder, cosine_similarity};
use crate::error::Result;
use crate::llm::{ChatMessage, LlmClient, Role};
use crate::store::Store;

const RECENT_TURNS: i64 = 10;
const MEMORY_CANDIDATES: i64 = 100;
const MEMORY_RECALL_COUNT: usize = 5;

pub struct DmReply {
    pub answer: String,
    pub remembered: usize,
}

async fn store_turn(store: &Store, user_id: i64, role: &str, content: &str) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO dm_messages (user_id, role, content, authored_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(role)
    .bind(content)
    .bind(Utc::now().timestamp())
    .execute(store.pool())
    .await?;
    Ok(result.last_insert_rowid())
}

async fn recent_turns(store: &Store, user_id: i64, limit: i64) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query(
        "SELECT role, content FROM dm_messages
         WHERE user_id = ? ORDER BY id DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(store.pool())
    .await?;

    let mut turns: Vec<(String, String)> = rows
        .into_iter()
        .map(|r| (r.get("role"), r.get("content")))
        .collect();
    turns.reverse();
    Ok(turns)
}

/// Older user messages ranked by similarity to the query; the recent window
/// is excluded so memories add information the history doesn't already have.
async fn recall_memories(
    store: &Store,
    embedder: &TextEmbedder,
    user_id: i64,
    query: &str,
) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT content FROM dm_messages
         WHERE user_id = ? AND role = 'user'
         ORDER BY id DESC LIMIT ? OFFSET ?",
    )
    .bind(user_id)
    .bind(MEMORY_CANDIDATES)
    .bind(RECENT_TURNS)
    .fetch_all(store.pool())
    .await?;

    let candidates: Vec<String> = rows.into_iter().map(|r| r.get("content")).collect();
    if candidates.is_empty() {
        return Ok(vec![]);
    }

    let query_embedding = embedder.embed_one(query).await?;
    let candidate_embeddings = embedder.embed_many(&candidates).await?;

    let mut scored: Vec<(f32, String)> = candidates
        .into_iter()
        .zip(candidate_embeddings)
        .map(|(text, emb)| (cosine_similarity(&query_embedding, &emb), text))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    Ok(scored
        .into_iter()
        .take(MEMORY_RECALL_COUNT)
        .filter(|(score, _)| *score > 0.1)
        .map(|(_, text)| text)
        .collect())
}

pub async fn process_dm(
    store: &Store,
    llm: &LlmClient,
    embedder: &TextEmbedder,
    user_id: i64,
    message: &str,
    tenant_id: Option<i64>,
) -> Result<DmReply> {
    store_turn(store, user_id, "user", message).await?;

    let history = recent_turns(store, user_id, RECENT_TURNS).await?;
    let memories = recall_memories(store, embedder, user_id, message).await?;
    debug!(
        "DM context for user {}: {} turns, {} memories",
        user_id,
        history.len(),
        memories.len()
    );

    let personality = match tenant_id {
        Some(tenant) => store
            .personality_directive(tenant)
            .await?
            .map(|d| format!("\n\n{d}"))
            .unwrap_or_default(),
        None => String::new(),
    };

    let memory_section = if memories.is_empty() {
        String::new()
    } else {
        format!(
            "\n\nThings this user has told you before:\n{}",
            memories
                .iter()
                .map(|m| format!("- {m}"))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    let system = format!(
        "You are a helpful assistant in a private conversation. Use the \
         conversation history and remembered context naturally; don't recite \
         them back.{memory_section}{personality}"
    );

    let chat_history: Vec<ChatMessage> = history
        .iter()
        .map(|(role, content)| ChatMessage {
            role: if role == "assistant" { Role::Assistant } else { Role::User },
            content: content.clone(),
        })
        .collect();

    let answer = if llm.is_available() {
        llm.generate_with_history(&system, &chat_history)
            .await
            .unwrap_or_else(|e| format!("I couldn't reply right now ({e})."))
    } else {
        "I need an LLM provider configured to chat.".to_string()
    };

    store_turn(store, user_id, "assistant", &answer).await?;

    Ok(DmReply {
        answer,
        remembered: memories.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::LocalEmbedder;

    #[tokio::test]
    async fn turns_persist_and_memories_recall_semantically() {
        let store = Store::connect_in_memory().await.unwrap();
        let embedder = TextEmbedder::Local(LocalEmbedder::new(128));

        // Seed old exchanges beyond the recent window.
        for i in 0..12 {
            store_turn(&store, 7, "user", &format!("filler message number {i}"))
                .await
                .unwrap();
        }
        store_turn(&store, 7, "user", "my favorite database is postgres")
            .await
            .unwrap();
        for i in 0..RECENT_TURNS {
            store_turn(&store, 7, "user", &format!("recent chatter {i}"))
                .await
                .unwrap();
        }

        let memories = recall_memories(&store, &embedder, 7, "which database do I like?")
            .await
            .unwrap();
        assert!(
            memories.iter().any(|m| m.contains("postgres")),
            "expected the database preference to surface, got {memories:?}"
        );
    }

    #[tokio::test]
    async fn reply_without_llm_still_persists_both_sides() {
        let store = Store::connect_in_memory().await.unwrap();
        let embedder = TextEmbedder::Local(LocalEmbedder::new(64));
        let reply = process_dm(&store, &LlmClient::Disabled, &embedder, 3, "hello", None)
            .await
            .unwrap();
        assert!(!reply.answer.is_empty());

        let turns = recent_turns(&store, 3, 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].0, "user");
        assert_eq!(turns[1].0, "assistant");
    }
}
