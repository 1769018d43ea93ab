// src/answer/rag.rs

//! Vector-RAG answering path.
//!
//! Context assembly order: the channel's recent messages (short-term memory,
//! straight from the store so deletions are respected), then retrieved
//! historical context, then the user question. The tenant personality
//! directive rides on the system prompt.

use tracing::debug;

use super::memory::ConversationMemory;
use super::{AskResponse, MessageSource, intent::RouterIntent};
use crate::error::Result;
use crate::llm::LlmClient;
use crate::retrieval::{RetrievalEngine, SearchRequest};
use crate::store::Store;
use crate::vector::SearchHit;

pub const RECENT_MESSAGE_COUNT: i64 = 30;
const RETRIEVAL_LIMIT: usize = 5;

pub fn hit_to_source(hit: &SearchHit) -> MessageSource {
    let content = ["text", "content", "summary"]
        .iter()
        .find_map(|key| hit.payload_str(key))
        .unwrap_or_default();
    let content = crate::util::truncate_chars(content, 500);

    MessageSource {
        id: hit.id.clone(),
        channel_id: hit.payload_i64("channel_id").unwrap_or(0),
        content,
        relevance_score: hit.score,
        source_type: hit
            .payload_str("source_type")
            .unwrap_or("chat")
            .to_string(),
        parent_file: hit.payload_str("parent_file").map(String::from),
    }
}

fn format_retrieved(hits: &[SearchHit]) -> String {
    let mut blocks = Vec::new();
    for hit in hits {
        let text = ["text", "content", "summary"]
            .iter()
            .find_map(|key| hit.payload_str(key))
            .unwrap_or_default();
        if text.is_empty() {
            continue;
        }
        match hit.payload_str("parent_file") {
            Some(file) => blocks.push(format!(
                "[Source: {file}, Relevance: {:.2}]\n{text}",
                hit.score
            )),
            None => blocks.push(format!("[Relevance: {:.2}]\n{text}", hit.score)),
        }
    }
    blocks.join("\n\n")
}

fn fallback_answer(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "I couldn't find any relevant discussions matching your query.".to_string();
    }
    let lines: Vec<String> = hits
        .iter()
        .take(3)
        .filter_map(|hit| {
            let text = ["text", "content", "summary"]
                .iter()
                .find_map(|key| hit.payload_str(key))?;
            let text = crate::util::truncate_chars(text, 200);
            match hit.payload_str("parent_file") {
                Some(file) => Some(format!("- [{file}] {text}...")),
                None => Some(format!("- {text}...")),
            }
        })
        .collect();
    format!("Found {} relevant results:\n{}", hits.len(), lines.join("\n"))
}

#[allow(clippy::too_many_arguments)]
pub async fn process_rag_query(
    store: &Store,
    engine: &RetrievalEngine,
    llm: &LlmClient,
    memory: &ConversationMemory,
    tenant_id: i64,
    query: &str,
    channel_ids: &[i64],
    channel_id: Option<i64>,
) -> Result<AskResponse> {
    let started = std::time::Instant::now();

    // Short-term memory: recent channel rows (deleted rows never surface).
    let mut recent_block = String::new();
    if let Some(channel) = channel_id {
        let recent = store
            .recent_messages(tenant_id, channel, RECENT_MESSAGE_COUNT)
            .await?;
        if !recent.is_empty() {
            let mut lines = Vec::new();
            for row in &recent {
                let name = store
                    .member_name(row.author_id)
                    .await?
                    .map(|n| n.best().to_string())
                    .unwrap_or_else(|| format!("member-{}", row.author_id));
                lines.push(format!(
                    "[{}] {}: {}",
                    row.authored_at.format("%H:%M"),
                    name,
                    row.content
                ));
            }
            recent_block = lines.join("\n");
        }
    }

    let conversation = channel_id
        .map(|c| memory.context(c, 5))
        .unwrap_or_default();

    let hits = engine
        .search(&SearchRequest {
            tenant_id: Some(tenant_id),
            query: query.to_string(),
            channel_ids: channel_ids.to_vec(),
            limit: RETRIEVAL_LIMIT,
        })
        .await?;
    debug!("RAG retrieval returned {} hits", hits.len());

    let answer = if llm.is_available() {
        let personality = store
            .personality_directive(tenant_id)
            .await?
            .map(|d| format!("\n\n{d}"))
            .unwrap_or_default();

        let system = format!(
            "You are a helpful assistant analyzing community discussions. \
             Based on the retrieved context from the community's message history, \
             answer the user's question. Be concise and cite specific discussions \
             when relevant. If the context doesn't contain enough information, \
             say so.{personality}"
        );

        let mut user_content = String::new();
        if !recent_block.is_empty() {
            user_content.push_str(&format!("Recent messages in this channel:\n{recent_block}\n\n"));
        }
        if !conversation.is_empty() {
            user_content.push_str(&format!("Recent conversation with you:\n{conversation}\n\n"));
        }
        let retrieved = format_retrieved(&hits);
        if !retrieved.is_empty() {
            user_content.push_str(&format!("Context from message history:\n{retrieved}\n\n"));
        }
        user_content.push_str(&format!("Question: {query}"));

        match llm.generate(&system, &user_content).await {
            Ok(answer) => answer,
            Err(_) => fallback_answer(&hits),
        }
    } else {
        fallback_answer(&hits)
    };

    Ok(AskResponse {
        answer,
        sources: hits.iter().map(hit_to_source).collect(),
        routed_to: RouterIntent::VectorRag.as_str().to_string(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}
