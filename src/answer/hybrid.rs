// src/answer/hybrid.rs

//! Multi-source answering: vector retrieval and web search run concurrently,
//! their contexts fuse into one LLM call. The routing label names the
//! sources that actually contributed, so partial failures self-describe
//! ("vector + knowledge" when web search came up empty).

use tracing::warn;

use super::memory::ConversationMemory;
use super::rag::hit_to_source;
use super::web::{self, WebSearchClient};
use super::{AskResponse, MessageSource};
use crate::error::Result;
use crate::llm::LlmClient;
use crate::retrieval::{RetrievalEngine, SearchRequest};
use crate::store::Store;

#[allow(clippy::too_many_arguments)]
pub async fn process_hybrid_query(
    store: &Store,
    engine: &RetrievalEngine,
    llm: &LlmClient,
    web_client: &WebSearchClient,
    memory: &ConversationMemory,
    tenant_id: i64,
    query: &str,
    channel_ids: &[i64],
    channel_id: Option<i64>,
) -> Result<AskResponse> {
    let started = std::time::Instant::now();

    let conversation = channel_id
        .map(|c| memory.context(c, 5))
        .unwrap_or_default();

    let search_request = SearchRequest {
        tenant_id: Some(tenant_id),
        query: query.to_string(),
        channel_ids: channel_ids.to_vec(),
        limit: 5,
    };
    let vector_fut = engine.search(&search_request);
    let web_fut = web_client.search(query, 3);
    let (vector_result, web_result) = tokio::join!(vector_fut, web_fut);

    let mut context_sections = Vec::new();
    let mut sources: Vec<MessageSource> = Vec::new();
    let mut used = Vec::new();

    match vector_result {
        Ok(hits) if !hits.is_empty() => {
            let block: Vec<String> = hits
                .iter()
                .filter_map(|h| {
                    ["text", "content", "summary"]
                        .iter()
                        .find_map(|k| h.payload_str(k))
                        .map(String::from)
                })
                .collect();
            context_sections.push(format!("## Community Context:\n{}", block.join("\n---\n")));
            sources.extend(hits.iter().map(hit_to_source));
            used.push("vector");
        }
        Ok(_) => {}
        Err(e) => warn!("Hybrid vector leg failed: {}", e),
    }

    match web_result {
        Ok(results) if !results.is_empty() => {
            context_sections.push(format!("## Web Context:\n{}", web::context_block(&results)));
            used.push("web");
        }
        Ok(_) => {}
        Err(e) => warn!("Hybrid web leg failed: {}", e),
    }

    used.push("knowledge");

    let personality = store
        .personality_directive(tenant_id)
        .await?
        .map(|d| format!("\n\n{d}"))
        .unwrap_or_default();

    let system = format!(
        "You are a helpful assistant with access to community discussion context \
         and web search results. Combine the provided context with your own \
         knowledge to answer comprehensively. Prefer the provided context for \
         community-specific claims and cite web sources for external ones.{personality}"
    );

    let mut user_content = String::new();
    if !conversation.is_empty() {
        user_content.push_str(&format!("Recent conversation:\n{conversation}\n\n"));
    }
    if !context_sections.is_empty() {
        user_content.push_str(&context_sections.join("\n\n"));
        user_content.push_str("\n\n");
    }
    user_content.push_str(&format!("Question: {query}"));

    let answer = match llm.generate(&system, &user_content).await {
        Ok(answer) => answer,
        Err(e) => {
            warn!("Hybrid synthesis failed: {}", e);
            "I couldn't synthesize an answer right now. Please try again.".to_string()
        }
    };

    Ok(AskResponse {
        answer,
        sources,
        routed_to: used.join(" + "),
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}
