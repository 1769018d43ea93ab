// src/answer/knowledge.rs

//! Direct-LLM answering with the current time and tenant personality in the
//! system prompt, optionally augmented with top web results.

use chrono::Utc;

use super::web::{self, WebSearchClient};
use super::{AskResponse, intent::RouterIntent};
use crate::llm::LlmClient;
use crate::store::Store;

pub async fn process_knowledge_query(
    store: &Store,
    llm: &LlmClient,
    web_client: &WebSearchClient,
    tenant_id: i64,
    query: &str,
    augment_with_web: bool,
) -> AskResponse {
    let started = std::time::Instant::now();

    if !llm.is_available() {
        return AskResponse {
            answer: "I need an LLM provider configured to answer general knowledge questions."
                .to_string(),
            sources: vec![],
            routed_to: RouterIntent::GeneralKnowledge.as_str().to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
    }

    let web_section = if augment_with_web && web_client.is_configured() {
        match web_client.search(query, 3).await {
            Ok(results) if !results.is_empty() => format!(
                "\n\nWEB SEARCH RESULTS (use for current/recent information):\n{}\n\n\
                 Incorporate relevant information from these results where applicable.",
                web::context_block(&results)
            ),
            _ => String::new(),
        }
    } else {
        String::new()
    };

    let personality = store
        .personality_directive(tenant_id)
        .await
        .ok()
        .flatten()
        .map(|d| format!("\n\n{d}"))
        .unwrap_or_default();

    let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    let system = format!(
        "You are a helpful community assistant that answers questions clearly and \
         concisely.\n\n\
         Current date and time: {now}\n\n\
         For time-related questions, use the timestamp above (UTC unless the user \
         names a timezone). For factual questions, answer from your knowledge and \
         say so when you are genuinely uncertain.{web_section}{personality}"
    );

    let answer = match llm.generate(&system, query).await {
        Ok(answer) => answer,
        Err(e) => format!("I couldn't process that question right now ({e})."),
    };

    AskResponse {
        answer,
        sources: vec![],
        routed_to: RouterIntent::GeneralKnowledge.as_str().to_string(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}
