// src/answer/intent.rs

//! Intent classification for query routing.
//!
//! Pattern-based first (deterministic, ordered ANALYTICS -> GRAPH -> WEB ->
//! VECTOR), LLM fallback on miss, GENERAL_KNOWLEDGE when the LLM is
//! unavailable or fails.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::LlmClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterIntent {
    AnalyticsDb,
    VectorRag,
    GraphRag,
    WebSearch,
    GeneralKnowledge,
    Hybrid,
}

impl RouterIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouterIntent::AnalyticsDb => "analytics_db",
            RouterIntent::VectorRag => "vector_rag",
            RouterIntent::GraphRag => "graph_rag",
            RouterIntent::WebSearch => "web_search",
            RouterIntent::GeneralKnowledge => "general_knowledge",
            RouterIntent::Hybrid => "hybrid",
        }
    }
}

// Community terms that anchor a counting question to stored data.
const DATA_TERMS: &str =
    r"(messages?|users?|members?|channels?|server|guild|community|activity|sent|posted|active)";

static ANALYTICS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(r"(?i)\b(how many|count|total|number of)\b.*\b{DATA_TERMS}\b"),
        format!(r"(?i)\b{DATA_TERMS}\b.*\b(how many|count|total|number of)\b"),
        r"(?i)\b(who spoke|most active|least active|top \d+|bottom \d+)\b".to_string(),
        r"(?i)\b(most|least|highest|lowest|average|avg|sum|min|max)\b.*\b(messages?|users?|members?|channels?)\b"
            .to_string(),
        r"(?i)\b(messages?|activity)\b.*\b(per|by|each)\b.*\b(day|week|month|hour|user|member|channel)\b".to_string(),
        format!(r"(?i)\b(between|from|since|until|last)\b.*\b(am|pm|\d{{1,2}}:\d{{2}}|week|month|day)\b.*\b{DATA_TERMS}\b"),
        r"(?i)\b(show|list|display|get)\b.*\b(count|stats|statistics|metrics)\b".to_string(),
        r"(?i)\b(message counts?|user counts?|channel stats?)\b".to_string(),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid pattern"))
    .collect()
});

static GRAPH_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(main|common|frequent|popular|major)\b.*\b(topics?|themes?|subjects?|discussions?)\b",
        r"(?i)\bwhat (do|does) (everyone|people|users?|members?) (talk|discuss|chat) about\b",
        r"(?i)\b(summarize|overview|summary of)\b.*\b(server|community|all)\b",
        r"(?i)\b(general|overall|common)\b.*\b(sentiment|opinion|feeling|mood)\b",
        r"(?i)\b(trends?|patterns?|themes?)\b.*\b(in|across|throughout)\b.*\b(server|community|channels?)\b",
        r"(?i)\bwhat are the\b.*\b(main|biggest|most common|top)\b.*\b(complaints?|issues?|concerns?|problems?)\b",
        r"(?i)\b(analyze|analysis of)\b.*\b(conversations?|discussions?|community)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid pattern"))
    .collect()
});

static WEB_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(latest|current|recent|today'?s?)\b.*\b(news|price|version|release)\b",
        r"(?i)\b(how (do|does|to|can)|what is the .* way to)\b.*\b(configure|setup|install|use)\b",
        r"(?i)\b(according to|based on|from the web|google|search for)\b",
        r"(?i)\b(nginx|docker|kubernetes|aws|gcp|azure)\b.*\b(how|configure|setup)\b",
        r"(?i)\b(price of|cost of|worth of)\b.*\b(bitcoin|eth|stock|crypto)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid pattern"))
    .collect()
});

static VECTOR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(what (was|were|is|are)|summarize|summary of)\b.*\b(said|discussed|talked|mentioned|decided?)\b",
        r"(?i)\b(summarize|summary of)\b.*\b(discussion|conversation|chat|thread)\b",
        r"(?i)\b(find|search|look for)\b.*\b(messages?|discussions?|conversations?)\b.*\b(about|where|that)\b",
        r"(?i)\b(what (do|does) .* think|opinions? (on|about)|sentiment)\b",
        r"(?i)\b(explain|describe|tell me about)\b.*\b(discussion|conversation|thread)\b",
        r"(?i)\b(what has been said|what did .* say)\b",
        r"(?i)\bwhat did we (decide|agree|conclude)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid pattern"))
    .collect()
});

/// Deterministic pattern pass. Same input, same label, always.
pub fn classify_by_pattern(query: &str) -> Option<RouterIntent> {
    if ANALYTICS_PATTERNS.iter().any(|p| p.is_match(query)) {
        return Some(RouterIntent::AnalyticsDb);
    }
    if GRAPH_PATTERNS.iter().any(|p| p.is_match(query)) {
        return Some(RouterIntent::GraphRag);
    }
    if WEB_PATTERNS.iter().any(|p| p.is_match(query)) {
        return Some(RouterIntent::WebSearch);
    }
    if VECTOR_PATTERNS.iter().any(|p| p.is_match(query)) {
        return Some(RouterIntent::VectorRag);
    }
    None
}

const CLASSIFIER_PROMPT: &str = "\
You are a query intent classifier for a community analytics system.
Classify the user's query into exactly ONE of these categories:

- analytics_db: Statistical queries about THIS community's message counts, \
member activity, rankings, time-based metrics.
- vector_rag: Semantic content queries about what was discussed, finding \
specific discussions or what someone said.
- graph_rag: Broad thematic queries about overall topics, trends, or \
patterns across the ENTIRE community.
- web_search: Queries requiring external/current information that needs \
real-time web search.
- general_knowledge: Factual questions answerable from general knowledge, \
NOT about community data.

Respond with ONLY the category name, nothing else.";

async fn classify_with_llm(llm: &LlmClient, query: &str) -> RouterIntent {
    if !llm.is_available() {
        return RouterIntent::GeneralKnowledge;
    }

    match llm.generate(CLASSIFIER_PROMPT, query).await {
        Ok(label) => {
            let label = label.to_lowercase();
            if label.contains("analytics") {
                RouterIntent::AnalyticsDb
            } else if label.contains("graph") {
                RouterIntent::GraphRag
            } else if label.contains("web") {
                RouterIntent::WebSearch
            } else if label.contains("general") {
                RouterIntent::GeneralKnowledge
            } else {
                RouterIntent::VectorRag
            }
        }
        // Any LLM failure defaults to the safe no-retrieval path.
        Err(_) => RouterIntent::GeneralKnowledge,
    }
}

pub async fn classify_intent(llm: &LlmClient, query: &str) -> RouterIntent {
    if let Some(intent) = classify_by_pattern(query) {
        debug!("Pattern classification: {}", intent.as_str());
        return intent;
    }
    let intent = classify_with_llm(llm, query).await;
    debug!("LLM classification: {}", intent.as_str());
    intent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn who_spoke_most_routes_to_analytics() {
        assert_eq!(
            classify_by_pattern("who spoke most?"),
            Some(RouterIntent::AnalyticsDb)
        );
        assert_eq!(
            classify_by_pattern("how many messages were sent last week?"),
            Some(RouterIntent::AnalyticsDb)
        );
    }

    #[test]
    fn topic_recall_routes_to_vector() {
        assert_eq!(
            classify_by_pattern("what did we decide about caching?"),
            Some(RouterIntent::VectorRag)
        );
        assert_eq!(
            classify_by_pattern("summarize the discussion about auth"),
            Some(RouterIntent::VectorRag)
        );
    }

    #[test]
    fn thematic_questions_route_to_graph() {
        assert_eq!(
            classify_by_pattern("what are the main topics people discuss?"),
            Some(RouterIntent::GraphRag)
        );
    }

    #[test]
    fn external_questions_route_to_web() {
        assert_eq!(
            classify_by_pattern("what's the latest rust version release?"),
            Some(RouterIntent::WebSearch)
        );
    }

    #[test]
    fn analytics_outranks_vector_on_overlap() {
        // Mentions both counting and discussion content; the ordered pass
        // resolves to analytics.
        assert_eq!(
            classify_by_pattern("how many messages discussed the deploy?"),
            Some(RouterIntent::AnalyticsDb)
        );
    }

    #[test]
    fn pattern_classification_is_deterministic() {
        let query = "who spoke most in the server?";
        let first = classify_by_pattern(query);
        for _ in 0..50 {
            assert_eq!(classify_by_pattern(query), first);
        }
    }

    #[test]
    fn unmatched_queries_return_none_for_llm_fallback() {
        assert_eq!(classify_by_pattern("hello there"), None);
        assert_eq!(classify_by_pattern("what is the capital of France?"), None);
    }

    #[tokio::test]
    async fn llm_unavailable_defaults_to_general_knowledge() {
        let intent = classify_intent(&LlmClient::Disabled, "what is the capital of France?").await;
        assert_eq!(intent, RouterIntent::GeneralKnowledge);
    }
}
