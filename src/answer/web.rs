// src/answer/web.rs

//! Web search adapter and synthesis path.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{AskResponse, intent::RouterIntent};
use crate::error::{HivemindError, Result};
use crate::llm::LlmClient;

#[derive(Debug, Clone, Deserialize)]
pub struct WebResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WebResult>,
}

pub struct WebSearchClient {
    http: Client,
    api_key: Option<String>,
}

impl WebSearchClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            api_key,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Top `limit` results; empty when no key is configured.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<WebResult>> {
        let Some(key) = &self.api_key else {
            return Ok(vec![]);
        };

        let response = self
            .http
            .post("https://api.tavily.com/search")
            .json(&json!({
                "api_key": key,
                "query": query,
                "max_results": limit,
            }))
            .send()
            .await
            .map_err(|e| HivemindError::upstream("web_search", e))?;

        if !response.status().is_success() {
            return Err(HivemindError::upstream(
                "web_search",
                format!("search API status {}", response.status()),
            ));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| HivemindError::upstream("web_search", e))?;
        debug!("Web search returned {} results", parsed.results.len());
        Ok(parsed.results)
    }
}

pub fn format_results(results: &[WebResult]) -> String {
    if results.is_empty() {
        return "No web search results found.".to_string();
    }
    let mut out = String::from("Here's what I found:\n\n");
    for (i, r) in results.iter().take(5).enumerate() {
        let content = crate::util::truncate_chars(&r.content, 200);
        out.push_str(&format!(
            "{}. **{}**\n   {}...\n   Source: {}\n\n",
            i + 1,
            r.title,
            content,
            r.url
        ));
    }
    out
}

/// Short context block for augmenting other paths.
pub fn context_block(results: &[WebResult]) -> String {
    results
        .iter()
        .filter(|r| !r.content.is_empty())
        .take(3)
        .map(|r| {
            let content = crate::util::truncate_chars(&r.content, 300);
            format!("- [{}]({}): {}", r.title, r.url, content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn process_web_query(
    web: &WebSearchClient,
    llm: &LlmClient,
    query: &str,
) -> AskResponse {
    let started = std::time::Instant::now();

    let results = web.search(query, 5).await.unwrap_or_default();

    let answer = if results.is_empty() {
        "I wasn't able to search the web for this information. \
         Check whether web search is configured."
            .to_string()
    } else if llm.is_available() {
        let context = results
            .iter()
            .map(|r| format!("Source: {}\nURL: {}\n{}", r.title, r.url, r.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let system = "You are a helpful assistant that answers questions using web search \
                      results. Synthesize the information to answer the user's question. \
                      Always cite your sources by mentioning the website or URL. If the \
                      results don't contain relevant information, say so.";
        match llm
            .generate(system, &format!("Search Results:\n{context}\n\nQuestion: {query}"))
            .await
        {
            Ok(answer) => answer,
            Err(_) => format_results(&results),
        }
    } else {
        format_results(&results)
    };

    AskResponse {
        answer,
        sources: vec![],
        routed_to: RouterIntent::WebSearch.as_str().to_string(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}
