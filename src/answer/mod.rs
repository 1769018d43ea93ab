// src/answer/mod.rs

//! Answer router: injection gate -> intent classification -> dispatch.
//!
//! Every user-originated query passes the injection filter before any LLM
//! sees it, and every generated answer passes output validation before it
//! leaves. Dispatch paths all produce the uniform
//! `{answer, sources, routed_to, elapsed_ms}` shape; no raw adapter error
//! crosses this boundary.

pub mod analytics;
pub mod dm;
pub mod guard;
pub mod hybrid;
pub mod injection;
pub mod intent;
pub mod knowledge;
pub mod memory;
pub mod rag;
pub mod summary;
pub mod thematic;
pub mod web;

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use crate::embeddings::TextEmbedder;
use crate::error::{HivemindError, Result};
use crate::llm::LlmClient;
use crate::retrieval::RetrievalEngine;
use crate::store::Store;
pub use intent::RouterIntent;
pub use memory::ConversationMemory;
pub use thematic::ThematicAnalyzer;
pub use web::WebSearchClient;

#[derive(Debug, Clone, Serialize)]
pub struct MessageSource {
    pub id: String,
    pub channel_id: i64,
    pub content: String,
    pub relevance_score: f32,
    pub source_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_file: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<MessageSource>,
    pub routed_to: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub tenant_id: i64,
    pub query: String,
    pub channel_ids: Vec<i64>,
    /// Originating channel, used for conversation memory and recent context.
    pub channel_id: Option<i64>,
}

pub struct AnswerRouter {
    store: Store,
    engine: Arc<RetrievalEngine>,
    embedder: Arc<TextEmbedder>,
    llm: RwLock<Arc<LlmClient>>,
    web: WebSearchClient,
    pub conversation_memory: ConversationMemory,
    pub thematic: ThematicAnalyzer,
    knowledge_web_augmentation: bool,
}

impl AnswerRouter {
    pub fn new(
        store: Store,
        engine: Arc<RetrievalEngine>,
        embedder: Arc<TextEmbedder>,
        llm: Arc<LlmClient>,
        web: WebSearchClient,
        thematic: ThematicAnalyzer,
    ) -> Self {
        Self {
            store,
            engine,
            embedder,
            llm: RwLock::new(llm),
            web,
            conversation_memory: ConversationMemory::new(),
            thematic,
            knowledge_web_augmentation: true,
        }
    }

    pub fn llm(&self) -> Arc<LlmClient> {
        self.llm.read().expect("llm lock poisoned").clone()
    }

    /// Swap the answering client after a provider-override change.
    pub fn set_llm(&self, llm: Arc<LlmClient>) {
        *self.llm.write().expect("llm lock poisoned") = llm;
    }

    pub async fn classify(&self, query: &str) -> RouterIntent {
        intent::classify_intent(&self.llm(), query).await
    }

    /// Main entry point. Returns `Err` only for caller mistakes (empty
    /// query); security refusals and upstream degradation come back as
    /// well-formed answers.
    pub async fn ask(&self, request: &AskRequest) -> Result<AskResponse> {
        let started = std::time::Instant::now();

        if request.query.trim().is_empty() {
            return Err(HivemindError::Validation("empty query".to_string()));
        }

        // Input defense gates everything; a trip never reaches an LLM.
        let check = injection::detect_injection(&request.query);
        if !check.is_safe {
            warn!(
                target: "security",
                tenant = request.tenant_id,
                risk = check.risk_score,
                "query refused by injection filter"
            );
            return Ok(AskResponse {
                answer: injection::REFUSAL_MESSAGE.to_string(),
                sources: vec![],
                routed_to: "security_filter".to_string(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }
        let query = check.sanitized_input;

        let llm = self.llm();
        let intent = intent::classify_intent(&llm, &query).await;
        info!(
            tenant = request.tenant_id,
            intent = intent.as_str(),
            "dispatching query"
        );

        let mut response = match intent {
            RouterIntent::AnalyticsDb => self.dispatch_analytics(&llm, request, &query).await,
            RouterIntent::VectorRag => {
                rag::process_rag_query(
                    &self.store,
                    &self.engine,
                    &llm,
                    &self.conversation_memory,
                    request.tenant_id,
                    &query,
                    &request.channel_ids,
                    request.channel_id,
                )
                .await?
            }
            RouterIntent::GraphRag => {
                let answer = self.thematic.answer(request.tenant_id, &query, &llm).await;
                AskResponse {
                    answer,
                    sources: vec![],
                    routed_to: RouterIntent::GraphRag.as_str().to_string(),
                    elapsed_ms: 0,
                }
            }
            RouterIntent::WebSearch => web::process_web_query(&self.web, &llm, &query).await,
            RouterIntent::GeneralKnowledge => {
                knowledge::process_knowledge_query(
                    &self.store,
                    &llm,
                    &self.web,
                    request.tenant_id,
                    &query,
                    self.knowledge_web_augmentation,
                )
                .await
            }
            RouterIntent::Hybrid => {
                hybrid::process_hybrid_query(
                    &self.store,
                    &self.engine,
                    &llm,
                    &self.web,
                    &self.conversation_memory,
                    request.tenant_id,
                    &query,
                    &request.channel_ids,
                    request.channel_id,
                )
                .await?
            }
        };

        // Output defense: leaky answers are replaced wholesale.
        let (_, validated) = injection::validate_output(&response.answer);
        response.answer = validated;
        response.elapsed_ms = started.elapsed().as_millis() as u64;

        if let Some(channel) = request.channel_id {
            self.conversation_memory.record_user(channel, "user", &query);
            self.conversation_memory.record_assistant(channel, &response.answer);
        }

        Ok(response)
    }

    async fn dispatch_analytics(
        &self,
        llm: &LlmClient,
        request: &AskRequest,
        query: &str,
    ) -> AskResponse {
        match analytics::run_analytics(&self.store, llm, query, request.tenant_id).await {
            Ok(result) => AskResponse {
                answer: analytics::format_result(&result),
                sources: vec![],
                routed_to: RouterIntent::AnalyticsDb.as_str().to_string(),
                elapsed_ms: 0,
            },
            Err(e) => {
                // Guard refusals are answers, not transport errors.
                if matches!(e, HivemindError::Security(_)) {
                    warn!(target: "security", tenant = request.tenant_id, "SQL guard refusal: {}", e);
                }
                AskResponse {
                    answer: format!("Unable to process query: {e}"),
                    sources: vec![],
                    routed_to: RouterIntent::AnalyticsDb.as_str().to_string(),
                    elapsed_ms: 0,
                }
            }
        }
    }

    pub async fn chat(
        &self,
        user_id: i64,
        message: &str,
        tenant_id: Option<i64>,
    ) -> Result<dm::DmReply> {
        let check = injection::detect_injection(message);
        if !check.is_safe {
            return Ok(dm::DmReply {
                answer: injection::REFUSAL_MESSAGE.to_string(),
                remembered: 0,
            });
        }
        dm::process_dm(
            &self.store,
            &self.llm(),
            &self.embedder,
            user_id,
            &check.sanitized_input,
            tenant_id,
        )
        .await
    }
}
