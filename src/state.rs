// src/state.rs

//! Shared application state for the HTTP runtime.

use std::sync::Arc;

use crate::answer::AnswerRouter;
use crate::config::{Config, OverrideStore};
use crate::consistency::ConsistencyService;
use crate::embeddings::TextEmbedder;
use crate::queue::WorkQueue;
use crate::retrieval::RetrievalEngine;
use crate::store::Store;
use crate::vector::VectorIndex;

pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub queue: WorkQueue,
    pub index: Arc<VectorIndex>,
    pub embedder: Arc<TextEmbedder>,
    pub engine: Arc<RetrievalEngine>,
    pub router: Arc<AnswerRouter>,
    pub consistency: Arc<ConsistencyService>,
    pub overrides: Arc<OverrideStore>,
}
