// tests/right_to_be_forgotten_test.rs
// Full deletion pipeline against a live vector index: index a message,
// verify it is searchable, deliver the delete event, drain the queue, and
// verify the content never resurfaces.

use std::sync::Arc;

use chrono::Utc;
use hivemind::answer::{AnswerRouter, ThematicAnalyzer, WebSearchClient};
use hivemind::config::IngestConfig;
use hivemind::documents::DocumentProcessor;
use hivemind::embeddings::{SparseEncoder, TextEmbedder};
use hivemind::ingest::IngestService;
use hivemind::llm::LlmClient;
use hivemind::platform::PlatformEvent;
use hivemind::queue::handlers::TaskContext;
use hivemind::queue::worker::TaskHandler;
use hivemind::queue::{Priority, WorkQueue};
use hivemind::retrieval::{RetrievalEngine, SearchRequest};
use hivemind::store::Store;
use hivemind::vector::VectorIndex;

const QDRANT_URL: &str = "http://localhost:6334";

async fn build_context() -> (Store, WorkQueue, IngestService, TaskContext, Arc<RetrievalEngine>) {
    let store = Store::connect_in_memory().await.unwrap();
    let queue = WorkQueue::connect_in_memory().await.unwrap();
    store.upsert_tenant(901, "rtbf guild").await.unwrap();
    store.upsert_channel(9010, 901, "general").await.unwrap();
    store.set_channel_indexed(901, 9010, true).await.unwrap();

    let embedder = Arc::new(TextEmbedder::from_config(
        &hivemind::config::Config::from_env(),
    ));
    let index = Arc::new(
        VectorIndex::connect(QDRANT_URL, None, embedder.dimension())
            .await
            .expect("qdrant reachable"),
    );
    let engine = Arc::new(RetrievalEngine::new(index.clone(), embedder.clone(), false));

    let router = Arc::new(AnswerRouter::new(
        store.clone(),
        engine.clone(),
        embedder.clone(),
        Arc::new(LlmClient::Disabled),
        WebSearchClient::new(None),
        ThematicAnalyzer::new(std::env::temp_dir().join("rtbf-topics")),
    ));

    let ingest_config = IngestConfig {
        ingest_bot_messages: true,
        session_gap_minutes: 15,
        semantic_split_threshold: 15,
        min_session_size: 2,
        max_session_size: 30,
    };

    let context = TaskContext {
        store: store.clone(),
        queue: queue.clone(),
        index,
        embedder,
        sparse: SparseEncoder::new(),
        documents: DocumentProcessor::new(),
        vision: Arc::new(LlmClient::Disabled),
        router,
        ingest_config: ingest_config.clone(),
    };
    let service = IngestService::new(store.clone(), queue.clone(), ingest_config);

    (store, queue, service, context, engine)
}

async fn drain_queue(queue: &WorkQueue, context: &TaskContext) {
    loop {
        let mut claimed = None;
        for priority in [Priority::High, Priority::Default, Priority::Low] {
            if let Some(item) = queue.claim_one(priority, 600).await.unwrap() {
                claimed = Some(item);
                break;
            }
        }
        let Some(item) = claimed else { break };
        context.handle(&item).await.expect("task succeeds");
        queue.ack(item.id).await.unwrap();
    }
}

#[tokio::test]
#[ignore = "requires a running Qdrant instance on localhost:6334"]
async fn deleted_message_never_resurfaces_in_search() {
    let (store, queue, service, context, engine) = build_context().await;

    service
        .handle_event(PlatformEvent::MessageCreated {
            tenant_id: 901,
            tenant_name: "rtbf guild".into(),
            channel_id: 9010,
            channel_name: "general".into(),
            message_id: 1,
            author_id: 100,
            author_username: "ada".into(),
            author_display_name: None,
            author_is_bot: false,
            content: "the secret token is hunter2, don't share it".into(),
            reply_target_id: None,
            thread_id: None,
            attachment_count: 0,
            embed_count: 0,
            mention_count: 0,
            authored_at: Utc::now(),
        })
        .await
        .unwrap();
    drain_queue(&queue, &context).await;

    // Indexed and searchable.
    let hits = engine
        .search(&SearchRequest {
            tenant_id: Some(901),
            query: "secret token hunter2".into(),
            channel_ids: vec![],
            limit: 5,
        })
        .await
        .unwrap();
    assert!(
        hits.iter().any(|h| h.message_ids().contains(&1)),
        "message should be indexed before deletion"
    );

    // Deliver the deletion and drain the purge.
    service
        .handle_event(PlatformEvent::MessageDeleted {
            tenant_id: 901,
            message_id: 1,
        })
        .await
        .unwrap();
    drain_queue(&queue, &context).await;

    let row = store.get_message(901, 1).await.unwrap().unwrap();
    assert!(row.deleted);
    assert_eq!(row.content, "[deleted]");

    let hits = engine
        .search(&SearchRequest {
            tenant_id: Some(901),
            query: "secret token hunter2".into(),
            channel_ids: vec![],
            limit: 10,
        })
        .await
        .unwrap();
    assert!(
        hits.iter().all(|h| !h.message_ids().contains(&1)),
        "no result may reference the deleted message"
    );
}

#[tokio::test]
#[ignore = "requires a running Qdrant instance on localhost:6334"]
async fn search_without_tenant_is_refused() {
    let (_store, _queue, _service, _context, engine) = build_context().await;

    let err = engine
        .search(&SearchRequest {
            tenant_id: None,
            query: "anything".into(),
            channel_ids: vec![],
            limit: 5,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, hivemind::error::HivemindError::Isolation(_)));
}
