// tests/ingest_flow_test.rs
// End-to-end ingest flow against in-memory store and broker: idempotent
// event handling, dual-write ordering, deletion, and sync-health movement.

use chrono::Utc;
use hivemind::config::IngestConfig;
use hivemind::ingest::IngestService;
use hivemind::platform::PlatformEvent;
use hivemind::queue::{Priority, TaskPayload, WorkQueue};
use hivemind::store::sync::HealthTier;
use hivemind::store::{DELETED_SENTINEL, Store};

fn ingest_config() -> IngestConfig {
    IngestConfig {
        ingest_bot_messages: true,
        session_gap_minutes: 15,
        semantic_split_threshold: 15,
        min_session_size: 2,
        max_session_size: 30,
    }
}

fn message_event(message_id: i64, content: &str) -> PlatformEvent {
    PlatformEvent::MessageCreated {
        tenant_id: 1,
        tenant_name: "test guild".into(),
        channel_id: 10,
        channel_name: "general".into(),
        message_id,
        author_id: 100 + message_id % 2,
        author_username: format!("member{}", message_id % 2),
        author_display_name: None,
        author_is_bot: false,
        content: content.into(),
        reply_target_id: None,
        thread_id: None,
        attachment_count: 0,
        embed_count: 0,
        mention_count: 0,
        authored_at: Utc::now(),
    }
}

async fn setup() -> (Store, WorkQueue, IngestService) {
    let store = Store::connect_in_memory().await.unwrap();
    let queue = WorkQueue::connect_in_memory().await.unwrap();
    store.upsert_tenant(1, "test guild").await.unwrap();
    store.upsert_channel(10, 1, "general").await.unwrap();
    store.set_channel_indexed(1, 10, true).await.unwrap();
    let service = IngestService::new(store.clone(), queue.clone(), ingest_config());
    (store, queue, service)
}

// ============================================================================
// TEST 1: Idempotent ingest (same event twice, one row, one work item)
// ============================================================================

#[tokio::test]
async fn duplicate_event_is_idempotent() {
    let (store, queue, service) = setup().await;

    for _ in 0..3 {
        service.handle_event(message_event(1, "hello")).await.unwrap();
    }

    assert!(store.get_message(1, 1).await.unwrap().is_some());
    assert_eq!(queue.stats().await.unwrap().default, 1);
}

// ============================================================================
// TEST 2: Sync health moves from critical to healthy as bindings land
// ============================================================================

#[tokio::test]
async fn sync_health_converges_as_workers_bind() {
    let (store, queue, service) = setup().await;

    for id in 1..=10 {
        service
            .handle_event(message_event(id, &format!("message {id}")))
            .await
            .unwrap();
    }

    let health = store.sync_health(1).await.unwrap();
    assert_eq!(health.total, 10);
    assert_eq!(health.unbound, 10);
    assert_eq!(health.tier, HealthTier::Critical);

    // Simulate workers draining the queue and acknowledging upserts.
    while let Some(item) = queue.claim_one(Priority::Default, 60).await.unwrap() {
        if let TaskPayload::SingleMessageIndex { message_id, .. } = &item.payload {
            store
                .record_vector_binding(1, &[*message_id], &format!("pt-{message_id}"))
                .await
                .unwrap();
        }
        queue.ack(item.id).await.unwrap();
    }

    let health = store.sync_health(1).await.unwrap();
    assert_eq!(health.bound, 10);
    assert_eq!(health.unbound, 0);
    assert_eq!(health.tier, HealthTier::Healthy);
}

// ============================================================================
// TEST 3: Deletion replaces content and enqueues a high-priority purge
// ============================================================================

#[tokio::test]
async fn deletion_soft_deletes_and_enqueues_purge() {
    let (store, queue, service) = setup().await;
    service
        .handle_event(message_event(1, "secret token hunter2"))
        .await
        .unwrap();

    service
        .handle_event(PlatformEvent::MessageDeleted {
            tenant_id: 1,
            message_id: 1,
        })
        .await
        .unwrap();

    let row = store.get_message(1, 1).await.unwrap().unwrap();
    assert!(row.deleted);
    assert_eq!(row.content, DELETED_SENTINEL);
    assert!(!row.content.contains("hunter2"));

    let purge = queue
        .claim_one(Priority::High, 60)
        .await
        .unwrap()
        .expect("high-priority purge item");
    match purge.payload {
        TaskPayload::PurgeSessions { message_ids, .. } => assert_eq!(message_ids, vec![1]),
        other => panic!("unexpected payload: {other:?}"),
    }
}

// ============================================================================
// TEST 4: Bulk deletion carries all ids in one purge item
// ============================================================================

#[tokio::test]
async fn bulk_deletion_purges_every_id() {
    let (store, queue, service) = setup().await;
    for id in 1..=5 {
        service.handle_event(message_event(id, "to be purged")).await.unwrap();
    }

    service
        .handle_event(PlatformEvent::MessagesBulkDeleted {
            tenant_id: 1,
            message_ids: vec![1, 2, 3, 4, 5],
        })
        .await
        .unwrap();

    for id in 1..=5 {
        let row = store.get_message(1, id).await.unwrap().unwrap();
        assert!(row.deleted, "message {id} should be soft-deleted");
    }

    let purge = queue.claim_one(Priority::High, 60).await.unwrap().unwrap();
    match purge.payload {
        TaskPayload::PurgeSessions { message_ids, .. } => {
            assert_eq!(message_ids.len(), 5);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

// ============================================================================
// TEST 5: Command invocation defers into the queue
// ============================================================================

#[tokio::test]
async fn command_invocation_enqueues_query_ask() {
    let (_store, queue, service) = setup().await;
    service
        .handle_event(PlatformEvent::CommandInvoked {
            tenant_id: 1,
            channel_id: 10,
            query: "who spoke most?".into(),
        })
        .await
        .unwrap();

    let item = queue.claim_one(Priority::Default, 60).await.unwrap().unwrap();
    assert_eq!(item.payload.kind(), "query_ask");
}
