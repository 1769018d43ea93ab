// tests/worker_pool_test.rs
// Worker pool behavior over the broker: permanent failures dead-letter
// without retry, successes ack and remove.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hivemind::config::QueueConfig;
use hivemind::error::HivemindError;
use hivemind::queue::worker::{TaskHandler, WorkerPool};
use hivemind::queue::{ClaimedItem, TaskPayload, WorkQueue};

struct ScriptedHandler {
    calls: Arc<AtomicUsize>,
    fail_with_validation: bool,
}

#[async_trait]
impl TaskHandler for ScriptedHandler {
    async fn handle(&self, _item: &ClaimedItem) -> hivemind::error::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_with_validation {
            Err(HivemindError::Validation("blocked attachment".into()))
        } else {
            Ok(())
        }
    }
}

fn queue_config() -> QueueConfig {
    QueueConfig {
        broker_url: String::new(),
        worker_concurrency: 1,
        task_soft_limit_s: 300,
        task_hard_limit_s: 600,
        tasks_per_worker_recycle: 1000,
    }
}

async fn wait_for_stats(queue: &WorkQueue, check: fn(&hivemind::queue::QueueStats) -> bool) {
    for _ in 0..60 {
        let stats = queue.stats().await.unwrap();
        if check(&stats) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("queue did not reach the expected state within 6s");
}

#[tokio::test]
async fn successful_task_is_acked_and_removed() {
    let queue = WorkQueue::connect_in_memory().await.unwrap();
    queue
        .enqueue(&TaskPayload::SingleMessageIndex {
            tenant_id: 1,
            channel_id: 1,
            message_id: 1,
        })
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(ScriptedHandler {
        calls: calls.clone(),
        fail_with_validation: false,
    });

    let pool = WorkerPool::new(queue.clone(), handler, queue_config());
    let running = tokio::spawn(pool.run());

    wait_for_stats(&queue, |stats| stats.default == 0 && stats.dead_letters == 0).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    running.abort();
}

#[tokio::test]
async fn validation_failure_dead_letters_without_retry() {
    let queue = WorkQueue::connect_in_memory().await.unwrap();
    queue
        .enqueue(&TaskPayload::ProcessAttachment {
            tenant_id: 1,
            attachment_id: 9,
        })
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(ScriptedHandler {
        calls: calls.clone(),
        fail_with_validation: true,
    });

    let pool = WorkerPool::new(queue.clone(), handler, queue_config());
    let running = tokio::spawn(pool.run());

    wait_for_stats(&queue, |stats| stats.dead_letters == 1).await;

    // Permanent failure: exactly one execution, full context preserved.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let drained = queue.drain_dead_letters(10, false).await.unwrap();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].kind, "process_attachment");
    assert!(drained[0].error.contains("blocked attachment"));
    running.abort();
}
