// src/queue/worker.rs

//! Parallel worker pool over the queue broker.
//!
//! Each worker pulls one item at a time (no batch prefetch), polls queues in
//! priority order with starvation avoidance, enforces soft/hard deadlines,
//! and recycles itself after N completions. Dead workers leave leased items
//! behind; the lease expiry re-delivers them (at-least-once).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ClaimedItem, Priority, WorkQueue, backoff_seconds};
use crate::config::QueueConfig;
use crate::error::HivemindError;

/// After this many high/default pulls, one low pull is forced.
const STARVATION_WINDOW: u32 = 10;

/// Idle poll interval when all queues are empty.
const IDLE_POLL: Duration = Duration::from_millis(500);

#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, item: &ClaimedItem) -> crate::error::Result<()>;
}

pub struct WorkerPool {
    queue: WorkQueue,
    handler: Arc<dyn TaskHandler>,
    config: QueueConfig,
}

impl WorkerPool {
    pub fn new(queue: WorkQueue, handler: Arc<dyn TaskHandler>, config: QueueConfig) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    /// Run the pool until the process is stopped. Workers that exit (recycle
    /// or panic) are respawned by their supervisor.
    pub async fn run(self) {
        info!(
            "Starting worker pool: {} workers, soft {}s / hard {}s, recycle after {}",
            self.config.worker_concurrency,
            self.config.task_soft_limit_s,
            self.config.task_hard_limit_s,
            self.config.tasks_per_worker_recycle
        );

        let mut supervisors: Vec<JoinHandle<()>> = Vec::new();
        for worker_id in 0..self.config.worker_concurrency {
            let queue = self.queue.clone();
            let handler = self.handler.clone();
            let config = self.config.clone();
            supervisors.push(tokio::spawn(async move {
                loop {
                    let worker = Worker {
                        id: worker_id,
                        queue: queue.clone(),
                        handler: handler.clone(),
                        config: config.clone(),
                    };
                    let run = tokio::spawn(worker.run());
                    match run.await {
                        Ok(()) => debug!("Worker {} recycled", worker_id),
                        Err(e) => error!("Worker {} crashed: {}; respawning", worker_id, e),
                    }
                }
            }));
        }

        for handle in supervisors {
            let _ = handle.await;
        }
    }
}

struct Worker {
    id: usize,
    queue: WorkQueue,
    handler: Arc<dyn TaskHandler>,
    config: QueueConfig,
}

impl Worker {
    /// Runs until the recycle threshold, then returns so the supervisor can
    /// replace it (long-lived process memory hygiene).
    async fn run(self) {
        let mut completions = 0usize;
        let mut non_low_pulls = 0u32;

        while completions < self.config.tasks_per_worker_recycle {
            let force_low = non_low_pulls >= STARVATION_WINDOW;
            let order: [Priority; 3] = if force_low {
                [Priority::Low, Priority::High, Priority::Default]
            } else {
                [Priority::High, Priority::Default, Priority::Low]
            };

            let mut claimed = None;
            for priority in order {
                match self.claim(priority).await {
                    Ok(Some(item)) => {
                        if priority == Priority::Low {
                            non_low_pulls = 0;
                        } else {
                            non_low_pulls += 1;
                        }
                        claimed = Some(item);
                        break;
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Worker {}: claim failed: {}", self.id, e);
                        break;
                    }
                }
            }

            match claimed {
                Some(item) => {
                    self.execute(item).await;
                    completions += 1;
                }
                None => {
                    non_low_pulls = 0;
                    tokio::time::sleep(IDLE_POLL).await;
                }
            }
        }

        info!(
            "Worker {} reached {} completions, recycling",
            self.id, completions
        );
    }

    async fn claim(&self, priority: Priority) -> crate::error::Result<Option<ClaimedItem>> {
        // Lease outlives the hard limit so only dead workers lose items.
        let lease = self.hard_limit_for(priority) as i64 + 30;
        self.queue.claim_one(priority, lease).await
    }

    fn hard_limit_for(&self, _priority: Priority) -> u64 {
        // Per-kind limits apply at execution; the claim lease uses the
        // longest kind on this queue.
        3600.max(self.config.task_hard_limit_s)
    }

    async fn execute(&self, item: ClaimedItem) {
        let kind = item.payload.kind();
        let soft = Duration::from_secs(self.config.task_soft_limit_s);
        let hard = Duration::from_secs(item.payload.hard_limit_s(self.config.task_hard_limit_s));

        info!(
            worker = self.id,
            task = kind,
            item = item.id,
            attempt = item.attempt,
            "task started"
        );
        let started = Instant::now();

        let outcome = tokio::time::timeout(hard, self.handler.handle(&item)).await;
        let elapsed = started.elapsed();

        if elapsed > soft {
            warn!(
                "Task {} item {} ran {:?}, over the soft limit {:?}",
                kind, item.id, elapsed, soft
            );
        }

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(HivemindError::Timeout {
                service: "task",
                seconds: hard.as_secs(),
            }),
        };

        match result {
            Ok(()) => {
                if let Err(e) = self.queue.ack(item.id).await {
                    error!("Ack failed for item {}: {}", item.id, e);
                }
                info!(
                    worker = self.id,
                    task = kind,
                    item = item.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "task finished"
                );
            }
            Err(e) => self.handle_failure(item, e).await,
        }
    }

    async fn handle_failure(&self, item: ClaimedItem, err: HivemindError) {
        let kind = item.payload.kind();
        let exhausted = item
            .payload
            .max_attempts()
            .is_some_and(|max| item.attempt >= max);

        // Validation and security failures never retry.
        let permanent = matches!(
            err,
            HivemindError::Validation(_) | HivemindError::Security(_) | HivemindError::Isolation(_)
        );

        if exhausted || permanent {
            if let Err(e) = self.queue.dead_letter(&item, &err.to_string()).await {
                error!("Dead-letter failed for item {}: {}", item.id, e);
            }
            return;
        }

        let delay = backoff_seconds(item.attempt, rand::random::<f64>());
        warn!(
            "Task {} item {} failed (attempt {}): {}; retrying in {}s",
            kind, item.id, item.attempt, err, delay
        );
        if let Err(e) = self.queue.release_for_retry(item.id, delay).await {
            error!("Retry release failed for item {}: {}", item.id, e);
        }
    }
}
