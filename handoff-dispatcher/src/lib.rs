//! Component B: drains every `(project, agent)` queue, invokes the
//! target agent, archives successful outcomes, and publishes follow-up
//! handoffs through the Router (spec.md §4.B).
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use handoff_core::config::DispatcherConfig;
use handoff_core::health::HealthHandle;
use handoff_core::{
    AgentCapabilities, CreateHandoffRequest, Handoff, HandoffError, Status, ACTIVE_AGENTS_KEY,
    ACTIVE_AGENTS_TTL_SECS, METRICS_COMPLETED_KEY, METRICS_COUNTER_TTL_SECS, METRICS_FAILED_KEY,
    METRICS_TOTAL_KEY, PROCESSING_TIMES_KEY,
};
use handoff_redis::{Client, ConnPool};
use handoff_router::Router;
use handoff_store::HandoffStore;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

pub mod archive;
pub mod invoker;

pub use invoker::{InvocationResult, Invoker, NextHandoffRequest, ScriptInvoker};
#[cfg(feature = "test-support")]
pub use invoker::FakeInvoker;

/// Per-agent concurrency gate, modeled on the reference codebase's
/// semaphore-bounded `WebhookWorker`.
struct AgentPool {
    capabilities: AgentCapabilities,
    semaphore: Arc<Semaphore>,
}

/// Drains queues, invokes agents, archives completed records, and routes
/// follow-ups (spec.md §4.B). Holds no mutable state beyond its own
/// per-agent semaphores; the store and router are the sole authorities
/// for durable state.
pub struct Dispatcher<C: Client, I: Invoker> {
    pool: Arc<ConnPool<C>>,
    store: Arc<HandoffStore<C>>,
    router: Arc<Router>,
    invoker: Arc<I>,
    agents: HashMap<String, AgentPool>,
    config: DispatcherConfig,
    archive_root: String,
}

impl<C: Client + 'static, I: Invoker + 'static> Dispatcher<C, I> {
    pub fn new(
        pool: Arc<ConnPool<C>>,
        store: Arc<HandoffStore<C>>,
        router: Arc<Router>,
        invoker: Arc<I>,
        agents: Vec<AgentCapabilities>,
        config: DispatcherConfig,
        archive_root: impl Into<String>,
    ) -> Self {
        let agents = agents
            .into_iter()
            .map(|capabilities| {
                let semaphore = Arc::new(Semaphore::new(capabilities.max_concurrent));
                (
                    capabilities.name.clone(),
                    AgentPool {
                        capabilities,
                        semaphore,
                    },
                )
            })
            .collect();

        Self {
            pool,
            store,
            router,
            invoker,
            agents,
            config,
            archive_root: archive_root.into(),
        }
    }

    /// Runs the scan/pop/dispatch loop until `shutdown` resolves, then
    /// waits up to `drain_deadline_secs` for in-flight workers before
    /// returning (spec.md §5 graceful shutdown).
    pub async fn run(&self, mut shutdown: tokio::sync::oneshot::Receiver<()>, health: HealthHandle) {
        let mut idle_backoff = Duration::from_millis(self.config.idle_sleep_min_ms);
        let max_backoff = Duration::from_millis(self.config.idle_sleep_max_ms);
        let mut in_flight = tokio::task::JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("dispatcher received shutdown signal, draining in-flight work");
                    break;
                }
                did_work = self.tick(&mut in_flight) => {
                    health.report_healthy().await;
                    if did_work {
                        idle_backoff = Duration::from_millis(self.config.idle_sleep_min_ms);
                    } else {
                        tokio::time::sleep(idle_backoff).await;
                        idle_backoff = (idle_backoff * 2).min(max_backoff);
                    }
                }
            }
        }

        let drain_deadline = Duration::from_secs(self.config.drain_deadline_secs);
        let drained = tokio::time::timeout(drain_deadline, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("dispatcher drain deadline exceeded; abandoning remaining in-flight workers");
        }
    }

    /// One scan/pop/dispatch pass. Returns whether any work was found.
    async fn tick(&self, in_flight: &mut tokio::task::JoinSet<()>) -> bool {
        let queues = match self.pool.scan_pattern("project:*:queue:*").await {
            Ok(queues) => queues,
            Err(err) => {
                error!(error = %err, "failed to scan queues");
                return false;
            }
        };
        if queues.is_empty() {
            return false;
        }

        let batch: Vec<String> = queues
            .into_iter()
            .take(self.config.scan_batch_limit)
            .collect();

        let popped = match self.pool.batch_pop(batch).await {
            Ok(popped) => popped,
            Err(err) => {
                error!(error = %err, "batched pop failed");
                return false;
            }
        };

        let mut did_work = false;
        for (queue, entry) in popped {
            let Some((member, score)) = entry else {
                continue;
            };
            did_work = true;
            self.dispatch_one(&queue, &member, score, in_flight).await;
        }
        did_work
    }

    async fn dispatch_one(
        &self,
        queue: &str,
        member: &str,
        score: f64,
        in_flight: &mut tokio::task::JoinSet<()>,
    ) {
        let Some((_project, agent_name)) = handoff_store::parse_queue_name(queue) else {
            warn!(queue, "popped from malformed queue name, dropping");
            return;
        };

        let id = match uuid::Uuid::parse_str(member) {
            Ok(id) => id,
            Err(e) => {
                warn!(member, error = %e, "malformed handoff id in queue, dropping");
                return;
            }
        };

        let Some(agent_pool) = self.agents.get(&agent_name) else {
            warn!(agent = %agent_name, "popped handoff for unregistered agent, re-enqueuing");
            self.requeue_or_fail(queue, member, score, id).await;
            return;
        };

        let permit = match agent_pool.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                // Capacity exhausted: push back onto the same queue at the
                // same score rather than block (spec.md §4.B step 4), up to
                // the configured retry cap.
                self.requeue_or_fail(queue, member, score, id).await;
                return;
            }
        };

        let store = self.store.clone();
        let router = self.router.clone();
        let invoker = self.invoker.clone();
        let pool = self.pool.clone();
        let archive_root = self.archive_root.clone();
        let agent_name_for_task = agent_name.clone();
        let max_hop_count = self.config.max_hop_count;
        let processing_times_window = self.config.processing_times_window;

        in_flight.spawn(async move {
            let _permit = permit;
            process_one(
                store,
                router,
                invoker,
                pool,
                archive_root,
                agent_name_for_task,
                id,
                max_hop_count,
                processing_times_window,
            )
            .await;
        });
    }

    async fn requeue(&self, queue: &str, member: &str, score: f64) {
        if let Err(err) = self
            .pool
            .execute_with_retry(|client| {
                let queue = queue.to_string();
                let member = member.to_string();
                async move { client.zadd(&queue, &member, score).await }
            })
            .await
        {
            error!(queue, member, error = %err, "failed to re-enqueue handoff");
        }
    }

    /// Bumps `id`'s requeue count and either pushes it back onto `queue`
    /// or, once `worker_requeue_max_attempts` is exceeded, marks it
    /// `failed` instead of retrying forever (spec.md §4.B step 4).
    async fn requeue_or_fail(&self, queue: &str, member: &str, score: f64, id: uuid::Uuid) {
        match self.store.increment_requeue_count(id).await {
            Ok(count) if count > self.config.worker_requeue_max_attempts => {
                warn!(
                    handoff_id = %id,
                    count,
                    max = self.config.worker_requeue_max_attempts,
                    "requeue attempts exhausted, marking handoff failed"
                );
                if let Err(err) = self.store.update_status(id, Status::Failed).await {
                    error!(handoff_id = %id, error = %err, "failed to mark exhausted handoff failed");
                }
            }
            Ok(_) => {
                self.requeue(queue, member, score).await;
            }
            Err(HandoffError::NotFound(_)) => {
                info!(handoff_id = %id, "record missing while requeuing, dropping");
            }
            Err(err) => {
                error!(handoff_id = %id, error = %err, "failed to bump requeue count, requeuing anyway");
                self.requeue(queue, member, score).await;
            }
        }
    }
}

/// The per-handoff worker body: transition to `processing`, invoke the
/// agent, then archive + route on success or mark `failed` on error
/// (spec.md §4.B step 5).
async fn process_one<C: Client + 'static, I: Invoker>(
    store: Arc<HandoffStore<C>>,
    router: Arc<Router>,
    invoker: Arc<I>,
    pool: Arc<ConnPool<C>>,
    archive_root: String,
    agent_name: String,
    id: uuid::Uuid,
    max_hop_count: u32,
    processing_times_window: usize,
) {
    let handoff = match store.update_status(id, Status::Processing).await {
        Ok(handoff) => handoff,
        Err(HandoffError::NotFound(_)) => {
            info!(handoff_id = %id, "record missing at dispatch time, skipping (no re-queue)");
            return;
        }
        Err(err) => {
            error!(handoff_id = %id, error = %err, "failed to mark handoff processing");
            return;
        }
    };

    let started_at = std::time::Instant::now();
    let result = invoker.invoke(&agent_name, &handoff).await;
    let elapsed_ms = started_at.elapsed().as_millis() as u64;
    let success = matches!(result, Ok(ref invocation) if invocation.success);
    record_dispatch_metrics(&pool, &agent_name, success, elapsed_ms, processing_times_window).await;

    match result {
        Ok(invocation) if invocation.success => {
            if let Err(err) = store.update_status(id, Status::Completed).await {
                error!(handoff_id = %id, error = %err, "failed to mark handoff completed");
                return;
            }

            let completed = match store.get_by_id(id).await {
                Ok(h) => h,
                Err(err) => {
                    error!(handoff_id = %id, error = %err, "failed to reload completed handoff");
                    return;
                }
            };

            if let Err(err) = archive::archive_handoff(&archive_root, &completed).await {
                error!(handoff_id = %id, error = %err, "CRITICAL: failed to archive completed handoff");
            }

            metrics::counter!("handoff_dispatcher_completed_total").increment(1);
            publish_followups(&store, &router, &completed, &invocation, max_hop_count).await;
        }
        Ok(_failure) => {
            mark_failed(&store, id, "invoker reported failure").await;
        }
        Err(err) => {
            mark_failed(&store, id, &err.to_string()).await;
        }
    }
}

/// Writes the durable counters and heartbeat the Monitor's `tick` reads
/// (spec.md §4.B step 6 / §4.D / §6 persisted key schema). Best-effort:
/// a write failure is logged and never affects the handoff's own status.
async fn record_dispatch_metrics<C: Client + 'static>(
    pool: &ConnPool<C>,
    agent_name: &str,
    success: bool,
    elapsed_ms: u64,
    processing_times_window: usize,
) {
    bump_counter(pool, METRICS_TOTAL_KEY).await;
    bump_counter(pool, if success { METRICS_COMPLETED_KEY } else { METRICS_FAILED_KEY }).await;

    let elapsed = elapsed_ms.to_string();
    let window = processing_times_window as isize;
    if let Err(err) = pool
        .execute_with_retry(|client| {
            let elapsed = elapsed.clone();
            async move { client.rpush_bounded(PROCESSING_TIMES_KEY, &elapsed, window).await }
        })
        .await
    {
        warn!(error = %err, "failed to record processing time");
    }

    let agent = agent_name.to_string();
    let heartbeat = pool
        .execute_with_retry(|client| {
            let agent = agent.clone();
            async move { client.sadd(ACTIVE_AGENTS_KEY, &agent).await }
        })
        .await;
    match heartbeat {
        Ok(()) => {
            if let Err(err) = pool
                .execute_with_retry(|client| async move {
                    client.expire(ACTIVE_AGENTS_KEY, ACTIVE_AGENTS_TTL_SECS).await
                })
                .await
            {
                warn!(error = %err, "failed to refresh active-agent heartbeat ttl");
            }
        }
        Err(err) => warn!(error = %err, "failed to record active-agent heartbeat"),
    }
}

async fn bump_counter<C: Client + 'static>(pool: &ConnPool<C>, key: &'static str) {
    if let Err(err) = pool
        .execute_with_retry(|client| async move { client.incr_by(key, 1).await })
        .await
    {
        warn!(key, error = %err, "failed to bump metrics counter");
        return;
    }
    if let Err(err) = pool
        .execute_with_retry(|client| async move { client.expire(key, METRICS_COUNTER_TTL_SECS).await })
        .await
    {
        warn!(key, error = %err, "failed to set metrics counter ttl");
    }
}

async fn mark_failed<C: Client + 'static>(store: &HandoffStore<C>, id: uuid::Uuid, reason: &str) {
    warn!(handoff_id = %id, reason, "handoff failed");
    if let Err(err) = store.update_status(id, Status::Failed).await {
        error!(handoff_id = %id, error = %err, "failed to mark handoff failed");
    }
    metrics::counter!("handoff_dispatcher_failed_total").increment(1);
}

/// Asks the Router for the next hop and creates follow-up handoffs for
/// every match, inheriting `project_name`/`task_context` and carrying a
/// snapshot of the completed handoff's artifacts and next steps
/// (spec.md §4.B step 5), while incrementing `hop_count` to bound cycles.
async fn publish_followups<C: Client + 'static>(
    store: &HandoffStore<C>,
    router: &Router,
    completed: &Handoff,
    invocation: &InvocationResult,
    max_hop_count: u32,
) {
    let hop_count = completed.hop_count();
    if hop_count >= max_hop_count {
        warn!(handoff_id = %completed.handoff_id, hop_count, "hop count cap reached, not routing further");
        return;
    }

    match router.route(&completed.to_agent, completed) {
        Ok(target_agent) => {
            let mut metadata = completed.metadata.clone();
            metadata.insert("hop_count".to_string(), serde_json::Value::from(hop_count + 1));

            let req = CreateHandoffRequest {
                project_name: completed.project_name.clone(),
                from_agent: completed.to_agent.clone(),
                to_agent: target_agent,
                task_context: completed.task_context.clone(),
                priority: Some(completed.priority),
                content: handoff_core::Content {
                    summary: invocation.output.clone(),
                    artifacts: completed.content.artifacts.clone(),
                    next_steps: completed.content.next_steps.clone(),
                    ..Default::default()
                },
                metadata,
            };
            if let Err(err) = store.create(req).await {
                error!(handoff_id = %completed.handoff_id, error = %err, "failed to publish follow-up handoff");
            }
        }
        Err(HandoffError::NoRoute) => {
            info!(handoff_id = %completed.handoff_id, "no route for follow-up, stopping chain");
        }
        Err(err) => {
            error!(handoff_id = %completed.handoff_id, error = %err, "router error");
        }
    }

    for followup in &invocation.next_handoff_requests {
        let mut metadata = completed.metadata.clone();
        metadata.insert("hop_count".to_string(), serde_json::Value::from(hop_count + 1));
        let req = CreateHandoffRequest {
            project_name: completed.project_name.clone(),
            from_agent: completed.to_agent.clone(),
            to_agent: followup.target.clone(),
            task_context: completed.task_context.clone(),
            priority: Some(completed.priority),
            content: handoff_core::Content {
                summary: followup.summary.clone(),
                ..Default::default()
            },
            metadata,
        };
        if let Err(err) = store.create(req).await {
            error!(handoff_id = %completed.handoff_id, error = %err, "failed to publish invoker-requested follow-up");
        }
    }
}
