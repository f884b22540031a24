//! Component A: the canonical durable home for handoff records and their
//! per-(project, agent) priority queues (spec.md §4.A). Holds no state of
//! its own beyond a `ConnPool` handle — every observable effect goes
//! through the backing store, per the "global mutable state → scoped
//! holders" design note.
use std::sync::Arc;

use chrono::Utc;
use handoff_core::config::StoreConfig;
use handoff_core::{
    project_index_key, queue_name, record_key, CreateHandoffRequest, Handoff, HandoffError,
    Status, REQUEUE_COUNT_METADATA_KEY,
};
use handoff_redis::{Client, ConnPool};
use tracing::{info, warn};
use uuid::Uuid;

mod queues;

pub use queues::{parse_queue_name, QueueInfo};

/// Canonical durable home for handoff records and queues (spec.md §4.A).
pub struct HandoffStore<C: Client> {
    pool: Arc<ConnPool<C>>,
    config: StoreConfig,
}

impl<C: Client + 'static> HandoffStore<C> {
    pub fn new(pool: Arc<ConnPool<C>>, config: StoreConfig) -> Self {
        Self { pool, config }
    }

    /// Validates the request, generates a fresh id, and atomically writes
    /// the record, its queue entry, and its project index membership.
    pub async fn create(&self, req: CreateHandoffRequest) -> Result<Handoff, HandoffError> {
        req.validate()?;

        let now = Utc::now();
        let handoff = Handoff {
            handoff_id: Uuid::now_v7(),
            project_name: req.project_name,
            from_agent: req.from_agent,
            to_agent: req.to_agent,
            created_at: now,
            updated_at: now,
            task_context: req.task_context,
            priority: req.priority.unwrap_or_default(),
            status: Status::Pending,
            content: req.content,
            metadata: req.metadata,
        };

        let serialized_len = handoff.serialized_len()?;
        if serialized_len > self.config.max_payload_bytes {
            return Err(HandoffError::validation(format!(
                "payload of {serialized_len} bytes exceeds the {} byte cap",
                self.config.max_payload_bytes
            )));
        }

        let record_json = serde_json::to_string(&handoff)
            .map_err(|e| HandoffError::internal(format!("serialize handoff: {e}")))?;
        let record_key = record_key(handoff.handoff_id);
        let queue_key = queue_name(&handoff.project_name, &handoff.to_agent);
        let project_key = project_index_key(&handoff.project_name);
        let member = handoff.handoff_id.to_string();
        let score = handoff.score();
        let ttl = self.config.retention_secs;

        self.pool
            .execute_with_retry(|client| {
                let record_key = record_key.clone();
                let record_json = record_json.clone();
                let queue_key = queue_key.clone();
                let member = member.clone();
                let project_key = project_key.clone();
                async move {
                    client
                        .create_handoff_atomic(
                            &record_key,
                            &record_json,
                            ttl,
                            &queue_key,
                            &member,
                            score,
                            &project_key,
                        )
                        .await
                }
            })
            .await?;

        info!(
            handoff_id = %handoff.handoff_id,
            project = %handoff.project_name,
            to_agent = %handoff.to_agent,
            "handoff created"
        );
        Ok(handoff)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Handoff, HandoffError> {
        let key = record_key(id);
        let raw = self
            .pool
            .execute_with_retry(|client| {
                let key = key.clone();
                async move { client.get(&key).await }
            })
            .await?;
        let raw = raw.ok_or_else(|| HandoffError::not_found(format!("handoff {id}")))?;
        serde_json::from_str(&raw)
            .map_err(|e| HandoffError::internal(format!("deserialize handoff {id}: {e}")))
    }

    /// Validates the requested transition, then writes the record back
    /// with a refreshed `updated_at` (which also refreshes the record's
    /// TTL, per SPEC_FULL.md's resolution of the TTL-vs-retry open question).
    pub async fn update_status(
        &self,
        id: Uuid,
        new_status: Status,
    ) -> Result<Handoff, HandoffError> {
        let mut handoff = self.get_by_id(id).await?;

        if !handoff.status.can_transition_to(new_status) {
            return Err(HandoffError::InvalidTransition {
                current: handoff.status,
                requested: new_status,
            });
        }

        handoff.status = new_status;
        handoff.updated_at = Utc::now();

        let record_json = serde_json::to_string(&handoff)
            .map_err(|e| HandoffError::internal(format!("serialize handoff: {e}")))?;
        let key = record_key(id);
        let ttl = self.config.retention_secs;

        self.pool
            .execute_with_retry(|client| {
                let key = key.clone();
                let record_json = record_json.clone();
                async move { client.setex(&key, &record_json, ttl).await }
            })
            .await?;

        Ok(handoff)
    }

    /// Bumps the handoff's `requeue_count` metadata and persists it,
    /// returning the new count. Used by the dispatcher to bound how many
    /// times a saturated agent's queue pushes a handoff back onto itself
    /// (spec.md §4.B step 4).
    pub async fn increment_requeue_count(&self, id: Uuid) -> Result<u32, HandoffError> {
        let mut handoff = self.get_by_id(id).await?;
        let count = handoff.requeue_count() + 1;
        handoff
            .metadata
            .insert(REQUEUE_COUNT_METADATA_KEY.to_string(), serde_json::Value::from(count));
        handoff.updated_at = Utc::now();

        let record_json = serde_json::to_string(&handoff)
            .map_err(|e| HandoffError::internal(format!("serialize handoff: {e}")))?;
        let key = record_key(id);
        let ttl = self.config.retention_secs;

        self.pool
            .execute_with_retry(|client| {
                let key = key.clone();
                let record_json = record_json.clone();
                async move { client.setex(&key, &record_json, ttl).await }
            })
            .await?;

        Ok(count)
    }

    /// Atomically removes and returns the lowest-scored member of `queue`,
    /// or `Empty` when the queue has no ready item. Does not itself change
    /// the popped handoff's status.
    pub async fn pop(&self, queue: &str) -> Result<(Uuid, f64), HandoffError> {
        let popped = self
            .pool
            .execute_with_retry(|client| {
                let queue = queue.to_string();
                async move { client.zpopmin(&queue).await }
            })
            .await?;

        match popped {
            Some((member, score)) => {
                let id = Uuid::parse_str(&member).map_err(|e| {
                    HandoffError::internal(format!("malformed queue member {member}: {e}"))
                })?;
                Ok((id, score))
            }
            None => Err(HandoffError::Empty),
        }
    }

    /// Non-destructive removal of `id` from `queue` (used by cancel).
    pub async fn remove(&self, queue: &str, id: Uuid) -> Result<(), HandoffError> {
        let member = id.to_string();
        self.pool
            .execute_with_retry(|client| {
                let queue = queue.to_string();
                let member = member.clone();
                async move { client.zrem(&queue, &member).await }
            })
            .await?;
        Ok(())
    }

    /// Paginated listing of handoffs for `project`, ordered by project
    /// index membership order; `page` is 1-indexed.
    pub async fn list(
        &self,
        project: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Handoff>, HandoffError> {
        let page_size = self.config.pagination.clamp(page_size);
        let page = page.max(1);

        let project_key = project_index_key(project);
        let members = self
            .pool
            .execute_with_retry(|client| {
                let project_key = project_key.clone();
                async move { client.smembers(&project_key).await }
            })
            .await?;

        let mut sorted_members = members;
        sorted_members.sort();

        let start = ((page - 1) * page_size) as usize;
        let end = start + page_size as usize;
        let page_members = sorted_members
            .into_iter()
            .skip(start)
            .take(end.saturating_sub(start));

        let mut out = Vec::new();
        for member in page_members {
            let Ok(id) = Uuid::parse_str(&member) else {
                warn!(member, "skipping malformed project index member");
                continue;
            };
            match self.get_by_id(id).await {
                Ok(handoff) => out.push(handoff),
                Err(HandoffError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Depth and identifying metadata for every queue, optionally scoped
    /// to a single project.
    pub async fn get_queues(&self, project: Option<&str>) -> Result<Vec<QueueInfo>, HandoffError> {
        let pattern = match project {
            Some(p) => format!("project:{p}:queue:*"),
            None => "project:*:queue:*".to_string(),
        };
        let keys = self.pool.scan_pattern(&pattern).await?;
        let depths = self
            .pool
            .execute_with_retry(|client| {
                let keys = keys.clone();
                async move { client.batch_zcard(&keys).await }
            })
            .await?;

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let Some((project_name, agent_name)) = queues::parse_queue_name(&key) else {
                continue;
            };
            let depth = depths.get(&key).copied().unwrap_or(0);
            let oldest_created_at = self.oldest_created_at(&key).await?;
            out.push(QueueInfo {
                queue_name: key,
                project_name,
                agent_name,
                depth,
                oldest_created_at,
            });
        }
        Ok(out)
    }

    /// `created_at` of the lowest-scored member of `queue`, or `None` if
    /// the queue is empty or its head record has since expired.
    async fn oldest_created_at(
        &self,
        queue: &str,
    ) -> Result<Option<chrono::DateTime<Utc>>, HandoffError> {
        let head = self
            .pool
            .execute_with_retry(|client| {
                let queue = queue.to_string();
                async move { client.zrange_with_scores(&queue, 0, 0).await }
            })
            .await?;

        let Some((member, _score)) = head.into_iter().next() else {
            return Ok(None);
        };
        let Ok(id) = Uuid::parse_str(&member) else {
            return Ok(None);
        };
        match self.get_by_id(id).await {
            Ok(handoff) => Ok(Some(handoff.created_at)),
            Err(HandoffError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_queue_depth(&self, queue: &str) -> Result<u64, HandoffError> {
        let depth = self
            .pool
            .execute_with_retry(|client| {
                let queue = queue.to_string();
                async move { client.zcard(&queue).await }
            })
            .await?;
        Ok(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::Priority;
    use handoff_redis::MockClient;

    fn store() -> HandoffStore<MockClient> {
        let pool = Arc::new(ConnPool::new(
            Arc::new(MockClient::new()),
            handoff_core::config::PoolConfig::default(),
        ));
        HandoffStore::new(pool, StoreConfig::default())
    }

    fn req(project: &str, from: &str, to: &str, summary: &str) -> CreateHandoffRequest {
        CreateHandoffRequest {
            project_name: project.into(),
            from_agent: from.into(),
            to_agent: to.into(),
            content: handoff_core::Content {
                summary: summary.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store();
        let created = store.create(req("p", "a", "b", "do it")).await.unwrap();
        let fetched = store.get_by_id(created.handoff_id).await.unwrap();
        assert_eq!(created, fetched);
    }

    #[tokio::test]
    async fn create_rejects_empty_summary() {
        let store = store();
        let result = store.create(req("p", "a", "b", "")).await;
        assert!(matches!(result, Err(HandoffError::Validation(_))));
    }

    #[tokio::test]
    async fn pop_on_empty_queue_is_empty_error() {
        let store = store();
        let result = store.pop("project:p:queue:nobody").await;
        assert!(matches!(result, Err(HandoffError::Empty)));
    }

    #[tokio::test]
    async fn priority_ordering_pops_urgent_before_normal() {
        let store = store();
        let mut r1 = req("p", "x", "a", "first");
        r1.priority = Some(Priority::Normal);
        let mut r2 = req("p", "x", "a", "second");
        r2.priority = Some(Priority::Urgent);

        let h1 = store.create(r1).await.unwrap();
        let h2 = store.create(r2).await.unwrap();

        let (popped_first, _) = store.pop(&h1.queue_name()).await.unwrap();
        assert_eq!(popped_first, h2.handoff_id);
        let (popped_second, _) = store.pop(&h1.queue_name()).await.unwrap();
        assert_eq!(popped_second, h1.handoff_id);
    }

    #[tokio::test]
    async fn update_status_rejects_invalid_transition() {
        let store = store();
        let created = store.create(req("p", "a", "b", "do it")).await.unwrap();
        let result = store
            .update_status(created.handoff_id, Status::Completed)
            .await;
        assert!(matches!(result, Err(HandoffError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn update_status_allows_documented_path() {
        let store = store();
        let created = store.create(req("p", "a", "b", "do it")).await.unwrap();
        store
            .update_status(created.handoff_id, Status::Processing)
            .await
            .unwrap();
        let completed = store
            .update_status(created.handoff_id, Status::Completed)
            .await
            .unwrap();
        assert_eq!(completed.status, Status::Completed);
        assert!(completed.updated_at >= completed.created_at);
    }

    #[tokio::test]
    async fn multi_tenant_projects_have_isolated_queue_depth() {
        let store = store();
        store.create(req("p1", "x", "a", "one")).await.unwrap();
        store.create(req("p1", "x", "a", "two")).await.unwrap();
        store.create(req("p2", "x", "a", "three")).await.unwrap();

        assert_eq!(
            store.get_queue_depth("project:p1:queue:a").await.unwrap(),
            2
        );
        assert_eq!(
            store.get_queue_depth("project:p2:queue:a").await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn list_respects_page_size_clamping() {
        let store = store();
        for i in 0..5 {
            store
                .create(req("p", "x", "a", &format!("item {i}")))
                .await
                .unwrap();
        }
        let page = store.list("p", 1, 0).await.unwrap();
        assert_eq!(page.len(), 5.min(store.config.pagination.default_page_size as usize));
    }

    #[tokio::test]
    async fn get_queues_reports_depth_per_project_agent_pair() {
        let store = store();
        store.create(req("p", "x", "a", "one")).await.unwrap();
        store.create(req("p", "x", "b", "two")).await.unwrap();

        let queues = store.get_queues(Some("p")).await.unwrap();
        assert_eq!(queues.len(), 2);
        assert!(queues.iter().all(|q| q.depth == 1));
        assert!(queues.iter().all(|q| q.oldest_created_at.is_some()));
    }

    #[tokio::test]
    async fn get_queues_reports_none_for_empty_pattern_match() {
        let store = store();
        let queues = store.get_queues(Some("nobody")).await.unwrap();
        assert!(queues.is_empty());
    }

    #[tokio::test]
    async fn increment_requeue_count_persists_across_reads() {
        let store = store();
        let created = store.create(req("p", "x", "a", "one")).await.unwrap();
        assert_eq!(created.requeue_count(), 0);

        let first = store.increment_requeue_count(created.handoff_id).await.unwrap();
        assert_eq!(first, 1);
        let second = store.increment_requeue_count(created.handoff_id).await.unwrap();
        assert_eq!(second, 2);

        let reloaded = store.get_by_id(created.handoff_id).await.unwrap();
        assert_eq!(reloaded.requeue_count(), 2);
    }
}
