use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::RedisOpError;

/// The narrow set of KV-store primitives the broker needs. Mirrors the
/// reference codebase's `common_redis::Client` trait: a thin async trait
/// implemented once against the real store and once as an in-memory fake
/// for tests, so every higher-level component is generic over `C: Client`.
#[async_trait]
pub trait Client: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RedisOpError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), RedisOpError>;
    async fn setex(&self, key: &str, value: &str, seconds: u64) -> Result<(), RedisOpError>;
    async fn expire(&self, key: &str, seconds: u64) -> Result<(), RedisOpError>;
    async fn del(&self, key: &str) -> Result<(), RedisOpError>;
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, RedisOpError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<(), RedisOpError>;
    async fn srem(&self, key: &str, member: &str) -> Result<(), RedisOpError>;
    async fn scard(&self, key: &str) -> Result<u64, RedisOpError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, RedisOpError>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), RedisOpError>;
    async fn zrem(&self, key: &str, member: &str) -> Result<(), RedisOpError>;
    /// Atomically remove and return the lowest-scored member, or `None` if empty.
    async fn zpopmin(&self, key: &str) -> Result<Option<(String, f64)>, RedisOpError>;
    async fn zcard(&self, key: &str) -> Result<u64, RedisOpError>;
    async fn zrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, RedisOpError>;

    /// Push a value onto a bounded list, trimming it to `max_len` most-recent entries.
    async fn rpush_bounded(&self, key: &str, value: &str, max_len: isize) -> Result<(), RedisOpError>;
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, RedisOpError>;

    /// Non-blocking key enumeration (`ConnPool::ScanPattern`).
    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>, RedisOpError>;

    /// Atomically write the handoff record, enqueue it, and index it by
    /// project, as a single multi-key transaction (spec.md §4.A `Create`).
    async fn create_handoff_atomic(
        &self,
        record_key: &str,
        record_json: &str,
        record_ttl_secs: u64,
        queue_key: &str,
        member: &str,
        score: f64,
        project_index_key: &str,
    ) -> Result<(), RedisOpError>;

    /// Pop the lowest-scored member from each of `queues` in a single
    /// pipeline (`ConnPool::BatchPop`, spec.md §4.E / §4.B step 2).
    async fn batch_zpopmin(
        &self,
        queues: &[String],
    ) -> Result<HashMap<String, Option<(String, f64)>>, RedisOpError>;

    /// Batched `ZCARD` over several queues in a single round-trip.
    async fn batch_zcard(&self, queues: &[String]) -> Result<HashMap<String, u64>, RedisOpError>;

    /// A lightweight liveness probe (`PING`).
    async fn ping(&self) -> Result<(), RedisOpError>;
}
