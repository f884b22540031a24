use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::time::timeout;

use crate::client::Client;
use crate::error::RedisOpError;

/// Real `Client` implementation backed by `redis::aio::ConnectionManager`,
/// which auto-reconnects on transport failure (mirrors the reference
/// codebase's `common_redis::RedisClient`, swapped to a connection manager
/// since `ConnPool` layers its own health/retry semantics on top).
pub struct RedisClient {
    connection: ConnectionManager,
    op_timeout: Duration,
}

impl RedisClient {
    pub async fn new(addr: &str, op_timeout: Duration) -> Result<Self, RedisOpError> {
        let client = redis::Client::open(addr)?;
        let connection = client.get_connection_manager().await?;
        Ok(Self {
            connection,
            op_timeout,
        })
    }

    async fn run<F, T>(&self, fut: F) -> Result<T, RedisOpError>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        Ok(timeout(self.op_timeout, fut).await??)
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn get(&self, key: &str) -> Result<Option<String>, RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.get(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.set(key, value)).await
    }

    async fn setex(&self, key: &str, value: &str, seconds: u64) -> Result<(), RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.set_ex(key, value, seconds)).await
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.expire(key, seconds as i64)).await
    }

    async fn del(&self, key: &str) -> Result<(), RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.del(key)).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.incr(key, delta)).await
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.sadd(key, member)).await
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.srem(key, member)).await
    }

    async fn scard(&self, key: &str) -> Result<u64, RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.scard(key)).await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.smembers(key)).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.zadd(key, member, score)).await
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.zrem(key, member)).await
    }

    async fn zpopmin(&self, key: &str) -> Result<Option<(String, f64)>, RedisOpError> {
        let mut conn = self.connection.clone();
        let result: Vec<(String, f64)> = self.run(conn.zpopmin(key, 1)).await?;
        Ok(result.into_iter().next())
    }

    async fn zcard(&self, key: &str) -> Result<u64, RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.zcard(key)).await
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.zrange_withscores(key, start, stop)).await
    }

    async fn rpush_bounded(
        &self,
        key: &str,
        value: &str,
        max_len: isize,
    ) -> Result<(), RedisOpError> {
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        pipe.rpush(key, value).ignore();
        pipe.ltrim(key, -max_len, -1).ignore();
        self.run(pipe.query_async(&mut conn)).await
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(conn.lrange(key, start, stop)).await
    }

    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>, RedisOpError> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = self
            .run(async {
                use futures::TryStreamExt;
                let iter: redis::AsyncIter<String> = conn.scan_match(pattern).await?;
                iter.try_collect().await
            })
            .await?;
        Ok(keys)
    }

    async fn create_handoff_atomic(
        &self,
        record_key: &str,
        record_json: &str,
        record_ttl_secs: u64,
        queue_key: &str,
        member: &str,
        score: f64,
        project_index_key: &str,
    ) -> Result<(), RedisOpError> {
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.set_ex(record_key, record_json, record_ttl_secs).ignore();
        pipe.zadd(queue_key, member, score).ignore();
        pipe.sadd(project_index_key, member).ignore();
        self.run(pipe.query_async(&mut conn)).await
    }

    async fn batch_zpopmin(
        &self,
        queues: &[String],
    ) -> Result<HashMap<String, Option<(String, f64)>>, RedisOpError> {
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        for q in queues {
            pipe.zpopmin(q, 1);
        }
        let results: Vec<Vec<(String, f64)>> = self.run(pipe.query_async(&mut conn)).await?;
        Ok(queues
            .iter()
            .cloned()
            .zip(results.into_iter().map(|r| r.into_iter().next()))
            .collect())
    }

    async fn batch_zcard(&self, queues: &[String]) -> Result<HashMap<String, u64>, RedisOpError> {
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        for q in queues {
            pipe.zcard(q);
        }
        let results: Vec<u64> = self.run(pipe.query_async(&mut conn)).await?;
        Ok(queues.iter().cloned().zip(results).collect())
    }

    async fn ping(&self) -> Result<(), RedisOpError> {
        let mut conn = self.connection.clone();
        self.run(redis::cmd("PING").query_async(&mut conn)).await
    }
}
