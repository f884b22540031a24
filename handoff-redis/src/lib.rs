//! Component E: the Redis-backed key/value substrate every other
//! component is generic over. Exposes a narrow `Client` trait, a real
//! implementation, an in-memory fake for tests, and the `ConnPool`
//! wrapper providing retry-with-backoff and health reporting.

pub mod client;
pub mod error;
pub mod pool;
pub mod redis_client;
pub mod retry;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use client::Client;
pub use error::RedisOpError;
pub use pool::ConnPool;
pub use redis_client::RedisClient;
pub use retry::RetryPolicy;

#[cfg(any(test, feature = "test-support"))]
pub use mock::MockClient;
