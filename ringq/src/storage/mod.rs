//! Storage layer
//!
//! Every queue, ring and lock operation goes through the [`Store`] trait, which
//! mirrors the small set of atomic Redis primitives the protocols rely on.
//! [`RedisStore`] talks to a real server, [`MemoryStore`] keeps the same
//! semantics in process.

pub mod keys;
pub mod memory;
pub mod redis;

pub use keys::Keys;
pub use memory::MemoryStore;
pub use redis::{RedisConfig, RedisStore};

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Atomic key-value / list / set primitives
///
/// List orientation follows Redis: `lpush` inserts at the head, `brpop` and
/// `rpoplpush` take from the tail.
#[async_trait]
pub trait Store: Send + Sync {
    /// SETNX: set `key` only when absent; true if this call created it
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool>;

    /// GET
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// GETSET: atomically replace the value, returning the previous one
    async fn get_set(&self, key: &str, value: &str) -> Result<Option<String>>;

    /// DEL, returns the number of removed keys
    async fn del(&self, key: &str) -> Result<u64>;

    /// EXISTS
    async fn exists(&self, key: &str) -> Result<bool>;

    /// SADD, returns the number of members actually added
    async fn sadd(&self, key: &str, member: &str) -> Result<u64>;

    /// SREM, returns the number of members removed
    async fn srem(&self, key: &str, member: &str) -> Result<u64>;

    /// LPUSH, returns the new list length
    async fn lpush(&self, key: &str, value: &str) -> Result<u64>;

    /// RPUSH, returns the new list length
    async fn rpush(&self, key: &str, value: &str) -> Result<u64>;

    /// BRPOP on a single list. `None` blocks until an element arrives.
    async fn brpop(&self, key: &str, timeout: Option<Duration>) -> Result<Option<String>>;

    /// RPOPLPUSH: pop the tail of `source` and push it onto the head of `destination`
    async fn rpoplpush(&self, source: &str, destination: &str) -> Result<Option<String>>;

    /// LREM with Redis count semantics (0 = all, >0 from head, <0 from tail)
    async fn lrem(&self, key: &str, count: i64, value: &str) -> Result<u64>;

    /// LRANGE with inclusive, possibly negative, bounds
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    /// LLEN
    async fn llen(&self, key: &str) -> Result<u64>;

    /// WATCH key, EXISTS key, MULTI, LPUSH key value (only if absent), EXEC
    ///
    /// Returns true only when this caller's transaction seeded the list.
    /// A concurrent writer between WATCH and EXEC aborts the transaction.
    async fn lpush_if_absent(&self, key: &str, value: &str) -> Result<bool>;
}
