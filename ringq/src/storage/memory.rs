//! In-memory store
//!
//! Keeps strings, lists and sets in one keyspace behind a mutex. Lists follow
//! Redis orientation (index 0 is the head) and vanish when emptied, so
//! `exists` behaves like it does against a server. Blocking pops park on a
//! `Notify` that every push wakes.

use super::Store;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    Set(HashSet<String>),
}

/// In-process [`Store`] with Redis semantics
#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspace: Mutex<HashMap<String, Value>>,
    pushed: Notify,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently present
    pub fn key_count(&self) -> usize {
        self.keyspace().len()
    }

    fn keyspace(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.keyspace.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wrong_type(key: &str) -> Error {
        Error::Store(format!(
            "WRONGTYPE Operation against a key holding the wrong kind of value: {}",
            key
        ))
    }

    fn push(&self, key: &str, value: &str, head: bool) -> Result<u64> {
        let len = {
            let mut keyspace = self.keyspace();
            let entry = keyspace
                .entry(key.to_string())
                .or_insert_with(|| Value::List(VecDeque::new()));
            let Value::List(list) = entry else {
                return Err(Self::wrong_type(key));
            };
            if head {
                list.push_front(value.to_string());
            } else {
                list.push_back(value.to_string());
            }
            list.len() as u64
        };
        self.pushed.notify_waiters();
        Ok(len)
    }

    fn pop_tail(keyspace: &mut HashMap<String, Value>, key: &str) -> Result<Option<String>> {
        let popped = match keyspace.get_mut(key) {
            None => return Ok(None),
            Some(Value::List(list)) => list.pop_back(),
            Some(_) => return Err(Self::wrong_type(key)),
        };
        Self::drop_if_empty(keyspace, key);
        Ok(popped)
    }

    fn drop_if_empty(keyspace: &mut HashMap<String, Value>, key: &str) {
        let empty = match keyspace.get(key) {
            Some(Value::List(list)) => list.is_empty(),
            Some(Value::Set(set)) => set.is_empty(),
            _ => false,
        };
        if empty {
            keyspace.remove(key);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
        let mut keyspace = self.keyspace();
        if keyspace.contains_key(key) {
            return Ok(false);
        }
        keyspace.insert(key.to_string(), Value::Str(value.to_string()));
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.keyspace().get(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn get_set(&self, key: &str, value: &str) -> Result<Option<String>> {
        let mut keyspace = self.keyspace();
        let previous = match keyspace.get(key) {
            None => None,
            Some(Value::Str(s)) => Some(s.clone()),
            Some(_) => return Err(Self::wrong_type(key)),
        };
        keyspace.insert(key.to_string(), Value::Str(value.to_string()));
        Ok(previous)
    }

    async fn del(&self, key: &str) -> Result<u64> {
        Ok(self.keyspace().remove(key).map_or(0, |_| 1))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.keyspace().contains_key(key))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<u64> {
        let mut keyspace = self.keyspace();
        let entry = keyspace
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(HashSet::new()));
        let Value::Set(set) = entry else {
            return Err(Self::wrong_type(key));
        };
        Ok(u64::from(set.insert(member.to_string())))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<u64> {
        let mut keyspace = self.keyspace();
        let removed = match keyspace.get_mut(key) {
            None => return Ok(0),
            Some(Value::Set(set)) => set.remove(member),
            Some(_) => return Err(Self::wrong_type(key)),
        };
        Self::drop_if_empty(&mut keyspace, key);
        Ok(u64::from(removed))
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<u64> {
        self.push(key, value, true)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64> {
        self.push(key, value, false)
    }

    async fn brpop(&self, key: &str, timeout: Option<Duration>) -> Result<Option<String>> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            // Register interest before looking, so a push in between is not missed
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let popped = {
                let mut keyspace = self.keyspace();
                Self::pop_tail(&mut keyspace, key)?
            };
            if popped.is_some() {
                return Ok(popped);
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    async fn rpoplpush(&self, source: &str, destination: &str) -> Result<Option<String>> {
        let moved = {
            let mut keyspace = self.keyspace();
            if let Some(Value::Str(_) | Value::Set(_)) = keyspace.get(destination) {
                return Err(Self::wrong_type(destination));
            }
            let Some(value) = Self::pop_tail(&mut keyspace, source)? else {
                return Ok(None);
            };
            let entry = keyspace
                .entry(destination.to_string())
                .or_insert_with(|| Value::List(VecDeque::new()));
            if let Value::List(list) = entry {
                list.push_front(value.clone());
            }
            value
        };
        self.pushed.notify_waiters();
        Ok(Some(moved))
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> Result<u64> {
        let mut keyspace = self.keyspace();
        let list = match keyspace.get_mut(key) {
            None => return Ok(0),
            Some(Value::List(list)) => list,
            Some(_) => return Err(Self::wrong_type(key)),
        };

        let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
        let mut removed = 0usize;

        if count >= 0 {
            let mut i = 0;
            while i < list.len() && removed < limit {
                if list[i] == value {
                    list.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let mut i = list.len();
            while i > 0 && removed < limit {
                i -= 1;
                if list[i] == value {
                    list.remove(i);
                    removed += 1;
                }
            }
        }

        Self::drop_if_empty(&mut keyspace, key);
        Ok(removed as u64)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let keyspace = self.keyspace();
        let list = match keyspace.get(key) {
            None => return Ok(Vec::new()),
            Some(Value::List(list)) => list,
            Some(_) => return Err(Self::wrong_type(key)),
        };

        let len = list.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }

        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    async fn llen(&self, key: &str) -> Result<u64> {
        match self.keyspace().get(key) {
            None => Ok(0),
            Some(Value::List(list)) => Ok(list.len() as u64),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn lpush_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        // The mutex makes check-and-push one step, which is what a WATCH that
        // never fires would give
        let seeded = {
            let mut keyspace = self.keyspace();
            if keyspace.contains_key(key) {
                false
            } else {
                keyspace.insert(
                    key.to_string(),
                    Value::List(VecDeque::from([value.to_string()])),
                );
                true
            }
        };
        if seeded {
            self.pushed.notify_waiters();
        }
        Ok(seeded)
    }
}
