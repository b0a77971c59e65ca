//! In-process [`KvStore`] implementations for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::{KvError, KvStore};

#[derive(Debug, Clone)]
enum Value {
    Scalar(String),
    List(Vec<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// TTL-aware in-memory [`KvStore`].
///
/// Expiry is lazy: expired entries are dropped on the next access. Counters,
/// scalars, and lists share one namespace, like redis.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_live_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> R) -> R {
        let mut entries = self.entries.lock().expect("memory store lock poisoned");
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));
        f(&mut entries)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        self.with_live_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Scalar("0".to_string()),
                expires_at: None,
            });
            let current = match &entry.value {
                Value::Scalar(raw) => raw.parse::<i64>().unwrap_or(0),
                Value::List(_) => 0,
            };
            let next = current + 1;
            entry.value = Value::Scalar(next.to_string());
            Ok(next)
        })
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, KvError> {
        self.with_live_entries(|entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
                Ok(true)
            }
            None => Ok(false),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.with_live_entries(|entries| {
            Ok(entries.get(key).and_then(|entry| match &entry.value {
                Value::Scalar(raw) => Some(raw.clone()),
                Value::List(_) => None,
            }))
        })
    }

    async fn del(&self, keys: &[String]) -> Result<u64, KvError> {
        self.with_live_entries(|entries| {
            Ok(keys.iter().filter(|key| entries.remove(*key).is_some()).count() as u64)
        })
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<u64, KvError> {
        self.with_live_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::List(Vec::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::List(items) => {
                    items.insert(0, value.to_string());
                    Ok(items.len() as u64)
                }
                Value::Scalar(_) => {
                    entry.value = Value::List(vec![value.to_string()]);
                    Ok(1)
                }
            }
        })
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, KvError> {
        self.with_live_entries(|entries| {
            let items = match entries.get(key) {
                Some(Entry {
                    value: Value::List(items),
                    ..
                }) => items,
                _ => return Ok(Vec::new()),
            };
            let len = items.len() as i64;
            let clamp = |index: i64| -> usize {
                let resolved = if index < 0 { len + index } else { index };
                resolved.clamp(0, len) as usize
            };
            let from = clamp(start);
            let to = if stop < 0 {
                clamp(stop) + 1
            } else {
                (stop as usize + 1).min(items.len())
            };
            if from >= to {
                return Ok(Vec::new());
            }
            Ok(items[from..to].to_vec())
        })
    }

    async fn llen(&self, key: &str) -> Result<u64, KvError> {
        self.with_live_entries(|entries| match entries.get(key) {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => Ok(items.len() as u64),
            _ => Ok(0),
        })
    }
}

/// A store whose every operation fails with [`KvError::Unavailable`].
///
/// Used to exercise the degraded paths: rate-limit fail-open, health
/// recording surfacing errors, selector shedding.
#[derive(Debug, Default)]
pub struct UnavailableStore;

impl UnavailableStore {
    pub fn new() -> Self {
        Self
    }

    fn err<T>() -> Result<T, KvError> {
        Err(KvError::Unavailable("store offline".to_string()))
    }
}

#[async_trait]
impl KvStore for UnavailableStore {
    async fn incr(&self, _key: &str) -> Result<i64, KvError> {
        Self::err()
    }

    async fn expire(&self, _key: &str, _seconds: u64) -> Result<bool, KvError> {
        Self::err()
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
        Self::err()
    }

    async fn del(&self, _keys: &[String]) -> Result<u64, KvError> {
        Self::err()
    }

    async fn lpush(&self, _key: &str, _value: &str) -> Result<u64, KvError> {
        Self::err()
    }

    async fn lrange(&self, _key: &str, _start: i64, _stop: i64) -> Result<Vec<String>, KvError> {
        Self::err()
    }

    async fn llen(&self, _key: &str) -> Result<u64, KvError> {
        Self::err()
    }
}
