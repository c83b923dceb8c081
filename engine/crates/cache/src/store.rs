use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use dashmap::mapref::entry::Entry as Slot;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::clock::SharedClock;
use crate::error::CacheError;
use crate::pattern::glob_match;

const DEFAULT_SHARDS: usize = 16;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    /// Absolute expiry in clock millis; `None` never expires.
    expires_at: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// In-process key-value store with per-key TTL.
///
/// Backed by a `DashMap`, so every single-key operation runs under one shard
/// lock and is atomic. Expired entries are invisible to reads, dropped lazily
/// by writes and in bulk by [`CacheStore::purge_expired`].
#[derive(Debug)]
pub struct CacheStore {
    map: DashMap<String, Entry>,
    clock: SharedClock,
}

impl CacheStore {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_shards(clock, DEFAULT_SHARDS)
    }

    /// `shards` is rounded up to a power of two of at least 2.
    pub fn with_shards(clock: SharedClock, shards: usize) -> Self {
        Self {
            map: DashMap::with_shard_amount(shards.max(2).next_power_of_two()),
            clock,
        }
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    fn expiry(&self, ttl: Option<Duration>) -> Option<i64> {
        ttl.map(|t| self.now_millis() + t.as_millis() as i64)
    }

    /// Read the live entry for `key`.
    fn read<R>(&self, key: &str, f: impl FnOnce(&Entry) -> R) -> Option<R> {
        let now = self.now_millis();
        self.map.get(key).filter(|e| !e.is_expired(now)).map(|e| f(&e))
    }

    /// Mutate the live entry for `key` in place. Never creates one.
    fn modify<R>(&self, key: &str, f: impl FnOnce(&mut Entry) -> R) -> Option<R> {
        let now = self.now_millis();
        self.map
            .get_mut(key)
            .filter(|e| !e.is_expired(now))
            .map(|mut e| f(&mut e))
    }

    /// Mutate the entry for `key`, creating it with `init` when absent or
    /// expired. A new entry has no TTL.
    fn upsert<R>(&self, key: &str, init: impl FnOnce() -> Value, f: impl FnOnce(&mut Entry) -> R) -> R {
        let now = self.now_millis();
        let fresh = || Entry {
            value: init(),
            expires_at: None,
        };
        match self.map.entry(key.to_string()) {
            Slot::Occupied(mut slot) => {
                if slot.get().is_expired(now) {
                    slot.insert(fresh());
                }
                f(slot.get_mut())
            }
            Slot::Vacant(slot) => f(slot.insert(fresh()).value_mut()),
        }
    }

    // ---- strings ----

    pub fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.read(key, |entry| match &entry.value {
            Value::Str(s) => Ok(s.clone()),
            other => Err(wrong_type(key, "string", other)),
        })
        .transpose()
    }

    /// Store a string without expiry, clearing any previous TTL.
    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<(), CacheError> {
        self.put(key, Value::Str(value.into()), None)
    }

    pub fn set_ex(&self, key: &str, value: impl Into<String>, ttl: Duration) -> Result<(), CacheError> {
        self.put(key, Value::Str(value.into()), Some(ttl))
    }

    /// Set only when the key is absent (or expired). Returns whether it was set.
    pub fn setnx_ex(&self, key: &str, value: impl Into<String>, ttl: Duration) -> Result<bool, CacheError> {
        let now = self.now_millis();
        let entry = Entry {
            value: Value::Str(value.into()),
            expires_at: self.expiry(Some(ttl)),
        };
        match self.map.entry(key.to_string()) {
            Slot::Occupied(mut slot) => {
                if !slot.get().is_expired(now) {
                    return Ok(false);
                }
                slot.insert(entry);
            }
            Slot::Vacant(slot) => {
                slot.insert(entry);
            }
        }
        Ok(true)
    }

    fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let expires_at = self.expiry(ttl);
        self.map.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_json_ex<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        self.set_ex(key, raw, ttl)
    }

    // ---- generic key ops ----

    pub fn del(&self, key: &str) -> Result<bool, CacheError> {
        let now = self.now_millis();
        Ok(self.map.remove(key).is_some_and(|(_, e)| !e.is_expired(now)))
    }

    pub fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.read(key, |_| ()).is_some())
    }

    /// Reset the TTL of an existing key. Returns false when the key is absent.
    pub fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let expires_at = self.expiry(Some(ttl));
        Ok(self.modify(key, |entry| entry.expires_at = expires_at).is_some())
    }

    /// Remaining lifetime, or `None` for a missing or persistent key.
    pub fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let now = self.now_millis();
        Ok(self
            .read(key, |e| e.expires_at)
            .flatten()
            .map(|at| Duration::from_millis((at - now).max(0) as u64)))
    }

    /// All live keys matching a `*` glob pattern, sorted.
    pub fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let now = self.now_millis();
        let mut keys: Vec<String> = self
            .map
            .iter()
            .filter(|e| !e.value().is_expired(now) && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Delete every live key matching `pattern`. Returns the number removed.
    pub fn del_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut removed = 0;
        for key in self.scan(pattern)? {
            if self.del(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Drop all expired entries. Returns the number evicted.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = self.now_millis();
        let mut evicted = 0;
        self.map.retain(|_, e| {
            let keep = !e.is_expired(now);
            if !keep {
                evicted += 1;
            }
            keep
        });
        Ok(evicted)
    }

    pub fn len(&self) -> usize {
        let now = self.now_millis();
        self.map.iter().filter(|e| !e.value().is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- hashes ----

    pub fn hset(&self, key: &str, field: &str, value: impl Into<String>) -> Result<(), CacheError> {
        self.hset_many(key, &[(field, value.into())])
    }

    /// Set several hash fields at once, creating the hash if needed. An
    /// existing TTL is preserved.
    pub fn hset_many(&self, key: &str, fields: &[(&str, String)]) -> Result<(), CacheError> {
        self.upsert(key, || Value::Hash(HashMap::new()), |entry| match &mut entry.value {
            Value::Hash(map) => {
                for (f, v) in fields {
                    map.insert((*f).to_string(), v.clone());
                }
                Ok(())
            }
            other => Err(wrong_type(key, "hash", other)),
        })
    }

    /// Set one field of a hash that is still live. Returns false, creating
    /// nothing, when the key is gone.
    pub fn hset_existing(&self, key: &str, field: &str, value: impl Into<String>) -> Result<bool, CacheError> {
        self.modify(key, |entry| match &mut entry.value {
            Value::Hash(map) => {
                map.insert(field.to_string(), value.into());
                Ok(())
            }
            other => Err(wrong_type(key, "hash", other)),
        })
        .transpose()
        .map(|set| set.is_some())
    }

    pub fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.read(key, |entry| match &entry.value {
            Value::Hash(map) => Ok(map.get(field).cloned()),
            other => Err(wrong_type(key, "hash", other)),
        })
        .transpose()
        .map(Option::flatten)
    }

    pub fn hgetall(&self, key: &str) -> Result<Option<HashMap<String, String>>, CacheError> {
        self.read(key, |entry| match &entry.value {
            Value::Hash(map) => Ok(map.clone()),
            other => Err(wrong_type(key, "hash", other)),
        })
        .transpose()
    }

    // ---- sets ----

    /// Add a member. Returns true when it was not already present.
    pub fn sadd(&self, key: &str, member: impl Into<String>) -> Result<bool, CacheError> {
        self.upsert(key, || Value::Set(BTreeSet::new()), |entry| match &mut entry.value {
            Value::Set(set) => Ok(set.insert(member.into())),
            other => Err(wrong_type(key, "set", other)),
        })
    }

    /// Remove a member. Returns true when it was present. An emptied set is
    /// deleted.
    pub fn srem(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let removed = self
            .modify(key, |entry| match &mut entry.value {
                Value::Set(set) => Ok(set.remove(member)),
                other => Err(wrong_type(key, "set", other)),
            })
            .transpose()?
            .unwrap_or(false);
        if removed {
            self.map
                .remove_if(key, |_, e| matches!(&e.value, Value::Set(set) if set.is_empty()));
        }
        Ok(removed)
    }

    pub fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError> {
        self.read(key, |entry| match &entry.value {
            Value::Set(set) => Ok(set.iter().cloned().collect()),
            other => Err(wrong_type(key, "set", other)),
        })
        .transpose()
        .map(Option::unwrap_or_default)
    }

    pub fn sismember(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.read(key, |entry| match &entry.value {
            Value::Set(set) => Ok(set.contains(member)),
            other => Err(wrong_type(key, "set", other)),
        })
        .transpose()
        .map(|found| found.unwrap_or(false))
    }
}

fn wrong_type(key: &str, expected: &'static str, found: &Value) -> CacheError {
    CacheError::WrongType {
        key: key.to_string(),
        expected,
        found: found.type_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde::Deserialize;
    use std::sync::Arc;

    fn store() -> (CacheStore, Arc<ManualClock>) {
        let clock = ManualClock::new(1_000_000);
        (CacheStore::new(clock.clone()), clock)
    }

    #[test]
    fn set_get_del() {
        let (cache, _) = store();
        cache.set("a", "1").unwrap();
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("1"));
        assert!(cache.exists("a").unwrap());
        assert!(cache.del("a").unwrap());
        assert!(!cache.del("a").unwrap());
        assert_eq!(cache.get("a").unwrap(), None);
    }

    #[test]
    fn ttl_expiry_follows_clock() {
        let (cache, clock) = store();
        cache.set_ex("res:equip:1", "{}", Duration::from_secs(20)).unwrap();
        clock.advance(Duration::from_secs(19));
        assert!(cache.exists("res:equip:1").unwrap());
        assert_eq!(cache.ttl("res:equip:1").unwrap(), Some(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(1));
        assert!(!cache.exists("res:equip:1").unwrap());
        assert_eq!(cache.get("res:equip:1").unwrap(), None);
    }

    #[test]
    fn expire_extends_lifetime() {
        let (cache, clock) = store();
        cache.set_ex("k", "v", Duration::from_secs(5)).unwrap();
        clock.advance(Duration::from_secs(4));
        assert!(cache.expire("k", Duration::from_secs(10)).unwrap());
        clock.advance(Duration::from_secs(6));
        assert!(cache.exists("k").unwrap());
        assert!(!cache.expire("missing", Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn setnx_only_sets_absent_keys() {
        let (cache, clock) = store();
        let ttl = Duration::from_secs(20);
        assert!(cache.setnx_ex("lock:equip:4:e7:enhance", "1", ttl).unwrap());
        assert!(!cache.setnx_ex("lock:equip:4:e7:enhance", "2", ttl).unwrap());
        clock.advance(ttl);
        assert!(cache.setnx_ex("lock:equip:4:e7:enhance", "3", ttl).unwrap());
    }

    #[test]
    fn hash_fields_keep_ttl() {
        let (cache, clock) = store();
        cache.hset("presence:1", "status", "online").unwrap();
        cache.expire("presence:1", Duration::from_secs(60)).unwrap();
        cache
            .hset_many("presence:1", &[("ip", "10.0.0.1".to_string()), ("status", "offline".to_string())])
            .unwrap();
        assert_eq!(cache.hget("presence:1", "status").unwrap().as_deref(), Some("offline"));
        assert_eq!(cache.hgetall("presence:1").unwrap().unwrap().len(), 2);
        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.hget("presence:1", "ip").unwrap(), None);
    }

    #[test]
    fn set_membership() {
        let (cache, _) = store();
        assert!(cache.sadd("online-players", "1").unwrap());
        assert!(!cache.sadd("online-players", "1").unwrap());
        cache.sadd("online-players", "2").unwrap();
        assert_eq!(cache.smembers("online-players").unwrap(), vec!["1", "2"]);
        assert!(cache.sismember("online-players", "2").unwrap());
        assert!(cache.srem("online-players", "1").unwrap());
        assert!(!cache.srem("online-players", "1").unwrap());
        cache.srem("online-players", "2").unwrap();
        assert!(!cache.exists("online-players").unwrap());
    }

    #[test]
    fn wrong_type_is_reported() {
        let (cache, _) = store();
        cache.set("k", "v").unwrap();
        assert!(matches!(cache.hget("k", "f"), Err(CacheError::WrongType { .. })));
        assert!(matches!(cache.sadd("k", "m"), Err(CacheError::WrongType { .. })));
    }

    #[test]
    fn scan_and_delete_matching() {
        let (cache, clock) = store();
        cache.set("session:pvp:3:9", "{}").unwrap();
        cache.set("session:pve:3:1001", "{}").unwrap();
        cache.set("session:pvp:4:3", "{}").unwrap();
        cache.set_ex("session:pvp:3:10", "{}", Duration::from_secs(1)).unwrap();
        clock.advance(Duration::from_secs(1));

        let keys = cache.scan("session:*:3:*").unwrap();
        assert_eq!(keys, vec!["session:pve:3:1001", "session:pvp:3:9"]);
        assert_eq!(cache.del_matching("session:*:3:*").unwrap(), 2);
        assert_eq!(cache.scan("session:*").unwrap(), vec!["session:pvp:4:3"]);
    }

    #[test]
    fn purge_evicts_expired() {
        let (cache, clock) = store();
        cache.set_ex("a", "1", Duration::from_secs(1)).unwrap();
        cache.set("b", "2").unwrap();
        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn json_helpers() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Stones {
            reinforce: i64,
        }
        let (cache, _) = store();
        cache
            .set_json_ex("res:equip:1", &Stones { reinforce: 5 }, Duration::from_secs(20))
            .unwrap();
        let back: Option<Stones> = cache.get_json("res:equip:1").unwrap();
        assert_eq!(back, Some(Stones { reinforce: 5 }));
        let missing: Option<Stones> = cache.get_json("res:equip:2").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn concurrent_sadd_is_atomic() {
        let (cache, _) = store();
        let cache = Arc::new(cache);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.sadd("set", format!("{}-{}", t, i)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.smembers("set").unwrap().len(), 800);
    }

    #[test]
    fn hset_existing_never_creates() {
        let (cache, clock) = store();
        assert!(!cache.hset_existing("presence:9", "status", "offline").unwrap());
        assert!(!cache.exists("presence:9").unwrap());

        cache.hset("presence:9", "status", "online").unwrap();
        cache.expire("presence:9", Duration::from_secs(5)).unwrap();
        assert!(cache.hset_existing("presence:9", "status", "offline").unwrap());
        assert_eq!(cache.hget("presence:9", "status").unwrap().as_deref(), Some("offline"));
        assert_eq!(cache.ttl("presence:9").unwrap(), Some(Duration::from_secs(5)));

        clock.advance(Duration::from_secs(5));
        assert!(!cache.hset_existing("presence:9", "status", "online").unwrap());
        assert!(!cache.exists("presence:9").unwrap());
    }

    #[test]
    fn shard_count_is_normalized() {
        let clock = ManualClock::new(0);
        for shards in [0, 1, 3, 16] {
            let cache = CacheStore::with_shards(clock.clone(), shards);
            cache.set("k", "v").unwrap();
            assert_eq!(cache.len(), 1);
        }
    }
}
