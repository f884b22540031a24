use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::Client;
use crate::error::RedisOpError;

#[derive(Debug, Default)]
struct State {
    strings: HashMap<String, String>,
    sets: HashMap<String, Vec<String>>,
    sorted_sets: HashMap<String, Vec<(String, f64)>>,
    lists: HashMap<String, Vec<String>>,
    calls: Vec<String>,
}

/// In-memory fake `Client`, modeled on the reference codebase's
/// `MockRedisClient`: records every call for assertions in tests and
/// implements the same ordering/atomicity semantics a real store gives,
/// without needing a live server.
#[derive(Default)]
pub struct MockClient {
    state: Mutex<State>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, state: &mut State, call: impl Into<String>) {
        state.calls.push(call.into());
    }

    fn sort_zset(zset: &mut Vec<(String, f64)>) {
        zset.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    }
}

#[async_trait]
impl Client for MockClient {
    async fn get(&self, key: &str) -> Result<Option<String>, RedisOpError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("get {key}"));
        Ok(state.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RedisOpError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("set {key}"));
        state.strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn setex(&self, key: &str, value: &str, _seconds: u64) -> Result<(), RedisOpError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("setex {key}"));
        state.strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn expire(&self, key: &str, _seconds: u64) -> Result<(), RedisOpError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("expire {key}"));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), RedisOpError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("del {key}"));
        state.strings.remove(key);
        state.sets.remove(key);
        state.sorted_sets.remove(key);
        state.lists.remove(key);
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, RedisOpError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("incr_by {key}"));
        let current = state
            .strings
            .get(key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + delta;
        state.strings.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), RedisOpError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("sadd {key}"));
        let set = state.sets.entry(key.to_string()).or_default();
        if !set.iter().any(|m| m == member) {
            set.push(member.to_string());
        }
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), RedisOpError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("srem {key}"));
        if let Some(set) = state.sets.get_mut(key) {
            set.retain(|m| m != member);
        }
        Ok(())
    }

    async fn scard(&self, key: &str) -> Result<u64, RedisOpError> {
        let state = self.state.lock().unwrap();
        Ok(state.sets.get(key).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, RedisOpError> {
        let state = self.state.lock().unwrap();
        Ok(state.sets.get(key).cloned().unwrap_or_default())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), RedisOpError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("zadd {key}"));
        let zset = state.sorted_sets.entry(key.to_string()).or_default();
        zset.retain(|(m, _)| m != member);
        zset.push((member.to_string(), score));
        Self::sort_zset(zset);
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), RedisOpError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("zrem {key}"));
        if let Some(zset) = state.sorted_sets.get_mut(key) {
            zset.retain(|(m, _)| m != member);
        }
        Ok(())
    }

    async fn zpopmin(&self, key: &str) -> Result<Option<(String, f64)>, RedisOpError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("zpopmin {key}"));
        let zset = state.sorted_sets.entry(key.to_string()).or_default();
        if zset.is_empty() {
            return Ok(None);
        }
        Ok(Some(zset.remove(0)))
    }

    async fn zcard(&self, key: &str) -> Result<u64, RedisOpError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sorted_sets
            .get(key)
            .map(|s| s.len() as u64)
            .unwrap_or(0))
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, RedisOpError> {
        let state = self.state.lock().unwrap();
        let zset = match state.sorted_sets.get(key) {
            Some(z) => z,
            None => return Ok(Vec::new()),
        };
        Ok(slice_range(zset, start, stop))
    }

    async fn rpush_bounded(
        &self,
        key: &str,
        value: &str,
        max_len: isize,
    ) -> Result<(), RedisOpError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("rpush_bounded {key}"));
        let list = state.lists.entry(key.to_string()).or_default();
        list.push(value.to_string());
        let max_len = max_len.max(0) as usize;
        if list.len() > max_len {
            let drop = list.len() - max_len;
            list.drain(0..drop);
        }
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, RedisOpError> {
        let state = self.state.lock().unwrap();
        let list = match state.lists.get(key) {
            Some(l) => l,
            None => return Ok(Vec::new()),
        };
        Ok(slice_range(list, start, stop))
    }

    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>, RedisOpError> {
        let state = self.state.lock().unwrap();
        let regex = glob_to_regex(pattern);
        let mut keys: Vec<String> = state
            .strings
            .keys()
            .chain(state.sets.keys())
            .chain(state.sorted_sets.keys())
            .chain(state.lists.keys())
            .filter(|k| regex.is_match(k))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn create_handoff_atomic(
        &self,
        record_key: &str,
        record_json: &str,
        _record_ttl_secs: u64,
        queue_key: &str,
        member: &str,
        score: f64,
        project_index_key: &str,
    ) -> Result<(), RedisOpError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("create_handoff_atomic {record_key}"));
        state
            .strings
            .insert(record_key.to_string(), record_json.to_string());
        let zset = state.sorted_sets.entry(queue_key.to_string()).or_default();
        zset.retain(|(m, _)| m != member);
        zset.push((member.to_string(), score));
        Self::sort_zset(zset);
        let set = state.sets.entry(project_index_key.to_string()).or_default();
        if !set.iter().any(|m| m == member) {
            set.push(member.to_string());
        }
        Ok(())
    }

    async fn batch_zpopmin(
        &self,
        queues: &[String],
    ) -> Result<HashMap<String, Option<(String, f64)>>, RedisOpError> {
        let mut state = self.state.lock().unwrap();
        let mut out = HashMap::new();
        for q in queues {
            self.record(&mut state, format!("batch_zpopmin {q}"));
            let popped = {
                let zset = state.sorted_sets.entry(q.clone()).or_default();
                if zset.is_empty() {
                    None
                } else {
                    Some(zset.remove(0))
                }
            };
            out.insert(q.clone(), popped);
        }
        Ok(out)
    }

    async fn batch_zcard(&self, queues: &[String]) -> Result<HashMap<String, u64>, RedisOpError> {
        let state = self.state.lock().unwrap();
        Ok(queues
            .iter()
            .map(|q| {
                let card = state.sorted_sets.get(q).map(|s| s.len() as u64).unwrap_or(0);
                (q.clone(), card)
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), RedisOpError> {
        Ok(())
    }
}

fn slice_range<T: Clone>(items: &[T], start: isize, stop: isize) -> Vec<T> {
    let len = items.len() as isize;
    if len == 0 {
        return Vec::new();
    }
    let norm = |i: isize| -> isize {
        if i < 0 {
            (len + i).max(0)
        } else {
            i.min(len - 1).max(0)
        }
    };
    let start = norm(start);
    let stop = norm(stop).min(len - 1);
    if start > stop {
        return Vec::new();
    }
    items[start as usize..=stop as usize].to_vec()
}

fn glob_to_regex(pattern: &str) -> regex::Regex {
    let mut out = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    regex::Regex::new(&out).expect("generated pattern is always valid")
}
