//! Consecutive-failure gating.
//!
//! Counters live only in process memory; a restart starts every
//! (rule, target) pair from zero.

use chrono::{DateTime, Duration, Utc};
use opsmon_common::types::{self, AlertRule};
use std::collections::HashMap;
use std::sync::Mutex;

type CounterKey = (String, String);

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: i32,
    touched_at: DateTime<Utc>,
}

/// Bounded map of (rule_id, target_id) to consecutive breach count.
///
/// Entries untouched for longer than `ttl` are dropped by [`sweep_expired`];
/// when the map is full, the least recently touched entry makes room.
///
/// [`sweep_expired`]: HysteresisTracker::sweep_expired
pub struct HysteresisTracker {
    counters: Mutex<HashMap<CounterKey, Counter>>,
    ttl: Duration,
    capacity: usize,
}

impl HysteresisTracker {
    pub fn new(ttl_secs: u64, capacity: usize) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            ttl: types::seconds(ttl_secs),
            capacity: capacity.max(1),
        }
    }

    pub fn should_fire(&self, rule: &AlertRule, target_id: &str, triggered: bool) -> bool {
        self.should_fire_at(rule, target_id, triggered, Utc::now())
    }

    pub fn should_fire_at(
        &self,
        rule: &AlertRule,
        target_id: &str,
        triggered: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let mut counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());
        let key = (rule.id.clone(), target_id.to_string());

        if !triggered {
            counters.remove(&key);
            return false;
        }
        if rule.consecutive_failures <= 0 {
            return true;
        }

        if !counters.contains_key(&key) && counters.len() >= self.capacity {
            evict_oldest(&mut counters);
        }
        let counter = counters.entry(key).or_insert(Counter {
            count: 0,
            touched_at: now,
        });
        counter.count += 1;
        counter.touched_at = now;

        if counter.count >= rule.consecutive_failures {
            counter.count = 0;
            true
        } else {
            false
        }
    }

    pub fn clear(&self, rule_id: &str, target_id: &str) {
        let mut counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());
        counters.remove(&(rule_id.to_string(), target_id.to_string()));
    }

    pub fn count(&self, rule_id: &str, target_id: &str) -> i32 {
        let counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());
        counters
            .get(&(rule_id.to_string(), target_id.to_string()))
            .map(|c| c.count)
            .unwrap_or(0)
    }

    /// Drops counters untouched for longer than the TTL. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());
        let before = counters.len();
        let Some(cutoff) = now.checked_sub_signed(self.ttl) else {
            return 0;
        };
        counters.retain(|_, c| c.touched_at >= cutoff);
        before - counters.len()
    }

    pub fn len(&self) -> usize {
        self.counters.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict_oldest(counters: &mut HashMap<CounterKey, Counter>) {
    let oldest = counters
        .iter()
        .min_by_key(|(_, c)| c.touched_at)
        .map(|(k, _)| k.clone());
    if let Some(key) = oldest {
        counters.remove(&key);
    }
}
