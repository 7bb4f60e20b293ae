// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! LRU cache for dashboard and notification-count responses.
//!
//! Caches rendered JSON responses per user to shortcut repeated reads from
//! the polling frontend. Entries expire by TTL and are bounded by an LRU
//! capacity. Invalidation is keyed through an owner index (user id → set of
//! keys), so clearing one user's entries never scans the whole key space.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;

/// Cached entry: rendered JSON + insertion timestamp.
struct CacheEntry {
    value: Value,
    inserted_at: Instant,
}

struct CacheInner {
    entries: LruCache<String, CacheEntry>,
    /// Owner index: user id → keys currently held for that user.
    owners: HashMap<String, HashSet<String>>,
}

/// In-process response cache with TTL, LRU bound, and per-owner invalidation.
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
}

impl ResponseCache {
    /// Create a new cache with the given capacity and TTL.
    ///
    /// - `capacity`: Max number of cached responses.
    /// - `ttl`: Time-to-live for each entry.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(
                    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
                ),
                owners: HashMap::new(),
            }),
            ttl,
        }
    }

    /// Get a cached response.
    ///
    /// Returns `None` if not cached or expired. Expired entries are removed
    /// on access.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().ok()?;
        if let Some(entry) = inner.entries.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.value.clone());
            }
            inner.entries.pop(key);
        }
        None
    }

    /// Store a response under `key`, attributed to `owner` for invalidation.
    pub fn put(&self, owner: &str, key: &str, value: Value) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.put(
                key.to_string(),
                CacheEntry {
                    value,
                    inserted_at: Instant::now(),
                },
            );
            inner
                .owners
                .entry(owner.to_string())
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Drop every entry attributed to `owner`.
    ///
    /// Walks only the owner's key set, not the whole cache.
    pub fn invalidate_owner(&self, owner: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(keys) = inner.owners.remove(owner) {
                for key in keys {
                    inner.entries.pop(&key);
                }
            }
        }
    }
}

/// Cache key builders, one per cached read.
pub mod keys {
    pub fn seller_dashboard(user_id: &str) -> String {
        format!("dashboard:seller:{user_id}")
    }

    pub fn buyer_dashboard(user_id: &str) -> String {
        format!("dashboard:buyer:{user_id}")
    }

    pub fn notification_count(user_id: &str) -> String {
        format!("notifications:count:{user_id}")
    }
}
