// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Shared Context Store
//!
//! Scoped key-value state exchanged between agents.
//!
//! - Writes merge into the existing map (shallow, last write wins per field).
//! - Reads past the TTL evict the entry and return `None`.
//! - Every successful read increments the access counter.

use super::older_than;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const DEFAULT_CONTEXT_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedContextEntry {
    pub scope_id: String,
    pub key: String,
    pub data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub access_count: u64,
    pub ttl_seconds: u64,
}

impl SharedContextEntry {
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        older_than(self.updated_at, now, self.ttl_seconds)
    }
}

type ContextKey = (String, String);

#[derive(Debug)]
pub struct SharedContextStore {
    entries: RwLock<HashMap<ContextKey, SharedContextEntry>>,
    default_ttl_seconds: u64,
}

impl Default for SharedContextStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_TTL_SECONDS)
    }
}

impl SharedContextStore {
    pub fn new(default_ttl_seconds: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl_seconds,
        }
    }

    fn key(scope_id: &str, key: &str) -> ContextKey {
        (scope_id.to_string(), key.to_string())
    }

    pub fn get(&self, scope_id: &str, key: &str) -> Option<SharedContextEntry> {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let lookup = Self::key(scope_id, key);

        if entries.get(&lookup)?.is_expired_at(now) {
            entries.remove(&lookup);
            return None;
        }

        let entry = entries.get_mut(&lookup)?;
        entry.access_count += 1;
        Some(entry.clone())
    }

    /// Merge `data` into the entry, creating it with `ttl_seconds` (or the
    /// store default) when absent. An entry that already expired is replaced.
    pub fn set(
        &self,
        scope_id: &str,
        key: &str,
        data: Map<String, Value>,
        ttl_seconds: Option<u64>,
    ) -> SharedContextEntry {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let lookup = Self::key(scope_id, key);

        match entries.get_mut(&lookup) {
            Some(entry) if !entry.is_expired_at(now) => {
                entry.data.extend(data);
                entry.updated_at = now.max(entry.updated_at);
                entry.clone()
            }
            _ => {
                let entry = SharedContextEntry {
                    scope_id: scope_id.to_string(),
                    key: key.to_string(),
                    data,
                    created_at: now,
                    updated_at: now,
                    access_count: 0,
                    ttl_seconds: ttl_seconds.unwrap_or(self.default_ttl_seconds),
                };
                entries.insert(lookup, entry.clone());
                entry
            }
        }
    }

    /// Bump the access counter without reading the data.
    pub fn touch(&self, scope_id: &str, key: &str) -> bool {
        match self.entries.write().get_mut(&Self::key(scope_id, key)) {
            Some(entry) => {
                entry.access_count += 1;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, scope_id: &str, key: &str) -> Option<SharedContextEntry> {
        self.entries.write().remove(&Self::key(scope_id, key))
    }

    /// Keys currently stored under `scope_id`, sorted.
    pub fn keys(&self, scope_id: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter(|(scope, _)| scope == scope_id)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn default_ttl_seconds(&self) -> u64 {
        self.default_ttl_seconds
    }
}
