//! In-Memory Coordination Store
//!
//! Ordered key/value map guarded by a `parking_lot` lock. Used for
//! standalone mode and as the store behind handler tests.

use crate::domain::CoordinationStore;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-process coordination store
///
/// Only leaf values are stored; directories exist implicitly as key
/// prefixes. Children enumerate in lexical order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn dir_prefix(key: &str) -> String {
    format!("{}/", key.trim_end_matches('/'))
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn children(&self, key: &str) -> Result<Vec<String>> {
        let prefix = dir_prefix(key);
        let entries = self.entries.read();

        let mut children: Vec<String> = Vec::new();
        for (full_key, _) in entries.range(prefix.clone()..) {
            let Some(rest) = full_key.strip_prefix(&prefix) else {
                break;
            };
            let child = rest.split('/').next().unwrap_or(rest);
            if child.is_empty() {
                continue;
            }
            if !children.iter().any(|c| c == child) {
                children.push(child.to_string());
            }
        }

        Ok(children)
    }
}
