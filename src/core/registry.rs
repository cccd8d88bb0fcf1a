// src/core/registry.rs

//! The callback registry: stable names for page producers.
//!
//! Background jobs cannot carry live closures across the response
//! boundary, so regeneration work references its callback by a string
//! name registered at process startup. Inline closures remain usable on
//! the synchronous paths (miss, bypass) where nothing is serialized.

use crate::core::errors::RestaticError;
use crate::core::generator::RenderCallback;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;

struct Registration {
    callback: RenderCallback,
    metadata: HashMap<String, Value>,
}

/// Concurrent name-to-callback map. Names are unique and restricted to
/// `[A-Za-z0-9_.-]+`.
#[derive(Default)]
pub struct CallbackRegistry {
    entries: DashMap<String, Registration>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `name` with optional metadata.
    /// Duplicate names and names outside the allowed alphabet are
    /// rejected.
    pub fn register(
        &self,
        name: &str,
        callback: RenderCallback,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<(), RestaticError> {
        if !is_valid_name(name) {
            return Err(RestaticError::InvalidCallbackName(name.to_string()));
        }
        match self.entries.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(RestaticError::CallbackExists(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Registration {
                    callback,
                    metadata: metadata.unwrap_or_default(),
                });
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<RenderCallback> {
        self.entries.get(name).map(|r| r.callback.clone())
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All registered names, unordered.
    pub fn list(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn metadata(&self, name: &str) -> Option<HashMap<String, Value>> {
        self.entries.get(name).map(|r| r.metadata.clone())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
