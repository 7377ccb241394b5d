//! Snapshot Module
//!
//! The store's in-memory copy of the configuration document.
//!
//! ## Concurrency Model
//! - Readers take the read lock only long enough to clone an `Arc`
//! - Replacement builds the new value first, then swaps the pointer under
//!   the write lock
//! - A reader therefore sees one whole generation, never a mix of two

use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// One generation of the document
#[derive(Debug, Clone)]
struct Generation {
    value: Arc<Value>,
    number: u64,
}

/// Atomically replaceable document value
#[derive(Debug)]
pub struct Snapshot {
    current: RwLock<Generation>,
}

impl Snapshot {
    /// Create a snapshot holding `value` as generation 0
    pub fn new(value: Value) -> Self {
        Self {
            current: RwLock::new(Generation {
                value: Arc::new(value),
                number: 0,
            }),
        }
    }

    /// Create a snapshot holding an empty document
    pub fn empty() -> Self {
        Self::new(Value::Object(Map::new()))
    }

    /// Current value (cheap: clones an `Arc`)
    pub fn load(&self) -> Arc<Value> {
        Arc::clone(&self.current.read().value)
    }

    /// Current value together with its generation number
    pub fn load_with_generation(&self) -> (Arc<Value>, u64) {
        let current = self.current.read();
        (Arc::clone(&current.value), current.number)
    }

    /// Number of replacements since creation
    pub fn generation(&self) -> u64 {
        self.current.read().number
    }

    /// Swap in a new value, returning its generation number
    pub fn replace(&self, value: Value) -> u64 {
        let value = Arc::new(value);
        let mut current = self.current.write();
        current.number += 1;
        current.value = value;
        current.number
    }

    /// Decode the current value into a caller type
    ///
    /// A document whose shape does not fit `T` is an `InvalidArgument`:
    /// the destination is wrong for this document, not the document itself.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.load();
        <T as Deserialize>::deserialize(value.as_ref()).map_err(|e| {
            StoreError::InvalidArgument(format!(
                "destination does not match the settings document: {}",
                e
            ))
        })
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}
