//! In-memory gateway
//!
//! BTreeMap-based document table with RwLock for concurrency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::error::{Result, StoreError};

use super::DocumentGateway;

/// Documents grouped by namespace, then by id
type Namespaces = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// Gateway that keeps documents in process memory
///
/// ## Concurrency:
/// - `namespaces`: RwLock (concurrent fetches, exclusive put/delete)
/// - `offline`: atomic switch, checked before every call
#[derive(Default)]
pub struct MemoryGateway {
    namespaces: RwLock<Namespaces>,
    offline: AtomicBool,
}

impl MemoryGateway {
    /// Create an empty gateway
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a transport error (or recover)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Whether the gateway is currently failing calls
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Number of documents across all namespaces
    pub fn document_count(&self) -> usize {
        self.namespaces.read().values().map(|docs| docs.len()).sum()
    }

    /// Whether a namespace currently exists
    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.read().contains_key(namespace)
    }

    fn check_online(&self) -> Result<()> {
        if self.is_offline() {
            return Err(StoreError::Transport("remote store unreachable".into()));
        }
        Ok(())
    }
}

impl DocumentGateway for MemoryGateway {
    fn fetch(&self, namespace: &str, id: &str) -> Result<Option<Vec<u8>>> {
        self.check_online()?;
        let namespaces = self.namespaces.read();
        Ok(namespaces.get(namespace).and_then(|docs| docs.get(id)).cloned())
    }

    fn put(&self, namespace: &str, id: &str, body: &[u8]) -> Result<()> {
        self.check_online()?;
        let mut namespaces = self.namespaces.write();
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(id.to_string(), body.to_vec());
        Ok(())
    }

    fn delete(&self, namespace: &str) -> Result<()> {
        self.check_online()?;
        self.namespaces.write().remove(namespace);
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        self.check_online()
    }
}
