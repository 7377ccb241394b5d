//! Concurrency tests for Store
//!
//! These tests verify:
//! - Readers never observe a partially replaced document
//! - Concurrent writers converge after a refresh
//! - A shared store can be used from many threads
//! - A refresh racing a write never rolls back the acknowledged write

#[path = "../common/mod.rs"]
mod common;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use serde_json::{json, Value};
use settingstore::{DocumentGateway, MemoryGateway, Result, Store};
use tempfile::TempDir;

use common::{store_config, ScriptedGateway};

/// Gateway whose next fetch, once armed, stalls after reading the remote
/// document until released
struct StallingGateway {
    inner: MemoryGateway,
    armed: AtomicBool,
    fetched_tx: Sender<()>,
    fetched_rx: Receiver<()>,
    release_tx: Sender<()>,
    release_rx: Receiver<()>,
}

impl StallingGateway {
    fn new() -> Self {
        let (fetched_tx, fetched_rx) = channel::bounded(1);
        let (release_tx, release_rx) = channel::bounded(1);
        Self {
            inner: MemoryGateway::new(),
            armed: AtomicBool::new(false),
            fetched_tx,
            fetched_rx,
            release_tx,
            release_rx,
        }
    }

    fn stall_next_fetch(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Block until the stalled fetch has read the remote document
    fn wait_for_fetch(&self) {
        self.fetched_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("fetch never started");
    }

    fn release(&self) {
        self.release_tx.send(()).unwrap();
    }
}

impl DocumentGateway for StallingGateway {
    fn fetch(&self, namespace: &str, id: &str) -> Result<Option<Vec<u8>>> {
        let body = self.inner.fetch(namespace, id)?;
        if self.armed.swap(false, Ordering::SeqCst) {
            let _ = self.fetched_tx.send(());
            let _ = self.release_rx.recv_timeout(Duration::from_secs(5));
        }
        Ok(body)
    }

    fn put(&self, namespace: &str, id: &str, body: &[u8]) -> Result<()> {
        self.inner.put(namespace, id, body)
    }

    fn delete(&self, namespace: &str) -> Result<()> {
        self.inner.delete(namespace)
    }
}

/// Document whose fields all carry the same marker
fn uniform_document(marker: u64) -> Value {
    let fields: BTreeMap<String, u64> = (0..32).map(|i| (format!("field_{:02}", i), marker)).collect();
    json!(fields)
}

fn assert_uniform(document: &BTreeMap<String, u64>) {
    let mut values = document.values();
    let first = values.next().copied();
    assert!(values.all(|v| Some(*v) == first), "torn read: {:?}", document);
    assert_eq!(document.len(), 32);
}

fn setup_store() -> (TempDir, Arc<ScriptedGateway>, Arc<Store>) {
    let temp_dir = TempDir::new().unwrap();
    let gateway = Arc::new(ScriptedGateway::new());
    let store = Store::open(store_config(temp_dir.path(), uniform_document(0)), gateway.clone())
        .unwrap();
    (temp_dir, gateway, Arc::new(store))
}

#[test]
fn test_readers_see_whole_generations_during_refresh() {
    let (_temp, gateway, store) = setup_store();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut reads = 0u64;
                while !done.load(Ordering::SeqCst) || reads == 0 {
                    let document: BTreeMap<String, u64> = store.read().unwrap();
                    assert_uniform(&document);
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for marker in 1..=200 {
        gateway.set_remote(&uniform_document(marker));
        store.refresh().unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    assert_eq!(*store.snapshot(), uniform_document(200));
}

#[test]
fn test_readers_see_whole_generations_during_writes() {
    let (_temp, _gateway, store) = setup_store();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let document: BTreeMap<String, u64> = store.read().unwrap();
                    assert_uniform(&document);
                }
            })
        })
        .collect();

    let writers: Vec<_> = (0..4u64)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..50 {
                    store.write(&uniform_document(w * 1000 + i)).unwrap();
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn test_concurrent_writers_converge_after_refresh() {
    let (temp_dir, gateway, store) = setup_store();

    let writers: Vec<_> = (1..=8u64)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || store.write(&uniform_document(w)).unwrap())
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    store.refresh().unwrap();

    let remote = gateway.remote().unwrap();
    assert_eq!(*store.snapshot(), remote);
    assert_eq!(common::cached(temp_dir.path()), Some(remote));
}

#[test]
fn test_generation_counts_replacements() {
    let (_temp, _gateway, store) = setup_store();
    let start = store.generation();

    let writers: Vec<_> = (0..4u64)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..10 {
                    store.write(&uniform_document(w * 100 + i)).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(store.generation(), start + 40);
}

#[test]
fn test_refresh_in_flight_does_not_roll_back_write() {
    let temp_dir = TempDir::new().unwrap();
    let gateway = Arc::new(StallingGateway::new());
    let store = Arc::new(
        Store::open(store_config(temp_dir.path(), json!({"level": "info"})), gateway.clone())
            .unwrap(),
    );

    // Refresh reads {"level":"info"} and stalls before installing it
    gateway.stall_next_fetch();
    let refresh = {
        let store = Arc::clone(&store);
        thread::spawn(move || store.refresh())
    };
    gateway.wait_for_fetch();

    store.write(&json!({"level": "debug"})).unwrap();
    gateway.release();
    refresh.join().unwrap().unwrap();

    assert_eq!(store.read::<Value>().unwrap(), json!({"level": "debug"}));
    assert_eq!(common::cached(temp_dir.path()), Some(json!({"level": "debug"})));

    // An uncontended refresh still installs what the remote holds
    gateway
        .inner
        .put(common::NAMESPACE, settingstore::DOCUMENT_ID, br#"{"level":"warn"}"#)
        .unwrap();
    store.refresh().unwrap();
    assert_eq!(store.read::<Value>().unwrap(), json!({"level": "warn"}));
    assert_eq!(common::cached(temp_dir.path()), Some(json!({"level": "warn"})));
}
