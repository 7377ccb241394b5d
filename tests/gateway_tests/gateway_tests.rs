//! Gateway Tests
//!
//! TcpGateway against a live document server.

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{json, Value};
use settingstore::network::Server;
use settingstore::{
    DocumentGateway, GatewayConfig, MemoryGateway, ServerConfig, Store, StoreError, TcpGateway,
    DOCUMENT_ID,
};
use tempfile::TempDir;

#[path = "../common/mod.rs"]
mod common;

use common::{store_config, NAMESPACE};

/// A server running on its own thread, stopped on drop
struct TestServer {
    addr: String,
    backend: Arc<MemoryGateway>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    fn start() -> Self {
        Self::start_with(ServerConfig {
            listen_addr: "127.0.0.1:0".into(),
            ..ServerConfig::default()
        })
    }

    fn start_with(config: ServerConfig) -> Self {
        let backend = Arc::new(MemoryGateway::new());
        let mut server = Server::new(config, backend.clone());
        let addr = server.bind().unwrap().to_string();
        let shutdown = server.shutdown_handle();

        let handle = thread::spawn(move || {
            server.run().unwrap();
        });

        Self {
            addr,
            backend,
            shutdown,
            handle: Some(handle),
        }
    }

    fn gateway(&self) -> TcpGateway {
        TcpGateway::with_addr(self.addr.clone())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_ping() {
    let server = TestServer::start();
    server.gateway().ping().unwrap();
}

#[test]
fn test_fetch_missing_document() {
    let server = TestServer::start();
    let gateway = server.gateway();

    assert_eq!(gateway.fetch(NAMESPACE, DOCUMENT_ID).unwrap(), None);
}

#[test]
fn test_put_then_fetch() {
    let server = TestServer::start();
    let gateway = server.gateway();

    gateway.put(NAMESPACE, DOCUMENT_ID, br#"{"a":1}"#).unwrap();

    assert_eq!(
        gateway.fetch(NAMESPACE, DOCUMENT_ID).unwrap(),
        Some(br#"{"a":1}"#.to_vec())
    );
    // The server stores into its backend
    assert_eq!(
        server.backend.fetch(NAMESPACE, DOCUMENT_ID).unwrap(),
        Some(br#"{"a":1}"#.to_vec())
    );
}

#[test]
fn test_delete_namespace() {
    let server = TestServer::start();
    let gateway = server.gateway();

    gateway.put(NAMESPACE, DOCUMENT_ID, b"{}").unwrap();
    gateway.delete(NAMESPACE).unwrap();

    assert_eq!(gateway.fetch(NAMESPACE, DOCUMENT_ID).unwrap(), None);
    assert!(!server.backend.has_namespace(NAMESPACE));

    // Deleting a missing namespace succeeds
    gateway.delete(NAMESPACE).unwrap();
}

#[test]
fn test_many_requests_share_one_connection() {
    let server = TestServer::start();
    let gateway = server.gateway();

    for i in 0..50 {
        let body = format!(r#"{{"n":{}}}"#, i);
        gateway.put(NAMESPACE, DOCUMENT_ID, body.as_bytes()).unwrap();
        assert_eq!(
            gateway.fetch(NAMESPACE, DOCUMENT_ID).unwrap(),
            Some(body.into_bytes())
        );
    }
}

// =============================================================================
// Failure Handling
// =============================================================================

#[test]
fn test_backend_failure_is_transport_error() {
    let server = TestServer::start();
    let gateway = server.gateway();
    server.backend.set_offline(true);

    let err = gateway.fetch(NAMESPACE, DOCUMENT_ID).unwrap_err();
    assert!(err.is_transport());
    assert!(err.to_string().contains("remote store unreachable"));

    server.backend.set_offline(false);
    assert_eq!(gateway.fetch(NAMESPACE, DOCUMENT_ID).unwrap(), None);
}

#[test]
fn test_connection_refused_is_transport_error() {
    // Grab a free port, then release it so nothing is listening
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let gateway = TcpGateway::new(GatewayConfig {
        addr,
        connect_timeout_ms: 500,
        ..GatewayConfig::default()
    });

    assert!(matches!(
        gateway.fetch(NAMESPACE, DOCUMENT_ID),
        Err(StoreError::Transport(_))
    ));
}

#[test]
fn test_reconnects_after_server_idle_timeout() {
    let server = TestServer::start_with(ServerConfig {
        listen_addr: "127.0.0.1:0".into(),
        read_timeout_ms: 50,
        ..ServerConfig::default()
    });
    let gateway = server.gateway();

    gateway.put(NAMESPACE, DOCUMENT_ID, b"{}").unwrap();

    // The server drops the idle connection
    thread::sleep(Duration::from_millis(300));

    assert_eq!(
        gateway.fetch(NAMESPACE, DOCUMENT_ID).unwrap(),
        Some(b"{}".to_vec())
    );
}

#[test]
fn test_server_gone_is_transport_error() {
    let server = TestServer::start_with(ServerConfig {
        listen_addr: "127.0.0.1:0".into(),
        read_timeout_ms: 100,
        ..ServerConfig::default()
    });
    let gateway = server.gateway();
    gateway.ping().unwrap();

    drop(server);

    assert!(gateway.ping().unwrap_err().is_transport());
}

#[test]
fn test_connection_limit_rejects_extra_clients() {
    let server = TestServer::start_with(ServerConfig {
        listen_addr: "127.0.0.1:0".into(),
        max_connections: 1,
        ..ServerConfig::default()
    });

    // Holds the only slot
    let first = server.gateway();
    first.ping().unwrap();

    let second = server.gateway();
    assert!(second.ping().unwrap_err().is_transport());

    // The first client is still served
    first.ping().unwrap();
}

// =============================================================================
// Store Over TCP
// =============================================================================

#[test]
fn test_store_over_tcp() {
    let server = TestServer::start();
    let dir = TempDir::new().unwrap();

    let store = Store::open(
        store_config(dir.path(), json!({"level": "info"})),
        Arc::new(server.gateway()),
    )
    .unwrap();

    // Bootstrapped from the default and pushed to the server
    assert_eq!(store.read::<Value>().unwrap(), json!({"level": "info"}));
    assert_eq!(
        server.backend.fetch(NAMESPACE, DOCUMENT_ID).unwrap(),
        Some(br#"{"level":"info"}"#.to_vec())
    );

    store.write(&json!({"level": "debug"})).unwrap();
    let remote: Value =
        serde_json::from_slice(&server.backend.fetch(NAMESPACE, DOCUMENT_ID).unwrap().unwrap())
            .unwrap();
    assert_eq!(remote, json!({"level": "debug"}));

    // Another client changes the document; refresh picks it up
    server
        .backend
        .put(NAMESPACE, DOCUMENT_ID, br#"{"level":"warn"}"#)
        .unwrap();
    store.refresh().unwrap();
    assert_eq!(store.read::<Value>().unwrap(), json!({"level": "warn"}));

    store.reset().unwrap();
    assert_eq!(store.read::<Value>().unwrap(), json!({"level": "info"}));

    store.close();
}

#[test]
fn test_store_survives_server_outage() {
    let server = TestServer::start();
    let dir = TempDir::new().unwrap();

    let store = Store::open(
        store_config(dir.path(), json!({"level": "info"})),
        Arc::new(server.gateway()),
    )
    .unwrap();

    server.backend.set_offline(true);

    assert!(store.write(&json!({"level": "debug"})).unwrap_err().is_transport());
    assert!(store.refresh().is_err());

    // Reads keep serving the last good snapshot
    assert_eq!(store.read::<Value>().unwrap(), json!({"level": "info"}));
}
