//! # settingstore
//!
//! A resilient settings store that keeps one configuration document in sync
//! between a remote document store and a local cache:
//! - Typed, concurrent reads from an atomically replaced snapshot
//! - Writes applied locally only after the remote acknowledges them
//! - Periodic background refresh
//! - Self-healing bootstrap from the local cache or a default document
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Callers                               │
//! │              read / write / refresh / reset                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Store                                │
//! │        (Snapshot swap + cache write under one lock)          │
//! └───────┬──────────────────────┬──────────────────────┬───────┘
//!         │                      │                      │
//!         ▼                      ▼                      ▼
//!   ┌─────────────┐       ┌─────────────┐        ┌─────────────┐
//!   │  Snapshot   │       │ Cache File  │        │  Refresher  │
//!   │  (RwLock)   │       │  (atomic)   │        │  (thread)   │
//!   └─────────────┘       └─────────────┘        └──────┬──────┘
//!                                                       │
//!                         ┌─────────────────────────────▼──────┐
//!                         │          DocumentGateway           │
//!                         │   (memory, or TCP to the server)   │
//!                         └────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use settingstore::{MemoryGateway, Store, StoreConfig};
//!
//! let config = StoreConfig::builder()
//!     .namespace("cfg")
//!     .default_document(json!({"level": "info"}))
//!     .cache_dir("/tmp/settingstore")
//!     .build();
//!
//! let store = Store::open(config, Arc::new(MemoryGateway::new()))?;
//! store.write(&json!({"level": "debug"}))?;
//! let current: serde_json::Value = store.read()?;
//! assert_eq!(current, json!({"level": "debug"}));
//! # Ok::<(), settingstore::StoreError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod cache;
pub mod snapshot;
pub mod refresher;
pub mod gateway;
pub mod protocol;
pub mod network;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{GatewayConfig, ServerConfig, StoreConfig};
pub use gateway::{DocumentGateway, MemoryGateway, TcpGateway};
pub use store::{Store, DOCUMENT_ID};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of settingstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
