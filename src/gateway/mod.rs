//! Gateway Module
//!
//! The seam between the store and the remote document store.
//!
//! ## Responsibilities
//! - Fetch, put and delete raw document bytes by (namespace, id)
//! - Distinguish "document absent" from real failures
//! - Bound every remote call so a stalled remote cannot hang the caller
//!
//! ## Implementations
//! - [`MemoryGateway`]: in-process documents (tests, server backend)
//! - [`TcpGateway`]: client for the document server wire protocol

mod memory;
mod tcp;

pub use memory::MemoryGateway;
pub use tcp::TcpGateway;

use crate::error::Result;

/// Client of a remote document store
///
/// Implementations are shared between the store's foreground callers and its
/// background refresher, so every method takes `&self`.
pub trait DocumentGateway: Send + Sync {
    /// Fetch a document
    ///
    /// Returns:
    /// - `Ok(Some(bytes))`: document exists
    /// - `Ok(None)`: namespace or document does not exist
    /// - `Err(_)`: transport or remote failure
    fn fetch(&self, namespace: &str, id: &str) -> Result<Option<Vec<u8>>>;

    /// Create or replace a document
    fn put(&self, namespace: &str, id: &str, body: &[u8]) -> Result<()>;

    /// Delete a whole namespace (succeeds if it does not exist)
    fn delete(&self, namespace: &str) -> Result<()>;

    /// Health check
    fn ping(&self) -> Result<()> {
        Ok(())
    }
}
