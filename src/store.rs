//! Store Module
//!
//! The settings store that coordinates all components.
//!
//! ## Responsibilities
//! - Load the document on open, bootstrapping it when the remote has none
//! - Serve typed reads from the in-memory snapshot
//! - Forward writes to the remote and apply them locally once acknowledged
//! - Keep the snapshot fresh from a background refresher
//! - Mirror every new document into the local cache record

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheFile;
use crate::config::{json_kind, StoreConfig};
use crate::error::{Result, StoreError};
use crate::gateway::DocumentGateway;
use crate::refresher::Refresher;
use crate::snapshot::Snapshot;

/// Fixed id of the settings document inside its namespace
pub const DOCUMENT_ID: &str = "general";

/// A settings store bound to one namespace
///
/// ## Concurrency Model
///
/// - **Reads**: clone the snapshot `Arc` under a short read lock; any number
///   run together
/// - **Replacements** (load, refresh, write, bootstrap): network I/O happens
///   first with no lock held, then the snapshot swap and cache write run
///   under `persist_lock`, so cache records land in snapshot order
/// - **Refresher**: one background thread, stopped and joined by `close()`
pub struct Store {
    inner: Arc<StoreInner>,

    /// Background refresh task (taken on close)
    refresher: Mutex<Option<Refresher>>,
}

/// State shared between foreground callers and the refresher thread
struct StoreInner {
    /// Validated configuration
    config: StoreConfig,

    /// Validated default document
    default: Value,

    /// Remote document store client
    gateway: Arc<dyn DocumentGateway>,

    /// Current document
    snapshot: Snapshot,

    /// Local cache record
    cache: CacheFile,

    /// Serializes snapshot swap + cache write
    persist_lock: Mutex<()>,

    /// Asynchronous error reports
    errors_tx: Sender<StoreError>,
    errors_rx: Receiver<StoreError>,

    closed: AtomicBool,
}

impl Store {
    /// Open a store
    ///
    /// On startup:
    /// 1. Validate the config (namespace and default are required)
    /// 2. Load the document, bootstrapping it if the remote has none
    /// 3. Start the background refresher
    pub fn open(config: StoreConfig, gateway: Arc<dyn DocumentGateway>) -> Result<Self> {
        let mut config = config;
        let default = config.validate()?;

        let cache = CacheFile::new(config.cache_path());
        let (errors_tx, errors_rx) = channel::bounded(config.error_channel_capacity);

        let inner = Arc::new(StoreInner {
            config,
            default,
            gateway,
            snapshot: Snapshot::empty(),
            cache,
            persist_lock: Mutex::new(()),
            errors_tx,
            errors_rx,
            closed: AtomicBool::new(false),
        });

        inner.load()?;

        let refresher = {
            let task = Arc::clone(&inner);
            let mut last_error: Option<String> = None;
            Refresher::spawn(
                format!("settingstore-refresh-{}", inner.config.namespace),
                inner.config.refresh_interval,
                move || task.background_refresh(&mut last_error),
            )?
        };

        tracing::info!(
            "Settings store ready: namespace={}, refresh every {:?}",
            inner.config.namespace,
            inner.config.refresh_interval
        );

        Ok(Self {
            inner,
            refresher: Mutex::new(Some(refresher)),
        })
    }

    /// Decode the current document into `T`
    pub fn read<T: DeserializeOwned>(&self) -> Result<T> {
        self.ensure_open()?;
        self.inner.snapshot.decode()
    }

    /// Decode the current document into an existing destination
    ///
    /// `out` is left untouched if decoding fails.
    pub fn read_into<T: DeserializeOwned>(&self, out: &mut T) -> Result<()> {
        *out = self.read()?;
        Ok(())
    }

    /// Current document as raw JSON
    pub fn snapshot(&self) -> Arc<Value> {
        self.inner.snapshot.load()
    }

    /// Number of snapshot replacements since open
    pub fn generation(&self) -> u64 {
        self.inner.snapshot.generation()
    }

    /// Replace the document
    ///
    /// Steps:
    /// 1. Encode `value` (must encode to a JSON object)
    /// 2. Put it to the remote
    /// 3. Only on success: swap the snapshot and write the cache record
    pub fn write<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.ensure_open()?;

        let document = serde_json::to_value(value)
            .map_err(|e| StoreError::InvalidArgument(format!("cannot encode settings: {}", e)))?;
        if !document.is_object() {
            return Err(StoreError::InvalidArgument(format!(
                "settings must encode to an object, got {}",
                json_kind(&document)
            )));
        }
        let body = encode_document(&document)?;

        self.inner.put_remote(&body)?;
        let generation = self.inner.install(document, &body);

        tracing::debug!(
            "Settings written: namespace={}, generation={}",
            self.inner.config.namespace,
            generation
        );
        Ok(())
    }

    /// Re-fetch the document from the remote
    ///
    /// On failure the previous snapshot is kept, and the error is both
    /// returned and sent to the error channel.
    pub fn refresh(&self) -> Result<()> {
        self.ensure_open()?;

        self.inner.refresh_once().map(|_| ()).map_err(|e| {
            self.inner.report(&e);
            e
        })
    }

    /// Delete the remote namespace and recreate the document from the default
    ///
    /// The cache record is not consulted: reset means factory defaults.
    pub fn reset(&self) -> Result<()> {
        self.ensure_open()?;

        let namespace = &self.inner.config.namespace;
        tracing::info!("Resetting settings: namespace={}", namespace);

        self.inner.gateway.delete(namespace)?;
        self.inner.bootstrap(false)
    }

    /// Receiver for asynchronous error reports
    ///
    /// Every clone competes for the same reports.
    pub fn errors(&self) -> Receiver<StoreError> {
        self.inner.errors_rx.clone()
    }

    /// Stop the refresher
    ///
    /// Calls already in progress finish normally; later calls fail with
    /// `StoreError::Closed`. Closing twice is a no-op.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(mut refresher) = self.refresher.lock().take() {
            refresher.stop();
        }

        tracing::info!("Settings store closed: namespace={}", self.inner.config.namespace);
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the namespace
    pub fn namespace(&self) -> &str {
        &self.inner.config.namespace
    }

    /// Get the cache record
    pub fn cache(&self) -> &CacheFile {
        &self.inner.cache
    }

    /// Get the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.close();
    }
}

impl StoreInner {
    /// Initial load
    ///
    /// - Found: install it
    /// - Not found: bootstrap, back off, fetch again
    /// - Any other failure: keep the empty snapshot and report the error,
    ///   so the refresher can recover later
    fn load(&self) -> Result<()> {
        let namespace = &self.config.namespace;
        let started = Instant::now();

        loop {
            match self.gateway.fetch(namespace, DOCUMENT_ID) {
                Ok(Some(body)) => {
                    let document = decode_document(&body)?;
                    self.install(document, &body);
                    tracing::debug!("Settings loaded: namespace={}", namespace);
                    return Ok(());
                }
                Ok(None) => {
                    tracing::warn!("Settings missing remotely: namespace={}", namespace);
                    self.bootstrap(true)?;
                    self.backoff(started)?;
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to load settings, starting degraded: namespace={}, error={}",
                        namespace,
                        e
                    );
                    self.report(&e);
                    return Ok(());
                }
            }
        }
    }

    /// Wait before the next fetch, honouring the bootstrap deadline
    fn backoff(&self, started: Instant) -> Result<()> {
        let wait = match self.config.bootstrap_deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return Err(StoreError::BootstrapTimeout(deadline));
                }
                remaining.min(self.config.bootstrap_backoff)
            }
            None => self.config.bootstrap_backoff,
        };

        if wait > Duration::ZERO {
            thread::sleep(wait);
        }
        Ok(())
    }

    /// Create the remote document from the cache record (if allowed and
    /// readable) or the default
    fn bootstrap(&self, use_cache: bool) -> Result<()> {
        let namespace = &self.config.namespace;

        let seed = match use_cache.then(|| self.cached_document()).flatten() {
            Some(cached) => cached,
            None => {
                tracing::info!("Creating default settings: namespace={}", namespace);
                self.default.clone()
            }
        };

        let body = encode_document(&seed)?;
        self.put_remote(&body)?;
        self.install(seed, &body);
        Ok(())
    }

    /// Document from the cache record, if one exists and decodes
    fn cached_document(&self) -> Option<Value> {
        let path = self.cache.path();

        match self.cache.read() {
            Ok(Some(body)) => match decode_document(&body) {
                Ok(document) => {
                    tracing::info!("Recovered from local cache: {}", path.display());
                    Some(document)
                }
                Err(e) => {
                    tracing::warn!("Ignoring corrupt cache record {}: {}", path.display(), e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read cache record {}: {}", path.display(), e);
                None
            }
        }
    }

    /// One fetch + install; returns the current generation
    ///
    /// The fetch runs without any lock held. If another replacement (a write,
    /// a reset) lands while it is in flight, the fetched document may predate
    /// it, so it is dropped rather than installed over the newer one.
    fn refresh_once(&self) -> Result<u64> {
        let observed = self.snapshot.generation();

        match self.gateway.fetch(&self.config.namespace, DOCUMENT_ID)? {
            Some(body) => {
                let document = decode_document(&body)?;
                match self.install_if_current(observed, document, &body) {
                    Some(generation) => Ok(generation),
                    None => {
                        tracing::debug!(
                            "Refreshed settings superseded: namespace={}, fetched at generation {}",
                            self.config.namespace,
                            observed
                        );
                        Ok(self.snapshot.generation())
                    }
                }
            }
            None => Err(StoreError::NotFound),
        }
    }

    /// Refresher tick
    ///
    /// Repeats of the previous tick's error are logged at debug level and
    /// not reported again; a successful tick clears the memory.
    fn background_refresh(&self, last_error: &mut Option<String>) {
        match self.refresh_once() {
            Ok(generation) => {
                if last_error.take().is_some() {
                    tracing::info!(
                        "Settings refresh recovered: namespace={}",
                        self.config.namespace
                    );
                }
                tracing::trace!("Settings refreshed: generation={}", generation);
            }
            Err(e) => {
                let message = e.to_string();
                if last_error.as_deref() == Some(message.as_str()) {
                    tracing::debug!("Settings refresh still failing: {}", message);
                } else {
                    tracing::warn!(
                        "Settings refresh failed: namespace={}, error={}",
                        self.config.namespace,
                        message
                    );
                    self.report(&e);
                }
                *last_error = Some(message);
            }
        }
    }

    fn put_remote(&self, body: &[u8]) -> Result<()> {
        self.gateway.put(&self.config.namespace, DOCUMENT_ID, body)
    }

    /// Swap the snapshot and persist the cache record
    ///
    /// Cache failures are logged and otherwise ignored.
    fn install(&self, document: Value, body: &[u8]) -> u64 {
        let _guard = self.persist_lock.lock();
        self.persist(document, body)
    }

    /// Like `install`, but only if the snapshot is still at `expected`
    ///
    /// Returns `None` (and touches nothing) when another replacement got
    /// there first.
    fn install_if_current(&self, expected: u64, document: Value, body: &[u8]) -> Option<u64> {
        let _guard = self.persist_lock.lock();
        if self.snapshot.generation() != expected {
            return None;
        }
        Some(self.persist(document, body))
    }

    /// Caller holds `persist_lock`
    fn persist(&self, document: Value, body: &[u8]) -> u64 {
        let generation = self.snapshot.replace(document);
        if let Err(e) = self.cache.write(body) {
            tracing::warn!(
                "Failed to write cache record {}: {}",
                self.cache.path().display(),
                e
            );
        }
        generation
    }

    /// Send an error to the error channel without blocking
    fn report(&self, err: &StoreError) {
        match self.errors_tx.try_send(err.to_report()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Error channel full, dropping report: {}", err);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Parse a stored document; it must be a JSON object
fn decode_document(body: &[u8]) -> Result<Value> {
    let document: Value = serde_json::from_slice(body)
        .map_err(|e| StoreError::Decode(format!("malformed settings document: {}", e)))?;

    if !document.is_object() {
        return Err(StoreError::Decode(format!(
            "settings document must be an object, got {}",
            json_kind(&document)
        )));
    }
    Ok(document)
}

fn encode_document(document: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(document)
        .map_err(|e| StoreError::InvalidArgument(format!("cannot encode settings: {}", e)))
}
