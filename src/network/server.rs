//! TCP Server
//!
//! Accepts connections and dispatches each to its own thread.

use std::io::{BufWriter, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::gateway::DocumentGateway;
use crate::protocol::{write_response, Response};

use super::Connection;

/// How long the accept loop sleeps when no client is waiting
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// TCP document server
///
/// ## Threading
/// - The caller's thread runs the accept loop (non-blocking, polls `shutdown`)
/// - One thread per connection, capped at `max_connections`
/// - `run()` joins every connection thread before returning
pub struct Server {
    config: ServerConfig,
    backend: Arc<dyn DocumentGateway>,
    listener: Option<TcpListener>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Create a new server with the given config and backend
    pub fn new(config: ServerConfig, backend: Arc<dyn DocumentGateway>) -> Self {
        Self {
            config,
            backend,
            listener: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind the listen address (idempotent); returns the bound address
    pub fn bind(&mut self) -> Result<SocketAddr> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?);
        }

        let listener = TcpListener::bind(&self.config.listen_addr)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        self.listener = Some(listener);

        tracing::info!("Listening on {}", addr);
        Ok(addr)
    }

    /// Start the server (blocking until shutdown)
    pub fn run(&mut self) -> Result<()> {
        self.bind()?;
        let listener = match &self.listener {
            Some(listener) => listener,
            None => return Ok(()),
        };

        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        while !self.shutdown.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    workers.retain(|w| !w.is_finished());

                    if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
                        tracing::warn!("Rejecting {}: connection limit reached", peer);
                        reject(stream);
                        continue;
                    }

                    match self.spawn_worker(stream) {
                        Ok(handle) => workers.push(handle),
                        Err(e) => tracing::warn!("Failed to start connection for {}: {}", peer, e),
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!("Shutting down, waiting for {} connection(s)", workers.len());
        for worker in workers {
            let _ = worker.join();
        }
        Ok(())
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Flag that stops `run()` when set (for use from another thread)
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn spawn_worker(&self, stream: TcpStream) -> Result<JoinHandle<()>> {
        // Accepted sockets may inherit non-blocking mode from the listener
        stream.set_nonblocking(false)?;

        let mut connection = Connection::new(stream, Arc::clone(&self.backend))?;
        connection.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms)?;

        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name(format!("settingstore-conn-{}", connection.peer_addr()))
            .spawn(move || {
                if let Err(e) = connection.handle() {
                    tracing::debug!("Connection {} ended with error: {}", connection.peer_addr(), e);
                }
                active.fetch_sub(1, Ordering::SeqCst);
            });

        match spawned {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.active.fetch_sub(1, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }
}

/// Tell an over-limit client why it is being dropped
fn reject(stream: TcpStream) {
    let _ = stream.set_nonblocking(false);
    let mut writer = BufWriter::new(stream);
    let _ = write_response(&mut writer, &Response::error("server busy"));
}
