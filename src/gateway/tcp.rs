//! TCP gateway
//!
//! Client side of the document server protocol.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::GatewayConfig;
use crate::error::{Result, StoreError};
use crate::protocol::{read_response, write_command, Command, Response, Status};

use super::DocumentGateway;

/// An open connection to the document server
struct ClientConnection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

/// Gateway that talks to a `settingstore-server` over TCP
///
/// One connection is opened lazily and reused. Requests are serialized over
/// it; after any I/O or protocol failure the connection is dropped and the
/// next call reconnects.
pub struct TcpGateway {
    config: GatewayConfig,
    conn: Mutex<Option<ClientConnection>>,
}

impl TcpGateway {
    /// Create a gateway (does not connect yet)
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    /// Create a gateway for `addr` with default timeouts
    pub fn with_addr(addr: impl Into<String>) -> Self {
        Self::new(GatewayConfig {
            addr: addr.into(),
            ..GatewayConfig::default()
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Send one command and wait for its response
    ///
    /// A reused connection may have been closed by the server while idle, so
    /// a failure on it is retried once on a fresh connection. Every command
    /// is idempotent (put replaces, delete of a missing namespace succeeds).
    fn round_trip(&self, command: Command) -> Result<Response> {
        let mut guard = self.conn.lock();

        if let Some(conn) = guard.as_mut() {
            match Self::exchange(conn, &command) {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::debug!("Reused connection to {} failed: {}", self.config.addr, e);
                    *guard = None;
                }
            }
        }

        let mut conn = self.connect().map_err(|e| self.transport_error(e))?;
        let response = Self::exchange(&mut conn, &command).map_err(|e| self.transport_error(e))?;

        // Only a connection that completed an exchange is kept
        *guard = Some(conn);
        Ok(response)
    }

    fn exchange(conn: &mut ClientConnection, command: &Command) -> Result<Response> {
        write_command(&mut conn.writer, command)?;
        read_response(&mut conn.reader)
    }

    fn connect(&self) -> Result<ClientConnection> {
        let addr = self.resolve()?;

        let stream = TcpStream::connect_timeout(
            &addr,
            Duration::from_millis(self.config.connect_timeout_ms.max(1)),
        )
        .map_err(|e| StoreError::Transport(format!("connect to {}: {}", self.config.addr, e)))?;

        stream.set_nodelay(true)?;
        if self.config.read_timeout_ms > 0 {
            stream.set_read_timeout(Some(Duration::from_millis(self.config.read_timeout_ms)))?;
        }
        if self.config.write_timeout_ms > 0 {
            stream.set_write_timeout(Some(Duration::from_millis(self.config.write_timeout_ms)))?;
        }

        let read_stream = stream.try_clone()?;
        tracing::debug!("Connected to document server {}", self.config.addr);

        Ok(ClientConnection {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    fn resolve(&self) -> Result<SocketAddr> {
        self.config
            .addr
            .to_socket_addrs()
            .map_err(|e| StoreError::Transport(format!("resolve {}: {}", self.config.addr, e)))?
            .next()
            .ok_or_else(|| {
                StoreError::Transport(format!("no address found for {}", self.config.addr))
            })
    }

    /// Socket errors surface as transport errors naming the server
    fn transport_error(&self, err: StoreError) -> StoreError {
        match err {
            StoreError::Io(e) => StoreError::Transport(format!("{}: {}", self.config.addr, e)),
            other => other,
        }
    }

    /// Map a remote ERROR status to a transport error
    fn expect_ok(response: Response) -> Result<Response> {
        match response.status {
            Status::Error => Err(StoreError::Transport(format!(
                "remote error: {}",
                response.error_message()
            ))),
            _ => Ok(response),
        }
    }
}

impl DocumentGateway for TcpGateway {
    fn fetch(&self, namespace: &str, id: &str) -> Result<Option<Vec<u8>>> {
        let response = Self::expect_ok(self.round_trip(Command::Fetch {
            namespace: namespace.to_string(),
            id: id.to_string(),
        })?)?;

        match response.status {
            Status::NotFound => Ok(None),
            _ => Ok(Some(response.payload.unwrap_or_default())),
        }
    }

    fn put(&self, namespace: &str, id: &str, body: &[u8]) -> Result<()> {
        Self::expect_ok(self.round_trip(Command::Put {
            namespace: namespace.to_string(),
            id: id.to_string(),
            body: body.to_vec(),
        })?)?;
        Ok(())
    }

    fn delete(&self, namespace: &str) -> Result<()> {
        Self::expect_ok(self.round_trip(Command::Delete {
            namespace: namespace.to_string(),
        })?)?;
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        let response = Self::expect_ok(self.round_trip(Command::Ping)?)?;
        match response.payload.as_deref() {
            Some(b"PONG") => Ok(()),
            _ => Err(StoreError::Protocol("unexpected PING reply".into())),
        }
    }
}
