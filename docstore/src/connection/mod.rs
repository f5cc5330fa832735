// Connection lifecycle - owns the transport and guards every command on it

mod config;
mod memory;
mod tcp;

pub use config::{ConnectionConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT};
pub use memory::MemoryTransport;
pub use tcp::TcpTransport;

use crate::error::{DocStoreError, Result, TransportError};
use crate::resp::{Command, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// The capability to execute one command and return the raw reply.
///
/// Implementations must be safe to call concurrently. Error replies from the
/// store come back as `Ok(Value::Error(..))`; `Err` is reserved for failures of
/// the transport itself.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, command: &Command) -> std::result::Result<Value, TransportError>;

    /// Release the underlying resources. Must be idempotent.
    async fn close(&self) -> std::result::Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
    Disposed,
}

/// Owns at most one transport.
///
/// `Unconnected -> Connected -> Disposed`; connecting again from `Disposed`
/// is allowed. Commands are only sent in the `Connected` state.
pub struct Connection {
    transport: Option<Arc<dyn Transport>>,
    state: ConnectionState,
}

impl Connection {
    pub fn new() -> Self {
        Connection {
            transport: None,
            state: ConnectionState::Unconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Open a TCP transport for `config`. An existing transport is disposed first.
    pub async fn open(&mut self, config: &ConnectionConfig) -> Result<()> {
        self.release_previous().await;
        let transport = TcpTransport::connect(config).await?;
        log::info!("Connected to {config}");
        self.install(Arc::new(transport));
        Ok(())
    }

    /// Use an already-established transport. An existing transport is disposed first.
    pub async fn attach(&mut self, transport: Arc<dyn Transport>) {
        self.release_previous().await;
        self.install(transport);
    }

    fn install(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
        self.state = ConnectionState::Connected;
    }

    async fn release_previous(&mut self) {
        if self.transport.is_some() {
            log::warn!("Connecting while already connected; disposing the previous connection");
            if let Err(e) = self.dispose().await {
                log::warn!("Failed to close previous connection: {e}");
            }
        }
    }

    /// Execute a command. Fails with `NotConnected` before touching the network
    /// unless connected; error replies surface as `TransportError::Server`.
    pub async fn execute(&self, command: Command) -> Result<Value> {
        let transport = match (&self.state, &self.transport) {
            (ConnectionState::Connected, Some(transport)) => transport,
            _ => return Err(DocStoreError::NotConnected),
        };

        log::debug!("-> {}", command.name());
        let reply = transport.execute(&command).await?.into_result()?;
        Ok(reply)
    }

    /// Release the transport. Safe to call when never connected and safe to
    /// call repeatedly.
    pub async fn dispose(&mut self) -> Result<()> {
        let Some(transport) = self.transport.take() else {
            if self.state == ConnectionState::Connected {
                self.state = ConnectionState::Disposed;
            }
            return Ok(());
        };
        self.state = ConnectionState::Disposed;
        transport.close().await?;
        log::info!("Connection disposed");
        Ok(())
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}
