//! TCP Server
//!
//! Accepts connections and runs each one on its own thread.

use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{KvError, Result};

use super::Connection;

/// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

const TOO_MANY_CLIENTS: &[u8] = b"-ERR max number of clients reached\r\n";

/// TCP server for respkv
pub struct Server {
    config: Config,
    engine: Arc<Engine>,
    listener: Option<TcpListener>,

    /// Set to stop the accept loop
    shutdown: Arc<AtomicBool>,

    /// Connections currently being served
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Create a new server with the given config and engine
    pub fn new(config: Config, engine: Arc<Engine>) -> Self {
        Self {
            config,
            engine,
            listener: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind the listen address, if not bound yet, and return the bound address
    ///
    /// Binding `host:0` picks a free port, which tests read back from here.
    pub fn bind(&mut self) -> Result<SocketAddr> {
        if self.listener.is_none() {
            let listener = TcpListener::bind(&self.config.listen_addr).map_err(|e| {
                KvError::Network(format!("failed to bind {}: {}", self.config.listen_addr, e))
            })?;
            listener.set_nonblocking(true)?;
            self.listener = Some(listener);
        }
        self.local_addr()
            .ok_or_else(|| KvError::Network("listener has no local address".to_string()))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Start the server (blocking until shutdown is signalled)
    pub fn run(&mut self) -> Result<()> {
        let addr = self.bind()?;
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| KvError::Network("listener not bound".to_string()))?;

        tracing::info!("Listening on {}", addr);

        while !self.shutdown.load(Ordering::Acquire) {
            match listener.accept() {
                Ok((stream, peer)) => self.spawn_connection(stream, peer),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    // e.g. out of file descriptors; keep serving existing clients
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!("Server on {} stopped accepting connections", addr);
        Ok(())
    }

    /// Run until shutdown is signalled, then shut the engine down
    ///
    /// The engine is shut down even when the accept loop fails, so the AOF
    /// is always fsynced and closed before this returns.
    pub fn serve(&mut self) -> Result<()> {
        let served = self.run();
        if let Err(e) = &served {
            tracing::error!("Server error: {}", e);
        }

        let closed = self.engine.shutdown();
        if let Err(e) = &closed {
            tracing::error!("Engine shutdown failed: {}", e);
        }

        served.and(closed)
    }

    fn spawn_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        // Some platforms hand out accepted sockets in the listener's mode
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Dropping {}: {}", peer, e);
            return;
        }

        let Some(slot) = ConnectionSlot::acquire(&self.active, self.config.max_connections) else {
            tracing::warn!("Refusing {}: {} clients connected", peer, self.config.max_connections);
            let _ = stream.write_all(TOO_MANY_CLIENTS);
            return;
        };

        let engine = Arc::clone(&self.engine);
        let spawned = thread::Builder::new()
            .name(format!("conn-{}", peer))
            .spawn(move || {
                let _slot = slot;
                match Connection::new(stream, engine) {
                    Ok(mut connection) => {
                        if let Err(e) = connection.handle() {
                            tracing::debug!("Connection {} ended with error: {}", peer, e);
                        }
                    }
                    Err(e) => tracing::warn!("Failed to set up connection {}: {}", peer, e),
                }
                tracing::debug!("Connection {} closed", peer);
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn thread for {}: {}", peer, e);
        }
    }

    /// Flag that stops [`Server::run`] when set; usable from another thread
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the server to stop accepting connections
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Number of connections currently served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// Counts one live connection; released on drop
struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .ok()?;
        Some(Self {
            active: Arc::clone(active),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}
