//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::Arc;

use crate::command::Request;
use crate::engine::Engine;
use crate::error::{KvError, Result};
use crate::protocol::{write_value, RespReader, Value};

/// Handles a single client connection
pub struct Connection {
    /// Request decoder over the buffered read half
    reader: RespReader<BufReader<TcpStream>>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Reference to the engine
    engine: Arc<Engine>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// No read timeout is set: a client may stay idle indefinitely.
    pub fn new(stream: TcpStream, engine: Arc<Engine>) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: RespReader::new(BufReader::new(read_stream)),
            writer: BufWriter::new(write_stream),
            engine,
            peer_addr,
        })
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Requests are read and answered strictly one at a time. Returns when
    /// the client disconnects; a protocol error closes the connection and is
    /// returned.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            // Read next request
            let value = match self.reader.read_request() {
                Ok(Some(value)) => value,
                Ok(None) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(e) if e.is_disconnect() => {
                    tracing::debug!("Connection to {} dropped: {}", self.peer_addr, e);
                    return Ok(());
                }
                Err(e @ KvError::Protocol(_)) => {
                    tracing::warn!("Closing {} after protocol error: {}", self.peer_addr, e);
                    // Best effort: tell the client why before hanging up
                    let _ = self.send(&Value::error(format!("ERR {}", e)));
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            };

            let request = match Request::from_value(value) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!("Skipping request from {}: {}", self.peer_addr, e);
                    continue;
                }
            };

            tracing::trace!("Received {} from {}", request.name(), self.peer_addr);

            let reply = match self.engine.execute(&request) {
                Ok(reply) => reply,
                Err(e) => Value::error(format!("ERR persistence failure: {}", e)),
            };

            if let Err(e) = self.send(&reply) {
                // The client went away before the reply could be written
                if e.is_disconnect() {
                    tracing::debug!(
                        "Client {} disconnected before reply could be sent: {}",
                        self.peer_addr,
                        e
                    );
                    return Ok(());
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Send a reply to the client
    fn send(&mut self, reply: &Value) -> Result<()> {
        write_value(&mut self.writer, reply)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
