//! Error types for respkv
//!
//! Provides a unified error type for all fallible operations. Command-level
//! failures (bad arity, unknown command) live in [`crate::command::CommandError`]
//! because they are answered to the client rather than propagated.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for respkv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Wire Protocol Errors
    // -------------------------------------------------------------------------
    /// Malformed framing or a stream that ended in the middle of a value.
    /// Fatal to the connection it happened on, never to the process.
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Append-Only File Errors
    // -------------------------------------------------------------------------
    /// The log could not durably record a command.
    #[error("AOF error: {0}")]
    Aof(String),

    /// The log could not be replayed at startup.
    #[error("AOF replay failed at record {record}: {reason}")]
    Replay { record: u64, reason: String },

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with an error reply (client side)
    #[error("Server error: {0}")]
    ServerReply(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// True when the error is a clean hang-up from the peer rather than a fault
    pub fn is_disconnect(&self) -> bool {
        match self {
            KvError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
