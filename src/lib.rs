//! # respkv
//!
//! A small in-memory key-value store that speaks the Redis wire protocol:
//! - RESP2 codec shared by the network layer and the on-disk log
//! - Append-only file (AOF) written before every mutation, replayed on startup
//! - String and hash tables behind independent read-write locks
//! - Thread-per-connection TCP server
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │              (one thread per connection)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  RESP request
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Engine                                 │
//! │          (log mutating commands, then apply)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     AOF     │          │ Dispatcher  │
//!   │  (Append)   │          └──────┬──────┘
//!   └─────────────┘                 │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │ MemoryStore │
//!                           │  (RwLocks)  │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod aof;
pub mod store;
pub mod command;
pub mod network;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{Config, SyncStrategy};
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of respkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
