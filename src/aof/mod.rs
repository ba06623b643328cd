//! Append-Only File (AOF) Module
//!
//! Durability through an append-only log of client commands.
//!
//! ## Responsibilities
//! - Append every mutating command before it is applied
//! - fsync on the configured strategy (every write, on a timer, or never)
//! - Replay the log at startup to rebuild the in-memory tables
//! - Close deterministically on shutdown
//!
//! ## File Format
//! The log is a plain concatenation of request arrays, encoded exactly as
//! they arrive on the wire. Arrays are self-delimiting, so there are no
//! record separators, headers or checksums.
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ *3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n   │  record 1
//! ├─────────────────────────────────────────────┤
//! │ *4\r\n$4\r\nHSET\r\n$1\r\nh\r\n$1\r\nf\r\n… │  record 2
//! └─────────────────────────────────────────────┘
//! ```

mod log;
mod sync;

pub use log::{Aof, ReplayStats};
pub use sync::SyncTask;
