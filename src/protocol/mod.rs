//! Protocol Module
//!
//! The Redis serialization protocol (RESP2) spoken between clients and the
//! server, and also the on-disk record format of the append-only file.
//!
//! ### Request Format
//! ```text
//! *3\r\n $3\r\nSET\r\n $1\r\na\r\n $1\r\n1\r\n
//! └─┬──┘ └────┬─────┘ └───┬───┘ └───┬───┘
//!  len     command       key      value
//! ```
//!
//! ### Reply Types
//! - `+` simple string, `-` error, `:` integer
//! - `$` bulk string (`$-1` is null)
//! - `*` array

mod value;
mod codec;

pub use value::Value;
pub use codec::{encode, encode_into, write_value, RespReader, MAX_NESTING};
