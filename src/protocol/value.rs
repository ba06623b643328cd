//! Protocol values
//!
//! One parsed or to-be-serialized unit of the wire protocol.

use bytes::Bytes;

/// A RESP value
///
/// Values are immutable once built: the reader produces them from the wire,
/// command handlers construct them as replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `+<text>\r\n`
    SimpleString(String),

    /// `-<text>\r\n`
    Error(String),

    /// `:<n>\r\n`
    Integer(i64),

    /// `$<len>\r\n<bytes>\r\n` (binary safe)
    Bulk(Bytes),

    /// The absent bulk string, `$-1\r\n`
    Null,

    /// `*<len>\r\n` followed by each element
    Array(Vec<Value>),
}

impl Value {
    /// The `+OK` reply
    pub fn ok() -> Self {
        Value::SimpleString("OK".to_string())
    }

    /// An error reply
    pub fn error(message: impl Into<String>) -> Self {
        Value::Error(message.into())
    }

    /// A present bulk string
    pub fn bulk(payload: impl Into<Bytes>) -> Self {
        Value::Bulk(payload.into())
    }

    /// Build a client request: an array of bulk strings
    pub fn command(parts: &[&str]) -> Self {
        Value::Array(
            parts
                .iter()
                .map(|part| Value::Bulk(Bytes::copy_from_slice(part.as_bytes())))
                .collect(),
        )
    }

    /// Raw bytes of a string-like value (bulk or simple string)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bulk(bytes) => Some(bytes),
            Value::SimpleString(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    /// Owned bytes of a string-like value, cheap for bulk strings
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self {
            Value::Bulk(bytes) => Some(bytes.clone()),
            Value::SimpleString(text) => Some(Bytes::copy_from_slice(text.as_bytes())),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Short type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::SimpleString(_) => "simple string",
            Value::Error(_) => "error",
            Value::Integer(_) => "integer",
            Value::Bulk(_) => "bulk string",
            Value::Null => "null",
            Value::Array(_) => "array",
        }
    }
}
