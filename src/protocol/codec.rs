//! Protocol codec
//!
//! Recursive-descent decoding and canonical encoding of RESP values.
//!
//! ## Wire Format
//!
//! ```text
//! +<text>\r\n                 simple string
//! -<text>\r\n                 error
//! :<n>\r\n                    integer
//! $<len>\r\n<bytes>\r\n       bulk string
//! $-1\r\n                     null bulk string
//! *<len>\r\n<elem>...<elem>   array (no trailer; the length delimits it)
//! ```
//!
//! Client requests only ever use arrays and bulk strings, so
//! [`RespReader::read_request`] rejects every other type byte. Replies can
//! carry all five types and are read with [`RespReader::read_value`].

use std::io::{self, BufRead, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use super::Value;
use crate::error::{KvError, Result};

pub const SIMPLE_STRING: u8 = b'+';
pub const ERROR: u8 = b'-';
pub const INTEGER: u8 = b':';
pub const BULK_STRING: u8 = b'$';
pub const ARRAY: u8 = b'*';

const CRLF: &[u8] = b"\r\n";

/// Deepest array nesting accepted before the stream is declared hostile
pub const MAX_NESTING: usize = 64;

/// Upper bound on capacity reserved up front from a declared length.
/// Larger values still decode, the buffer just grows as bytes arrive.
const PREALLOC_LIMIT: usize = 64 * 1024;

/// Which type bytes a decode call accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Arrays and bulk strings only
    Request,
    /// Every RESP type
    Reply,
}

// =============================================================================
// Decoding
// =============================================================================

/// Reads RESP values one at a time from a buffered byte stream
pub struct RespReader<R> {
    reader: R,
}

impl<R: BufRead> RespReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read one client request
    ///
    /// Returns `Ok(None)` when the stream ends cleanly before a new value
    /// starts. Running out of bytes inside a value is a protocol error.
    pub fn read_request(&mut self) -> Result<Option<Value>> {
        self.read_top(Mode::Request)
    }

    /// Read one value of any type (server replies)
    pub fn read_value(&mut self) -> Result<Option<Value>> {
        self.read_top(Mode::Reply)
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_top(&mut self, mode: Mode) -> Result<Option<Value>> {
        match self.read_tag()? {
            Some(tag) => self.read_tagged(tag, mode, 0).map(Some),
            None => Ok(None),
        }
    }

    /// Read the type byte; `None` on clean end of stream
    fn read_tag(&mut self) -> Result<Option<u8>> {
        let mut tag = [0u8; 1];
        loop {
            match self.reader.read(&mut tag) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(tag[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_tagged(&mut self, tag: u8, mode: Mode, depth: usize) -> Result<Value> {
        match (tag, mode) {
            (ARRAY, _) => self.read_array(mode, depth),
            (BULK_STRING, _) => self.read_bulk(),
            (SIMPLE_STRING, Mode::Reply) => Ok(Value::SimpleString(self.read_text_line()?)),
            (ERROR, Mode::Reply) => Ok(Value::Error(self.read_text_line()?)),
            (INTEGER, Mode::Reply) => Ok(Value::Integer(self.read_decimal()?)),
            _ => Err(KvError::Protocol(format!(
                "unexpected type byte '{}'",
                tag.escape_ascii()
            ))),
        }
    }

    fn read_array(&mut self, mode: Mode, depth: usize) -> Result<Value> {
        if depth >= MAX_NESTING {
            return Err(KvError::Protocol(format!(
                "arrays nested deeper than {}",
                MAX_NESTING
            )));
        }

        let len = self.read_decimal()?;
        if len == -1 {
            return Ok(Value::Null);
        }
        let len = checked_len(len, "array")?;

        let mut items = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        for _ in 0..len {
            let tag = self
                .read_tag()?
                .ok_or_else(|| truncated("array element"))?;
            items.push(self.read_tagged(tag, mode, depth + 1)?);
        }

        Ok(Value::Array(items))
    }

    fn read_bulk(&mut self) -> Result<Value> {
        let len = self.read_decimal()?;
        if len == -1 {
            // Null bulk string: no payload and no trailing CRLF follow
            return Ok(Value::Null);
        }
        let len = checked_len(len, "bulk string")?;

        let mut payload = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        let read = (&mut self.reader)
            .take(len as u64)
            .read_to_end(&mut payload)?;
        if read < len {
            return Err(truncated("bulk string payload"));
        }

        let mut trailer = [0u8; 2];
        self.reader
            .read_exact(&mut trailer)
            .map_err(|e| eof_as_truncated(e, "bulk string trailer"))?;
        if trailer != CRLF {
            return Err(KvError::Protocol(
                "bulk string payload not followed by CRLF".to_string(),
            ));
        }

        Ok(Value::Bulk(Bytes::from(payload)))
    }

    /// Read up to CRLF and return the line without it
    fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        self.reader.read_until(b'\n', &mut line)?;

        if !line.ends_with(b"\n") {
            return Err(truncated("line"));
        }
        if !line.ends_with(CRLF) {
            return Err(KvError::Protocol("line terminated by bare LF".to_string()));
        }

        line.truncate(line.len() - CRLF.len());
        Ok(line)
    }

    fn read_text_line(&mut self) -> Result<String> {
        let line = self.read_line()?;
        String::from_utf8(line).map_err(|_| KvError::Protocol("line is not valid UTF-8".to_string()))
    }

    /// Parse a length or integer line: optional `-`, then ASCII digits only
    fn read_decimal(&mut self) -> Result<i64> {
        let line = self.read_line()?;
        let digits = line.strip_prefix(b"-").unwrap_or(&line[..]);
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(KvError::Protocol(format!(
                "invalid decimal '{}'",
                line.escape_ascii()
            )));
        }

        std::str::from_utf8(&line)
            .ok()
            .and_then(|text| text.parse::<i64>().ok())
            .ok_or_else(|| {
                KvError::Protocol(format!(
                    "invalid decimal '{}'",
                    line.escape_ascii()
                ))
            })
    }
}

fn checked_len(len: i64, what: &str) -> Result<usize> {
    usize::try_from(len).map_err(|_| KvError::Protocol(format!("invalid {} length {}", what, len)))
}

fn truncated(what: &str) -> KvError {
    KvError::Protocol(format!("stream ended inside {}", what))
}

fn eof_as_truncated(err: io::Error, what: &str) -> KvError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        truncated(what)
    } else {
        err.into()
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a value into a fresh buffer
pub fn encode(value: &Value) -> Bytes {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf);
    buf.freeze()
}

/// Append the encoding of `value` to `buf`
pub fn encode_into(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::SimpleString(text) => put_line(buf, SIMPLE_STRING, text),
        Value::Error(text) => put_line(buf, ERROR, text),
        Value::Integer(n) => {
            buf.put_u8(INTEGER);
            buf.put_slice(n.to_string().as_bytes());
            buf.put_slice(CRLF);
        }
        Value::Bulk(payload) => {
            buf.put_u8(BULK_STRING);
            buf.put_slice(payload.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            buf.put_slice(payload);
            buf.put_slice(CRLF);
        }
        Value::Null => buf.put_slice(b"$-1\r\n"),
        Value::Array(items) => {
            buf.put_u8(ARRAY);
            buf.put_slice(items.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            for item in items {
                encode_into(item, buf);
            }
        }
    }
}

/// Simple strings and errors cannot carry line breaks; they are flattened to
/// spaces so the frame stays intact.
fn put_line(buf: &mut BytesMut, tag: u8, text: &str) {
    buf.put_u8(tag);
    buf.reserve(text.len() + CRLF.len());
    for byte in text.bytes() {
        buf.put_u8(if byte == b'\r' || byte == b'\n' { b' ' } else { byte });
    }
    buf.put_slice(CRLF);
}

/// Encode and write a value, then flush the writer
pub fn write_value<W: Write>(writer: &mut W, value: &Value) -> Result<()> {
    writer.write_all(&encode(value))?;
    writer.flush()?;
    Ok(())
}
