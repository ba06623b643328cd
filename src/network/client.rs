//! Blocking client
//!
//! Speaks the same protocol as the server; used by `respkv-cli` and tests.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};

use bytes::Bytes;

use crate::error::{KvError, Result};
use crate::protocol::{write_value, RespReader, Value};

/// A single connection to a respkv server
pub struct Client {
    reader: RespReader<BufReader<TcpStream>>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: RespReader::new(BufReader::new(read_stream)),
            writer: BufWriter::new(stream),
        })
    }

    /// Send any value and wait for the reply, error replies included
    pub fn send_value(&mut self, request: &Value) -> Result<Value> {
        write_value(&mut self.writer, request)?;
        self.reader
            .read_value()?
            .ok_or_else(|| KvError::Network("server closed the connection".to_string()))
    }

    /// Send a command built from string parts
    pub fn send(&mut self, parts: &[&str]) -> Result<Value> {
        self.send_value(&Value::command(parts))
    }

    pub fn ping(&mut self, message: Option<&str>) -> Result<String> {
        let reply = match message {
            Some(message) => self.send(&["PING", message])?,
            None => self.send(&["PING"])?,
        };
        match check(reply)? {
            Value::SimpleString(text) => Ok(text),
            other => Err(unexpected("PING", &other)),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        expect_ok("SET", self.send(&["SET", key, value])?)
    }

    pub fn get(&mut self, key: &str) -> Result<Option<Bytes>> {
        optional_bulk("GET", self.send(&["GET", key])?)
    }

    pub fn hset(&mut self, key: &str, pairs: &[(&str, &str)]) -> Result<()> {
        let mut parts = Vec::with_capacity(2 + pairs.len() * 2);
        parts.push("HSET");
        parts.push(key);
        for &(field, value) in pairs {
            parts.push(field);
            parts.push(value);
        }
        expect_ok("HSET", self.send(&parts)?)
    }

    pub fn hget(&mut self, key: &str, field: &str) -> Result<Option<Bytes>> {
        optional_bulk("HGET", self.send(&["HGET", key, field])?)
    }

    /// All `(field, value)` pairs of a hash, in server order
    pub fn hgetall(&mut self, key: &str) -> Result<Vec<(Bytes, Bytes)>> {
        let items = match check(self.send(&["HGETALL", key])?)? {
            Value::Array(items) => items,
            other => return Err(unexpected("HGETALL", &other)),
        };
        if items.len() % 2 != 0 {
            return Err(KvError::Network(format!(
                "HGETALL reply has odd length {}",
                items.len()
            )));
        }

        items
            .chunks_exact(2)
            .map(|pair| match (&pair[0], &pair[1]) {
                (Value::Bulk(field), Value::Bulk(value)) => Ok((field.clone(), value.clone())),
                (other, _) => Err(unexpected("HGETALL", other)),
            })
            .collect()
    }
}

/// Turn an error reply into `Err`
fn check(reply: Value) -> Result<Value> {
    match reply {
        Value::Error(message) => Err(KvError::ServerReply(message)),
        other => Ok(other),
    }
}

fn expect_ok(command: &str, reply: Value) -> Result<()> {
    match check(reply)? {
        Value::SimpleString(text) if text == "OK" => Ok(()),
        other => Err(unexpected(command, &other)),
    }
}

fn optional_bulk(command: &str, reply: Value) -> Result<Option<Bytes>> {
    match check(reply)? {
        Value::Bulk(bytes) => Ok(Some(bytes)),
        Value::Null => Ok(None),
        other => Err(unexpected(command, &other)),
    }
}

fn unexpected(command: &str, reply: &Value) -> KvError {
    KvError::Network(format!("unexpected {} reply to {}", reply.type_name(), command))
}
