//! Command dispatcher
//!
//! Executes typed commands against an injected store.

use std::sync::Arc;

use super::{Command, Request};
use crate::protocol::Value;
use crate::store::{MemoryStore, Store};

/// Executes commands against a store
///
/// The dispatcher never touches the AOF; logging a mutation before it is
/// applied is the [`Engine`](crate::engine::Engine)'s job.
pub struct Dispatcher<S: Store = MemoryStore> {
    store: Arc<S>,
}

impl<S: Store> Dispatcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Parse and execute a request; argument errors become error replies
    pub fn dispatch(&self, request: &Request) -> Value {
        match Command::parse(request) {
            Ok(command) => self.apply(command),
            Err(e) => e.into(),
        }
    }

    /// Execute an already validated command
    pub fn apply(&self, command: Command) -> Value {
        match command {
            Command::Ping(None) => Value::SimpleString("PONG".to_string()),
            Command::Ping(Some(message)) => {
                Value::SimpleString(String::from_utf8_lossy(&message).into_owned())
            }
            Command::Set { key, value } => {
                self.store.set(key, value);
                Value::ok()
            }
            Command::Get { key } => match self.store.get(&key) {
                Some(value) => Value::Bulk(value),
                None => Value::Null,
            },
            Command::HSet { key, pairs } => {
                self.store.hset(key, pairs);
                Value::ok()
            }
            Command::HGet { key, field } => match self.store.hget(&key, &field) {
                Some(value) => Value::Bulk(value),
                None => Value::Null,
            },
            Command::HGetAll { key } => Value::Array(
                self.store
                    .hgetall(&key)
                    .into_iter()
                    .flat_map(|(field, value)| [Value::Bulk(field), Value::Bulk(value)])
                    .collect(),
            ),
        }
    }
}

impl<S: Store> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}
