//! Command Module
//!
//! Turns decoded requests into typed commands and executes them against a
//! [`Store`](crate::store::Store).
//!
//! ## Commands
//! | Name    | Arguments                     | Reply                 | Writes |
//! |---------|-------------------------------|-----------------------|--------|
//! | PING    | `[message]`                   | `+PONG` / `+message`  |        |
//! | SET     | `key value`                   | `+OK`                 | yes    |
//! | GET     | `key`                         | bulk or null          |        |
//! | HSET    | `key field value [field value ...]` | `+OK`           | yes    |
//! | HGET    | `key field`                   | bulk or null          |        |
//! | HGETALL | `key`                         | array of field, value |        |
//!
//! Command names are matched case-insensitively.

mod dispatcher;

pub use dispatcher::Dispatcher;

use bytes::Bytes;
use thiserror::Error;

use crate::error::{KvError, Result};
use crate::protocol::Value;

// =============================================================================
// Request
// =============================================================================

/// A decoded client request: a non-empty array whose first element names the
/// command
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Command name, uppercased
    name: String,

    /// The request exactly as decoded; this is what the AOF records
    raw: Value,
}

impl Request {
    /// Validate the shape of a decoded value
    ///
    /// Anything other than a non-empty array with a string-like first
    /// element is rejected; the connection skips such values.
    pub fn from_value(raw: Value) -> Result<Self> {
        let name = match &raw {
            Value::Array(items) => {
                let first = items
                    .first()
                    .ok_or_else(|| KvError::Protocol("empty request array".to_string()))?;
                let name = first.as_bytes().ok_or_else(|| {
                    KvError::Protocol(format!(
                        "command name must be a string, got {}",
                        first.type_name()
                    ))
                })?;
                String::from_utf8_lossy(name).to_ascii_uppercase()
            }
            other => {
                return Err(KvError::Protocol(format!(
                    "expected request array, got {}",
                    other.type_name()
                )))
            }
        };

        Ok(Self { name, raw })
    }

    /// Build a request from string parts (tests and tools)
    pub fn from_parts(parts: &[&str]) -> Result<Self> {
        Self::from_value(Value::command(parts))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments after the command name
    pub fn args(&self) -> &[Value] {
        match &self.raw {
            Value::Array(items) => &items[1..],
            _ => &[],
        }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }
}

// =============================================================================
// Command
// =============================================================================

/// The closed set of supported commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Ping,
    Set,
    Get,
    HSet,
    HGet,
    HGetAll,
}

/// Table a command touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Strings,
    Hashes,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        CommandKind::Ping,
        CommandKind::Set,
        CommandKind::Get,
        CommandKind::HSet,
        CommandKind::HGet,
        CommandKind::HGetAll,
    ];

    /// Look up a command by name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    /// Canonical uppercase name
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Ping => "PING",
            CommandKind::Set => "SET",
            CommandKind::Get => "GET",
            CommandKind::HSet => "HSET",
            CommandKind::HGet => "HGET",
            CommandKind::HGetAll => "HGETALL",
        }
    }

    /// Mutating commands are logged to the AOF before they run
    pub fn is_mutating(&self) -> bool {
        matches!(self, CommandKind::Set | CommandKind::HSet)
    }

    pub fn table(&self) -> Option<Table> {
        match self {
            CommandKind::Ping => None,
            CommandKind::Set | CommandKind::Get => Some(Table::Strings),
            CommandKind::HSet | CommandKind::HGet | CommandKind::HGetAll => Some(Table::Hashes),
        }
    }
}

/// A command with validated arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping(Option<Bytes>),
    Set { key: Bytes, value: Bytes },
    Get { key: Bytes },
    HSet { key: Bytes, pairs: Vec<(Bytes, Bytes)> },
    HGet { key: Bytes, field: Bytes },
    HGetAll { key: Bytes },
}

impl Command {
    /// Check arity and argument types
    pub fn parse(request: &Request) -> std::result::Result<Self, CommandError> {
        let kind = CommandKind::from_name(request.name()).ok_or_else(|| {
            CommandError::UnknownCommand {
                name: request.name().to_string(),
            }
        })?;
        let args = request.args();
        let arg = |value: &Value| argument(kind, value);

        match (kind, args) {
            (CommandKind::Ping, []) => Ok(Command::Ping(None)),
            (CommandKind::Ping, [message]) => Ok(Command::Ping(Some(arg(message)?))),
            (CommandKind::Set, [key, value]) => Ok(Command::Set {
                key: arg(key)?,
                value: arg(value)?,
            }),
            (CommandKind::Get, [key]) => Ok(Command::Get { key: arg(key)? }),
            (CommandKind::HSet, [key, rest @ ..]) if !rest.is_empty() && rest.len() % 2 == 0 => {
                let pairs = rest
                    .chunks_exact(2)
                    .map(|pair| -> std::result::Result<_, CommandError> {
                        Ok((arg(&pair[0])?, arg(&pair[1])?))
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(Command::HSet {
                    key: arg(key)?,
                    pairs,
                })
            }
            (CommandKind::HGet, [key, field]) => Ok(Command::HGet {
                key: arg(key)?,
                field: arg(field)?,
            }),
            (CommandKind::HGetAll, [key]) => Ok(Command::HGetAll { key: arg(key)? }),
            _ => Err(CommandError::WrongArity {
                command: kind.name(),
            }),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Ping(_) => CommandKind::Ping,
            Command::Set { .. } => CommandKind::Set,
            Command::Get { .. } => CommandKind::Get,
            Command::HSet { .. } => CommandKind::HSet,
            Command::HGet { .. } => CommandKind::HGet,
            Command::HGetAll { .. } => CommandKind::HGetAll,
        }
    }

    pub fn is_mutating(&self) -> bool {
        self.kind().is_mutating()
    }

    pub fn table(&self) -> Option<Table> {
        self.kind().table()
    }
}

fn argument(kind: CommandKind, value: &Value) -> std::result::Result<Bytes, CommandError> {
    value.to_bytes().ok_or(CommandError::InvalidArgument {
        command: kind.name(),
    })
}

// =============================================================================
// Errors
// =============================================================================

/// Errors answered to the client; the connection stays open
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("ERR wrong number of arguments for '{}' command", .command.to_ascii_lowercase())]
    WrongArity { command: &'static str },

    #[error("ERR unknown command '{name}'")]
    UnknownCommand { name: String },

    #[error("ERR invalid argument for '{}' command", .command.to_ascii_lowercase())]
    InvalidArgument { command: &'static str },
}

impl From<CommandError> for Value {
    fn from(err: CommandError) -> Self {
        Value::Error(err.to_string())
    }
}
