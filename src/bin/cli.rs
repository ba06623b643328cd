//! respkv CLI Client
//!
//! Command-line interface for interacting with a respkv server.

use clap::{Parser, Subcommand};
use respkv::network::Client;
use respkv::protocol::Value;

/// respkv CLI
#[derive(Parser, Debug)]
#[command(name = "respkv-cli")]
#[command(about = "CLI for the respkv key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ping the server
    Ping {
        /// Optional message to echo back
        message: Option<String>,
    },

    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Set one or more fields of a hash
    Hset {
        /// The hash key
        key: String,

        /// field value [field value ...]
        #[arg(required = true, num_args = 2..)]
        pairs: Vec<String>,
    },

    /// Get one field of a hash
    Hget {
        /// The hash key
        key: String,

        /// The field to get
        field: String,
    },

    /// Get every field and value of a hash
    Hgetall {
        /// The hash key
        key: String,
    },

    /// Send an arbitrary command, e.g. `raw SET a 1`
    Raw {
        #[arg(required = true, num_args = 1..)]
        parts: Vec<String>,
    },
}

impl Commands {
    fn into_parts(self) -> Vec<String> {
        match self {
            Commands::Ping { message } => {
                let mut parts = vec!["PING".to_string()];
                parts.extend(message);
                parts
            }
            Commands::Get { key } => vec!["GET".to_string(), key],
            Commands::Set { key, value } => vec!["SET".to_string(), key, value],
            Commands::Hset { key, pairs } => {
                let mut parts = vec!["HSET".to_string(), key];
                parts.extend(pairs);
                parts
            }
            Commands::Hget { key, field } => vec!["HGET".to_string(), key, field],
            Commands::Hgetall { key } => vec!["HGETALL".to_string(), key],
            Commands::Raw { parts } => parts,
        }
    }
}

fn main() {
    let args = Args::parse();

    let mut client = match Client::connect(&args.server) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Could not connect to {}: {}", args.server, e);
            std::process::exit(1);
        }
    };

    let parts = args.command.into_parts();
    let parts: Vec<&str> = parts.iter().map(String::as_str).collect();

    match client.send(&parts) {
        Ok(reply) => {
            print!("{}", render(&reply, 0));
            if reply.is_error() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Format a reply the way redis-cli does
fn render(value: &Value, indent: usize) -> String {
    match value {
        Value::SimpleString(text) => format!("{}\n", text),
        Value::Error(text) => format!("(error) {}\n", text),
        Value::Integer(n) => format!("(integer) {}\n", n),
        Value::Bulk(bytes) => format!("\"{}\"\n", bytes.escape_ascii()),
        Value::Null => "(nil)\n".to_string(),
        Value::Array(items) if items.is_empty() => "(empty array)\n".to_string(),
        Value::Array(items) => {
            let width = items.len().to_string().len();
            let mut out = String::new();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(&" ".repeat(indent));
                }
                let prefix = format!("{:>width$}) ", i + 1, width = width);
                out.push_str(&prefix);
                out.push_str(&render(item, indent + prefix.len()));
            }
            out
        }
    }
}
