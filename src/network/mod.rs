//! Network Module
//!
//! TCP server, per-connection handling and a blocking client.
//!
//! ## Architecture
//! - Single acceptor thread
//! - One thread per connection, requests answered in arrival order
//! - Requests routed through Engine

mod server;
mod connection;
mod client;

pub use server::Server;
pub use connection::Connection;
pub use client::Client;
