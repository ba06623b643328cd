//! Server Tests
//!
//! End-to-end tests over real TCP connections:
//! - Byte-exact request/reply scenarios
//! - Malformed input closes only the offending connection
//! - Non-array requests are skipped
//! - Many clients at once, connection limit
//! - Data survives a server restart
//! - Stopping the server closes the AOF

use std::io::{BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use respkv::config::{Config, SyncStrategy};
use respkv::engine::Engine;
use respkv::network::{Client, Server};
use respkv::protocol::{RespReader, Value};
use respkv::store::Store;
use respkv::KvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct TestServer {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    fn start(data_dir: &Path, max_connections: usize) -> Self {
        let config = Config::builder()
            .data_dir(data_dir)
            .listen_addr("127.0.0.1:0")
            .max_connections(max_connections)
            .sync_strategy(SyncStrategy::EveryWrite)
            .build();
        let engine = Arc::new(Engine::open(config.clone()).unwrap());

        let mut server = Server::new(config, engine);
        let addr = server.bind().unwrap();
        let shutdown = server.shutdown_handle();

        let handle = thread::spawn(move || server.serve().unwrap());

        Self {
            addr,
            shutdown,
            handle: Some(handle),
        }
    }

    fn client(&self) -> Client {
        Client::connect(self.addr).unwrap()
    }

    fn raw(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream
    }

    fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop_inner();
    }
}

/// Send raw bytes and read exactly `expected.len()` bytes back
fn exchange(stream: &mut TcpStream, request: &[u8], expected: &[u8]) {
    stream.write_all(request).unwrap();
    let mut reply = vec![0u8; expected.len()];
    stream.read_exact(&mut reply).unwrap();
    assert_eq!(
        reply,
        expected,
        "reply {:?}",
        String::from_utf8_lossy(&reply)
    );
}

// =============================================================================
// Wire Scenarios
// =============================================================================

#[test]
fn test_ping_scenario() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path(), 16);
    let mut stream = server.raw();

    exchange(&mut stream, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n");
}

#[test]
fn test_set_get_scenario() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path(), 16);
    let mut stream = server.raw();

    exchange(
        &mut stream,
        b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n",
        b"+OK\r\n",
    );
    exchange(&mut stream, b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n", b"$1\r\n1\r\n");
}

#[test]
fn test_hgetall_unknown_key_scenario() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path(), 16);
    let mut stream = server.raw();

    exchange(&mut stream, b"*2\r\n$7\r\nHGETALL\r\n$1\r\nz\r\n", b"*0\r\n");
}

#[test]
fn test_get_missing_is_null_bulk() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path(), 16);
    let mut stream = server.raw();

    exchange(&mut stream, b"*2\r\n$3\r\nGET\r\n$4\r\nnope\r\n", b"$-1\r\n");
}

#[test]
fn test_pipelined_requests_answered_in_order() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path(), 16);
    let mut stream = server.raw();

    exchange(
        &mut stream,
        b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n*1\r\n$4\r\nPING\r\n",
        b"+OK\r\n$1\r\nv\r\n+PONG\r\n",
    );
}

// =============================================================================
// Error Handling
// =============================================================================

#[test]
fn test_unknown_command_keeps_connection_open() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path(), 16);
    let mut client = server.client();

    match client.send(&["NOPE"]).unwrap() {
        Value::Error(msg) => assert!(msg.contains("unknown command")),
        other => panic!("Expected error, got {:?}", other),
    }
    match client.set("a", "1") {
        Ok(()) => {}
        Err(e) => panic!("connection should still work: {}", e),
    }
    assert!(matches!(
        client.send(&["SET", "a"]).unwrap(),
        Value::Error(_)
    ));
    assert_eq!(client.ping(None).unwrap(), "PONG");
}

#[test]
fn test_non_array_request_is_skipped() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path(), 16);
    let mut stream = server.raw();

    // A bare bulk string gets no reply; the following PING does
    exchange(&mut stream, b"$4\r\nPING\r\n*0\r\n*1\r\n$4\r\nPING\r\n", b"+PONG\r\n");
}

#[test]
fn test_protocol_error_closes_only_that_connection() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path(), 16);
    let mut healthy = server.client();
    healthy.set("k", "v").unwrap();

    let mut broken = server.raw();
    broken.write_all(b"*1\r\n+PING\r\n").unwrap();

    let mut reader = RespReader::new(BufReader::new(broken.try_clone().unwrap()));
    assert!(matches!(reader.read_value().unwrap(), Some(Value::Error(_))));
    assert_eq!(reader.read_value().unwrap(), None);

    assert_eq!(healthy.get("k").unwrap(), Some(Bytes::from("v")));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_many_clients_concurrently() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path(), 64);
    let addr = server.addr;

    let handles: Vec<_> = (0..8)
        .map(|t| {
            thread::spawn(move || {
                let mut client = Client::connect(addr).unwrap();
                for i in 0..25 {
                    let key = format!("k{}-{}", t, i);
                    client.set(&key, &i.to_string()).unwrap();
                    client
                        .hset("shared", &[(key.as_str(), "x")])
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut client = server.client();
    for t in 0..8 {
        for i in 0..25 {
            let key = format!("k{}-{}", t, i);
            assert_eq!(client.get(&key).unwrap(), Some(Bytes::from(i.to_string())));
        }
    }
    assert_eq!(client.hgetall("shared").unwrap().len(), 200);
}

#[test]
fn test_connection_limit() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path(), 1);

    let mut first = server.client();
    assert_eq!(first.ping(None).unwrap(), "PONG");

    // The refused client is told why, then the server hangs up
    let mut second = server.raw();
    let mut refusal = Vec::new();
    second.read_to_end(&mut refusal).unwrap();
    assert_eq!(refusal, b"-ERR max number of clients reached\r\n");

    // Once the first client leaves its slot is released
    drop(first);
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let mut third = server.client();
        match third.ping(None) {
            Ok(reply) => {
                assert_eq!(reply, "PONG");
                break;
            }
            Err(KvError::ServerReply(_)) | Err(KvError::Network(_)) | Err(KvError::Io(_))
                if Instant::now() < deadline =>
            {
                thread::sleep(Duration::from_millis(20));
            }
            Err(e) => panic!("slot was never released: {}", e),
        }
    }
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_data_survives_restart() {
    let temp = TempDir::new().unwrap();

    let server = TestServer::start(temp.path(), 16);
    {
        let mut client = server.client();
        client.set("greeting", "hello").unwrap();
        client.hset("user", &[("name", "ada"), ("lang", "rust")]).unwrap();
    }
    server.stop();

    let server = TestServer::start(temp.path(), 16);
    let mut client = server.client();
    assert_eq!(client.get("greeting").unwrap(), Some(Bytes::from("hello")));
    assert_eq!(client.hget("user", "lang").unwrap(), Some(Bytes::from("rust")));

    let mut pairs = client.hgetall("user").unwrap();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            (Bytes::from("lang"), Bytes::from("rust")),
            (Bytes::from("name"), Bytes::from("ada")),
        ]
    );
}

#[test]
fn test_shutdown_flag_closes_engine_and_aof() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .listen_addr("127.0.0.1:0")
        .sync_strategy(SyncStrategy::Interval { millis: 60_000 })
        .build();
    let engine = Arc::new(Engine::open(config.clone()).unwrap());

    let mut server = Server::new(config.clone(), Arc::clone(&engine));
    let addr = server.bind().unwrap();
    let shutdown = server.shutdown_handle();
    let handle = thread::spawn(move || server.serve());

    let mut client = Client::connect(addr).unwrap();
    client.set("k", "v").unwrap();
    drop(client);

    // What the signal handler in the server binary does
    shutdown.store(true, Ordering::Release);
    handle.join().unwrap().unwrap();

    assert!(engine.is_shut_down());

    drop(engine);
    let reopened = Engine::open(Config::builder().data_dir(temp.path()).build()).unwrap();
    assert_eq!(reopened.store().get(b"k"), Some(Bytes::from("v")));
}
