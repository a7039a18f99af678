//! Drives a real listener over TCP with raw HTTP/1.1 requests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dispatch::{
    AccessToken, Authenticator, Dispatcher, NotificationSink, QueueError, QueueSink, QueueStore,
    RoutingKey, SourceHost,
};
use listener::{Server, WebhookHandler};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Clone, Default)]
struct MemoryQueue {
    entries: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryQueue {
    fn get(&self, key: &str) -> Option<Bytes> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl QueueStore for MemoryQueue {
    async fn set(&self, key: &RoutingKey, value: Bytes) -> Result<(), QueueError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value);
        Ok(())
    }
}

struct RunningServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), listener::ListenerError>>,
}

impl RunningServer {
    async fn start(source: &str, token: &str, sink: Arc<dyn NotificationSink>) -> Self {
        let handler = WebhookHandler::new(
            Authenticator::new(SourceHost::new(source).unwrap(), AccessToken::new(token)),
            Dispatcher::new(sink),
            1024 * 1024,
        );

        let socket = listener::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(Server::new(handler).serve(socket, async move {
            let _ = stopped.await;
        }));

        Self { addr, stop, task }
    }

    async fn shutdown(self) {
        let _ = self.stop.send(());
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Sends one request and returns the status code and response body.
async fn send(addr: SocketAddr, target: &str, body: &[u8]) -> (u16, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let head = format!(
        "POST {target} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let mut request = head.into_bytes();
    request.extend_from_slice(body);
    stream.write_all(&request).await.unwrap();

    // A rejected request's body is never read, so the server may reset the
    // connection after answering. Keep whatever arrived before that.
    let mut raw = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => raw.extend_from_slice(&chunk[..n]),
        }
    }
    let text = String::from_utf8_lossy(&raw);

    let status = text
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or_else(|| panic!("malformed response: {text:?}"));
    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.as_bytes().to_vec())
        .unwrap_or_default();
    (status, body)
}

async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn queue_mode_stores_payload_under_repository_name() {
    let queue = MemoryQueue::default();
    let server = RunningServer::start(
        "127.0.0.1",
        "",
        Arc::new(QueueSink::new(queue.clone(), "memory")),
    )
    .await;

    let payload = br#"{"repository":{"name":"myrepo"}}"#;
    let (status, body) = send(server.addr, "/", payload).await;
    assert_eq!(status, 200);
    assert!(body.is_empty());

    assert!(eventually(|| queue.get("myrepo").is_some()).await);
    assert_eq!(queue.get("myrepo").unwrap().as_ref(), payload);

    server.shutdown().await;
}

#[tokio::test]
async fn queue_mode_answers_ok_but_skips_payload_without_repository() {
    let queue = MemoryQueue::default();
    let server = RunningServer::start(
        "127.0.0.1",
        "",
        Arc::new(QueueSink::new(queue.clone(), "memory")),
    )
    .await;

    let (status, _) = send(server.addr, "/", b"{}").await;
    assert_eq!(status, 200);

    // A well-formed request afterwards still goes through.
    let (status, _) = send(server.addr, "/", br#"{"repository":{"name":"after"}}"#).await;
    assert_eq!(status, 200);
    assert!(eventually(|| queue.get("after").is_some()).await);
    assert_eq!(queue.len(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn token_is_enforced_over_the_wire() {
    let queue = MemoryQueue::default();
    let server = RunningServer::start(
        "127.0.0.1",
        "secret123",
        Arc::new(QueueSink::new(queue.clone(), "memory")),
    )
    .await;

    let payload = br#"{"repository":{"name":"guarded"}}"#;
    let (status, body) = send(server.addr, "/?wrong", payload).await;
    assert_eq!(status, 401);
    assert!(body.is_empty());

    let (status, _) = send(server.addr, "/?secret123", payload).await;
    assert_eq!(status, 200);
    assert!(eventually(|| queue.get("guarded").is_some()).await);

    server.shutdown().await;
}

#[tokio::test]
async fn foreign_source_is_rejected() {
    let queue = MemoryQueue::default();
    let server = RunningServer::start(
        "192.30.252.1",
        "",
        Arc::new(QueueSink::new(queue.clone(), "memory")),
    )
    .await;

    let (status, _) = send(server.addr, "/", br#"{"repository":{"name":"x"}}"#).await;
    assert_eq!(status, 401);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queue.len(), 0);

    server.shutdown().await;
}

#[cfg(unix)]
#[tokio::test]
async fn command_mode_pipes_body_to_program() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::TempDir::new().unwrap();
    let out = dir.path().join("received");
    let script = dir.path().join("capture.sh");
    std::fs::write(&script, format!("#!/bin/sh\ncat > '{}'\n", out.display())).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let server =
        RunningServer::start("127.0.0.1", "", Arc::new(command::CommandSink::new(&script))).await;

    let (status, _) = send(server.addr, "/", br#"{"a":1}"#).await;
    assert_eq!(status, 200);
    assert!(eventually(|| std::fs::read(&out).map(|c| c == br#"{"a":1}"#).unwrap_or(false)).await);

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let server = RunningServer::start(
        "127.0.0.1",
        "",
        Arc::new(QueueSink::new(MemoryQueue::default(), "memory")),
    )
    .await;
    let addr = server.addr;
    server.shutdown().await;

    assert!(TcpStream::connect(addr).await.is_err());
}
