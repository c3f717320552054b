//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::Request;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use greetbot::config::{
    Config, DeploymentMetadata, Environment, Secret, ServerTuning, SlackConfig,
};
use greetbot::events::Dispatcher;
use greetbot::http::ServerHandle;
use greetbot::lifecycle::{LifecycleManager, LifecycleState, Shutdown, ShutdownReport};
use greetbot::security::signature::{compute_signature, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use tracing_subscriber::filter::LevelFilter;

pub const SIGNING_SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

/// Config bound to an ephemeral port with short timeouts.
pub fn test_config() -> Config {
    Config {
        port: 0,
        log_level: LevelFilter::DEBUG,
        env: Environment::Testing,
        deployment: DeploymentMetadata::default(),
        slack: SlackConfig {
            request_secret: Secret::new(SIGNING_SECRET),
            ..SlackConfig::default()
        },
        server: ServerTuning {
            read_timeout_secs: 5,
            idle_timeout_secs: 5,
            shutdown_grace_secs: 5,
            ..ServerTuning::default()
        },
        metrics_address: None,
    }
}

pub fn now_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        .to_string()
}

pub fn sign(body: &[u8], timestamp: &str) -> String {
    compute_signature(SIGNING_SECRET.as_bytes(), timestamp, body).unwrap()
}

/// A correctly signed JSON webhook request.
pub fn signed_request(body: &str) -> Request<Body> {
    let timestamp = now_timestamp();
    Request::post("/slack/event")
        .header("content-type", "application/json")
        .header(TIMESTAMP_HEADER, &timestamp)
        .header(SIGNATURE_HEADER, sign(body.as_bytes(), &timestamp))
        .body(Body::from(body.to_owned()))
        .unwrap()
}

/// Raw HTTP/1.1 request head for a signed POST, without the body.
pub fn signed_request_head(body: &str) -> String {
    let timestamp = now_timestamp();
    format!(
        "POST /slack/event HTTP/1.1\r\n\
         Host: localhost\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         {}: {}\r\n\
         {}: {}\r\n\r\n",
        body.len(),
        TIMESTAMP_HEADER,
        timestamp,
        SIGNATURE_HEADER,
        sign(body.as_bytes(), &timestamp),
    )
}

pub fn mention_body() -> String {
    serde_json::json!({
        "token": "ZZZZZZWSxiZZZ2yIvs3peJ",
        "team_id": "T061EG9R6",
        "api_app_id": "A0MDYCDME",
        "type": "event_callback",
        "event_id": "Ev0LAN670R",
        "event_time": 1515449522,
        "event": {
            "type": "app_mention",
            "user": "U061F7AUR",
            "channel": "C0LAN2Q65",
            "text": "<@U0LAN0Z89> is it everything a river should be?",
            "blocks": [{
                "type": "rich_text",
                "elements": [{
                    "type": "rich_text_section",
                    "elements": [
                        {"type": "user", "user_id": "U0LAN0Z89"},
                        {"type": "text", "text": " is it everything a river should be?"}
                    ]
                }]
            }]
        }
    })
    .to_string()
}

/// A server running on a background task.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: ServerHandle,
    pub state: watch::Receiver<LifecycleState>,
    pub task: JoinHandle<ShutdownReport>,
}

impl RunningServer {
    pub async fn start(config: Config, dispatcher: Dispatcher) -> Self {
        let shutdown = Shutdown::new();
        let manager = LifecycleManager::bind(Arc::new(config), shutdown.clone(), dispatcher)
            .await
            .unwrap();

        let addr = SocketAddr::from(([127, 0, 0, 1], manager.local_addr().port()));
        let handle = manager.server_handle();
        let mut state = manager.subscribe_state();
        let task = tokio::spawn(manager.run());

        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == LifecycleState::Serving),
        )
        .await
        .unwrap()
        .unwrap();

        Self {
            addr,
            shutdown,
            handle,
            state,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait for the run to finish and return its report.
    pub async fn finish(self, within: Duration) -> ShutdownReport {
        tokio::time::timeout(within, self.task)
            .await
            .expect("server did not stop in time")
            .unwrap()
    }
}

pub const RUOK_REQUEST: &[u8] = b"GET /_ruok HTTP/1.1\r\nHost: localhost\r\n\r\n";

/// Read from a kept-alive stream until `body` arrives at the end of the buffer.
pub async fn read_until_body(stream: &mut tokio::net::TcpStream, body: &str) -> String {
    use tokio::io::AsyncReadExt;

    let mut received = Vec::new();
    let mut chunk = [0u8; 1024];
    tokio::time::timeout(Duration::from_secs(2), async {
        while !received.ends_with(body.as_bytes()) {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed early");
            received.extend_from_slice(&chunk[..n]);
        }
    })
    .await
    .expect("response did not arrive in time");
    String::from_utf8(received).unwrap()
}

/// True once the peer has closed the stream or reset it.
pub async fn closed_by_peer(stream: &mut tokio::net::TcpStream) -> bool {
    use tokio::io::AsyncReadExt;

    let mut chunk = [0u8; 64];
    !matches!(stream.read(&mut chunk).await, Ok(n) if n > 0)
}
