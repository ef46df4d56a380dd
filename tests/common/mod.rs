//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use edge_emulator::config::{BehaviorConfig, EmulatorConfig, OriginConfig};
use edge_emulator::event::Stage;
use edge_emulator::handler::{HandlerInvoker, HandlerRef, Invocation, InvocationError};
use edge_emulator::http::{HttpServer, ServerError};
use edge_emulator::Shutdown;

/// A request as seen by the mock origin.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A mock origin on raw TCP that records what it receives.
pub struct MockOrigin {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockOrigin {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Start a mock origin that answers every request with a fixed response.
pub async fn start_mock_origin(
    status: &'static str,
    headers: &'static [(&'static str, &'static str)],
    body: &'static str,
) -> MockOrigin {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&requests);

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let recorded = Arc::clone(&recorded);
            tokio::spawn(async move {
                let mut reader = BufReader::new(socket);

                let mut request_line = String::new();
                if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
                    return;
                }
                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or_default().to_string();
                let target = parts.next().unwrap_or_default().to_string();

                let mut request_headers = Vec::new();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                        break;
                    }
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        request_headers.push((name.trim().to_string(), value.trim().to_string()));
                    }
                }

                let length = request_headers
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.parse::<usize>().ok())
                    .unwrap_or(0);
                let mut discard = vec![0; length];
                let _ = reader.read_exact(&mut discard).await;

                recorded.lock().unwrap().push(RecordedRequest {
                    method,
                    target,
                    headers: request_headers,
                });

                let mut response = format!("HTTP/1.1 {status}\r\n");
                for (name, value) in headers {
                    response.push_str(&format!("{name}: {value}\r\n"));
                }
                response.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                ));

                let mut socket = reader.into_inner();
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockOrigin { addr, requests }
}

/// One recorded handler invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub stage: Stage,
    pub handler: String,
    pub payload: Value,
}

impl Call {
    /// The `cf` record of the envelope.
    pub fn record(&self) -> &Value {
        &self.payload["Records"][0]["cf"]
    }
}

type Script = Arc<dyn Fn(Stage, &Value) -> Result<String, InvocationError> + Send + Sync>;

/// Handler invoker driven by in-process scripts keyed by handler path.
///
/// Handlers without a script reply `null` (no changes).
#[derive(Clone, Default)]
pub struct ScriptedInvoker {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    delay: Duration,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer invocations of `path` with `script`.
    pub fn on<F>(self, path: &str, script: F) -> Self
    where
        F: Fn(Stage, &Value) -> Result<String, InvocationError> + Send + Sync + 'static,
    {
        self.scripts
            .lock()
            .unwrap()
            .insert(path.to_string(), Arc::new(script));
        self
    }

    /// Answer invocations of `path` with a fixed reply.
    pub fn reply(self, path: &str, reply: &'static str) -> Self {
        self.on(path, move |_, _| Ok(reply.to_string()))
    }

    /// Sleep this long inside every invocation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.calls().into_iter().map(|call| call.stage).collect()
    }
}

#[async_trait]
impl HandlerInvoker for ScriptedInvoker {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<Bytes, InvocationError> {
        let payload: Value = serde_json::from_slice(invocation.payload).unwrap();
        self.calls.lock().unwrap().push(Call {
            stage: invocation.stage,
            handler: invocation.handler.path.clone(),
            payload: payload.clone(),
        });

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&invocation.handler.path)
            .cloned();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match script {
            Some(script) => script(invocation.stage, &payload).map(Bytes::from),
            None => Ok(Bytes::from_static(b"null")),
        }
    }
}

/// A behavior routed to the `origin` origin with one handler per listed stage.
/// The handler path is the given name.
pub fn behavior(path: &str, handlers: &[(Stage, &str)]) -> BehaviorConfig {
    let mut behavior = BehaviorConfig {
        path: path.to_string(),
        origin: "origin".to_string(),
        ..Default::default()
    };
    for (stage, name) in handlers {
        behavior
            .events
            .set(*stage, HandlerRef::new(*name, "index.handler"));
    }
    behavior
}

/// Plain-HTTP configuration on an ephemeral port with one origin.
pub fn config(origin: SocketAddr, behaviors: Vec<BehaviorConfig>) -> EmulatorConfig {
    let mut config = EmulatorConfig::default();
    config.listener.address = "127.0.0.1".to_string();
    config.listener.port = 0;
    config.timeouts.origin_secs = 2;
    config.origins.insert(
        "origin".to_string(),
        OriginConfig {
            domain: origin.to_string(),
            protocol: "http".to_string(),
            ..Default::default()
        },
    );
    config.behaviors = behaviors;
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub updates: mpsc::UnboundedSender<EmulatorConfig>,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_server(config: EmulatorConfig, invoker: Arc<dyn HandlerInvoker>) -> TestServer {
    let listener = edge_emulator::net::bind(&config.listener).unwrap();
    let addr = listener.local_addr().unwrap();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let shutdown = Shutdown::new();

    let server = HttpServer::with_invoker(config, invoker);
    let task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    TestServer {
        addr,
        updates,
        shutdown,
        task,
    }
}

/// Client that neither follows redirects nor uses a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
