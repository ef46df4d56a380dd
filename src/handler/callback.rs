//! Per-invocation callback listener.
//!
//! # Responsibilities
//! - Bind a loopback listener on an ephemeral port
//! - Accept POSTs and hand the first body to the waiting invocation
//! - Tear itself down when dropped
//!
//! # Design Decisions
//! - The completion gate is a oneshot channel: signalled at most once, never polled
//! - Later deliveries get a 200 but are discarded, not queued

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type Gate = Arc<Mutex<Option<oneshot::Sender<Bytes>>>>;

/// Loopback HTTP endpoint that receives exactly one handler result.
pub struct CallbackListener {
    addr: SocketAddr,
    completion: Option<oneshot::Receiver<Bytes>>,
    server: JoinHandle<()>,
}

impl CallbackListener {
    /// Bind a fresh listener on `127.0.0.1:0`.
    pub async fn bind() -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel();
        let gate: Gate = Arc::new(Mutex::new(Some(tx)));

        let app = Router::new()
            .route("/", post(receive_callback))
            .with_state(gate);

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "Callback listener stopped");
            }
        });

        tracing::trace!(address = %addr, "Callback listener bound");

        Ok(Self {
            addr,
            completion: Some(rx),
            server,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// URL a handler must POST its result to.
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Wait until the first callback arrives.
    ///
    /// Returns `None` if the gate was already consumed. Cancel-safe: a
    /// dropped wait leaves the gate armed for [`try_take`](Self::try_take).
    pub async fn wait(&mut self) -> Option<Bytes> {
        let body = self.completion.as_mut()?.await.ok();
        self.completion = None;
        body
    }

    /// Take the callback if it has already arrived, without waiting.
    pub fn try_take(&mut self) -> Option<Bytes> {
        let mut completion = self.completion.take()?;
        match completion.try_recv() {
            Ok(body) => Some(body),
            Err(_) => {
                self.completion = Some(completion);
                None
            }
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn receive_callback(State(gate): State<Gate>, body: Bytes) -> StatusCode {
    let sender = match gate.lock() {
        Ok(mut slot) => slot.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };

    match sender {
        Some(sender) => {
            let _ = sender.send(body);
        }
        None => {
            tracing::debug!("Ignoring repeated handler callback");
        }
    }
    StatusCode::OK
}
