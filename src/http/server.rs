//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all handler
//! - Wire up middleware (tracing, body limits)
//! - Serve on the bound listener, with TLS when configured
//! - Dispatch requests to the matched pipeline
//! - Swap route tables on configuration updates without dropping requests
//!
//! # Data Flow
//! ```text
//! serve generation N on listener
//!     ← valid config update
//!     → stop accepting (graceful shutdown of generation N)
//!     → wait for every in-flight pipeline
//!     → swap route table
//!     → serve generation N+1 on the same listener
//! ```

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::{validate_config, ConfigError, EmulatorConfig};
use crate::handler::{HandlerInvoker, NodeInvoker};
use crate::http::request::{self, BodyTooLarge, RequestId, REQUEST_ID_HEADER};
use crate::http::response;
use crate::net::tls::{self, TlsError};
use crate::net::InFlightTracker;
use crate::observability::metrics;
use crate::origin::OriginClient;
use crate::routing::RouteTable;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build origin client: {0}")]
    OriginClient(#[from] reqwest::Error),

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Everything a request needs from one configuration snapshot.
struct Generation {
    routes: RouteTable,
    max_body_size: usize,
}

impl Generation {
    fn build(config: &EmulatorConfig, invoker: &Arc<dyn HandlerInvoker>) -> Result<Self, ServerError> {
        validate_config(config).map_err(ConfigError::Validation)?;
        let origin_client = OriginClient::new(Duration::from_secs(config.timeouts.origin_secs))?;
        Ok(Self {
            routes: RouteTable::build(config, origin_client, Arc::clone(invoker))?,
            max_body_size: config.listener.max_body_size,
        })
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    generation: Arc<ArcSwap<Generation>>,
    in_flight: InFlightTracker,
}

/// HTTP server for the emulator.
pub struct HttpServer {
    config: EmulatorConfig,
    invoker: Arc<dyn HandlerInvoker>,
}

impl HttpServer {
    /// Create a server that runs handlers with the configured runtime.
    pub fn new(config: EmulatorConfig) -> Self {
        let invoker = Arc::new(NodeInvoker::new(config.handlers.runtime.clone()));
        Self::with_invoker(config, invoker)
    }

    /// Create a server with a custom handler invoker.
    pub fn with_invoker(config: EmulatorConfig, invoker: Arc<dyn HandlerInvoker>) -> Self {
        Self { config, invoker }
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState, max_body_size: usize) -> Router {
        Router::new()
            .route("/", any(edge_handler))
            .route("/{*path}", any(edge_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(RequestBodyLimitLayer::new(max_body_size)),
            )
    }

    fn spawn_generation(
        listener: &TcpListener,
        tls: Option<&RustlsConfig>,
        state: AppState,
        max_body_size: usize,
    ) -> Result<(Handle, JoinHandle<std::io::Result<()>>), ServerError> {
        let handle = Handle::new();
        let app = Self::build_router(state, max_body_size)
            .into_make_service_with_connect_info::<SocketAddr>();
        let listener = listener.try_clone()?;

        let task = match tls {
            Some(tls) => {
                let server = axum_server::from_tcp_rustls(listener, tls.clone()).handle(handle.clone());
                tokio::spawn(server.serve(app))
            }
            None => {
                let server = axum_server::from_tcp(listener).handle(handle.clone());
                tokio::spawn(server.serve(app))
            }
        };
        Ok((handle, task))
    }

    /// Stop accepting, let open connections finish, then wait for pipelines.
    async fn drain(
        handle: Handle,
        task: JoinHandle<std::io::Result<()>>,
        in_flight: &InFlightTracker,
    ) -> Result<(), ServerError> {
        handle.graceful_shutdown(None);
        task.await??;
        if in_flight.active_count() > 0 {
            tracing::info!(in_flight = in_flight.active_count(), "Waiting for in-flight pipelines");
        }
        in_flight.wait_idle().await;
        Ok(())
    }

    /// Run the server on `listener` until `shutdown` fires.
    ///
    /// Every configuration received on `config_updates` is validated; a valid
    /// one replaces the route table once in-flight pipelines have finished,
    /// an invalid one is logged and ignored.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<EmulatorConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        let tls = tls::server_config(&self.config.listener).await?;

        let state = AppState {
            generation: Arc::new(ArcSwap::from_pointee(Generation::build(
                &self.config,
                &self.invoker,
            )?)),
            in_flight: InFlightTracker::new(),
        };

        tracing::info!(
            address = %addr,
            tls = tls.is_some(),
            behaviors = state.generation.load().routes.len(),
            "Edge emulator listening"
        );

        let mut current_listener = self.config.listener.clone();
        let mut updates_open = true;

        loop {
            let max_body_size = state.generation.load().max_body_size;
            let (handle, mut task) =
                Self::spawn_generation(&listener, tls.as_ref(), state.clone(), max_body_size)?;

            let next = loop {
                tokio::select! {
                    _ = shutdown.recv() => break None,
                    update = config_updates.recv(), if updates_open => match update {
                        Some(config) => match Generation::build(&config, &self.invoker) {
                            Ok(generation) => {
                                if config.listener.address != current_listener.address
                                    || config.listener.port != current_listener.port
                                {
                                    tracing::warn!("Listener address changes take effect after a restart");
                                }
                                current_listener = config.listener.clone();
                                break Some(generation);
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Ignoring invalid configuration update");
                            }
                        },
                        None => updates_open = false,
                    },
                    result = &mut task => {
                        result??;
                        return Err(ServerError::Io(std::io::Error::other("server stopped unexpectedly")));
                    }
                }
            };

            Self::drain(handle, task, &state.in_flight).await?;

            match next {
                Some(generation) => {
                    let behaviors = generation.routes.len();
                    state.generation.store(Arc::new(generation));
                    tracing::info!(address = %addr, behaviors, "Route table reloaded");
                }
                None => {
                    tracing::info!("HTTP server stopped");
                    return Ok(());
                }
            }
        }
    }
}

/// Catch-all handler: match a behavior and run its pipeline.
async fn edge_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let started = Instant::now();
    let request_id = RequestId::new();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let generation = state.generation.load_full();

    let Some(route) = generation.routes.find(&path) else {
        tracing::warn!(request_id = %request_id, path = %path, "No behavior matched");
        metrics::record_request(&method, 404, "none", started);
        return with_request_id(response::not_found(&path), request_id);
    };
    let pipeline = Arc::clone(route.pipeline());
    let behavior = route.pattern().as_str().to_string();

    // Held from here until the pipeline task completes, even if the client goes away.
    let guard = state.in_flight.track();

    let edge_request = match request::capture(request, peer, generation.max_body_size).await {
        Ok(edge_request) => edge_request,
        Err(BodyTooLarge) => {
            metrics::record_request(&method, 413, &behavior, started);
            return with_request_id(response::payload_too_large(generation.max_body_size), request_id);
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        behavior = %behavior,
        "Running pipeline"
    );

    let task = tokio::spawn(async move {
        let _guard = guard;
        pipeline.execute(request_id.as_uuid(), edge_request).await
    });

    let response = match task.await {
        Ok(Ok(outcome)) => {
            if let Some(stage) = outcome.short_circuited {
                tracing::debug!(request_id = %request_id, stage = %stage, "Pipeline answered early");
            }
            response::render_outcome(outcome)
        }
        Ok(Err(e)) => {
            tracing::warn!(request_id = %request_id, kind = e.kind(), error = %e, "Pipeline failed");
            response::error_page(&e)
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Pipeline task panicked");
            response::internal_error()
        }
    };

    metrics::record_request(&method, response.status().as_u16(), &behavior, started);
    with_request_id(response, request_id)
}

fn with_request_id(mut response: Response, request_id: RequestId) -> Response {
    response
        .headers_mut()
        .insert(REQUEST_ID_HEADER, request_id.header_value());
    response
}
