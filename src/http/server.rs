//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the resource registry, storage backends and handler pipeline
//! - Create the Axum Router; every request lands in the dispatch fallback
//! - Wire up middleware (tracing, timeout, concurrency, body limit, request ID)
//! - Bind server to listener and shut down gracefully
//! - Observability (per-request metrics, correlation IDs)

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::Request,
    response::Response,
    Router,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ConfigError, FeedConfig, StorageConfig};
use crate::dispatch::{Dispatched, Pipeline, RequestContext};
use crate::http::request::{propagate_request_id_layer, request_id_of, set_request_id_layer};
use crate::http::response::ResponseWriter;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::resources::ResourceRegistry;
use crate::services;
use crate::storage::{Backends, FileSystemStore, MemoryCache, MemoryStatusProvider, PackageStatusProvider};

/// Slack above the package size limit for multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub writer: ResponseWriter,
    pub gzip_json: bool,
    pub shutdown: Shutdown,
}

/// Filesystem store plus listing status for `storage`.
pub fn build_backends(storage: &StorageConfig) -> Result<Backends, ConfigError> {
    let cache = Arc::new(MemoryCache::new(storage.cache_entries));
    let store = Arc::new(FileSystemStore::new(
        &storage.packages_dir,
        cache,
        storage.max_package_size,
    ));
    let status: Arc<dyn PackageStatusProvider> = match &storage.status_file {
        Some(path) => Arc::new(MemoryStatusProvider::load_from_file(Path::new(path))?),
        None => Arc::new(MemoryStatusProvider::new(None)),
    };
    tracing::info!(packages_dir = %storage.packages_dir, "Package store ready");
    Ok(Backends::filesystem(store, status))
}

/// HTTP server for the package feed.
pub struct HttpServer {
    router: Router,
    config: Arc<FeedConfig>,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a server over the filesystem store named in `config`.
    pub fn new(config: FeedConfig) -> Result<Self, ConfigError> {
        let backends = build_backends(&config.storage)?;
        Self::with_backends(config, backends)
    }

    /// Create a server over caller-supplied storage collaborators.
    pub fn with_backends(config: FeedConfig, backends: Backends) -> Result<Self, ConfigError> {
        let registry = Arc::new(ResourceRegistry::new(services::build_options(&config)?)?);
        let pipeline = Arc::new(services::build_pipeline(&config, registry, backends)?);
        let shutdown = Shutdown::new();

        let state = AppState {
            pipeline,
            writer: ResponseWriter::new(config.api.development_mode, config.http.write_buffer_size),
            gzip_json: config.http.gzip_json,
            shutdown: shutdown.clone(),
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config: Arc::new(config),
            shutdown,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &FeedConfig, state: AppState) -> Router {
        let body_limit = usize::try_from(config.storage.max_package_size)
            .unwrap_or(usize::MAX)
            .saturating_add(MULTIPART_OVERHEAD);

        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(ConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Handle that stops the server and cancels in-flight body writes.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            api_version = ?self.config.api.version,
            "HTTP server starting"
        );

        tokio::spawn(signals::shutdown_on_signal(self.shutdown.clone()));
        let drain = Duration::from_secs(self.config.timeouts.request_secs);
        tokio::spawn(self.shutdown.clone().abort_after_drain(drain));

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }
}

/// Fallback handler: runs every request through the pipeline.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id_of(&request);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let cancel = state.shutdown.request_token();
    // Cancels the token if the connection drops this future before a response exists.
    let abandoned = cancel.clone().drop_guard();
    let ctx = RequestContext::new(state.writer.clone(), cancel, request_id.clone()).with_gzip_json(state.gzip_json);
    let Dispatched { handler, response } = state.pipeline.dispatch(request, &ctx).await;
    let _ = abandoned.disarm();

    let status = response.status();
    metrics::record_request(handler, status.as_u16(), start_time);
    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        handler,
        status = status.as_u16(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Request dispatched"
    );
    response
}
