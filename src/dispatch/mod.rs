//! Request dispatch pipeline.
//!
//! # Responsibilities
//! - Define the per-resource handler shape (`ResourceHandler`)
//! - Try handlers in registration order; the first match is terminal
//! - Map handler failures onto bodyless HTTP statuses
//!
//! # Data Flow
//! ```text
//! Request
//!     → Pipeline::dispatch
//!         → handler.matches()  (pure, synchronous, no I/O)
//!         → handler.handle()   (awaits storage, writes via ResponseWriter)
//!     → no handler matched: 404, empty body
//! ```
//!
//! # Design Decisions
//! - A declining handler has no side effects
//! - Handlers resolve their paths at construction, so matching never fails per request
//! - "Not found" from storage is a response, not a `DispatchError`

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::http::response::{ContentEncoding, ResponseWriter, WriteError};
use crate::storage::StorageError;

/// Failures a handler hands back to the hosting pipeline.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request body exceeds the configured limit")]
    BodyTooLarge,
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Storage(StorageError::Conflict { .. }) => StatusCode::CONFLICT,
            DispatchError::Storage(StorageError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            DispatchError::Storage(StorageError::Archive(_)) | DispatchError::Storage(StorageError::Manifest(_)) => {
                StatusCode::BAD_REQUEST
            }
            DispatchError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DispatchError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            DispatchError::Storage(_) | DispatchError::Write(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }
        ResponseWriter::default().status(status)
    }
}

/// Per-request state shared with the handler that claims the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub writer: ResponseWriter,
    /// Cancelled when the connection is dropped before the response is built,
    /// or when shutdown gives up waiting for in-flight requests. A client that
    /// disconnects mid-body is handled by the server dropping the body stream.
    pub cancel: CancellationToken,
    pub request_id: String,
    /// Whether JSON bodies may be gzip-compressed.
    pub gzip_json: bool,
}

impl RequestContext {
    pub fn new(writer: ResponseWriter, cancel: CancellationToken, request_id: impl Into<String>) -> Self {
        Self {
            writer,
            cancel,
            request_id: request_id.into(),
            gzip_json: false,
        }
    }

    pub fn with_gzip_json(mut self, enabled: bool) -> Self {
        self.gzip_json = enabled;
        self
    }

    /// Encoding for a JSON body answering `req`.
    pub fn json_encoding<B>(&self, req: &Request<B>) -> ContentEncoding {
        ContentEncoding::negotiate(req.headers(), self.gzip_json)
    }
}

/// One resource's "decline or handle" pair.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Short name used for logs and metrics labels.
    fn name(&self) -> &'static str;

    /// Whether this handler claims `req`. Must not perform I/O.
    fn matches(&self, req: &Request<Body>) -> bool;

    /// Produce the response for a request this handler claimed.
    async fn handle(&self, req: Request<Body>, ctx: &RequestContext) -> Result<Response<Body>, DispatchError>;
}

/// Result of running a request through the pipeline.
pub struct Dispatched {
    /// Name of the handler that answered, `"none"` when nothing matched.
    pub handler: &'static str,
    pub response: Response<Body>,
}

/// Ordered list of resource handlers.
#[derive(Clone, Default)]
pub struct Pipeline {
    handlers: Vec<Arc<dyn ResourceHandler>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handler: Arc<dyn ResourceHandler>) {
        tracing::debug!(handler = handler.name(), "Handler registered");
        self.handlers.push(handler);
    }

    pub fn with(mut self, handler: Arc<dyn ResourceHandler>) -> Self {
        self.push(handler);
        self
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Hand `req` to the first handler that matches it.
    pub async fn dispatch(&self, req: Request<Body>, ctx: &RequestContext) -> Dispatched {
        let Some(handler) = self.handlers.iter().find(|h| h.matches(&req)) else {
            tracing::debug!(request_id = %ctx.request_id, path = %req.uri().path(), "No handler matched");
            return Dispatched {
                handler: "none",
                response: ctx.writer.not_found(),
            };
        };

        let name = handler.name();
        tracing::debug!(request_id = %ctx.request_id, handler = name, "Dispatching request");
        let response = match handler.handle(req, ctx).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        };
        Dispatched { handler: name, response }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("handlers", &self.handler_names())
            .finish()
    }
}
