//! HTTP request handler

use crate::adapter::{RequestAdapter, ResponseAdapter};
use crate::lifecycle::LifecycleEngine;
use crate::static_files::StaticFiles;
use bytes::Bytes;
use harbor_core::{Body, Error, Result};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Connection-facing request handler
///
/// Serves static files first, then runs the lifecycle engine on its own
/// task so a dropped connection cannot cut teardown short.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    engine: LifecycleEngine,
    static_files: Option<StaticFiles>,
    request_count: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
}

impl RequestHandler {
    /// Create a new request handler
    pub fn new(
        engine: LifecycleEngine,
        static_files: Option<StaticFiles>,
        request_count: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            engine,
            static_files,
            request_count,
            in_flight,
        }
    }

    /// Requests handled so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Requests currently inside the lifecycle
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Handle an incoming HTTP request
    pub async fn handle<B>(&self, req: Request<B>, remote_addr: Option<SocketAddr>) -> Result<Response<Body>>
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: Display,
    {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let method = req.method().clone();
        let path = req.uri().path().to_string();

        debug!(method = %method, path = %path, "Handling request");

        if let Some(static_files) = &self.static_files {
            if let Some(response) = static_files.serve(&method, &path).await {
                debug!(path = %path, "Served static file");
                return Ok(response);
            }
        }

        let (parts, body) = req.into_parts();
        let body_bytes = body
            .collect()
            .await
            .map_err(|e| Error::InvalidRequest(format!("Failed to read request body: {}", e)))?
            .to_bytes();
        let request = RequestAdapter::new(Request::from_parts(parts, body_bytes), remote_addr);
        let (response, receiver) = ResponseAdapter::channel();

        let engine = self.engine.clone();
        let guard = InFlight::enter(Arc::clone(&self.in_flight));
        tokio::spawn(async move {
            let _guard = guard;
            engine.handle(request, response).await;
        });

        match receiver.await {
            Ok(response) => {
                debug!(
                    method = %method,
                    path = %path,
                    status = response.status().as_u16(),
                    latency_ms = %start.elapsed().as_millis(),
                    "Request completed"
                );
                Ok(response)
            }
            Err(_) => {
                error!(method = %method, path = %path, "Request ended without a response");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}

/// Create a plain-text error response
pub(crate) fn error_response(status: StatusCode, message: &str) -> Result<Response<Body>> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .body(Full::new(Bytes::from(message.to_string())))
        .map_err(|e| Error::Internal(format!("Failed to build error response: {}", e)))
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
