//! HTTP server implementation
//!
//! Sets up the Axum HTTP server with:
//! - REST API routes
//! - Middleware (tracing, metrics, timeout, compression, panic recovery, body limit)
//! - Graceful shutdown

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use http::StatusCode;
use std::any::Any;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::config::Config;
use crate::errors::{ApiResponse, GENERIC_FAILURE};
use crate::metrics::{HTTP_REQUESTS, HTTP_REQUEST_DURATION};
use crate::routes;
use crate::s3::S3Service;

/// HTTP server for the REST API
pub struct Server {
    config: Config,
    service: S3Service,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, service: S3Service) -> Self {
        Self { config, service }
    }

    /// Build the Axum router with all middleware
    pub fn build_router(&self) -> Router {
        routes::create_router(self.service.clone())
            .layer(DefaultBodyLimit::max(self.config.server.max_body_size))
            .layer(
                ServiceBuilder::new()
                    // Add request tracing
                    .layer(TraceLayer::new_for_http())
                    .layer(middleware::from_fn(track_metrics))
                    // Turn handler panics into the generic 500 envelope
                    .layer(CatchPanicLayer::custom(panic_response))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        self.config.server.timeout_secs,
                    )))
                    .layer(CompressionLayer::new())
                    .into_inner(),
            )
    }

    /// Start the server and run until shutdown signal
    pub async fn start<F>(&self, shutdown: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.config.server.bind_address).await?;
        info!(address = %self.config.server.bind_address, "Server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    HTTP_REQUESTS
        .with_label_values(&[method.as_str(), response.status().as_str()])
        .inc();
    HTTP_REQUEST_DURATION.observe(started.elapsed().as_secs_f64());
    response
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::failure(GENERIC_FAILURE)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_panic_response_is_generic_envelope() {
        let response = panic_response(Box::new("bucket map poisoned"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "success": false, "error": "Something went wrong!" })
        );
    }
}
