//! HTTP surface of the publishing service.
//!
//! ## Routes
//!
//! - `POST /orders` — synthesizes an `OrderCreatedEvent`, publishes it with the
//!   `orders.created` routing key and returns the event as JSON.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use crate::error::WorkerError;
use crate::event::OrderCreatedEvent;
use crate::publisher::EventPublisher;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<dyn EventPublisher>,
    pub routing_key: String,
}

/// Build the axum `Router` publishing through `publisher`.
pub fn router(publisher: Arc<dyn EventPublisher>, routing_key: impl Into<String>) -> Router {
    let state = AppState {
        publisher,
        routing_key: routing_key.into(),
    };
    Router::new()
        .route("/orders", post(create_order))
        .with_state(state)
}

/// Serve the router at the given address until `shutdown` resolves.
pub async fn serve(
    router: Router,
    addr: std::net::SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Publishing failures surface to the caller as a 500.
pub struct ApiError(WorkerError);

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        log::error!("Request failed: {}", self.0);
        let body = json!({ "error": self.0.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// `POST /orders`
async fn create_order(State(state): State<AppState>) -> Result<Json<OrderCreatedEvent>, ApiError> {
    let event = OrderCreatedEvent::demo();
    state
        .publisher
        .publish_bytes(&state.routing_key, event.to_json_bytes()?)
        .await?;
    log::info!("Published OrderCreatedEvent OrderId={}", event.order_id);
    Ok(Json(event))
}
