// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! HTTP router and WebSocket connection handling.
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::handlers::{self, alert, images};
use crate::metrics::{WS_ACTIVE, WS_CONNECTION};
use crate::middleware::rate_limit;
use crate::registry::Frame;
use crate::websocket::RelayHandler;
use crate::AppState;

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let alert_routes = Router::new()
        .route("/api/alert", post(alert::send_alert))
        .route_layer(from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/", get(handlers::index))
        .route("/ws", get(ws_handler))
        .route("/api/images", get(images::list_images))
        .route("/api/images/{id}", delete(images::delete_image))
        .merge(alert_routes)
        .layer(cors_layer(state.settings.frontend_origin.as_deref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer
            .allow_origin(origin)
            .allow_headers([axum::http::header::CONTENT_TYPE])
            .allow_credentials(true),
        Some(Err(e)) => {
            warn!("ignoring unusable frontend origin: {e}");
            layer.allow_origin(Any).allow_headers(Any)
        },
        None => layer.allow_origin(Any).allow_headers(Any),
    }
}

/// Handler for WebSocket connections
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    counter!(WS_CONNECTION).increment(1);
    gauge!(WS_ACTIVE).increment(1.0);

    let (mut sink, mut stream) = socket.split();
    let (outbound, mut queue) = mpsc::channel::<Frame>(state.settings.relay.outbound_queue);

    let handler = RelayHandler::new(state, Uuid::new_v4());
    handler.on_connect(outbound);
    debug!(conn = %handler.conn_id(), "websocket opened");

    // Forward queued frames to the socket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = queue.recv().await {
            if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handler.on_text(text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => {},
            Err(e) => {
                debug!(conn = %handler.conn_id(), "websocket read failed: {e}");
                break;
            },
        }
    }

    handler.on_disconnect();
    send_task.abort();

    gauge!(WS_ACTIVE).decrement(1.0);
    debug!(conn = %handler.conn_id(), "websocket closed");
}
