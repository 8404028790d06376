use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::external::{AllowList, EarningsStore};
use crate::hub::{HubConfig, InboundMessage, TableHandle, TableRegistry};

use super::error::ApiError;
use super::identity::IdentityVerifier;

const LOG_TARGET: &str = "server::routes";
pub const DEFAULT_TABLE_ID: &str = "main";

#[derive(Clone)]
pub struct ServerContext {
    pub registry: Arc<TableRegistry>,
    pub default_table: TableHandle,
    pub identity: Arc<dyn IdentityVerifier>,
    next_connection_id: Arc<AtomicU64>,
}

impl ServerContext {
    pub fn new(
        config: crate::engine::TableConfig,
        hub_config: HubConfig,
        allow_list: Arc<dyn AllowList>,
        earnings: Arc<dyn EarningsStore>,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let registry = Arc::new(TableRegistry::new());
        let default_table = crate::hub::spawn_table(
            &registry,
            DEFAULT_TABLE_ID,
            config,
            hub_config,
            allow_list,
            earnings,
        );
        Self {
            registry,
            default_table,
            identity,
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }
}

pub fn build_router(context: ServerContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(read_root))
        .route("/login", post(login))
        .route("/ws/game", get(ws_game))
        .layer(middleware::from_fn(super::logging::log_requests))
        .layer(cors)
        .with_state(context)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn read_root() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "nlhe_table" }))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    token: String,
}

async fn login(
    State(context): State<ServerContext>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = context
        .identity
        .verify(&payload.token)
        .await
        .map_err(|err| ApiError::unauthorized(err.to_string()))?;

    Ok(Json(json!({ "status": "ok", "user": user })))
}

async fn ws_game(
    State(context): State<ServerContext>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, context))
}

async fn handle_socket(socket: WebSocket, context: ServerContext) {
    let connection_id = context.next_connection_id();
    let table = context.default_table.clone();
    let mut outbound_rx = table.connect(connection_id).await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let recv_table = table.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = ws_rx.next().await {
            match message {
                Message::Text(text) => match serde_json::from_str::<InboundMessage>(&text) {
                    Ok(parsed) => recv_table.dispatch(connection_id, parsed).await,
                    Err(err) => {
                        tracing::warn!(target: LOG_TARGET, connection_id, %err, "dropping unparseable message");
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    table.disconnect(connection_id).await;
}
