use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};

use crate::config::Config;
use crate::monitor::{Broadcaster, Inbound, Outbound, SessionRegistry};
use crate::sheets::{Credentials, SheetsClient};

/// True for any host that is not loopback. Binding one of these exposes the
/// gateway to the network, which requires explicit opt-in.
fn is_public_bind(host: &str) -> bool {
    !matches!(host, "127.0.0.1" | "localhost" | "::1" | "[::1]")
}

/// Transport-side half of the Broadcaster contract: one outbound channel per
/// live WebSocket connection. Sends to a dead or missing connection are
/// logged and swallowed — delivery failure never reaches the polling core.
pub struct WsBroadcaster {
    clients: RwLock<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl WsBroadcaster {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, connection_id: &str, sender: mpsc::UnboundedSender<String>) {
        self.clients
            .write()
            .await
            .insert(connection_id.to_string(), sender);
    }

    pub async fn unregister(&self, connection_id: &str) {
        self.clients.write().await.remove(connection_id);
    }

    pub async fn connected_clients(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broadcaster for WsBroadcaster {
    async fn send(&self, connection_id: &str, message: Outbound) {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(connection_id, "failed to serialize outbound message: {e}");
                return;
            }
        };

        let clients = self.clients.read().await;
        match clients.get(connection_id) {
            Some(sender) => {
                if sender.send(text).is_err() {
                    tracing::debug!(connection_id, "dropping message for closed connection");
                }
            }
            None => {
                tracing::debug!(connection_id, "dropping message for unknown connection");
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<WsBroadcaster>,
    access_token: Option<String>,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        broadcaster: Arc<WsBroadcaster>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            access_token,
        }
    }
}

/// Build the axum router: WebSocket endpoint plus health check.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(handle_health))
        .with_state(state)
}

async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "activeSessions": state.registry.active_sessions(),
        "connectedClients": state.broadcaster.connected_clients().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// One WebSocket connection: mint a connection id, bridge outbound frames
/// from the broadcaster, dispatch inbound control messages to the registry,
/// and guarantee session teardown when the socket closes.
pub async fn handle_socket(state: AppState, mut socket: WebSocket) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.broadcaster.register(&connection_id, tx).await;
    tracing::info!(connection_id, "client connected");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = socket.recv() => {
                let Some(Ok(message)) = inbound else {
                    break;
                };
                let Message::Text(text) = message else {
                    continue;
                };
                let Ok(control) = serde_json::from_str::<Inbound>(text.as_ref()) else {
                    tracing::debug!(connection_id, "ignoring malformed control message");
                    continue;
                };
                handle_control(&state, &connection_id, control).await;
            }
        }
    }

    state.registry.on_disconnect(&connection_id);
    state.broadcaster.unregister(&connection_id).await;
    tracing::info!(connection_id, "client disconnected");
}

async fn handle_control(state: &AppState, connection_id: &str, control: Inbound) {
    match control {
        Inbound::StartMonitoring { sheet_id } => {
            let credentials =
                Credentials::new(state.access_token.clone().unwrap_or_default());
            if let Err(e) = state.registry.start(connection_id, &sheet_id, credentials) {
                tracing::warn!(connection_id, "start-monitoring rejected: {e}");
                state
                    .broadcaster
                    .send(
                        connection_id,
                        Outbound::Error {
                            message: e.to_string(),
                        },
                    )
                    .await;
            }
        }
        Inbound::StopMonitoring => state.registry.stop(connection_id),
    }
}

/// Run the gateway until the process is stopped.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    if is_public_bind(host) && !config.gateway.allow_public_bind {
        anyhow::bail!(
            "🛑 Refusing to bind to {host} — gateway would be exposed to the network.\n\
             Fix: use --host 127.0.0.1 (default), or set\n\
             [gateway] allow_public_bind = true in config.toml (NOT recommended)."
        );
    }

    let reader = Arc::new(SheetsClient::new(
        config.sheets.api_base.clone(),
        config.sheets.range.clone(),
    ));
    let broadcaster = Arc::new(WsBroadcaster::new());
    let registry = Arc::new(SessionRegistry::new(
        reader,
        broadcaster.clone(),
        Duration::from_secs(config.sheets.poll_interval_secs),
    ));
    let state = AppState::new(registry, broadcaster, config.sheets.access_token.clone());

    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    let actual_port = listener.local_addr()?.port();
    let addr = format!("{host}:{actual_port}");

    println!("🦀 leadwatch gateway listening on http://{addr}");
    println!("  WS   /ws       — start-monitoring / stop-monitoring, pushes new-leads");
    println!("  GET  /health   — health check");
    if config.sheets.access_token.is_none() {
        println!("  ⚠️  No Sheets access token configured — start requests will be rejected.");
        println!("     Set LEADWATCH_SHEETS_TOKEN or [sheets] access_token in config.toml.");
    }
    println!("  Press Ctrl+C to stop.\n");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(e) => {
            // No signal handler means no clean shutdown path; keep serving.
            tracing::warn!("failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
    }
}
