//! Axum-based HTTP/WebSocket gateway.
//!
//! Owns the transport boundary: one WebSocket connection per client, a
//! `/health` probe, and the tower layers that keep the listener honest
//! (CORS, request body limits, request timeouts). Each connection gets its
//! own [`Session`] plus an outbound event channel; a dedicated send task
//! drains that channel into the socket so the pipeline never blocks on a
//! slow client.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::config::Config;
use crate::events::{ClientMessage, ServerMessage};
use crate::llm::ModelManager;
use crate::memory::ConversationMemory;
use crate::orchestrator::Orchestrator;
use crate::session::Session;
use crate::state::ActivityState;
use crate::util::now_epoch_ms;
use crate::voice::{Synthesizer, TtsClient};

/// Maximum request body size (64KB) — prevents memory exhaustion.
pub const MAX_BODY_SIZE: usize = 65_536;

/// HTTP request timeout. Applies to plain requests, not upgraded sockets.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared gateway state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    /// Most recent activity transition across sessions. Diagnostics for
    /// `/health` only, never load-bearing.
    latest_state: Arc<RwLock<ActivityState>>,
}

impl AppState {
    /// Assemble the pipeline from configuration.
    pub async fn from_config(config: &Config) -> Self {
        let memory = ConversationMemory::load(
            config.memory.resolved_store_path(),
            config.memory.max_turns,
        )
        .await;
        let synthesizer: Arc<dyn Synthesizer> = Arc::new(TtsClient::from_config(&config.voice.tts));
        let orchestrator = Orchestrator::new(
            ModelManager::from_config(&config.generation),
            Arc::new(Mutex::new(memory)),
            synthesizer,
            config.memory.context_turns,
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            latest_state: Arc::new(RwLock::new(ActivityState::Idle)),
        }
    }
}

/// Run the gateway until shutdown.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.server.listen_addr();
    let state = AppState::from_config(&config).await;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "aura gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/ws", get(handle_ws))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .with_state(state)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down gracefully");
}

/// GET /health — liveness plus the latest observed activity state.
async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let latest = *state.latest_state.read();
    Json(serde_json::json!({ "status": "ok", "state": latest }))
}

/// GET /ws — upgrade to the session protocol.
async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Drive one client connection: create the session, pump outbound events,
/// and dispatch inbound commands until the socket closes.
async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Outbound pump: the pipeline enqueues, this task writes frames.
    let send_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Every state transition is broadcast before the pipeline proceeds.
    let sink_tx = events_tx.clone();
    let mirror = Arc::clone(&state.latest_state);
    let mut session = Session::with_sink(Box::new(move |transition| {
        *mirror.write() = transition.to;
        let _ = sink_tx.send(ServerMessage::State {
            state: transition.to,
            timestamp: transition.timestamp,
        });
    }));

    tracing::info!(session = %session.id, "client connected");

    // Initial state snapshot on connect.
    let _ = events_tx.send(ServerMessage::State {
        state: session.state.current(),
        timestamp: now_epoch_ms(),
    });

    while let Some(Ok(message)) = ws_receiver.next().await {
        match message {
            Message::Text(text) => {
                dispatch(&state, &mut session, &events_tx, text.as_str()).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    tracing::info!(session = %session.id, "client disconnected");
}

/// Handle one inbound command. Always terminal: a turn ends in
/// `ai_response` or `error`, never silence.
async fn dispatch(
    state: &AppState,
    session: &mut Session,
    events_tx: &mpsc::UnboundedSender<ServerMessage>,
    raw: &str,
) {
    let message = match serde_json::from_str::<ClientMessage>(raw) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(session = %session.id, error = %e, "unparseable client message");
            let _ = events_tx.send(ServerMessage::Error {
                message: "Unknown message type".to_string(),
            });
            return;
        }
    };

    match message {
        ClientMessage::TextInput { content } => {
            if let Err(e) = state
                .orchestrator
                .process_turn(session, events_tx, &content)
                .await
            {
                let _ = events_tx.send(ServerMessage::Error {
                    message: format!("AI processing error: {e}"),
                });
            }
        }
        ClientMessage::GetState => {
            let _ = events_tx.send(ServerMessage::State {
                state: session.state.current(),
                timestamp: now_epoch_ms(),
            });
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
