use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::config::AppConfig;
use crate::hub::{ConnectionId, Flow, Outbound, StreamHub, reaper};
use crate::pages;

/// How long a closing connection may take to flush its queue.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the relay router.
pub fn router(state: AppState) -> Router {
    let static_dir = ServeDir::new(&state.config.server.static_dir);
    Router::new()
        .route("/", get(home_handler))
        .route("/api/ws", get(ws_handler))
        .route("/{stream_id}", get(watch_handler))
        .nest_service("/static", static_dir)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the relay with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let hub = StreamHub::new();
    let _reaper = reaper::spawn(hub.clone(), config.relay.reap_interval());

    let state = AppState {
        hub,
        config: Arc::clone(&config),
    };
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        reap_interval_secs = config.relay.reap_interval_secs,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET / - Usage page.
async fn home_handler() -> Html<String> {
    Html(pages::home())
}

/// GET /:stream_id - Live view of one stream.
async fn watch_handler(Path(stream_id): Path<String>) -> Response {
    if !pages::is_valid_stream_id(&stream_id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    Html(pages::watch(&stream_id)).into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// GET /api/ws - Upgrade to the relay protocol.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: StreamHub) {
    let (id, mut queue) = hub.connect();
    let (mut sender, mut receiver) = socket.split();

    // Egress: hub queue → socket.
    let mut writer = tokio::spawn(async move {
        while let Some(item) = queue.recv().await {
            match item {
                Outbound::Frame(frame) => {
                    if sender
                        .send(Message::Text(frame.to_json().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Ingest: socket → hub.
    let reader_hub = hub.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if reader_hub.handle_text(id, text.as_str()) == Flow::Close {
                        break;
                    }
                }
                Ok(Message::Binary(data)) => {
                    warn!(name: "relay.frame.binary", connection = %id, bytes = data.len(), "Ignoring binary frame");
                }
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    warn!(name: "relay.connection.error", connection = %id, error = %e, "Websocket error");
                    break;
                }
                // Ping/pong frames are answered by the transport.
                Ok(_) => {}
            }
        }
    });

    let writer_done = tokio::select! {
        _ = &mut writer => {
            reader.abort();
            true
        }
        _ = &mut reader => false,
    };

    hub.disconnect(id);
    if !writer_done {
        drain_writer(id, writer).await;
    }
}

/// Let the writer flush whatever the hub queued last (errors, close frames).
async fn drain_writer(id: ConnectionId, writer: tokio::task::JoinHandle<()>) {
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer)
        .await
        .is_err()
    {
        debug!(name: "relay.connection.drain_timeout", connection = %id, "Writer did not drain in time");
    }
}
