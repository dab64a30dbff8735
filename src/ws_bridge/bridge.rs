use axum::{
    extract::{ws::{WebSocket, WebSocketUpgrade}, Query, State},
    response::Response,
    routing::get,
    Json, Router,
};
use axum::extract::ws::Message;
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::sync::{broadcast, watch};
use tower_http::cors::CorsLayer;

use crate::job_control::{JobList, JobStatusEvent};

#[derive(Clone)]
pub struct AppState {
    pub events: broadcast::Sender<JobStatusEvent>,
    pub job_list: watch::Receiver<JobList>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    pub job_order_id: Option<String>,
}

impl EventFilter {
    fn matches(&self, event: &JobStatusEvent) -> bool {
        self.job_order_id
            .as_deref()
            .map_or(true, |id| id == event.job_order_id())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", get(jobs_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_ws_server(port: u16, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("WebSocket server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn jobs_handler(State(state): State<AppState>) -> Json<JobList> {
    Json(state.job_list.borrow().clone())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(filter): Query<EventFilter>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, filter))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, filter: EventFilter) {
    tracing::info!("New WebSocket connection");

    let mut rx = state.events.subscribe();

    let snapshot = serde_json::json!({
        "type": "snapshot",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "jobs": *state.job_list.borrow()
    });
    if let Ok(json) = serde_json::to_string(&snapshot) {
        if socket.send(Message::Text(json)).await.is_err() {
            tracing::info!("Client disconnected");
            return;
        }
    }

    loop {
        tokio::select! {
            received = rx.recv() => {
                let event = match received {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("WebSocket client lagged, {} job events skipped", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !filter.matches(&event) {
                    continue;
                }

                let msg = serde_json::json!({
                    "type": "jobStatus",
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "event": event
                });

                if let Ok(json) = serde_json::to_string(&msg) {
                    if socket.send(Message::Text(json)).await.is_err() {
                        tracing::info!("Client disconnected");
                        break;
                    }
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(_msg)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket connection closed");
                        break;
                    }
                }
            }
        }
    }
}
