use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::session::{engine, protocol};

use super::app::App;

pub fn ws_routes() -> Router<Arc<App>> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(
    State(app): State<Arc<App>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::info!(remote = %remote, "New client connected");

    if app.shutdown.is_draining() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response();
    }
    if app.options.once && !app.claim_once_slot() {
        tracing::info!(remote = %remote, "Once mode: refusing client, session already taken");
        return (StatusCode::SERVICE_UNAVAILABLE, "Session limit reached").into_response();
    }

    let params = app.session_params();
    let once = app.options.once;
    let shutdown = app.shutdown.clone();
    ws.protocols([protocol::SUBPROTOCOL])
        .on_upgrade(move |socket| async move {
            // In once mode the first successful upgrade drains the
            // acceptor; this session runs to completion.
            if once && shutdown.trigger() {
                tracing::info!("Once mode: acceptor drained");
            }
            engine::run(socket, params, remote).await;
        })
}
