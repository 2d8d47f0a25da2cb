use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use log::{debug, error, warn};
use tokio::sync::mpsc;

use crate::detector::RequestEvent;
use crate::settings::SettingsReference;

/// Inbound edge for the browser runtime: completed-request notifications
/// arrive here and are queued for the detector.
#[derive(Clone)]
pub struct BridgeState {
    pub settings: SettingsReference,
    pub events: mpsc::Sender<RequestEvent>,
}

fn is_authenticated(headers: &HeaderMap, settings: &SettingsReference) -> bool {
    let Ok(settings) = settings.read() else {
        error!("Authentication error: cannot read settings");
        return false;
    };
    let Some(secret) = &settings.secret else {
        debug!("Secret key not set");
        return true;
    };
    let Ok(x_secret_key) = (match headers.get("x-secret-key") {
        Some(value) => value.to_str(),
        None => {
            debug!("Authentication error: X-Secret-Key not provided");
            return false;
        }
    }) else {
        warn!("Authentication error: X-Secret-Key is not text");
        return false;
    };
    return x_secret_key == secret;
}

async fn event(
    State(state): State<BridgeState>,
    headers: HeaderMap,
    Json(payload): Json<RequestEvent>,
) -> StatusCode {
    if !is_authenticated(&headers, &state.settings) {
        return StatusCode::UNAUTHORIZED;
    }
    debug!("Observed request completion: {}", payload.url);
    match state.events.send(payload).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => {
            error!("Event channel is closed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub fn router(state: BridgeState) -> Router {
    Router::new().route("/event", post(event)).with_state(state)
}

pub async fn serve(listener: tokio::net::TcpListener, state: BridgeState) {
    if let Err(error) = axum::serve(listener, router(state)).await {
        error!("Bridge server stopped: {}", error);
    }
}
