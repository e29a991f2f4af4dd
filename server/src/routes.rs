use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use narrator_common::style::{Humor, Tone};
use serde::Deserialize;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

/// Largest accepted frame upload.
pub const MAX_UPLOAD_BYTES: usize = 5 << 20;

const INDEX_HTML: &str = include_str!("html/index.html");

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ToneRequest {
    tone: String,
}

#[derive(Debug, Deserialize)]
struct HumorRequest {
    humor: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET / — control page
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /caption — latest caption, possibly empty
async fn caption(State(state): State<Arc<AppState>>) -> String {
    state.caption.get()
}

/// GET /prompt — base prompt
async fn prompt(State(state): State<Arc<AppState>>) -> String {
    state.prompt.clone()
}

/// POST /upload — raw image bytes become the current frame
async fn upload(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let data = match body {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "failed to read upload body");
            return (StatusCode::BAD_REQUEST, "Failed to read image data").into_response();
        }
    };

    let decode_state = Arc::clone(&state);
    let result =
        tokio::task::spawn_blocking(move || decode_state.frames.decode_and_set(&data)).await;

    match result {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => {
            debug!(error = %e, "rejected upload");
            (StatusCode::BAD_REQUEST, "Failed to decode image").into_response()
        }
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// POST /tone — body: { "tone": "flattering" | "neutral" | "insulting" }
async fn set_tone(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let tone = serde_json::from_slice::<ToneRequest>(&body)
        .ok()
        .and_then(|req| req.tone.parse::<Tone>().ok());
    match tone {
        Some(tone) => {
            state.style.set_tone(tone);
            info!(%tone, "tone updated");
            StatusCode::OK.into_response()
        }
        None => (StatusCode::BAD_REQUEST, "Invalid tone").into_response(),
    }
}

/// POST /humor — body: { "humor": "funny" | "neutral" | "serious" }
async fn set_humor(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let humor = serde_json::from_slice::<HumorRequest>(&body)
        .ok()
        .and_then(|req| req.humor.parse::<Humor>().ok());
    match humor {
        Some(humor) => {
            state.style.set_humor(humor);
            info!(%humor, "humor updated");
            StatusCode::OK.into_response()
        }
        None => (StatusCode::BAD_REQUEST, "Invalid humor").into_response(),
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/caption", get(caption))
        .route("/prompt", get(prompt))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/tone", post(set_tone))
        .route("/humor", post(set_humor))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
