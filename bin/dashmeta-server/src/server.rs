//! HTTP surface of the server:
//! - `POST /metadata` - submit a metadata message
//! - `GET /metadata_feed` - every stored message
//! - `GET /stream_alive` - whether the transcoder is running
//! - `GET /watch` - viewer page
//! - `/live/app/*` - manifests and segments

use std::{path::Path, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use dashmeta::{FeedEntry, MetadataInbox, StreamLiveness};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub const DASH_ROUTE: &str = "/live/app";
pub const VIEWER_PAGE: &str = include_str!("../assets/live.html");

/// Fill the `{{live_manifest}}` and `{{scheme_id_uri}}` placeholders of a
/// viewer page with JavaScript string literals.
pub fn render_viewer(page: &str, live_manifest_name: &str, scheme_id_uri: &str) -> String {
    let literal = |value: &str| Value::from(value).to_string().replace("</", "<\\/");
    page.replace(
        "{{live_manifest}}",
        &literal(&format!("{DASH_ROUTE}/{live_manifest_name}")),
    )
    .replace("{{scheme_id_uri}}", &literal(scheme_id_uri))
}

#[derive(Clone)]
pub struct AppState {
    pub inbox: Arc<MetadataInbox>,
    pub liveness: Arc<dyn StreamLiveness>,
    pub viewer: Arc<str>,
}

pub fn build_router(state: AppState, dash_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/metadata", post(receive_metadata))
        .route("/metadata_feed", get(metadata_feed))
        .route("/stream_alive", get(stream_alive))
        .route("/watch", get(watch_page))
        .nest_service(DASH_ROUTE, ServeDir::new(dash_dir.as_ref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct MetadataRequest {
    #[serde(default)]
    metadata: String,
    #[serde(default)]
    time: Option<Value>,
}

#[derive(Debug, Serialize)]
struct MetadataResponse {
    status: &'static str,
    received: String,
}

#[derive(Debug, Serialize)]
struct FeedResponse {
    messages: Vec<FeedEntry>,
}

#[derive(Debug, Serialize)]
struct AliveResponse {
    alive: bool,
}

/// Accepts integers, floats (truncated) and numeric strings.
fn presentation_time(time: &Value) -> Option<i64> {
    match time {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// The body is read as JSON regardless of its content type. Anything that does
// not carry a text and a time is acknowledged but not stored.
async fn receive_metadata(State(state): State<AppState>, body: Bytes) -> Json<MetadataResponse> {
    let request: MetadataRequest = serde_json::from_slice(&body).unwrap_or_default();

    let received = match request.time.as_ref().and_then(presentation_time) {
        Some(time) => state.inbox.submit(request.metadata, time).received,
        None => {
            if !request.metadata.is_empty() {
                tracing::warn!("Ignored metadata without a valid time: {}", request.metadata);
            }
            request.metadata
        }
    };

    Json(MetadataResponse {
        status: "ok",
        received,
    })
}

async fn metadata_feed(State(state): State<AppState>) -> Json<FeedResponse> {
    Json(FeedResponse {
        messages: state.inbox.read_all(),
    })
}

async fn stream_alive(State(state): State<AppState>) -> Json<AliveResponse> {
    Json(AliveResponse {
        alive: state.liveness.is_alive(),
    })
}

async fn watch_page(State(state): State<AppState>) -> Html<String> {
    Html(state.viewer.to_string())
}
