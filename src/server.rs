//! HTTP surface: `GET /capture`, `POST /capture` and `GET /healthz`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderValue, Method};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use log::{error, warn};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::fonts::FontCache;
use crate::job::{CaptureQuery, JobResolver};
use crate::response::{error_response, image_response};
use crate::{async_api, Renderer, Result};

/// Everything a request handler needs; shared read-only across requests
pub struct AppState {
    pub resolver: JobResolver,
    pub renderer: Arc<Renderer>,
    pub fonts: Arc<FontCache>,
    /// Include diagnostic traces in error responses
    pub diagnostics: bool,
}

impl AppState {
    pub fn new(renderer: Renderer, fonts: FontCache, diagnostics: bool) -> Self {
        Self {
            resolver: JobResolver::new(renderer.policy().default_viewport),
            renderer: Arc::new(renderer),
            fonts: Arc::new(fonts),
            diagnostics,
        }
    }
}

/// CORS policy: echo allow-listed origins, fixed methods and headers.
///
/// The origin is echoed on every response from an allowed origin; methods and
/// headers are only advertised on preflight (`OPTIONS`) responses.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Ignoring invalid CORS origin '{}': {}", o, e);
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/capture", get(capture_get).post(capture_post))
        .with_state(state)
        .layer(cors)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn capture_get(State(state): State<Arc<AppState>>, RawQuery(raw): RawQuery) -> Response {
    let job = CaptureQuery::parse(raw.as_deref()).and_then(|query| state.resolver.from_query(&query));
    capture(state, job).await
}

async fn capture_post(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let job = state.resolver.from_json(&body);
    capture(state, job).await
}

async fn capture(state: Arc<AppState>, job: Result<crate::CaptureJob>) -> Response {
    let job = match job {
        Ok(job) => job,
        Err(e) => return error_response(&e, state.diagnostics),
    };

    let font = state.fonts.get().await;
    let image_type = job.image_type.clone();
    let url = job.url.clone();

    match async_api::render(state.renderer.clone(), job, font).await {
        Ok(data) => image_response(data, image_type),
        Err(e) => {
            error!("Error capturing screenshot of {}: {}", url, e);
            error_response(&e, state.diagnostics)
        }
    }
}
