use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use reqwest::{header::ACCEPT, Client};
use serde_json::Value;
use shared::{error::ProxyErrorBody, protocol::UpstreamTrackRequest};
use tower_http::{limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer};
use tracing::{error, info, warn};

mod config;

use config::load_settings;

const MAX_REQUEST_BYTES: usize = 64 * 1024;
const MAX_RAW_BODY_CHARS: usize = 200;
const API_KEY_HEADER: &str = "Tracking-Api-Key";

const CORS_HEADERS: [(&str, &str); 4] = [
    ("access-control-allow-credentials", "true"),
    ("access-control-allow-origin", "*"),
    ("access-control-allow-methods", "GET,OPTIONS,POST"),
    (
        "access-control-allow-headers",
        "X-CSRF-Token, X-Requested-With, Accept, Accept-Version, Content-Length, Content-MD5, Content-Type, Date, X-Api-Version",
    ),
];

#[derive(Clone)]
struct AppState {
    http: Client,
    upstream_url: String,
}

type ProxyError = (StatusCode, Json<ProxyErrorBody>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let http = Client::builder()
        .timeout(settings.upstream_timeout)
        .build()?;
    let state = AppState {
        http,
        upstream_url: settings.upstream_url,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "tracking proxy listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/track",
            post(track).options(preflight).fallback(method_not_allowed),
        )
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .with_state(state);

    CORS_HEADERS.into_iter().fold(router, |router, (name, value)| {
        router.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ))
    })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> ProxyError {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ProxyErrorBody::new("Method Not Allowed")),
    )
}

/// Forwards one lookup to the provider and relays its answer unchanged.
async fn track(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ProxyError> {
    let (request, api_key) = parse_track_request(&body)?;
    info!(
        code = %request.tracking_number,
        courier_code = %request.courier_code,
        "forwarding tracking lookup"
    );

    let response = state
        .http
        .post(&state.upstream_url)
        .header(API_KEY_HEADER, api_key)
        .header(ACCEPT, "application/json")
        .json(&request)
        .send()
        .await
        .map_err(internal_error)?;

    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let text = response.text().await.map_err(internal_error)?;

    let Ok(data) = serde_json::from_str::<Value>(&text) else {
        warn!(%status, "provider answered with a non-JSON body");
        return Err((
            StatusCode::BAD_GATEWAY,
            Json(
                ProxyErrorBody::new("Bad Gateway")
                    .with_details("Could not read the tracking provider response.")
                    .with_raw_body(text.chars().take(MAX_RAW_BODY_CHARS).collect::<String>()),
            ),
        ));
    };

    Ok((status, Json(data)).into_response())
}

fn parse_track_request(body: &[u8]) -> Result<(UpstreamTrackRequest, String), ProxyError> {
    let value: Value = serde_json::from_slice(body).map_err(|error| {
        (
            StatusCode::BAD_REQUEST,
            Json(ProxyErrorBody::new("Invalid request body").with_details(error.to_string())),
        )
    })?;

    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string)
    };

    match (
        field("tracking_number"),
        field("courier_code"),
        field("api_key"),
    ) {
        (Some(tracking_number), Some(courier_code), Some(api_key)) => Ok((
            UpstreamTrackRequest {
                tracking_number,
                courier_code,
            },
            api_key,
        )),
        _ => Err((
            StatusCode::BAD_REQUEST,
            Json(
                ProxyErrorBody::new("Missing tracking details")
                    .with_details("tracking_number, courier_code and api_key are required."),
            ),
        )),
    }
}

fn internal_error(error: reqwest::Error) -> ProxyError {
    error!(%error, "tracking provider request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ProxyErrorBody::new("Internal Server Error").with_details(error.to_string())),
    )
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
