use super::*;
use axum::{
    body::{self, Body},
    http::{HeaderMap, Method, Request},
};
use serde_json::json;
use tokio::{net::TcpListener, sync::Mutex};
use tower::ServiceExt;

#[derive(Clone)]
struct UpstreamState {
    status: StatusCode,
    body: String,
    seen: Arc<Mutex<Option<(Option<String>, Value)>>>,
}

async fn fake_realtime(
    State(state): State<UpstreamState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    *state.seen.lock().await = Some((api_key, body));
    (state.status, state.body.clone())
}

async fn spawn_upstream(status: StatusCode, body: impl Into<String>) -> (String, UpstreamState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = UpstreamState {
        status,
        body: body.into(),
        seen: Arc::new(Mutex::new(None)),
    };
    let app = Router::new()
        .route("/v4/trackings/realtime", post(fake_realtime))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/v4/trackings/realtime"), state)
}

fn test_app(upstream_url: impl Into<String>) -> Router {
    build_router(Arc::new(AppState {
        http: Client::new(),
        upstream_url: upstream_url.into(),
    }))
}

fn track_request(body: impl Into<Body>) -> Request<Body> {
    Request::post("/api/track")
        .header("content-type", "application/json")
        .body(body.into())
        .expect("request")
}

async fn json_body(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn valid_request() -> Value {
    json!({
        "tracking_number": "SF1234567890",
        "courier_code": "sf-express",
        "api_key": "secret-key"
    })
}

#[tokio::test]
async fn healthz_reports_ok() {
    let response = test_app("http://127.0.0.1:9/unused")
        .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn preflight_returns_ok_with_cors_headers() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/track")
        .body(Body::empty())
        .expect("request");
    let response = test_app("http://127.0.0.1:9/unused")
        .oneshot(request)
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-credentials"], "true");
    assert_eq!(headers["access-control-allow-methods"], "GET,OPTIONS,POST");
    assert!(headers["access-control-allow-headers"]
        .to_str()
        .expect("ascii")
        .contains("Content-Type"));

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert!(body.is_empty());
}

#[tokio::test]
async fn non_post_methods_are_rejected() {
    for method in [Method::GET, Method::PUT, Method::DELETE] {
        let request = Request::builder()
            .method(method.clone())
            .uri("/api/track")
            .body(Body::empty())
            .expect("request");
        let response = test_app("http://127.0.0.1:9/unused")
            .oneshot(request)
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(
            json_body(response).await,
            json!({ "error": "Method Not Allowed" })
        );
    }
}

#[tokio::test]
async fn missing_or_blank_fields_are_bad_requests() {
    let (url, upstream) = spawn_upstream(StatusCode::OK, "{}").await;
    let app = test_app(url);

    for body in [
        json!({ "tracking_number": "SF1", "courier_code": "sf-express" }),
        json!({ "tracking_number": "  ", "courier_code": "sf-express", "api_key": "k" }),
        json!({ "tracking_number": "SF1", "courier_code": 7, "api_key": "k" }),
        json!([]),
    ] {
        let response = app
            .clone()
            .oneshot(track_request(body.to_string()))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        let error: ProxyErrorBody =
            serde_json::from_value(json_body(response).await).expect("error body");
        assert_eq!(error.error, "Missing tracking details");
        assert!(error.details.is_some());
    }
    assert!(upstream.seen.lock().await.is_none());
}

#[tokio::test]
async fn unparseable_body_is_a_bad_request() {
    let response = test_app("http://127.0.0.1:9/unused")
        .oneshot(track_request("{not json"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ProxyErrorBody =
        serde_json::from_value(json_body(response).await).expect("error body");
    assert_eq!(error.error, "Invalid request body");
}

#[tokio::test]
async fn forwards_lookup_and_relays_upstream_json() {
    let upstream_body = json!({
        "meta": { "code": 200, "message": "Request response is successful" },
        "data": { "delivery_status": "transit", "latest_event": "Departed hub" }
    });
    let (url, upstream) = spawn_upstream(StatusCode::OK, upstream_body.to_string()).await;

    let response = test_app(url)
        .oneshot(track_request(valid_request().to_string()))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(json_body(response).await, upstream_body);

    let (api_key, forwarded) = upstream.seen.lock().await.clone().expect("forwarded");
    assert_eq!(api_key.as_deref(), Some("secret-key"));
    assert_eq!(
        forwarded,
        json!({ "tracking_number": "SF1234567890", "courier_code": "sf-express" })
    );
}

#[tokio::test]
async fn upstream_error_status_is_relayed() {
    let upstream_body = json!({ "meta": { "code": 401, "message": "Unauthorized" }, "data": [] });
    let (url, _upstream) =
        spawn_upstream(StatusCode::UNAUTHORIZED, upstream_body.to_string()).await;

    let response = test_app(url)
        .oneshot(track_request(valid_request().to_string()))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, upstream_body);
}

#[tokio::test]
async fn non_json_upstream_body_is_bad_gateway_with_truncated_raw_body() {
    let html = format!("<html>{}</html>", "x".repeat(400));
    let (url, _upstream) = spawn_upstream(StatusCode::OK, html.clone()).await;

    let response = test_app(url)
        .oneshot(track_request(valid_request().to_string()))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let error: ProxyErrorBody =
        serde_json::from_value(json_body(response).await).expect("error body");
    assert!(error.details.is_some());
    let raw = error.raw_body.expect("raw body");
    assert_eq!(raw.chars().count(), MAX_RAW_BODY_CHARS);
    assert!(html.starts_with(&raw));
}

#[tokio::test]
async fn transport_failure_is_internal_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let response = test_app(format!("http://{addr}/v4/trackings/realtime"))
        .oneshot(track_request(valid_request().to_string()))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ProxyErrorBody =
        serde_json::from_value(json_body(response).await).expect("error body");
    assert_eq!(error.error, "Internal Server Error");
    assert!(error.details.is_some());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let (url, upstream) = spawn_upstream(StatusCode::OK, "{}").await;
    let padding = "x".repeat(MAX_REQUEST_BYTES + 1);
    let body = json!({
        "tracking_number": padding,
        "courier_code": "sf-express",
        "api_key": "k"
    });

    let response = test_app(url)
        .oneshot(track_request(body.to_string()))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(upstream.seen.lock().await.is_none());
}
