//! HTTP surface for the analysis pipeline.
//!
//! | Route | Method | Purpose |
//! |-------|--------|---------|
//! | `/api/analyze` | POST | Run an analysis, reply with the JSON envelope |
//! | `/api/analyze/stream` | POST | Same, as SSE `progress` events then one `result` |
//! | `/api/models` | GET | Provider model listing (diagnostic) |
//! | `/health` | GET | Liveness plus configuration summary |

use crate::config::Settings;
use crate::models::{AnalysisRequest, AnalysisResponse};
use crate::pipeline::{AnalysisError, Analyzer};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Shared, immutable state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    analyzer: Arc<Analyzer>,
    request_timeout: Duration,
    api_key_configured: bool,
}

impl AppState {
    pub fn new(analyzer: Analyzer, settings: &Settings) -> Self {
        Self {
            analyzer: Arc::new(analyzer),
            request_timeout: settings.request_timeout(),
            api_key_configured: settings.has_api_key(),
        }
    }
}

impl AnalysisError {
    pub fn status(&self) -> StatusCode {
        match self {
            AnalysisError::InvalidBody(_)
            | AnalysisError::MissingUrl
            | AnalysisError::InvalidUrl => StatusCode::BAD_REQUEST,
            AnalysisError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AnalysisError::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_response())).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/analyze/stream", post(analyze_stream))
        .route("/api/models", get(list_models))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors(origin: &str) -> Result<CorsLayer, Box<dyn Error>> {
    Ok(CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]))
}

/// Bind and serve until Ctrl-C.
pub async fn serve(analyzer: Analyzer, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let mut app = router(AppState::new(analyzer, settings));
    if let Some(origin) = &settings.allow_origin {
        app = app.layer(cors(origin)?);
        info!(%origin, "CORS enabled");
    }

    let listener = TcpListener::bind(settings.bind.as_str()).await?;
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Could not install Ctrl-C handler");
            }
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn analyze(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match AnalysisRequest::from_json(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = ?e.source(), "Rejected request body");
            return e.into_response();
        }
    };

    match state
        .analyzer
        .analyze_within(request, None, state.request_timeout)
        .await
    {
        Ok(result) => Json(AnalysisResponse::ok(result)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[instrument(level = "info", skip_all)]
async fn analyze_stream(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match AnalysisRequest::from_json(&body) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = request.validate() {
        return e.into_response();
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let analyzer = state.analyzer.clone();
    let limit = state.request_timeout;
    // Owns `tx`, so the progress stream ends once the analysis has.
    let handle = tokio::spawn(async move { analyzer.run(request, Some(&tx), limit).await });

    let progress = UnboundedReceiverStream::new(rx)
        .map(|p| Event::default().event("progress").json_data(p));
    let result = stream::once(async move {
        let envelope = handle.await.unwrap_or_else(|e| {
            error!(error = %e, "Analysis task failed");
            AnalysisResponse::failure("Internal server error")
        });
        Event::default().event("result").json_data(envelope)
    });

    Sse::new(progress.chain(result))
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn list_models(State(state): State<AppState>) -> Response {
    match state.analyzer.model_client().list_models().await {
        Ok(models) => Json(models).into_response(),
        Err(e) => {
            error!(error = %e, "Listing models failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to list models"})),
            )
                .into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "model": state.analyzer.model_client().model(),
        "apiKeyConfigured": state.api_key_configured,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::Fetched;
    use crate::pipeline::testing::{FakeFetcher, FakeModel, VERDICT_REPLY};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt; // for `oneshot`

    fn app_with(fetcher: Arc<FakeFetcher>, model: Arc<FakeModel>, timeout: Duration) -> Router {
        let settings = Settings {
            api_key: Some("test-key".to_string()),
            ..Settings::default()
        };
        let mut state = AppState::new(Analyzer::new(fetcher, model), &settings);
        state.request_timeout = timeout;
        router(state)
    }

    fn app(model: Arc<FakeModel>) -> Router {
        app_with(
            FakeFetcher::returning(Fetched::Content("Article text".into())),
            model,
            Duration::from_secs(5),
        )
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_json_body() {
        let resp = app(FakeModel::replying(VERDICT_REPLY))
            .oneshot(post_json("/api/analyze", "{url: nope"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await,
            json!({"success": false, "error": "Invalid JSON body"})
        );
    }

    #[tokio::test]
    async fn test_missing_url_is_bad_request_without_calls() {
        let fetcher = FakeFetcher::returning(Fetched::Content("x".into()));
        let model = FakeModel::replying(VERDICT_REPLY);
        let resp = app_with(fetcher.clone(), model.clone(), Duration::from_secs(5))
            .oneshot(post_json("/api/analyze", r#"{"content": "text"}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await,
            json!({"success": false, "error": "URL is required"})
        );
        assert!(fetcher.calls().is_empty());
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_successful_analysis() {
        let resp = app(FakeModel::replying(VERDICT_REPLY))
            .oneshot(post_json(
                "/api/analyze",
                r#"{"url": "https://news.example.com/story"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["success"], true);
        assert!(body.get("error").is_none());
        let data = &body["data"];
        assert_eq!(data["url"], "https://news.example.com/story");
        assert_eq!(data["fakeScore"], 80.0);
        assert_eq!(data["verdict"], "FALSE");
        assert_eq!(data["claims"][0]["text"], "The senator said X");
        assert_eq!(data["proofSources"][0]["title"], "Transcript");
        assert_eq!(data["executionLog"].as_array().unwrap().len(), 5);
        assert!(data["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_provider_failure_is_500() {
        let resp = app(FakeModel::failing())
            .oneshot(post_json("/api/analyze", r#"{"url": "https://a.example/"}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(resp).await,
            json!({"success": false, "error": "Gemini API call failed"})
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_still_succeeds() {
        let fetcher = FakeFetcher::returning(Fetched::Unavailable {
            reason: "connection refused".into(),
        });
        let resp = app_with(fetcher, FakeModel::replying(VERDICT_REPLY), Duration::from_secs(5))
            .oneshot(post_json("/api/analyze", r#"{"url": "https://down.example/"}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["success"], true);
    }

    #[tokio::test]
    async fn test_timeout_is_504() {
        let resp = app_with(
            FakeFetcher::returning(Fetched::Content("x".into())),
            FakeModel::slow(VERDICT_REPLY, Duration::from_millis(500)),
            Duration::from_millis(20),
        )
        .oneshot(post_json("/api/analyze", r#"{"url": "https://a.example/"}"#))
        .await
        .unwrap();

        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json_body(resp).await["error"], "Request timed out");
    }

    #[tokio::test]
    async fn test_stream_emits_progress_then_result() {
        let resp = app(FakeModel::replying(VERDICT_REPLY))
            .oneshot(post_json(
                "/api/analyze/stream",
                r#"{"url": "https://news.example.com/story"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        let first_progress = text.find("event: progress").unwrap();
        let result = text.find("event: result").unwrap();
        assert!(first_progress < result);
        assert_eq!(text.matches("event: progress").count(), 5);
        assert_eq!(text.matches("event: result").count(), 1);
        assert!(text.contains(r#""stage":"verdict-ready""#));
        assert!(text.contains(r#""success":true"#));
    }

    #[tokio::test]
    async fn test_stream_rejects_invalid_url_up_front() {
        let model = FakeModel::replying(VERDICT_REPLY);
        let resp = app(model.clone())
            .oneshot(post_json("/api/analyze/stream", r#"{"url": "javascript:alert(1)"}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await,
            json!({"success": false, "error": "Invalid URL"})
        );
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_list_models() {
        let resp = app(FakeModel::replying(VERDICT_REPLY))
            .oneshot(Request::get("/api/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["models"][0]["name"], "models/fake");

        let resp = app(FakeModel::failing())
            .oneshot(Request::get("/api/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(resp).await,
            json!({"error": "Failed to list models"})
        );
    }

    #[tokio::test]
    async fn test_health() {
        let resp = app(FakeModel::replying(VERDICT_REPLY))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            json_body(resp).await,
            json!({"status": "ok", "model": "fake-model", "apiKeyConfigured": true})
        );
    }

    #[test]
    fn test_cors_rejects_bad_origin() {
        assert!(cors("https://app.example.com").is_ok());
        assert!(cors("bad\norigin").is_err());
    }
}
