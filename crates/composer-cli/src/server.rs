use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use composer_contracts::challenge::Challenge;
use composer_engine::{is_remote_image_ref, ChatTurn, ImageSource, Pipeline, Role};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

pub type SharedPipeline = Arc<Pipeline>;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub image_url: String,
    pub heat_level: i64,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct MosaicTitleRequest {
    pub image_url: String,
}

#[derive(Debug, Serialize)]
pub struct MosaicTitleResponse {
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        ApiError {
            error: ApiErrorDetail {
                message: message.into(),
                error_type: error_type.into(),
            },
        }
    }
}

pub fn router(pipeline: SharedPipeline) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/challenge", post(generate_challenge))
        .route("/chat", post(chat))
        .route("/mosaic/title", post(mosaic_title))
        .with_state(pipeline)
}

/// Bind `0.0.0.0:port` and serve until ctrl-c.
///
/// Callers are remote, so `pipeline` must only resolve URL image references.
pub async fn serve(pipeline: SharedPipeline, port: u16) -> Result<()> {
    if pipeline.image_source() != ImageSource::RemoteOnly {
        bail!("refusing to serve a pipeline that reads local image paths");
    }
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    info!(
        port,
        vision_model = %pipeline.vision_model().name,
        text_model = %pipeline.text_model().name,
        "composer server listening"
    );
    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server stopped with an error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

pub async fn health_check(State(pipeline): State<SharedPipeline>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "vision_model": pipeline.vision_model().name,
        "text_model": pipeline.text_model().name,
        "providers": pipeline.provider_names(),
    }))
}

pub async fn generate_challenge(
    State(pipeline): State<SharedPipeline>,
    Json(req): Json<ChallengeRequest>,
) -> ApiResult<Challenge> {
    require_remote_image(&req.image_url)?;
    let challenge = blocking(pipeline, move |pipeline| {
        pipeline.run(&req.image_url, req.heat_level, req.context.as_deref())
    })
    .await?;
    Ok(Json(challenge))
}

pub async fn chat(
    State(pipeline): State<SharedPipeline>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    if req.messages.is_empty() {
        return Err(bad_request("messages array is empty"));
    }
    if let Some(turn) = req
        .messages
        .iter()
        .find(|turn| Role::parse(&turn.role).is_none())
    {
        return Err(bad_request(format!("unsupported role '{}'", turn.role)));
    }
    let response = blocking(pipeline, move |pipeline| {
        pipeline.chat(
            &req.messages,
            req.system_prompt.as_deref(),
            req.context.as_deref(),
        )
    })
    .await?;
    Ok(Json(ChatResponse { response }))
}

pub async fn mosaic_title(
    State(pipeline): State<SharedPipeline>,
    Json(req): Json<MosaicTitleRequest>,
) -> ApiResult<MosaicTitleResponse> {
    require_remote_image(&req.image_url)?;
    let title = blocking(pipeline, move |pipeline| pipeline.title_mosaic(&req.image_url)).await?;
    Ok(Json(MosaicTitleResponse { title }))
}

/// Providers use a blocking HTTP client, so every pipeline call leaves the
/// async workers.
async fn blocking<T, F>(pipeline: SharedPipeline, call: F) -> Result<T, (StatusCode, Json<ApiError>)>
where
    T: Send + 'static,
    F: FnOnce(&Pipeline) -> Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || call(pipeline.as_ref())).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            warn!(error = %format!("{err:#}"), "request failed");
            Err(server_error(format!("{err:#}")))
        }
        Err(err) => Err(server_error(format!("pipeline task aborted: {err}"))),
    }
}

fn require_remote_image(image_url: &str) -> Result<(), (StatusCode, Json<ApiError>)> {
    if is_remote_image_ref(image_url) {
        return Ok(());
    }
    Err(bad_request("image_url must be an http(s):// or data: URL"))
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new(message, "invalid_request_error")),
    )
}

fn server_error(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::new(message, "server_error")),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use composer_contracts::models::ModelSelector;
    use composer_engine::{CompletionRequest, DryrunProvider, ModelProvider, ModelProviderRegistry};

    use super::*;

    /// Dryrun answers, counting every call.
    #[derive(Clone, Default)]
    struct CountingDryrun {
        calls: Arc<AtomicUsize>,
    }

    impl ModelProvider for CountingDryrun {
        fn name(&self) -> &str {
            "dryrun"
        }

        fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            DryrunProvider.complete(request)
        }
    }

    fn counting_pipeline(provider: &CountingDryrun) -> SharedPipeline {
        let mut providers = ModelProviderRegistry::new();
        providers.register(provider.clone());
        let pipeline = Pipeline::from_parts(
            ModelSelector::new(None),
            providers,
            Some("dryrun-vision-1"),
            Some("dryrun-text-1"),
            None,
        );
        match pipeline {
            Ok(pipeline) => Arc::new(pipeline.with_image_source(ImageSource::RemoteOnly)),
            Err(err) => panic!("dryrun pipeline: {err:#}"),
        }
    }

    fn dryrun_pipeline() -> SharedPipeline {
        counting_pipeline(&CountingDryrun::default())
    }

    #[tokio::test]
    async fn health_reports_selected_models() {
        let Json(body) = health_check(State(dryrun_pipeline())).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["vision_model"], "dryrun-vision-1");
        assert_eq!(body["text_model"], "dryrun-text-1");
        assert_eq!(body["providers"], json!(["dryrun"]));
    }

    #[tokio::test]
    async fn challenge_clamps_heat_level() {
        let req = ChallengeRequest {
            image_url: "https://example.com/photo.jpg".to_string(),
            heat_level: 42,
            context: Some("anniversary".to_string()),
        };
        let result = generate_challenge(State(dryrun_pipeline()), Json(req)).await;
        let Ok(Json(challenge)) = result else {
            panic!("challenge request failed");
        };
        assert_eq!(challenge.intensity, 10);
        assert_eq!(challenge.error, None);
        assert!(!challenge.challenge_title.is_empty());
    }

    #[tokio::test]
    async fn local_paths_are_rejected_before_any_model_call() {
        let provider = CountingDryrun::default();
        let pipeline = counting_pipeline(&provider);
        for image_url in ["/etc/passwd", "file:///etc/passwd", "../secrets.env"] {
            let req = ChallengeRequest {
                image_url: image_url.to_string(),
                heat_level: 3,
                context: None,
            };
            let result = generate_challenge(State(Arc::clone(&pipeline)), Json(req)).await;
            let Err((status, Json(body))) = result else {
                panic!("local path {image_url} should be rejected");
            };
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body.error.error_type, "invalid_request_error");
            assert!(!body.error.message.contains("not found"));

            let req = MosaicTitleRequest {
                image_url: image_url.to_string(),
            };
            let Err((status, _)) = mosaic_title(State(Arc::clone(&pipeline)), Json(req)).await
            else {
                panic!("local path {image_url} should be rejected");
            };
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn serve_refuses_pipeline_that_reads_local_paths() {
        let mut providers = ModelProviderRegistry::new();
        providers.register(DryrunProvider);
        let pipeline = Pipeline::from_parts(
            ModelSelector::new(None),
            providers,
            Some("dryrun-vision-1"),
            Some("dryrun-text-1"),
            None,
        );
        let Ok(pipeline) = pipeline else {
            panic!("dryrun pipeline should build");
        };
        assert!(serve(Arc::new(pipeline), 0).await.is_err());
    }

    #[tokio::test]
    async fn chat_rejects_empty_messages() {
        let req = ChatRequest {
            messages: Vec::new(),
            system_prompt: None,
            context: None,
        };
        let Err((status, Json(body))) = chat(State(dryrun_pipeline()), Json(req)).await else {
            panic!("empty chat should fail");
        };
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error.error_type, "invalid_request_error");
    }

    #[tokio::test]
    async fn chat_rejects_unknown_role() {
        let req = ChatRequest {
            messages: vec![ChatTurn {
                role: "narrator".to_string(),
                content: "hello".to_string(),
            }],
            system_prompt: None,
            context: None,
        };
        let Err((status, _)) = chat(State(dryrun_pipeline()), Json(req)).await else {
            panic!("unknown role should fail");
        };
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_answers_last_user_turn() {
        let req = ChatRequest {
            messages: vec![ChatTurn {
                role: "user".to_string(),
                content: "Something playful?".to_string(),
            }],
            system_prompt: None,
            context: Some("rainy evening".to_string()),
        };
        let Ok(Json(reply)) = chat(State(dryrun_pipeline()), Json(req)).await else {
            panic!("chat request failed");
        };
        assert!(reply.response.ends_with("Something playful?"));
    }

    #[tokio::test]
    async fn mosaic_title_returns_single_line() {
        let req = MosaicTitleRequest {
            image_url: "data:image/jpeg;base64,AAAA".to_string(),
        };
        let Ok(Json(body)) = mosaic_title(State(dryrun_pipeline()), Json(req)).await else {
            panic!("title request failed");
        };
        assert_eq!(body.title, "Our Quiet Constellation");
    }

    #[test]
    fn error_body_uses_type_key() -> anyhow::Result<()> {
        let body = serde_json::to_value(ApiError::new("boom", "server_error"))?;
        assert_eq!(body, json!({"error": {"message": "boom", "type": "server_error"}}));
        Ok(())
    }
}
