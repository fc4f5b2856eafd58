//! Control API (§4.5): the stateless HTTP surface over the Task Store and
//! Job Queue. Structurally grounded on the teacher's `server::{AppState,
//! serve, create_router}` shape; `AppState` is repointed from document/
//! source/crawl repositories at the Task Store and Job Queue, and
//! `handlers`/`routes` are rewritten for the JSON Control API surface
//! instead of HTML document browsing.

mod error;
mod handlers;
mod routes;

pub use error::ApiError;
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::analysis::Clusterer;
use crate::config::Settings;
use crate::knowledge::EmbeddingProvider;
use crate::llm::ModelClient;
use crate::pipeline::PipelineConfig;
use crate::repository::TaskStore;
use crate::worker::JobQueue;

/// Shared state for the Control API: the Task Store, the Job Queue, and the
/// singletons `submit_sync` needs to run the pipeline inline.
#[derive(Clone)]
pub struct AppState {
    pub task_store: Arc<dyn TaskStore>,
    pub job_queue: Arc<dyn JobQueue>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub clusterer: Arc<dyn Clusterer>,
    pub model_client: Arc<dyn ModelClient>,
    pub pipeline_config: PipelineConfig,
}

/// Start the Control API HTTP server.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[allow(dead_code)]
fn _settings_type_is_referenced(_: &Settings) {}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::body::to_bytes;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::analysis::DeterministicClusterer;
    use crate::knowledge::DeterministicEmbedder;
    use crate::llm::{ModelError, ModelParams};
    use crate::repository::task_store::InMemoryTaskStore;
    use crate::worker::InProcessQueue;
    use async_trait::async_trait;

    struct NoopClient;

    #[async_trait]
    impl ModelClient for NoopClient {
        async fn generate(&self, _prompt: &str, _params: &ModelParams) -> Result<String, ModelError> {
            Ok("{}".to_string())
        }
    }

    fn test_state() -> AppState {
        AppState {
            task_store: Arc::new(InMemoryTaskStore::new()),
            job_queue: Arc::new(InProcessQueue::new(16)),
            embedder: Arc::new(DeterministicEmbedder::default()),
            clusterer: Arc::new(DeterministicClusterer::default()),
            model_client: Arc::new(NoopClient),
            pipeline_config: PipelineConfig {
                batch_size: 50,
                retry_limit: 1,
                self_correction_enabled: true,
                save_reports: false,
                rag_confidence_threshold: 0.8,
                rag_retrieval_top_k: 5,
            },
        }
    }

    #[tokio::test]
    async fn health_endpoint_reports_healthy() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_unknown_task_returns_404() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/optimize/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn submit_then_get_round_trips_through_the_router() {
        let app = create_router(test_state());
        let body = serde_json::json!({
            "dataset": [{"question": "q", "answer": "a"}],
        })
        .to_string();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/optimize")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let task_id = parsed["task_id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/optimize/{task_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
