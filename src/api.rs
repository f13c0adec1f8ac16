//! HTTP endpoints for operators.
//!
//! Nothing here changes the game; `/corpus/reload` only swaps the hint corpus.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::state::{AppState, RoomSnapshot};
use crate::types::GameConfig;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigResponse {
    pub game: GameConfig,
    /// Remote evaluator in use, if any
    pub evaluator: Option<String>,
    pub hints_enabled: bool,
    pub corpus_sentences: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReloadResponse {
    pub sentences: usize,
    pub forbidden: usize,
    pub spoilers: usize,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(config))
        .route("/db", get(diagnostic_snapshot))
        .route("/corpus/reload", post(reload_corpus))
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.connections.connected_count().await,
    })
}

/// GET /config
pub async fn config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        game: state.config.clone(),
        evaluator: state.evaluator.remote_name().map(str::to_string),
        hints_enabled: state.evaluator.hints_enabled(),
        corpus_sentences: state.evaluator.fallback().corpus().sentences().len(),
    })
}

/// GET /db
///
/// Full room dump including secrets.
pub async fn diagnostic_snapshot(State(state): State<Arc<AppState>>) -> Json<RoomSnapshot> {
    Json(state.diagnostic_snapshot().await)
}

/// POST /corpus/reload
///
/// Rebuilds the corpus from disk. On failure the previous corpus stays in place.
pub async fn reload_corpus(State(state): State<Arc<AppState>>) -> Response {
    let source = state.corpus_source.clone();
    let loaded = match tokio::task::spawn_blocking(move || source.load()).await {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Corpus reload task failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Reload failed").into_response();
        }
    };

    match loaded {
        Ok(corpus) => {
            let body = ReloadResponse {
                sentences: corpus.sentences().len(),
                forbidden: corpus.forbidden_terms().len(),
                spoilers: corpus.spoiler_terms().len(),
            };
            state.evaluator.reload_corpus(corpus);
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            tracing::error!("Corpus reload failed: {}", e);
            (StatusCode::BAD_REQUEST, format!("Reload failed: {}", e)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CorpusConfig;
    use axum::body::Body;
    use axum::http::Request;
    use std::io::Write;
    use tower::ServiceExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn app(state: AppState) -> Router {
        router().with_state(Arc::new(state))
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(AppState::new(GameConfig::default()))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 0);
    }

    #[tokio::test]
    async fn test_config_reports_fallback_only() {
        let response = app(AppState::new(GameConfig::default()))
            .oneshot(Request::get("/config").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["game"]["max_rounds"], 3);
        assert!(json["evaluator"].is_null());
        assert_eq!(json["corpus_sentences"], 0);
    }

    #[tokio::test]
    async fn test_db_includes_secrets() {
        let state = Arc::new(AppState::new(GameConfig::default()));
        state.add_player("Alice", None).await.unwrap();
        state
            .room
            .lock()
            .await
            .start_new_round("comet".to_string());

        let response = router()
            .with_state(state)
            .oneshot(Request::get("/db").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["rounds"][0]["secret"], "comet");
        assert_eq!(json["players"][0]["name"], "Alice");
    }

    #[tokio::test]
    async fn test_reload_corpus() {
        let mut sentences = tempfile::NamedTempFile::new().unwrap();
        write!(sentences, "Comets carry ice. Their tails point away from the sun.").unwrap();

        let state = Arc::new(
            AppState::new(GameConfig::default()).with_corpus_source(CorpusConfig {
                sentences_path: Some(sentences.path().to_path_buf()),
                rules_path: None,
            }),
        );

        let response = router()
            .with_state(Arc::clone(&state))
            .oneshot(
                Request::post("/corpus/reload")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["sentences"], 2);
        assert_eq!(state.evaluator.fallback().corpus().sentences().len(), 2);
    }

    #[tokio::test]
    async fn test_reload_failure_keeps_corpus() {
        let state = Arc::new(
            AppState::new(GameConfig::default()).with_corpus_source(CorpusConfig {
                sentences_path: Some("/nonexistent/corpus.txt".into()),
                rules_path: None,
            }),
        );

        let response = router()
            .with_state(Arc::clone(&state))
            .oneshot(
                Request::post("/corpus/reload")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.evaluator.fallback().corpus().is_empty());
    }
}
