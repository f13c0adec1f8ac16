use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hintroom::{
    api,
    corpus::{CorpusConfig, CorpusIndex},
    llm::{Evaluator, FallbackEvaluator, LlmConfig, RemoteEvaluator},
    state::AppState,
    types::GameConfig,
    ws,
};

const DEFAULT_PORT: u16 = 8000;

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hintroom=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting hintroom...");

    let game_config = GameConfig::from_env();
    tracing::info!(
        "{} rounds, {}s/{}s/{}s phases, up to {} players",
        game_config.max_rounds,
        game_config.submission_seconds,
        game_config.discussion_seconds,
        game_config.transition_seconds,
        game_config.max_players
    );

    // A broken corpus still lets the game run on template hints
    let corpus_source = CorpusConfig::from_env();
    let corpus = corpus_source.load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load corpus: {}. Starting with an empty one.", e);
        CorpusIndex::empty()
    });

    let llm_config = LlmConfig::from_env();
    let remote = match llm_config.build_remote() {
        Ok(remote) => {
            tracing::info!("Remote evaluator initialized: {}", remote.name());
            Some(remote)
        }
        Err(e) => {
            tracing::warn!("No remote evaluator: {}. Using fallback hints only.", e);
            None
        }
    };
    let evaluator = Evaluator::new(remote, FallbackEvaluator::new(corpus), &llm_config);

    let state = Arc::new(
        AppState::with_evaluator(game_config, evaluator).with_corpus_source(corpus_source),
    );

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(api::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
