use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use valvedesk_api::{
    config::Config,
    middleware::logging,
    routes::{auth, chat, conversations, health, history},
    state::AppState,
};
use valvedesk_engine::{ChatOrchestrator, ResponseEngine};
use valvedesk_llm::MistralClient;
use valvedesk_persist::{ConversationStore, PersistClient};
use valvedesk_retrieval::{QdrantConfig, QdrantRetriever};
use valvedesk_ticket::{BridgeConfig, TicketBridge, TicketExecutor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config =
        Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Initialize logging
    init_logging(&config);

    tracing::info!("Starting Valvedesk API server");
    tracing::info!("Config loaded: {}:{}", config.server.host, config.server.port);

    // Initialize persistence
    tracing::info!("Connecting to MongoDB");
    let persist = Arc::new(PersistClient::new(&config.mongodb_uri, &config.mongodb.database).await?);
    persist.ensure_indexes().await?;
    persist.run_migrations().await?;
    tracing::info!("MongoDB connected");

    // Initialize model client
    tracing::info!("Initializing chat model client");
    let chat_client: Arc<dyn valvedesk_llm::ChatClient> =
        Arc::new(MistralClient::new(config.mistral_api_key.clone())?);

    // Initialize retrieval adapter
    let retriever: Arc<dyn valvedesk_retrieval::Retriever> =
        Arc::new(QdrantRetriever::new(QdrantConfig {
            url: config.qdrant_url.clone(),
            api_key: config.qdrant_api_key.clone(),
            collection: config.retrieval.collection.clone(),
            mistral_api_key: config.mistral_api_key.clone(),
        })?);

    // Initialize ticketing bridge
    let tickets: Arc<dyn TicketExecutor> = Arc::new(TicketBridge::new(BridgeConfig {
        command: config.ticket.command.clone(),
        args: config.ticket.args.clone(),
        working_dir: config.ticket.working_dir.clone().map(PathBuf::from),
        timeout: Duration::from_secs(config.ticket.timeout_secs),
    }));

    // Assemble the orchestration core
    let engine = Arc::new(ResponseEngine::new(
        chat_client,
        retriever,
        config.engine.clone().into(),
    ));
    let store: Arc<dyn ConversationStore> = persist.clone();
    let orchestrator = Arc::new(ChatOrchestrator::new(engine, tickets, store));

    // Create application state
    let state = Arc::new(AppState::new(config.clone(), persist, orchestrator));

    // Build router
    let app = build_router(state.clone());

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(health::health_check))
        // Auth
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        // Chat
        .route("/chat/send", post(chat::send_message))
        .route("/chat/stream", post(chat::stream_message))
        .route("/chat/health", get(chat::chat_health))
        // Conversations
        .route("/conversations/new", post(conversations::create_conversation))
        .route("/conversations/list", get(conversations::list_conversations))
        .route(
            "/conversations/:conversation_id",
            get(conversations::get_conversation).delete(conversations::delete_conversation),
        )
        .route(
            "/conversations/all/clear",
            delete(conversations::clear_conversations),
        )
        .route(
            "/conversations/:conversation_id/pin",
            patch(conversations::pin_conversation),
        )
        .route(
            "/conversations/:conversation_id/messages/:message_id/favorite",
            patch(conversations::favorite_message),
        )
        // History
        .route("/history/all", get(history::get_full_history))
        .route("/history/stats", get(history::get_history_stats));

    Router::new()
        .merge(api_routes)
        .layer(middleware::from_fn(logging::log_request))
        .layer(TimeoutLayer::new(Duration::from_secs(
            state.config.server.request_timeout_secs,
        )))
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.cors.enabled {
        let mut cors = CorsLayer::new()
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers(Any);

        if config.cors.origins.iter().any(|o| o == "*") {
            cors = cors.allow_origin(Any);
        } else {
            for origin in &config.cors.origins {
                if let Ok(parsed_origin) = origin.parse::<axum::http::HeaderValue>() {
                    cors = cors.allow_origin(parsed_origin);
                }
            }
        }

        cors
    } else {
        CorsLayer::permissive()
    }
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}
