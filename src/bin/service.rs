/// Ragbus service - consumes broker events, answers document queries with
/// retrieval-augmented generation, and ingests documents into the index.
///
/// Exposes health/readiness endpoints for the orchestrator; all real work
/// happens on the broker consume loop.
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tower_http::cors::CorsLayer;

use ragbus::{
    topics, BrokerClient, BrokerConfig, DocumentRetriever, Embedder, HttpFetcher, IngestHandler,
    LlmConfig, MemoryIndex, OpenAiChatModel, PlainTextExtractor, QueryHandler, TopicDispatcher,
    TopicHandler, VectorIndex,
};

#[derive(Clone)]
struct AppState {
    broker: Arc<BrokerClient>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let broker_config = BrokerConfig::default();
    let llm_config = LlmConfig::default();
    let service_name = broker_config.service_name.clone();

    let group_id = std::env::var("CONSUMER_GROUP_ID")
        .unwrap_or_else(|_| "ragbus-workers".to_string());
    let scratch_dir = std::env::var("INGEST_SCRATCH_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir());

    // Connect the broker client
    let broker = Arc::new(
        BrokerClient::connect(broker_config)
            .await
            .expect("Failed to connect to broker"),
    );

    // Capability implementations: the OpenAI-compatible client serves
    // both completion and embedding; the index default is in-process.
    let llm = Arc::new(OpenAiChatModel::new(llm_config));
    if !llm.is_configured() {
        tracing::warn!("LLM_API_KEY is not set; generation requests will fail");
    }
    let embedder: Arc<dyn Embedder> = llm.clone();
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new());

    // Topic registry, frozen before consumption begins
    let mut dispatcher = TopicDispatcher::new();
    dispatcher.register(
        topics::DOCUMENT_QUERY,
        TopicHandler::Suspending(Arc::new(QueryHandler::new(
            DocumentRetriever::new(embedder.clone(), index.clone()),
            llm.clone(),
            broker.clone(),
            &service_name,
        ))),
    );
    dispatcher.register(
        topics::EMBEDDING_CREATE,
        TopicHandler::Suspending(Arc::new(IngestHandler::new(
            Arc::new(HttpFetcher::new(scratch_dir)),
            Arc::new(PlainTextExtractor),
            embedder,
            index,
        ))),
    );

    // Consume loop; a broker connection loss here is fatal and the
    // supervisor restarts the process.
    let consumer_broker = broker.clone();
    let consumer_task = tokio::spawn(async move {
        let result = consumer_broker
            .subscribe(
                &[topics::EMBEDDING_CREATE, topics::DOCUMENT_QUERY],
                &group_id,
                &dispatcher,
            )
            .await;
        if let Err(e) = result {
            tracing::error!("Consume loop terminated: {}", e);
            std::process::exit(1);
        }
    });

    let state = Arc::new(AppState {
        broker: broker.clone(),
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .expect("Invalid PORT");

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Ragbus service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // Dropping the consume task releases its consumer resources; the
    // producer connection is flushed and dropped last.
    consumer_task.abort();
    broker.disconnect().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.broker.is_connected() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
