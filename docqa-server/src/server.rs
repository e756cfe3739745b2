use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::HeaderValue,
    routing::{get, post},
};
use docqa_rag::{
    AppAttribution, CorpusStats, DocumentStore, InMemoryDocumentStore, OpenAIEmbeddingProvider,
    OpenAIGenerationProvider, RetrievalOrchestrator, SqliteDocumentStore,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    config::ServerConfig,
    error::ApiError,
    protocol::{
        AskRequest, AskResponse, DeleteResponse, DocumentListResponse, HealthResponse,
        RootResponse, UploadResponse,
    },
};

/// Largest accepted request body.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// How long the health check waits for the embedding provider.
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(8);

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RetrievalOrchestrator>,
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(orchestrator: Arc<RetrievalOrchestrator>) -> Self {
        Self { orchestrator, cors_origins: vec!["*".to_string()] }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

pub fn app_router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/api", get(root))
        .route("/api/", get(root))
        .route("/api/health", get(health))
        .route("/api/documents", get(list_documents))
        .route("/api/documents/upload", post(upload_document))
        .route("/api/documents/{document_id}", get(get_document).delete(delete_document))
        .route("/api/ask", post(ask))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn attribution(config: &ServerConfig) -> AppAttribution {
    AppAttribution { url: config.app_url.clone(), name: Some(config.app_name.clone()) }
}

/// Build the embedding provider.
///
/// A requested size wins over a declared native size.
pub fn build_embedder(config: &ServerConfig) -> anyhow::Result<OpenAIEmbeddingProvider> {
    let mut embedder = OpenAIEmbeddingProvider::new(&config.openai_api_key)?
        .with_model(&config.embedding_model)
        .with_client_options(&attribution(config), PROVIDER_TIMEOUT)?;
    if let Some(base_url) = &config.embedding_base_url {
        embedder = embedder.with_base_url(base_url);
    }
    if let Some(dims) = config.embedding_native_dimensions {
        embedder = embedder.with_native_dimensions(dims);
    }
    if let Some(dims) = config.embedding_dimensions {
        embedder = embedder.with_dimensions(dims);
    }
    Ok(embedder)
}

/// Build the orchestrator with OpenAI-compatible providers and the configured store.
pub async fn build_orchestrator(config: &ServerConfig) -> anyhow::Result<RetrievalOrchestrator> {
    let embedder = build_embedder(config)?;

    let mut generator = OpenAIGenerationProvider::new(&config.openai_api_key)?
        .with_model(&config.openai_model)
        .with_client_options(&attribution(config), PROVIDER_TIMEOUT)?;
    if let Some(base_url) = &config.openai_base_url {
        generator = generator.with_base_url(base_url);
    }

    let store: Arc<dyn DocumentStore> = match &config.database_url {
        Some(url) => {
            info!(database_url = %url, "using sqlite document store");
            Arc::new(
                SqliteDocumentStore::new(url)
                    .await
                    .with_context(|| format!("failed to open database {url}"))?,
            )
        }
        None => {
            info!("DATABASE_URL not set, documents are kept in memory");
            Arc::new(InMemoryDocumentStore::new())
        }
    };

    let orchestrator = RetrievalOrchestrator::builder()
        .config(config.rag.clone())
        .embedding_provider(Arc::new(embedder))
        .generation_provider(Arc::new(generator))
        .store(store)
        .build()?;
    Ok(orchestrator)
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;
    let orchestrator = build_orchestrator(&config).await?;
    let state =
        AppState::new(Arc::new(orchestrator)).with_cors_origins(config.cors_origins.clone());
    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for docqa server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        chat_model = %config.openai_model,
        embedding_model = %config.embedding_model,
        "docqa server listening on http://{}",
        addr
    );
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Private Knowledge Q&A API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("untitled.txt").to_string();
        let bytes = field.bytes().await?;
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|_| ApiError::InvalidRequest("File must be a text file (UTF-8)".to_string()))?;

        let report = state.orchestrator.ingest(&name, &text).await?;
        return Ok(Json(report.into()));
    }
    Err(ApiError::InvalidRequest("multipart field 'file' is required".to_string()))
}

async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let documents = state.orchestrator.list_documents().await?;
    Ok(Json(DocumentListResponse { count: documents.len(), documents }))
}

async fn get_document(
    Path(document_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<docqa_rag::Document>, ApiError> {
    Ok(Json(state.orchestrator.get_document(&document_id).await?))
}

async fn delete_document(
    Path(document_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted_chunks = state.orchestrator.delete_document(&document_id).await?;
    Ok(Json(DeleteResponse { id: document_id, deleted: true, deleted_chunks }))
}

async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let answer = state.orchestrator.ask(&request.question).await?;
    Ok(Json(answer.into()))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (database_ok, stats) = match state.orchestrator.stats().await {
        Ok(stats) => (true, stats),
        Err(e) => {
            error!(error = %e, "database health check failed");
            (false, CorpusStats::default())
        }
    };

    let probe = state.orchestrator.embedding_provider().embed("health check");
    let llm_ok = match tokio::time::timeout(HEALTH_PROBE_TIMEOUT, probe).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "embedding health check failed");
            false
        }
        Err(_) => {
            let timeout_secs = HEALTH_PROBE_TIMEOUT.as_secs();
            warn!(timeout_secs, "embedding health check timed out");
            false
        }
    };

    let connected = |ok: bool| (if ok { "connected" } else { "disconnected" }).to_string();
    let status = if database_ok && llm_ok { "healthy" } else { "degraded" };
    Json(HealthResponse {
        status: status.to_string(),
        database: connected(database_ok),
        llm: connected(llm_ok),
        documents_count: stats.documents,
        chunks_count: stats.chunks,
    })
}

#[cfg(test)]
mod tests {
    use docqa_rag::EmbeddingProvider;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        ServerConfig::from_lookup(|key| {
            vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
        })
        .unwrap()
    }

    #[test]
    fn embedder_uses_the_declared_native_size() {
        let embedder = build_embedder(&config(&[
            ("OPENAI_API_KEY", "k"),
            ("OPENAI_EMBEDDING_MODEL", "nomic-embed-text"),
            ("OPENAI_EMBEDDING_NATIVE_DIMENSIONS", "768"),
        ]))
        .unwrap();
        assert_eq!(embedder.dimensions(), 768);
        assert_eq!(embedder.name(), "OpenAI/nomic-embed-text");
    }

    #[test]
    fn requested_size_overrides_native_size() {
        let embedder = build_embedder(&config(&[
            ("OPENAI_API_KEY", "k"),
            ("OPENAI_EMBEDDING_MODEL", "text-embedding-3-large"),
            ("OPENAI_EMBEDDING_NATIVE_DIMENSIONS", "3072"),
            ("OPENAI_EMBEDDING_DIMENSIONS", "256"),
        ]))
        .unwrap();
        assert_eq!(embedder.dimensions(), 256);
    }

    #[test]
    fn known_models_keep_their_size_without_overrides() {
        let embedder = build_embedder(&config(&[
            ("OPENAI_API_KEY", "k"),
            ("OPENAI_EMBEDDING_MODEL", "text-embedding-3-large"),
        ]))
        .unwrap();
        assert_eq!(embedder.dimensions(), 3072);
    }
}
