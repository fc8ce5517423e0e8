use crate::config::{GenerationConfig, GenerationProvider, PersistenceConfig, QaConfig, StreamConfig};
use crate::handlers;
use crate::services::providers::gemini::{GeminiBackend, GeminiConfig};
use crate::services::providers::mock::MockGenerationBackend;
use crate::services::providers::GenerationBackend;
use crate::services::{
    ChatOrchestrator, HistoryRecorder, HistoryStore, QaDb, SessionCoordinator, SessionRegistry,
    UserServiceRegistry,
};
use crate::workers::PersistencePool;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{request_id_middleware, request_span};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ChatOrchestrator,
    pub history: Arc<dyn HistoryStore>,
    pub backend: Arc<dyn GenerationBackend>,
}

impl AppState {
    /// Wire the chat components together and start the persistence pool.
    pub fn assemble(
        registry: Arc<dyn SessionRegistry>,
        history: Arc<dyn HistoryStore>,
        backend: Arc<dyn GenerationBackend>,
        persistence: &PersistenceConfig,
        stream: &StreamConfig,
    ) -> (Self, PersistencePool) {
        let recorder = HistoryRecorder::new(history.clone());
        let (handle, pool) = PersistencePool::start(recorder.clone(), persistence);

        let orchestrator = ChatOrchestrator::new(
            SessionCoordinator::new(registry),
            backend.clone(),
            recorder,
            handle,
            stream.buffer,
        );

        let state = Self {
            orchestrator,
            history,
            backend,
        };
        (state, pool)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/api/qa/chat", post(handlers::chat))
        .route("/api/qa/chat/stream", post(handlers::chat_stream))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

pub fn build_backend(config: &GenerationConfig) -> Result<Arc<dyn GenerationBackend>, AppError> {
    let backend: Arc<dyn GenerationBackend> = match config.provider {
        GenerationProvider::Gemini => Arc::new(
            GeminiBackend::new(GeminiConfig {
                api_key: config.api_key.clone(),
                model: config.text_model.clone(),
            })
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?,
        ),
        GenerationProvider::Mock => Arc::new(MockGenerationBackend::new()),
    };

    tracing::info!(
        backend = backend.name(),
        model = %config.text_model,
        "Initialized generation backend"
    );
    Ok(backend)
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    app: Router,
    pool: PersistencePool,
}

impl Application {
    pub async fn build(config: QaConfig) -> Result<Self, AppError> {
        let db = QaDb::connect(&config.mongodb.uri, &config.mongodb.database)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to MongoDB: {}", e);
                e
            })?;
        db.initialize_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            e
        })?;

        let registry = UserServiceRegistry::new(&config.user_service)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
        tracing::info!(url = %config.user_service.url, "Initialized session registry client");

        let backend = build_backend(&config.generation)?;

        let (state, pool) = AppState::assemble(
            Arc::new(registry),
            Arc::new(db),
            backend,
            &config.persistence,
            &config.stream,
        );

        Self::serve(config.common.port, state, pool).await
    }

    /// Bind `port` (0 picks a free one) for an already assembled state.
    pub async fn serve(port: u16, state: AppState, pool: PersistencePool) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        Ok(Self {
            port,
            listener,
            app: router(state),
            pool,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `signal` resolves, let open streams finish, then drain
    /// queued history writes.
    pub async fn run_until<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let result = axum::serve(self.listener, self.app)
            .with_graceful_shutdown(signal)
            .await;

        self.pool.shutdown().await;
        result
    }
}
