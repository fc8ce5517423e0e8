use crate::config::{StoreBackend, UserConfig};
use crate::handlers;
use crate::services::{MemorySessionStore, SessionService, SessionStore, UserDb};
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
    pub sessions: SessionService,
    pub store: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            sessions: SessionService::new(store.clone()),
            store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/user/:user_id/sessions", post(handlers::create_session))
        .route(
            "/api/user/:user_id/sessions/:session_id",
            get(handlers::get_session),
        )
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

async fn build_store(config: &UserConfig) -> Result<Arc<dyn SessionStore>, AppError> {
    match config.store {
        StoreBackend::Mongodb => {
            let db = UserDb::connect(&config.mongodb.uri, &config.mongodb.database).await?;
            db.initialize_indexes().await.map_err(|e| {
                tracing::error!("Failed to initialize database indexes: {}", e);
                e
            })?;
            Ok(Arc::new(db))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory session store; sessions are lost on restart");
            Ok(Arc::new(MemorySessionStore::new()))
        }
    }
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    app: Router,
}

impl Application {
    pub async fn build(config: UserConfig) -> Result<Self, AppError> {
        let store = build_store(&config).await?;
        Self::serve(config.common.port, AppState::new(store)).await
    }

    /// Bind `port` (0 picks a free one) for an already assembled state.
    pub async fn serve(port: u16, state: AppState) -> Result<Self, AppError> {
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
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    pub async fn run_until<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(signal)
            .await
    }
}
