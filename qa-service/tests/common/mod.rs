//! In-memory collaborators for qa-service integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use qa_service::config::{PersistenceConfig, StreamConfig};
use qa_service::error::QaError;
use qa_service::models::{ChatHistoryRecord, ChatSession, CreateSessionOutcome};
use qa_service::services::providers::mock::MockGenerationBackend;
use qa_service::services::registry::{RegistryError, SessionRegistry};
use qa_service::services::{ChatOrchestrator, ChatStream, HistoryStore, StreamEvent};
use qa_service::startup::AppState;
use qa_service::workers::PersistencePool;
use service_core::error::AppError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Session registry with the same create compare-and-set as user-service.
#[derive(Default)]
pub struct InMemoryRegistry {
    sessions: DashMap<String, ChatSession>,
    created: AtomicUsize,
    create_attempts: AtomicUsize,
    lookups: AtomicUsize,
    lookup_delay: Option<Duration>,
    lookup_error: Option<RegistryError>,
    create_error: Option<RegistryError>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every lookup so concurrent turns all miss before anyone creates.
    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    pub fn with_lookup_error(mut self, error: RegistryError) -> Self {
        self.lookup_error = Some(error);
        self
    }

    pub fn with_create_error(mut self, error: RegistryError) -> Self {
        self.create_error = Some(error);
        self
    }

    pub fn seed(&self, id: &str, user_id: i64, title: &str) {
        self.sessions.insert(
            id.to_string(),
            ChatSession {
                id: id.to_string(),
                user_id,
                title: title.to_string(),
                created_at: Utc::now(),
            },
        );
    }

    pub fn session(&self, id: &str) -> Option<ChatSession> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn create_attempts(&self) -> usize {
        self.create_attempts.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionRegistry for InMemoryRegistry {
    async fn find_session(
        &self,
        _user_id: i64,
        session_id: &str,
    ) -> Result<Option<ChatSession>, RegistryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.lookup_error {
            return Err(error.clone());
        }
        Ok(self.session(session_id))
    }

    async fn create_session(
        &self,
        user_id: i64,
        session_id: Option<&str>,
        title: &str,
    ) -> CreateSessionOutcome {
        self.create_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.create_error {
            return CreateSessionOutcome::Error(error.clone());
        }

        let id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        match self.sessions.entry(id.clone()) {
            Entry::Occupied(existing) if existing.get().user_id == user_id => {
                CreateSessionOutcome::Conflict
            }
            Entry::Occupied(_) => CreateSessionOutcome::Error(RegistryError::Forbidden(id)),
            Entry::Vacant(slot) => {
                let session = ChatSession {
                    id,
                    user_id,
                    title: title.to_string(),
                    created_at: Utc::now(),
                };
                slot.insert(session.clone());
                self.created.fetch_add(1, Ordering::SeqCst);
                CreateSessionOutcome::Created(session)
            }
        }
    }
}

/// History store that keeps records in memory.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    records: Mutex<Vec<ChatHistoryRecord>>,
    insert_delay: Option<Duration>,
    failing: bool,
    attempts: AtomicUsize,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn records(&self) -> Vec<ChatHistoryRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Poll until `count` write attempts have finished or `timeout` passes.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.attempts() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.attempts() >= count
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn insert(&self, mut record: ChatHistoryRecord) -> Result<ChatHistoryRecord, AppError> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        let result = if self.failing {
            Err(AppError::DatabaseError(anyhow::anyhow!("store unavailable")))
        } else {
            record.id = Some(Uuid::new_v4().to_string());
            self.records.lock().unwrap().push(record.clone());
            Ok(record)
        };
        self.attempts.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn health_check(&self) -> Result<(), AppError> {
        if self.failing {
            return Err(AppError::DatabaseError(anyhow::anyhow!("store unavailable")));
        }
        Ok(())
    }
}

pub struct TestContext {
    pub state: AppState,
    pub registry: Arc<InMemoryRegistry>,
    pub store: Arc<InMemoryHistoryStore>,
    pub backend: MockGenerationBackend,
    pub pool: PersistencePool,
}

impl TestContext {
    pub fn new(
        registry: InMemoryRegistry,
        store: InMemoryHistoryStore,
        backend: MockGenerationBackend,
    ) -> Self {
        let registry = Arc::new(registry);
        let store = Arc::new(store);

        let (state, pool) = AppState::assemble(
            registry.clone(),
            store.clone(),
            Arc::new(backend.clone()),
            &PersistenceConfig {
                worker_count: 2,
                queue_size: 16,
            },
            &StreamConfig { buffer: 4 },
        );

        Self {
            state,
            registry,
            store,
            backend,
            pool,
        }
    }

    pub fn with_backend(backend: MockGenerationBackend) -> Self {
        Self::new(InMemoryRegistry::new(), InMemoryHistoryStore::new(), backend)
    }

    pub fn orchestrator(&self) -> &ChatOrchestrator {
        &self.state.orchestrator
    }
}

/// Drain a chat stream, returning delivered events and the terminal error, if any.
pub async fn collect(mut stream: ChatStream) -> (Vec<StreamEvent>, Option<QaError>) {
    let mut events = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => events.push(event),
            Err(e) => return (events, Some(e)),
        }
    }
    (events, None)
}

/// Concatenated content of delivered events.
pub fn content(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Content(text) => Some(text.as_str()),
            StreamEvent::SessionId(_) => None,
        })
        .collect()
}
