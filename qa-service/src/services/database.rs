//! MongoDB-backed chat history.

use crate::models::ChatHistoryRecord;
use crate::services::history::HistoryStore;
use async_trait::async_trait;
use mongodb::{
    bson::doc, options::IndexOptions, Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Clone)]
pub struct QaDb {
    client: MongoClient,
    db: Database,
}

impl QaDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for qa-service");

        // Turns of one session in order
        let session_time_index = IndexModel::builder()
            .keys(doc! { "session_id": 1, "created_at": 1 })
            .options(
                IndexOptions::builder()
                    .name("session_time_idx".to_string())
                    .build(),
            )
            .build();

        self.history()
            .create_index(session_time_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create session_time index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        let user_index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(IndexOptions::builder().name("user_id_idx".to_string()).build())
            .build();

        self.history()
            .create_index(user_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create user_id index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    pub fn history(&self) -> Collection<ChatHistoryRecord> {
        self.db.collection("chat_history")
    }
}

#[async_trait]
impl HistoryStore for QaDb {
    async fn insert(&self, mut record: ChatHistoryRecord) -> Result<ChatHistoryRecord, AppError> {
        record.id = Some(Uuid::new_v4().to_string());

        self.history()
            .insert_one(&record, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to insert chat history: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        Ok(record)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        Ok(())
    }
}
