//! MongoDB-backed session store.
//!
//! A unique index on `session_id` makes insert the compare-and-set: the
//! losing writer gets a duplicate-key error and reads the winner back.

use crate::models::Session;
use crate::services::store::{InsertOutcome, SessionStore};
use async_trait::async_trait;
use mongodb::{
    bson::doc,
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct UserDb {
    client: MongoClient,
    db: Database,
}

impl UserDb {
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
        tracing::info!("Creating MongoDB indexes for user-service");

        let session_id_index = IndexModel::builder()
            .keys(doc! { "session_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("session_id_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.sessions()
            .create_index(session_id_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create session_id index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        // Sessions of one user, newest first
        let user_time_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("user_time_idx".to_string())
                    .build(),
            )
            .build();

        self.sessions()
            .create_index(user_time_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create user_time index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    pub fn sessions(&self) -> Collection<Session> {
        self.db.collection("sessions")
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl SessionStore for UserDb {
    async fn find(&self, session_id: &str) -> Result<Option<Session>, AppError> {
        self.sessions()
            .find_one(doc! { "session_id": session_id }, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to find session: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })
    }

    async fn insert_if_absent(&self, session: Session) -> Result<InsertOutcome, AppError> {
        match self.sessions().insert_one(&session, None).await {
            Ok(_) => Ok(InsertOutcome::Inserted(session)),
            Err(e) if is_duplicate_key(&e) => {
                let existing = self.find(&session.session_id).await?.ok_or_else(|| {
                    AppError::DatabaseError(anyhow::anyhow!(
                        "Session {} reported as duplicate but not found",
                        session.session_id
                    ))
                })?;
                Ok(InsertOutcome::Exists(existing))
            }
            Err(e) => {
                tracing::error!("Failed to insert session: {}", e);
                Err(AppError::DatabaseError(anyhow::anyhow!(e.to_string())))
            }
        }
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
