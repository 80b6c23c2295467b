use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use std::future::Future;
use std::time::Duration;

use crate::error::SimulationError;
use crate::metrics::track_db_operation;
use crate::models::SimulationSession;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const COLLECTION_NAME: &str = "simulation_sessions";

/// Upper bound on any single store operation, retries included. The engine
/// fails with `StoreUnavailable` instead of hanging.
const OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable store for sessions and their embedded steps. The store is the
/// single source of truth between calls; the engine keeps no session cache.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &SimulationSession) -> Result<(), SimulationError>;

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<SimulationSession>, SimulationError>;

    /// Replaces the whole session document. A turn transition (answered
    /// step + new pending step + counter) commits atomically here.
    async fn update(&self, session: &SimulationSession) -> Result<(), SimulationError>;
}

pub struct MongoSessionRepository {
    collection: Collection<SimulationSession>,
}

impl MongoSessionRepository {
    pub fn new(mongo: &Database) -> Self {
        Self {
            collection: mongo.collection(COLLECTION_NAME),
        }
    }

    async fn bounded<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T, SimulationError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, mongodb::error::Error>>,
    {
        let tracked = track_db_operation(
            operation,
            COLLECTION_NAME,
            retry_async_with_config(RetryConfig::default(), || f()),
        );

        match tokio::time::timeout(OP_TIMEOUT, tracked).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(SimulationError::StoreUnavailable(e.to_string())),
            Err(_) => Err(SimulationError::StoreUnavailable(format!(
                "{} timed out after {:?}",
                operation, OP_TIMEOUT
            ))),
        }
    }
}

#[async_trait]
impl SessionRepository for MongoSessionRepository {
    async fn insert(&self, session: &SimulationSession) -> Result<(), SimulationError> {
        self.bounded("insert", || async {
            self.collection.insert_one(session).await.map(|_| ())
        })
        .await?;

        tracing::debug!("Session inserted: {}", session.session_id);
        Ok(())
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<SimulationSession>, SimulationError> {
        self.bounded("find", || async {
            self.collection
                .find_one(doc! { "_id": session_id })
                .await
        })
        .await
    }

    async fn update(&self, session: &SimulationSession) -> Result<(), SimulationError> {
        let result = self
            .bounded("replace", || async {
                self.collection
                    .replace_one(doc! { "_id": &session.session_id }, session)
                    .await
            })
            .await?;

        if result.matched_count == 0 {
            return Err(SimulationError::SessionNotFound(session.session_id.clone()));
        }

        Ok(())
    }
}
