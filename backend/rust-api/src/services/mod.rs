use crate::config::Config;
use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;

use self::completion_service::FeedbackThresholds;
use self::content_generator::HttpContentGenerator;
use self::event_publisher::EventPublisher;
use self::session_repository::MongoSessionRepository;
use self::session_service::{BusyPolicy, SessionStateMachine};

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub redis: ConnectionManager,
    pub engine: Arc<SessionStateMachine>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        // Create ConnectionManager with longer timeout
        let redis = tokio::time::timeout(
            Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        // Test connection
        let mut conn = redis.clone();
        tokio::time::timeout(
            Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let repository = Arc::new(MongoSessionRepository::new(&mongo));
        let generator = Arc::new(HttpContentGenerator::new(
            config.content_api_url.clone(),
            Duration::from_secs(config.content_timeout_seconds),
        )?);
        let events = Arc::new(EventPublisher::new(redis.clone()));

        let busy_policy = if config.respond_wait_for_busy_session {
            BusyPolicy::Wait
        } else {
            BusyPolicy::FailFast
        };
        let thresholds = FeedbackThresholds {
            advanced: config.advanced_tier_threshold,
            intermediate: config.intermediate_tier_threshold,
        };

        let engine = Arc::new(SessionStateMachine::new(
            repository,
            generator,
            thresholds,
            busy_policy,
            Some(events),
        ));

        Ok(Self {
            config,
            mongo,
            redis,
            engine,
        })
    }
}

pub mod completion_service;
pub mod content_generator;
pub mod evaluation_service;
pub mod event_publisher;
pub mod session_repository;
pub mod session_service;
