use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub content_api_url: String,
    pub content_timeout_seconds: u64,
    pub respond_wait_for_busy_session: bool,
    pub advanced_tier_threshold: f64,
    pub intermediate_tier_threshold: f64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            // Fallback to current directory .env for backward compatibility
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            // Load base config from TOML file
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        // Extract values with fallbacks to ENV or defaults
        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| {
                eprintln!("WARNING: MONGO_URI not set, using local MongoDB (dev mode only!)");
                "mongodb://localhost:27017".to_string()
            });

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
                let port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                format!("redis://{}:{}/0", host, port)
            });

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "softskills".to_string());

        let content_api_url = settings
            .get_string("content_api.url")
            .or_else(|_| env::var("CONTENT_API_URL"))
            .unwrap_or_else(|_| "http://localhost:8000".to_string());

        let content_timeout_seconds = settings
            .get_int("content_api.timeout_seconds")
            .ok()
            .map(|v| v as u64)
            .or_else(|| {
                env::var("CONTENT_API_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(10);

        let respond_wait_for_busy_session = settings
            .get_bool("engine.wait_for_busy_session")
            .ok()
            .or_else(|| {
                env::var("RESPOND_WAIT_FOR_BUSY_SESSION")
                    .ok()
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            })
            .unwrap_or(false);

        let advanced_tier_threshold = settings
            .get_float("feedback.advanced_threshold")
            .ok()
            .or_else(|| {
                env::var("ADVANCED_TIER_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(85.0);

        let intermediate_tier_threshold = settings
            .get_float("feedback.intermediate_threshold")
            .ok()
            .or_else(|| {
                env::var("INTERMEDIATE_TIER_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(60.0);

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            content_api_url,
            content_timeout_seconds,
            respond_wait_for_busy_session,
            advanced_tier_threshold,
            intermediate_tier_threshold,
        })
    }
}
