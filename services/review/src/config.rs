use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Longest lifetime S3 accepts for a presigned URL (7 days)
pub const MAX_URL_VALIDITY_MINUTES: u32 = 7 * 24 * 60;

/// Main configuration for the review service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Object storage configuration
    pub blob: BlobConfig,
    /// Review session configuration
    #[serde(default)]
    pub review: ReviewConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Database configuration
///
/// The pool keeps `pool_size` connections warm and may open up to
/// `max_overflow` more under load. Connections older than `recycle_secs`
/// are closed and replaced.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Connections kept open in the pool
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Extra connections allowed beyond `pool_size`
    #[serde(default = "default_max_overflow")]
    pub max_overflow: u32,
    /// Maximum wait for a free connection, in seconds
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Maximum connection lifetime, in seconds
    #[serde(default = "default_recycle_secs")]
    pub recycle_secs: u64,
    /// Idle timeout for overflow connections, in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Object storage configuration used for signing image URLs
#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    /// Bucket used for locators that carry no bucket of their own
    pub default_bucket: Option<String>,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Signing access key id; falls back to the default credential chain
    pub access_key_id: Option<String>,
    /// Signing secret key
    pub secret_access_key: Option<String>,
    /// Lifetime of issued image URLs, in minutes
    #[serde(default = "default_url_validity_minutes")]
    pub url_validity_minutes: u32,
}

/// Review session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewConfig {
    /// Rows fetched per page by the session cursor
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    /// Category name that disables filtering
    #[serde(default = "default_all_categories")]
    pub all_categories: String,
    /// Parent label whose children are offered as categories
    #[serde(default = "default_category_parent_id")]
    pub category_parent_id: i32,
    /// Start date of the session created at startup
    #[serde(default = "default_initial_start_date")]
    pub initial_start_date: NaiveDate,
    /// Image reference returned when nothing can be shown
    #[serde(default = "default_placeholder_image")]
    pub placeholder_image: String,
}

/// API configuration for the reviewer client
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "review-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_pool_size() -> u32 {
    10
}

fn default_max_overflow() -> u32 {
    20
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_recycle_secs() -> u64 {
    1800
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_run_migrations() -> bool {
    true
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_url_validity_minutes() -> u32 {
    5
}

fn default_page_size() -> i64 {
    2
}

fn default_all_categories() -> String {
    "Mind".to_string()
}

fn default_category_parent_id() -> i32 {
    3
}

fn default_initial_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default()
}

fn default_placeholder_image() -> String {
    "default_img/default.png".to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    6969
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "review-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/review").required(false))
            .add_source(config::File::with_name("/etc/review/review").required(false))
            // Override with environment variables
            // REVIEW__DATABASE__URL -> database.url
            .add_source(
                config::Environment::with_prefix("REVIEW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every request fail at runtime
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.review.page_size > 0,
            "review.page_size must be positive, got {}",
            self.review.page_size
        );
        anyhow::ensure!(
            (1..=MAX_URL_VALIDITY_MINUTES).contains(&self.blob.url_validity_minutes),
            "blob.url_validity_minutes must be between 1 and {}, got {}",
            MAX_URL_VALIDITY_MINUTES,
            self.blob.url_validity_minutes
        );
        Ok(())
    }
}

impl DatabaseConfig {
    /// Upper bound on open connections (fixed size plus overflow)
    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn recycle_after(&self) -> Duration {
        Duration::from_secs(self.recycle_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl ReviewConfig {
    /// Start of the initial session, as midnight UTC of the configured date
    pub fn initial_start(&self) -> DateTime<Utc> {
        start_of_day(self.initial_start_date)
    }
}

/// Midnight UTC of the given calendar date
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            all_categories: default_all_categories(),
            category_parent_id: default_category_parent_id(),
            initial_start_date: default_initial_start_date(),
            placeholder_image: default_placeholder_image(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_page_size(), 2);
        assert_eq!(default_url_validity_minutes(), 5);
        assert_eq!(default_all_categories(), "Mind");
        assert_eq!(default_api_port(), 6969);
    }

    #[test]
    fn test_pool_bounds_include_overflow() {
        let db: DatabaseConfig = serde_json::from_value(serde_json::json!({
            "url": "postgres://localhost/review"
        }))
        .unwrap();

        assert_eq!(db.max_connections(), 30);
        assert_eq!(db.acquire_timeout(), Duration::from_secs(30));
        assert_eq!(db.recycle_after(), Duration::from_secs(1800));
    }

    fn config_with(review: serde_json::Value, blob: serde_json::Value) -> Config {
        serde_json::from_value(serde_json::json!({
            "database": { "url": "postgres://localhost/review" },
            "blob": blob,
            "review": review,
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_pass_validation() {
        let config = config_with(serde_json::json!({}), serde_json::json!({}));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_unusable_values() {
        for (review, blob) in [
            (serde_json::json!({ "page_size": 0 }), serde_json::json!({})),
            (serde_json::json!({ "page_size": -2 }), serde_json::json!({})),
            (serde_json::json!({}), serde_json::json!({ "url_validity_minutes": 0 })),
            (serde_json::json!({}), serde_json::json!({ "url_validity_minutes": 10081 })),
        ] {
            let config = config_with(review.clone(), blob.clone());
            assert!(
                config.validate().is_err(),
                "review {review} blob {blob} should be rejected"
            );
        }

        let longest = config_with(
            serde_json::json!({}),
            serde_json::json!({ "url_validity_minutes": MAX_URL_VALIDITY_MINUTES }),
        );
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn test_initial_start_is_midnight_utc() {
        let review = ReviewConfig::default();
        assert_eq!(
            review.initial_start().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
    }
}
