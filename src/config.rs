use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub log_level: String,
    pub log_format: String,

    // Database configuration
    pub database_url: String,
    pub database_namespace: String,
    pub database_name: String,
    pub database_username: String,
    pub database_password: String,

    // Storage configuration
    pub storage_type: String,
    pub storage_root: String,
    pub s3_bucket: String,
    pub s3_region: String,

    // Push gateway
    pub push_enabled: bool,
    pub push_endpoint: String,
    pub push_access_token: Option<String>,

    // Content settings
    pub max_comment_length: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub in_query_limit: usize,

    // Background maintenance
    pub idempotency_retention_secs: u64,
    pub idempotency_cleanup_interval_secs: u64,
    pub deletion_sweep_interval_secs: u64,
    pub deletion_stale_after_secs: u64,

    // CORS configuration
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "photo_social=debug,tower_http=debug".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            database_namespace: env::var("DATABASE_NAMESPACE")
                .unwrap_or_else(|_| "photo".to_string()),
            database_name: env::var("DATABASE_NAME")
                .unwrap_or_else(|_| "social".to_string()),
            database_username: env::var("DATABASE_USERNAME")
                .unwrap_or_else(|_| "root".to_string()),
            database_password: env::var("DATABASE_PASSWORD")
                .unwrap_or_else(|_| "root".to_string()),

            storage_type: env::var("STORAGE_TYPE")
                .unwrap_or_else(|_| "local".to_string()),
            storage_root: env::var("STORAGE_ROOT")
                .unwrap_or_else(|_| "./data/storage".to_string()),
            s3_bucket: env::var("S3_BUCKET")
                .unwrap_or_else(|_| "photo-social".to_string()),
            s3_region: env::var("S3_REGION")
                .unwrap_or_else(|_| "us-east-1".to_string()),

            push_enabled: env::var("PUSH_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,
            push_endpoint: env::var("PUSH_ENDPOINT")
                .unwrap_or_else(|_| "https://exp.host/--/api/v2/push/send".to_string()),
            push_access_token: env::var("PUSH_ACCESS_TOKEN").ok(),

            max_comment_length: env::var("MAX_COMMENT_LENGTH")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()?,
            default_page_size: env::var("DEFAULT_PAGE_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            max_page_size: env::var("MAX_PAGE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            in_query_limit: env::var("IN_QUERY_LIMIT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            idempotency_retention_secs: env::var("IDEMPOTENCY_RETENTION_SECS")
                .unwrap_or_else(|_| "604800".to_string())
                .parse()?,
            idempotency_cleanup_interval_secs: env::var("IDEMPOTENCY_CLEANUP_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()?,
            deletion_sweep_interval_secs: env::var("DELETION_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            deletion_stale_after_secs: env::var("DELETION_STALE_AFTER_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// 是否使用进程内存储（开发和测试）
    pub fn uses_memory_database(&self) -> bool {
        self.database_url == "memory"
    }

    /// 将客户端请求的分页大小限制在允许范围内
    pub fn clamp_page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
            environment: "development".to_string(),
            log_level: "photo_social=debug".to_string(),
            log_format: "pretty".to_string(),
            database_url: "memory".to_string(),
            database_namespace: "photo".to_string(),
            database_name: "social".to_string(),
            database_username: "root".to_string(),
            database_password: "root".to_string(),
            storage_type: "memory".to_string(),
            storage_root: "./data/storage".to_string(),
            s3_bucket: "photo-social".to_string(),
            s3_region: "us-east-1".to_string(),
            push_enabled: false,
            push_endpoint: "https://exp.host/--/api/v2/push/send".to_string(),
            push_access_token: None,
            max_comment_length: 2000,
            default_page_size: 20,
            max_page_size: 100,
            in_query_limit: 30,
            idempotency_retention_secs: 7 * 24 * 3600,
            idempotency_cleanup_interval_secs: 3600,
            deletion_sweep_interval_secs: 300,
            deletion_stale_after_secs: 600,
            cors_allowed_origins: "http://localhost:8081".to_string(),
        }
    }
}
