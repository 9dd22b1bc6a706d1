use crate::config::AppConfig;
use crate::shared::rate_limit::KeyedRateLimiter;
use crate::shared::utils::DbPool;
use aws_sdk_s3::Client as S3Client;
use std::sync::Arc;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    /// Tenant bucket client. Upload endpoints answer SERVICE_UNAVAILABLE
    /// style errors when this is None.
    pub drive: Option<S3Client>,
    pub bucket_name: String,
    pub webhook_limiter: Arc<KeyedRateLimiter>,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig, drive: Option<S3Client>) -> Self {
        let bucket_name = config.drive.bucket.clone();
        Self {
            conn,
            config,
            drive,
            bucket_name,
            webhook_limiter: Arc::new(KeyedRateLimiter::new(60, 10)),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("conn", &"DbPool")
            .field("drive", &self.drive.is_some())
            .field("bucket_name", &self.bucket_name)
            .field("webhook_limiter", &self.webhook_limiter)
            .finish()
    }
}
