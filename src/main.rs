use aws_sdk_s3::Client as S3Client;
use axum::Router;
use dotenvy::dotenv;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bizserver::api_router::configure_api_routes;
use bizserver::config::{AppConfig, DriveConfig};
use bizserver::shared::state::AppState;
use bizserver::shared::utils::{create_conn, run_migrations};

async fn init_drive(cfg: &DriveConfig) -> Option<S3Client> {
    if let Some(server) = &cfg.server {
        let credentials = aws_sdk_s3::config::Credentials::new(
            cfg.access_key.clone(),
            cfg.secret_key.clone(),
            None,
            None,
            "drive",
        );
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .endpoint_url(server)
            .credentials_provider(credentials)
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .force_path_style(true)
            .build();
        return Some(S3Client::from_conf(config));
    }
    if std::env::var("AWS_ACCESS_KEY_ID").is_ok() {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        return Some(S3Client::new(&shared));
    }
    None
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to install shutdown handler: {e}");
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env().map_err(|e| {
        error!("configuration error: {e}");
        std::io::Error::other(e)
    })?;

    let pool = create_conn(&config.database_url()).map_err(|e| {
        error!("database pool creation failed: {e}");
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e)
    })?;

    if let Err(e) = run_migrations(&pool) {
        error!("database migrations failed: {e}");
        return Err(std::io::Error::other(e));
    }

    let drive = init_drive(&config.drive).await;
    if drive.is_none() {
        warn!("file storage not configured, receipt uploads disabled");
    }

    let state = Arc::new(AppState::new(pool, config.clone(), drive));

    let app: Router = configure_api_routes()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!("failed to bind {addr}: {e} - is another instance running?");
        e
    })?;
    info!("HTTP server listening on {addr}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other)
}
