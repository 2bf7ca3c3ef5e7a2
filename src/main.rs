use axum::http::{HeaderValue, Method};
use photo_social::{
    config::Config,
    routes,
    services::{push::create_push_gateway, storage::create_storage, Database},
    state::AppState,
};
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // 初始化日志
    let filter = tracing_subscriber::EnvFilter::new(&config.log_level);
    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting photo-social service...");

    // 初始化数据库连接
    let db = match Database::new(&config).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to create database connection: {}", e);
            return Err(anyhow::anyhow!("Database initialization failed"));
        }
    };
    if let Err(e) = db.verify_connection().await {
        error!("Database connection failed: {}", e);
        return Err(anyhow::anyhow!("Database connection failed"));
    }
    info!("Database connection established successfully");
    let db = Arc::new(db);

    let storage = create_storage(&config).await?;
    let push = create_push_gateway(&config)?;

    // 创建应用状态
    let app_state = Arc::new(AppState::build(config.clone(), db, storage, push).await?);

    // 启动后台任务
    start_background_tasks(&app_state);

    // 配置 CORS
    let origins = config
        .cors_allowed_origins
        .split(',')
        .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect::<Vec<_>>();
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(origins);

    let app = routes::router(app_state.clone())
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    // 启动主服务器
    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!("Starting server on http://{}", addr);

    axum::Server::bind(&addr.parse()?)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 等待已接收事件的副作用处理完成
    let drained = app_state.events.flush().await;
    info!("Drained {} in-flight events, shutting down", drained);

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn start_background_tasks(app_state: &Arc<AppState>) {
    info!("Starting background tasks...");

    // 清理过期的幂等记录
    app_state.ledger.clone().spawn_cleanup(
        Duration::from_secs(app_state.config.idempotency_cleanup_interval_secs),
        Duration::from_secs(app_state.config.idempotency_retention_secs),
    );

    // 继续被中断的帖子级联删除
    app_state.cascade_service.clone().spawn_sweep(
        Duration::from_secs(app_state.config.deletion_sweep_interval_secs),
        Duration::from_secs(app_state.config.deletion_stale_after_secs),
    );

    info!("Background tasks started successfully");
}
