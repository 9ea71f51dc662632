//! 积分账本服务进程入口
//!
//! 启动流程：加载配置、初始化可观测性、连接数据库并执行迁移、
//! 启动配额刷新 Worker。指标与健康检查端点由可观测性模块
//! 在独立端口上提供。

use points_ledger::worker::QuotaRefreshWorker;
use points_shared::{config::AppConfig, database::Database, observability};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：config/default.toml -> config/{env}.toml -> 环境变量
    let config = AppConfig::load("points-ledger-service").unwrap_or_else(|e| {
        eprintln!("配置加载失败，使用默认配置: {e}");
        AppConfig::default()
    });

    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!(
        environment = %config.environment,
        "Starting points-ledger-service"
    );

    // 初始化数据库并执行迁移
    let db = Database::connect(&config.database).await?;
    sqlx::migrate!("./migrations").run(db.pool()).await?;
    info!("Database migrations applied");

    // 启动配额刷新 Worker
    let worker_pool = db.pool().clone();
    let ledger_config = config.ledger.clone();
    let worker_handle = tokio::spawn(async move {
        let worker = QuotaRefreshWorker::new(
            worker_pool,
            ledger_config.quota_refresh_interval_seconds,
            ledger_config.quota_refresh_batch_size,
        );
        worker.run().await;
    });
    info!("QuotaRefreshWorker started");

    shutdown_signal().await;

    // Worker 循环没有自己的退出条件，进程退出前主动终止
    worker_handle.abort();
    db.close().await;
    info!("Shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
