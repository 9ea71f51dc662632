//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 和 `/health` 端点。
pub async fn init(service_name: &str, config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let builder = PrometheusBuilder::new();
    let handle = builder.install_recorder()?;

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标（预定义的业务指标）
///
/// 这些描述会出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("points_deductions_total", "Total number of point deductions");
    metrics::describe_counter!("points_credits_total", "Total number of point credits");
    metrics::describe_counter!(
        "points_insufficient_total",
        "Deductions rejected for insufficient balance"
    );
    metrics::describe_counter!(
        "points_contention_total",
        "Ledger operations that hit row-lock contention"
    );
    metrics::describe_histogram!(
        "points_deduction_duration_seconds",
        "Point deduction duration in seconds"
    );
    metrics::describe_counter!("quota_refreshes_total", "Total number of quota refreshes");
    metrics::describe_gauge!(
        "worker_last_run_timestamp",
        "Unix timestamp of the last worker loop completion"
    );

    // 记录服务启动
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次成功的扣减
#[inline]
pub fn record_deduction(reason: &str, duration_secs: f64) {
    metrics::counter!("points_deductions_total", "reason" => reason.to_string()).increment(1);
    metrics::histogram!("points_deduction_duration_seconds").record(duration_secs);
}

/// 记录一次成功的入账
#[inline]
pub fn record_credit(reason: &str) {
    metrics::counter!("points_credits_total", "reason" => reason.to_string()).increment(1);
}

/// 记录一次余额不足拒绝
#[inline]
pub fn record_insufficient(reason: &str) {
    metrics::counter!("points_insufficient_total", "reason" => reason.to_string()).increment(1);
}

/// 记录一次锁冲突
#[inline]
pub fn record_contention(operation: &str) {
    metrics::counter!("points_contention_total", "operation" => operation.to_string()).increment(1);
}

/// 记录一次配额刷新
#[inline]
pub fn record_quota_refresh(count: u64) {
    metrics::counter!("quota_refreshes_total").increment(count);
}

/// 记录 Worker 最近一次运行时间
#[inline]
pub fn set_worker_last_run(worker: &str) {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    metrics::gauge!("worker_last_run_timestamp", "worker" => worker.to_string()).set(now);
}
