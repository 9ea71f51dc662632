//! 配额刷新 Worker
//!
//! 定期扫描订阅周期已结束的积分账户，将余额重置为月度配额并推进周期，
//! 同时写入 QuotaRefresh 流水保持账目可追溯。
//!
//! 使用 `FOR UPDATE SKIP LOCKED` 保证多实例部署时不会重复刷新

use std::time::Duration;

use chrono::Utc;
use points_shared::observability::metrics;
use sqlx::PgPool;
use tracing::{error, info};

use crate::error::Result;
use crate::repository::AccountRepository;
use crate::service::refresh_account_in_tx;

/// 配额刷新 Worker
///
/// 以固定间隔轮询数据库，批量刷新到期账户。
/// 设计为可在多实例环境中安全运行。
pub struct QuotaRefreshWorker {
    pool: PgPool,
    /// 轮询间隔（建议 300 秒）
    poll_interval: Duration,
    /// 每批处理的最大账户数
    batch_size: i64,
}

impl QuotaRefreshWorker {
    /// 创建 QuotaRefreshWorker 实例
    ///
    /// # 参数
    /// - `pool`: 数据库连接池
    /// - `poll_interval_secs`: 轮询间隔（秒）
    /// - `batch_size`: 每批处理的最大账户数
    pub fn new(pool: PgPool, poll_interval_secs: u64, batch_size: i64) -> Self {
        Self {
            pool,
            poll_interval: Duration::from_secs(poll_interval_secs),
            batch_size,
        }
    }

    /// 使用默认配置创建 QuotaRefreshWorker
    pub fn with_defaults(pool: PgPool) -> Self {
        Self::new(pool, 300, 500)
    }

    /// 主循环：持续刷新到期账户直到进程退出
    pub async fn run(&self) {
        info!(
            poll_interval = ?self.poll_interval,
            batch_size = self.batch_size,
            "QuotaRefreshWorker 已启动"
        );

        loop {
            match self.process_due_accounts().await {
                Ok(count) if count > 0 => {
                    info!(count, "配额刷新批次处理完成");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "配额刷新批次处理出错");
                }
            }

            // 记录 Worker 健康状态
            metrics::set_worker_last_run("quota_refresh_worker");

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// 处理一批到期账户
    ///
    /// 锁定、刷新、写流水在同一事务内完成，整批提交。
    /// 返回本批刷新的账户数。
    pub async fn process_due_accounts(&self) -> Result<u64> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let accounts =
            AccountRepository::list_due_for_refresh_in_tx(&mut tx, now, self.batch_size).await?;

        // 刷新判定以实体谓词为准，与查询的过滤条件一致
        let mut refreshed: u64 = 0;
        for account in accounts.iter().filter(|a| a.period_elapsed(now)) {
            let new_balance = refresh_account_in_tx(&mut tx, account, now).await?;
            refreshed += 1;

            info!(
                account_id = %account.id,
                user_id = %account.user_id,
                old_balance = account.balance,
                new_balance,
                "账户配额已刷新"
            );
        }

        if refreshed == 0 {
            tx.rollback().await?;
            return Ok(0);
        }

        tx.commit().await?;

        metrics::record_quota_refresh(refreshed);
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_quota_refresh_worker_defaults() {
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap();
        let worker = QuotaRefreshWorker::with_defaults(pool);

        assert_eq!(worker.poll_interval.as_secs(), 300);
        assert_eq!(worker.batch_size, 500);
    }

    #[tokio::test]
    async fn test_quota_refresh_worker_custom_config() {
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap();
        let worker = QuotaRefreshWorker::new(pool, 60, 100);

        assert_eq!(worker.poll_interval.as_secs(), 60);
        assert_eq!(worker.batch_size, 100);
    }
}
