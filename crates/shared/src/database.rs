//! 数据库连接管理模块
//!
//! 账本的正确性依赖单个 PostgreSQL 实例上的行锁与事务。
//! 扣减事务持锁时间在毫秒级，连接池按短事务负载配置：
//! 小池子配合获取超时即可支撑并发，不依赖大量空闲连接。

use crate::config::DatabaseConfig;
use crate::error::{Result, SharedError};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// 积分库连接池
///
/// 各仓储与 Worker 共享同一个池，克隆是廉价的
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 按配置建立连接池
    ///
    /// 开启 test_before_acquire，保证借出的连接可用，
    /// 避免扣减事务在 BEGIN 之后才发现连接已失效。
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .test_before_acquire(true)
            .connect(&config.url)
            .await?;

        info!("积分库连接池就绪");

        Ok(Self { pool })
    }

    /// 获取连接池引用
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 就绪检查
    ///
    /// 执行一次最小查询并记录耗时。耗时异常升高通常意味着
    /// 池耗尽或数据库过载，会先于业务扣减报错暴露出来。
    pub async fn health_check(&self) -> Result<()> {
        let started = Instant::now();
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(SharedError::from)?;

        let elapsed = started.elapsed();
        if elapsed > Duration::from_millis(500) {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                "数据库就绪检查耗时偏高"
            );
        }

        Ok(())
    }

    /// 关闭连接池，等待在途事务结束
    pub async fn close(&self) {
        self.pool.close().await;
        info!("积分库连接池已关闭");
    }
}

impl std::ops::Deref for Database {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}
