//! 积分流水仓储
//!
//! 提供积分流水的数据访问，支持历史查询和余额对账

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use super::traits::LedgerRepositoryTrait;
use crate::error::Result;
use crate::models::LedgerEntry;

/// 积分流水仓储
///
/// 采用复式记账思想，记录积分的每一次变动，确保数据可追溯
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在事务中写入流水
    ///
    /// 流水必须与余额变更在同一事务内提交，返回新记录的 ID
    pub async fn create_in_tx(tx: &mut PgConnection, entry: &LedgerEntry) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO point_ledger
                (account_id, user_id, change_type, reason, delta, balance_after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(entry.account_id)
        .bind(entry.user_id)
        .bind(entry.change_type)
        .bind(&entry.reason)
        .bind(entry.delta)
        .bind(entry.balance_after)
        .bind(entry.created_at)
        .fetch_one(tx)
        .await?;

        Ok(row.get("id"))
    }

    /// 列出账户的流水记录
    ///
    /// 按时间倒序排列，返回最近的 limit 条记录
    pub async fn list_by_account(&self, account_id: Uuid, limit: i64) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, account_id, user_id, change_type, reason, delta, balance_after, created_at
            FROM point_ledger
            WHERE account_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// 获取账户最近一条流水的变动后余额
    ///
    /// 如无记录返回 0，用于与账户行的权威余额对账
    pub async fn latest_balance(&self, account_id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(
                (SELECT balance_after
                 FROM point_ledger
                 WHERE account_id = $1
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1),
                0
            ) AS balance
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("balance"))
    }

    /// 获取账户所有流水的带符号变动量之和
    ///
    /// 对账用途：初始余额 + sum(delta) 应等于当前余额
    pub async fn sum_deltas(&self, account_id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(delta), 0)::BIGINT AS total
            FROM point_ledger
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("total"))
    }
}

#[async_trait]
impl LedgerRepositoryTrait for LedgerRepository {
    async fn list_by_account(&self, account_id: Uuid, limit: i64) -> Result<Vec<LedgerEntry>> {
        self.list_by_account(account_id, limit).await
    }

    async fn latest_balance(&self, account_id: Uuid) -> Result<i64> {
        self.latest_balance(account_id).await
    }

    async fn sum_deltas(&self, account_id: Uuid) -> Result<i64> {
        self.sum_deltas(account_id).await
    }
}
