//! 动作计价仓储
//!
//! 提供计费动作目录的数据访问

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::CostRepositoryTrait;
use crate::error::Result;
use crate::models::ActionCost;

/// 动作计价仓储
pub struct CostRepository {
    pool: PgPool,
}

impl CostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 查询动作的计价
    ///
    /// 不在目录中的动作返回 None，调用方按免费处理
    pub async fn get_cost(&self, action: &str) -> Result<Option<ActionCost>> {
        let cost = sqlx::query_as::<_, ActionCost>(
            r#"
            SELECT id, action, cost, description
            FROM point_costs
            WHERE action = $1
            "#,
        )
        .bind(action)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cost)
    }

    /// 写入或更新动作计价
    pub async fn upsert_cost(
        &self,
        action: &str,
        cost: i64,
        description: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO point_costs (action, cost, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (action) DO UPDATE
            SET cost = EXCLUDED.cost, description = EXCLUDED.description
            "#,
        )
        .bind(action)
        .bind(cost)
        .bind(description)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CostRepositoryTrait for CostRepository {
    async fn get_cost(&self, action: &str) -> Result<Option<ActionCost>> {
        self.get_cost(action).await
    }
}
