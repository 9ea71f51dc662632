//! 仓储 Trait 定义
//!
//! 定义仓储接口，便于服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ActionCost, LedgerEntry, PointAccount};

/// 积分账户仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountRepositoryTrait: Send + Sync {
    async fn get_account(&self, id: Uuid) -> Result<Option<PointAccount>>;
    async fn get_spendable_by_user(&self, user_id: Uuid) -> Result<Option<PointAccount>>;
    async fn create_account(&self, account: &PointAccount) -> Result<()>;
}

/// 积分流水仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    async fn list_by_account(&self, account_id: Uuid, limit: i64) -> Result<Vec<LedgerEntry>>;
    async fn latest_balance(&self, account_id: Uuid) -> Result<i64>;
    async fn sum_deltas(&self, account_id: Uuid) -> Result<i64>;
}

/// 动作计价仓储接口
///
/// 服务层只依赖计价查询；目录维护走具体仓储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CostRepositoryTrait: Send + Sync {
    async fn get_cost(&self, action: &str) -> Result<Option<ActionCost>>;
}
