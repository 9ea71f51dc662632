//! 积分账户相关实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AccountStatus;

/// 积分账户
///
/// 每个用户工作区一行，balance 为权威余额，只能通过账本服务变更。
/// 账户在用户注册时由外部协作方创建，本服务不负责删除。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PointAccount {
    pub id: Uuid,
    /// 账户归属用户
    pub user_id: Uuid,
    /// 账户状态
    pub status: AccountStatus,
    /// 当前积分余额，任何已提交状态下均不为负
    pub balance: i64,
    /// 每个订阅周期的积分配额
    pub monthly_quota: i64,
    /// 当前周期开始时间
    #[sqlx(default)]
    pub current_period_start: Option<DateTime<Utc>>,
    /// 当前周期结束时间（配额刷新时间点）
    #[sqlx(default)]
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PointAccount {
    /// 账户是否允许积分变动
    pub fn is_spendable(&self) -> bool {
        self.status.is_spendable()
    }

    /// 余额是否足以支付指定数量
    pub fn can_afford(&self, amount: i64) -> bool {
        self.balance >= amount
    }

    /// 当前周期是否已结束（到达配额刷新时间）
    pub fn period_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.current_period_end.is_some_and(|end| now >= end)
    }
}

/// 动作计价
///
/// 计费动作目录：每个动作对应固定的积分成本。
/// 不在目录中的动作视为免费（非 AI 操作）。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActionCost {
    pub id: Uuid,
    /// 动作码，如 basic_chat、generate_assessment
    pub action: String,
    /// 单次调用消耗的积分
    pub cost: i64,
    #[sqlx(default)]
    pub description: Option<String>,
}
