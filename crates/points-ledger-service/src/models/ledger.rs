//! 积分流水实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ChangeType;

/// 积分流水
///
/// 只追加的审计记录：每次余额变动写入一条，包含带符号的变动量
/// 和变动后余额，确保数据一致性可追溯。提交后不可修改或删除。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: i64,
    /// 所属账户
    pub account_id: Uuid,
    /// 账户归属用户（冗余存储，便于查询）
    pub user_id: Uuid,
    /// 变动类型
    pub change_type: ChangeType,
    /// 变动原因（计费动作码或业务备注）
    pub reason: String,
    /// 带符号的变动量：扣减为负，入账为正
    pub delta: i64,
    /// 变动提交后的余额
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// 构造一条待写入的流水（id 由数据库生成）
    pub fn new(
        account_id: Uuid,
        user_id: Uuid,
        change_type: ChangeType,
        reason: impl Into<String>,
        delta: i64,
        balance_after: i64,
    ) -> Self {
        Self {
            id: 0,
            account_id,
            user_id,
            change_type,
            reason: reason.into(),
            delta,
            balance_after,
            created_at: Utc::now(),
        }
    }
}
