//! 积分账本枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 账户状态
///
/// 控制账户是否允许积分变动
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum AccountStatus {
    /// 正常 - 可扣减可入账
    #[default]
    Active,
    /// 试用期 - 与正常账户同等可用
    Trialing,
    /// 已暂停 - 运营冻结，拒绝一切积分变动
    Suspended,
    /// 已过期 - 订阅周期结束且未续费
    Expired,
}

impl AccountStatus {
    /// 账户是否处于可消费状态
    pub fn is_spendable(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

/// 账本变动类型
///
/// 采用复式记账思想，记录积分余额的每一次变动
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ChangeType {
    /// 扣减（-）- 消费计费动作
    Deduct,
    /// 入账（+）- 加油包购买、运营补偿等
    Credit,
    /// 配额刷新（±）- 周期开始时重置为月度配额
    QuotaRefresh,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_status_spendable() {
        assert!(AccountStatus::Active.is_spendable());
        assert!(AccountStatus::Trialing.is_spendable());
        assert!(!AccountStatus::Suspended.is_spendable());
        assert!(!AccountStatus::Expired.is_spendable());
    }

    #[test]
    fn test_account_status_serde_format() {
        let json = serde_json::to_string(&AccountStatus::Trialing).unwrap();
        assert_eq!(json, "\"TRIALING\"");
    }

    #[test]
    fn test_change_type_serde_format() {
        let json = serde_json::to_string(&ChangeType::QuotaRefresh).unwrap();
        assert_eq!(json, "\"QUOTA_REFRESH\"");
    }
}
