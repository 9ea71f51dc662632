//! 服务层数据传输对象
//!
//! 定义服务层与外部交互使用的 DTO，与内部领域模型解耦

use serde::{Deserialize, Serialize};

/// 按动作计费的扣减结果
///
/// 免费动作（不在计价目录中或成本为 0）不会触发任何存储访问，
/// 此时 remaining_balance 为 None。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeOutcome {
    /// 计费动作码
    pub action: String,
    /// 本次实际扣减的积分
    pub points_used: i64,
    /// 扣减提交后的余额；免费动作为 None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_balance: Option<i64>,
}

impl ChargeOutcome {
    /// 免费动作的结果：未读取余额，未写入流水
    pub fn free(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            points_used: 0,
            remaining_balance: None,
        }
    }

    /// 计费动作的结果
    pub fn charged(action: impl Into<String>, points_used: i64, remaining_balance: i64) -> Self {
        Self {
            action: action.into(),
            points_used,
            remaining_balance: Some(remaining_balance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_outcome() {
        let outcome = ChargeOutcome::free("outline_generation");
        assert_eq!(outcome.points_used, 0);
        assert!(outcome.remaining_balance.is_none());
    }

    #[test]
    fn test_charged_outcome_serialization() {
        let outcome = ChargeOutcome::charged("basic_chat", 5, 95);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["action"], "basic_chat");
        assert_eq!(json["pointsUsed"], 5);
        assert_eq!(json["remainingBalance"], 95);
    }

    #[test]
    fn test_free_outcome_omits_balance_field() {
        let json = serde_json::to_value(ChargeOutcome::free("ocr")).unwrap();
        assert!(json.get("remainingBalance").is_none());
    }
}
