//! 测试工具模块
//!
//! 提供集成测试所需的测试数据生成器，
//! 用于简化测试代码编写，提高测试的可重复性。

use uuid::Uuid;

// ==================== 测试数据生成 ====================

/// 生成唯一的测试用户 ID
pub fn test_user_id() -> Uuid {
    Uuid::new_v4()
}

/// 生成唯一的测试账户 ID
pub fn test_account_id() -> Uuid {
    Uuid::new_v4()
}

/// 生成唯一的测试动作码
///
/// 带随机后缀，避免并行测试间的 point_costs 冲突
pub fn test_action_code(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}
