//! 积分账本错误类型
//!
//! 定义服务层的业务错误和系统错误。
//! `From<sqlx::Error>` 会把锁等待超时、序列化失败、死锁统一归类为并发冲突，
//! 其余数据库错误归为存储层错误。

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// 锁等待超时（lock_not_available）
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";
/// 序列化失败
const PG_SERIALIZATION_FAILURE: &str = "40001";
/// 死锁
const PG_DEADLOCK_DETECTED: &str = "40P01";

/// 积分账本错误类型
#[derive(Debug, Error)]
pub enum LedgerError {
    // === 账户相关错误 ===
    #[error("积分账户不存在: {0}")]
    AccountNotFound(Uuid),

    #[error("积分账户不可用: account_id={account_id}, status={status}")]
    AccountNotSpendable { account_id: Uuid, status: String },

    #[error("用户没有可用的积分账户: user_id={0}")]
    NoActiveAccount(Uuid),

    // === 余额相关错误 ===
    #[error("积分余额不足: 需要 {required}, 可用 {available}")]
    InsufficientBalance {
        required: i64,
        available: i64,
        /// 下次配额刷新时间，用于提示用户
        refresh_at: Option<DateTime<Utc>>,
    },

    #[error("无效的积分数量: {0}，必须为正数")]
    InvalidAmount(i64),

    // === 系统错误 ===
    #[error("并发冲突，请重试")]
    Contention,

    #[error("存储层错误: {0}")]
    Store(sqlx::Error),
}

/// 积分账本 Result 类型别名
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let is_contention = db_err.code().is_some_and(|code| {
                matches!(
                    code.as_ref(),
                    PG_LOCK_NOT_AVAILABLE | PG_SERIALIZATION_FAILURE | PG_DEADLOCK_DETECTED
                )
            });
            if is_contention {
                return Self::Contention;
            }
        }

        Self::Store(err)
    }
}

impl LedgerError {
    /// 检查是否为可重试的错误
    ///
    /// 余额不足是正常业务结果，不重试；并发冲突和存储层故障
    /// 由调用方按有界策略重试。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention | Self::Store(_))
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(self, Self::Contention | Self::Store(_))
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::AccountNotSpendable { .. } => "ACCOUNT_NOT_SPENDABLE",
            Self::NoActiveAccount(_) => "NO_ACTIVE_ACCOUNT",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::Contention => "CONTENTION",
            Self::Store(_) => "STORE_UNAVAILABLE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(LedgerError::Contention.is_retryable());
        assert!(LedgerError::Store(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!LedgerError::AccountNotFound(Uuid::new_v4()).is_retryable());
        assert!(
            !LedgerError::InsufficientBalance {
                required: 100,
                available: 50,
                refresh_at: None,
            }
            .is_retryable()
        );
        assert!(!LedgerError::InvalidAmount(-5).is_retryable());
    }

    #[test]
    fn test_error_is_business_error() {
        assert!(
            LedgerError::InsufficientBalance {
                required: 100,
                available: 50,
                refresh_at: None,
            }
            .is_business_error()
        );
        assert!(LedgerError::AccountNotFound(Uuid::new_v4()).is_business_error());
        assert!(LedgerError::InvalidAmount(0).is_business_error());
        assert!(!LedgerError::Contention.is_business_error());
        assert!(!LedgerError::Store(sqlx::Error::PoolTimedOut).is_business_error());
    }

    #[test]
    fn test_error_code() {
        assert_eq!(LedgerError::Contention.error_code(), "CONTENTION");
        assert_eq!(
            LedgerError::InsufficientBalance {
                required: 100,
                available: 50,
                refresh_at: None,
            }
            .error_code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(
            LedgerError::Store(sqlx::Error::PoolTimedOut).error_code(),
            "STORE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::InsufficientBalance {
            required: 100,
            available: 50,
            refresh_at: None,
        };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));

        let err = LedgerError::InvalidAmount(-5);
        assert!(err.to_string().contains("-5"));
    }

    #[test]
    fn test_from_sqlx_error_maps_to_store() {
        // 非锁相关的数据库错误归类为存储层错误
        let err: LedgerError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, LedgerError::Store(_)));
        assert_eq!(err.error_code(), "STORE_UNAVAILABLE");
    }
}
