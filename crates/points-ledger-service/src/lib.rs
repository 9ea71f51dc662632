//! 积分账本服务
//!
//! 管理用户积分账户的余额变更，是系统中唯一允许修改余额的入口。
//!
//! ## 核心功能
//!
//! - **积分扣减**：按数量或计费动作扣减，并发下不透支、不重复扣费
//! - **积分入账**：加量包购买等场景的积分充值
//! - **流水审计**：每次变更写入只追加的流水记录，支持余额对账
//! - **配额刷新**：后台 Worker 在订阅周期结束时将余额重置为月度配额
//!
//! ## 并发正确性
//!
//! 所有余额变更在单个数据库事务内完成，通过账户行的
//! `SELECT ... FOR UPDATE` 排他锁串行化同一账户的并发操作。
//! 锁等待超时、序列化失败、死锁统一归类为 `Contention`，
//! 由调用方按有界退避策略重试。
//!
//! ## 模块结构
//!
//! - `models`: 积分账户、流水、动作计价实体
//! - `repository`: 数据访问层，事务方法以 `_in_tx` 结尾
//! - `service`: 业务服务层，扣减/入账/刷新的事务编排
//! - `worker`: 配额刷新后台 Worker
//! - `error`: 错误类型定义
//!
//! ## 技术栈
//!
//! - 数据库：PostgreSQL + sqlx
//! - 序列化：serde (camelCase)
//! - 可观测性：tracing + Prometheus 指标

pub mod error;
pub mod models;
pub mod repository;
pub mod service;
pub mod worker;

// 重新导出核心类型
pub use error::{LedgerError, Result};
pub use models::{AccountStatus, ActionCost, ChangeType, LedgerEntry, PointAccount};
pub use repository::{AccountRepository, CostRepository, LedgerRepository};
pub use service::{PointsLedgerService, dto::ChargeOutcome};
pub use worker::QuotaRefreshWorker;
