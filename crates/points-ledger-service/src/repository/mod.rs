//! 数据库仓储层
//!
//! 封装对 point_accounts / point_ledger / point_costs 三张表的访问，
//! 事务场景下的方法以 `_in_tx` 结尾，接收 `&mut PgConnection`。

mod account_repo;
mod cost_repo;
mod ledger_repo;
mod traits;

pub use account_repo::AccountRepository;
pub use cost_repo::CostRepository;
pub use ledger_repo::LedgerRepository;
pub use traits::{AccountRepositoryTrait, CostRepositoryTrait, LedgerRepositoryTrait};

#[cfg(test)]
pub use traits::{MockAccountRepositoryTrait, MockCostRepositoryTrait, MockLedgerRepositoryTrait};
