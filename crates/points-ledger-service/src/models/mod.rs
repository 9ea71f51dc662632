//! 领域模型定义

mod account;
mod enums;
mod ledger;

pub use account::{ActionCost, PointAccount};
pub use enums::{AccountStatus, ChangeType};
pub use ledger::LedgerEntry;
