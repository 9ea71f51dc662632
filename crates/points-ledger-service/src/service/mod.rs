//! 业务服务层

pub mod dto;
mod ledger_service;

pub use ledger_service::{PointsLedgerService, next_period, validate_amount};
pub(crate) use ledger_service::refresh_account_in_tx;
