//! 后台 Worker

mod quota_refresh_worker;

pub use quota_refresh_worker::QuotaRefreshWorker;
