//! 积分账本服务
//!
//! 账户余额变更的唯一授权入口，保证并发请求下的正确性：
//! 不会重复扣费，任何已提交状态下余额不为负。
//!
//! ## 并发策略（悲观锁）
//!
//! 每次变更在单个事务内执行「读取 -> 校验 -> 写入余额 -> 追加流水」，
//! 临界区由账户行的 `SELECT ... FOR UPDATE` 排他锁保护，对同一账户
//! 等价于串行执行；不同账户之间互不阻塞。锁等待由 `SET LOCAL
//! lock_timeout` 限定上界，超时、序列化失败、死锁统一以 `Contention`
//! 返回，由调用方按有界退避策略重试。
//!
//! 余额不做任何跨请求的进程内缓存——每次操作都在临界区开头读取
//! 权威的当前值。任何失败路径下事务整体回滚，不会留下部分余额
//! 变更或孤儿流水。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Months, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use points_shared::config::LedgerConfig;
use points_shared::observability::metrics;
use points_shared::retry::{RetryPolicy, retry_with_policy};

use crate::error::{LedgerError, Result};
use crate::models::{ChangeType, LedgerEntry, PointAccount};
use crate::repository::{
    AccountRepository, AccountRepositoryTrait, CostRepositoryTrait, LedgerRepository,
    LedgerRepositoryTrait,
};
use crate::service::dto::ChargeOutcome;

/// 积分账本服务
///
/// 持有仓储与连接池，负责扣减、入账、配额刷新的完整事务流程
pub struct PointsLedgerService {
    account_repo: Arc<dyn AccountRepositoryTrait>,
    ledger_repo: Arc<dyn LedgerRepositoryTrait>,
    cost_repo: Arc<dyn CostRepositoryTrait>,
    pool: PgPool,
    config: LedgerConfig,
}

impl PointsLedgerService {
    pub fn new(
        account_repo: Arc<dyn AccountRepositoryTrait>,
        ledger_repo: Arc<dyn LedgerRepositoryTrait>,
        cost_repo: Arc<dyn CostRepositoryTrait>,
        pool: PgPool,
    ) -> Self {
        Self {
            account_repo,
            ledger_repo,
            cost_repo,
            pool,
            config: LedgerConfig::default(),
        }
    }

    /// 覆盖默认的账本配置
    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    // ==================== 扣减 ====================

    /// 扣减积分
    ///
    /// 前置条件：amount > 0，否则返回 `InvalidAmount` 且不访问存储。
    /// 余额不足时返回 `InsufficientBalance`，这是正常业务结果而非故障。
    /// 成功时返回提交后的新余额。
    ///
    /// 两个并发的扣减会在行锁上串行化：后到者在前者提交后重新读取
    /// 余额再校验，因此联合超额的两笔扣减恰有一笔失败，不会透支。
    #[instrument(skip(self), fields(account_id = %account_id, amount, reason = %reason))]
    pub async fn deduct(&self, account_id: Uuid, amount: i64, reason: &str) -> Result<i64> {
        validate_amount(amount)?;

        let started = Instant::now();
        let result = self.deduct_in_tx(account_id, amount, reason).await;

        match &result {
            Ok(new_balance) => {
                metrics::record_deduction(reason, started.elapsed().as_secs_f64());
                info!(
                    account_id = %account_id,
                    amount,
                    new_balance,
                    reason = %reason,
                    "积分扣减成功"
                );
            }
            Err(LedgerError::InsufficientBalance { .. }) => metrics::record_insufficient(reason),
            Err(LedgerError::Contention) => metrics::record_contention("deduct"),
            Err(_) => {}
        }

        result
    }

    /// 带有界重试的扣减
    ///
    /// 仅对 `Contention` 重试，重试次数由配置的
    /// `max_contention_retries` 限定；业务错误与存储层故障直接向上传播。
    pub async fn deduct_with_retry(
        &self,
        account_id: Uuid,
        amount: i64,
        reason: &str,
    ) -> Result<i64> {
        let policy = RetryPolicy::for_contention(self.config.max_contention_retries);
        retry_with_policy(
            &policy,
            "ledger.deduct",
            |e: &LedgerError| matches!(e, LedgerError::Contention),
            || self.deduct(account_id, amount, reason),
        )
        .await
    }

    /// 按动作计费扣减
    ///
    /// 从计价目录查询动作成本；不在目录中或成本为 0 的动作视为免费，
    /// 不触发任何存储访问（与原始业务一致：非 AI 操作不计费）。
    #[instrument(skip(self), fields(account_id = %account_id, action = %action))]
    pub async fn deduct_for_action(&self, account_id: Uuid, action: &str) -> Result<ChargeOutcome> {
        let cost = match self.cost_repo.get_cost(action).await? {
            Some(cost) if cost.cost > 0 => cost.cost,
            _ => return Ok(ChargeOutcome::free(action)),
        };

        let new_balance = self.deduct(account_id, cost, action).await?;
        Ok(ChargeOutcome::charged(action, cost, new_balance))
    }

    /// 按用户与动作计费扣减
    ///
    /// 先解析用户当前可消费的账户，再委托给 `deduct_for_action`。
    /// 用户没有可用账户时返回 `NoActiveAccount`。
    #[instrument(skip(self), fields(user_id = %user_id, action = %action))]
    pub async fn charge_user(&self, user_id: Uuid, action: &str) -> Result<ChargeOutcome> {
        // 免费动作无需解析账户
        let cost = match self.cost_repo.get_cost(action).await? {
            Some(cost) if cost.cost > 0 => cost.cost,
            _ => return Ok(ChargeOutcome::free(action)),
        };

        let account = self
            .account_repo
            .get_spendable_by_user(user_id)
            .await?
            .ok_or(LedgerError::NoActiveAccount(user_id))?;

        let new_balance = self.deduct(account.id, cost, action).await?;
        Ok(ChargeOutcome::charged(action, cost, new_balance))
    }

    // ==================== 入账 ====================

    /// 入账积分
    ///
    /// 前置条件：amount > 0。无余额上限。成功时返回提交后的新余额。
    #[instrument(skip(self), fields(account_id = %account_id, amount, reason = %reason))]
    pub async fn credit(&self, account_id: Uuid, amount: i64, reason: &str) -> Result<i64> {
        validate_amount(amount)?;

        let result = self.credit_in_tx(account_id, amount, reason).await;

        match &result {
            Ok(new_balance) => {
                metrics::record_credit(reason);
                info!(
                    account_id = %account_id,
                    amount,
                    new_balance,
                    reason = %reason,
                    "积分入账成功"
                );
            }
            Err(LedgerError::Contention) => metrics::record_contention("credit"),
            Err(_) => {}
        }

        result
    }

    // ==================== 查询 ====================

    /// 查询账户当前余额
    ///
    /// 只读操作，返回最近一次提交的值，不加锁
    pub async fn get_balance(&self, account_id: Uuid) -> Result<i64> {
        let account = self
            .account_repo
            .get_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        Ok(account.balance)
    }

    /// 查询账户流水历史
    ///
    /// 按时间倒序，limit 超过配置上限时按上限截断
    pub async fn history(&self, account_id: Uuid, limit: i64) -> Result<Vec<LedgerEntry>> {
        let limit = limit.clamp(1, self.config.history_limit);
        self.ledger_repo.list_by_account(account_id, limit).await
    }

    // ==================== 配额刷新 ====================

    /// 刷新账户配额
    ///
    /// 将余额重置为月度配额并推进订阅周期，写入一条 QuotaRefresh
    /// 流水记录带符号的差额。返回刷新后的余额。
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn refresh_quota(&self, account_id: Uuid) -> Result<i64> {
        let mut tx = self.begin_locked_tx().await?;

        let account = AccountRepository::get_account_for_update(&mut tx, account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        Self::ensure_spendable(&account)?;

        let now = Utc::now();
        let new_balance = refresh_account_in_tx(&mut tx, &account, now).await?;

        tx.commit().await?;
        metrics::record_quota_refresh(1);

        info!(
            account_id = %account_id,
            new_balance,
            "配额刷新完成"
        );

        Ok(new_balance)
    }

    // ==================== 私有方法 ====================

    /// 扣减事务：锁定账户行 -> 校验 -> 写余额 -> 追加流水 -> 提交
    async fn deduct_in_tx(&self, account_id: Uuid, amount: i64, reason: &str) -> Result<i64> {
        let mut tx = self.begin_locked_tx().await?;

        let account = AccountRepository::get_account_for_update(&mut tx, account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        Self::ensure_spendable(&account)?;

        if !account.can_afford(amount) {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: account.balance,
                refresh_at: account.current_period_end,
            });
        }

        let new_balance = account.balance - amount;
        AccountRepository::update_balance_in_tx(&mut tx, account.id, new_balance).await?;

        let entry = LedgerEntry::new(
            account.id,
            account.user_id,
            ChangeType::Deduct,
            reason,
            -amount,
            new_balance,
        );
        LedgerRepository::create_in_tx(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok(new_balance)
    }

    /// 入账事务：与扣减同一锁纪律，差别仅在方向和无余额上限
    async fn credit_in_tx(&self, account_id: Uuid, amount: i64, reason: &str) -> Result<i64> {
        let mut tx = self.begin_locked_tx().await?;

        let account = AccountRepository::get_account_for_update(&mut tx, account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        Self::ensure_spendable(&account)?;

        let new_balance = account.balance + amount;
        AccountRepository::update_balance_in_tx(&mut tx, account.id, new_balance).await?;

        let entry = LedgerEntry::new(
            account.id,
            account.user_id,
            ChangeType::Credit,
            reason,
            amount,
            new_balance,
        );
        LedgerRepository::create_in_tx(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok(new_balance)
    }

    /// 开启事务并设置本事务内的锁等待上限
    async fn begin_locked_tx(&self) -> Result<Transaction<'_, Postgres>> {
        let mut tx = self.pool.begin().await?;

        // SET LOCAL 仅对当前事务生效，提交或回滚后自动还原
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.config.lock_timeout_ms
        ))
        .execute(&mut *tx)
        .await?;

        Ok(tx)
    }

    fn ensure_spendable(account: &PointAccount) -> Result<()> {
        if !account.is_spendable() {
            return Err(LedgerError::AccountNotSpendable {
                account_id: account.id,
                status: format!("{:?}", account.status).to_lowercase(),
            });
        }
        Ok(())
    }
}

/// 校验积分数量前置条件
///
/// 数量必须为正数；校验失败不触发任何存储访问
pub fn validate_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

/// 计算从 from 开始的下一个订阅周期
///
/// 正常情况为自然月；日期溢出（如 1 月 31 日）时退化为 30 天
pub fn next_period(from: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = from
        .checked_add_months(Months::new(1))
        .unwrap_or(from + Duration::days(30));
    (from, end)
}

/// 在已持锁的事务中执行配额重置并追加流水
///
/// 扣减/入账之外唯一的余额写入路径，供服务方法和刷新 Worker 共用
pub(crate) async fn refresh_account_in_tx(
    tx: &mut PgConnection,
    account: &PointAccount,
    now: DateTime<Utc>,
) -> Result<i64> {
    let new_balance = account.monthly_quota;
    let delta = new_balance - account.balance;
    let (period_start, period_end) = next_period(now);

    AccountRepository::reset_period_in_tx(tx, account.id, new_balance, period_start, period_end)
        .await?;

    let entry = LedgerEntry::new(
        account.id,
        account.user_id,
        ChangeType::QuotaRefresh,
        "monthly_quota_refresh",
        delta,
        new_balance,
    );
    LedgerRepository::create_in_tx(tx, &entry).await?;

    Ok(new_balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountStatus, ActionCost};
    use crate::repository::{
        MockAccountRepositoryTrait, MockCostRepositoryTrait, MockLedgerRepositoryTrait,
    };

    /// 构造一个不触网的服务实例
    ///
    /// connect_lazy 不建立连接，适合测试不触及存储的代码路径
    fn service_with_mocks(
        account_repo: MockAccountRepositoryTrait,
        ledger_repo: MockLedgerRepositoryTrait,
        cost_repo: MockCostRepositoryTrait,
    ) -> PointsLedgerService {
        let pool = PgPool::connect_lazy("postgres://localhost:5432/points_test")
            .expect("lazy pool creation should not fail");
        PointsLedgerService::new(
            Arc::new(account_repo),
            Arc::new(ledger_repo),
            Arc::new(cost_repo),
            pool,
        )
    }

    fn default_mocks() -> (
        MockAccountRepositoryTrait,
        MockLedgerRepositoryTrait,
        MockCostRepositoryTrait,
    ) {
        (
            MockAccountRepositoryTrait::new(),
            MockLedgerRepositoryTrait::new(),
            MockCostRepositoryTrait::new(),
        )
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(1).is_ok());
        assert!(validate_amount(1_000_000).is_ok());
        assert!(matches!(
            validate_amount(0),
            Err(LedgerError::InvalidAmount(0))
        ));
        assert!(matches!(
            validate_amount(-5),
            Err(LedgerError::InvalidAmount(-5))
        ));
    }

    #[tokio::test]
    async fn test_deduct_rejects_non_positive_amount_without_store_access() {
        // mock 未设置任何期望：任何仓储调用都会 panic，
        // 因此该测试同时验证了校验失败不触及存储
        let (account_repo, ledger_repo, cost_repo) = default_mocks();
        let service = service_with_mocks(account_repo, ledger_repo, cost_repo);
        let account_id = Uuid::new_v4();

        let err = service.deduct(account_id, 0, "basic_chat").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(0)));

        let err = service.deduct(account_id, -5, "basic_chat").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(-5)));
    }

    #[tokio::test]
    async fn test_credit_rejects_non_positive_amount() {
        let (account_repo, ledger_repo, cost_repo) = default_mocks();
        let service = service_with_mocks(account_repo, ledger_repo, cost_repo);

        let err = service
            .credit(Uuid::new_v4(), 0, "addon_purchase")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(0)));
    }

    #[tokio::test]
    async fn test_deduct_for_action_unknown_action_is_free() {
        let (account_repo, ledger_repo, mut cost_repo) = default_mocks();
        cost_repo
            .expect_get_cost()
            .withf(|action| action == "non_ai_operation")
            .returning(|_| Ok(None));

        let service = service_with_mocks(account_repo, ledger_repo, cost_repo);
        let outcome = service
            .deduct_for_action(Uuid::new_v4(), "non_ai_operation")
            .await
            .unwrap();

        assert_eq!(outcome.points_used, 0);
        assert!(outcome.remaining_balance.is_none());
    }

    #[tokio::test]
    async fn test_deduct_for_action_zero_cost_is_free() {
        let (account_repo, ledger_repo, mut cost_repo) = default_mocks();
        cost_repo.expect_get_cost().returning(|action| {
            Ok(Some(ActionCost {
                id: Uuid::new_v4(),
                action: action.to_string(),
                cost: 0,
                description: None,
            }))
        });

        let service = service_with_mocks(account_repo, ledger_repo, cost_repo);
        let outcome = service
            .deduct_for_action(Uuid::new_v4(), "outline_generation")
            .await
            .unwrap();

        assert_eq!(outcome.points_used, 0);
        assert!(outcome.remaining_balance.is_none());
    }

    #[tokio::test]
    async fn test_charge_user_without_active_account() {
        let (mut account_repo, ledger_repo, mut cost_repo) = default_mocks();
        cost_repo.expect_get_cost().returning(|action| {
            Ok(Some(ActionCost {
                id: Uuid::new_v4(),
                action: action.to_string(),
                cost: 5,
                description: None,
            }))
        });
        account_repo
            .expect_get_spendable_by_user()
            .returning(|_| Ok(None));

        let service = service_with_mocks(account_repo, ledger_repo, cost_repo);
        let user_id = Uuid::new_v4();
        let err = service.charge_user(user_id, "basic_chat").await.unwrap_err();

        assert!(matches!(err, LedgerError::NoActiveAccount(id) if id == user_id));
    }

    #[tokio::test]
    async fn test_deduct_store_unavailable_maps_to_store_error() {
        // 不可达地址加短获取超时：开启事务即失败，未提交任何变更
        let (account_repo, ledger_repo, cost_repo) = default_mocks();
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(50))
            .connect_lazy("postgres://localhost:1/points_unreachable")
            .expect("lazy pool creation should not fail");
        let service = PointsLedgerService::new(
            Arc::new(account_repo),
            Arc::new(ledger_repo),
            Arc::new(cost_repo),
            pool,
        );

        let err = service
            .deduct(Uuid::new_v4(), 10, "basic_chat")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Store(_)));
        assert_eq!(err.error_code(), "STORE_UNAVAILABLE");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_deduct_for_action_propagates_store_error_without_charging() {
        // 计价查询失败时直接向上传播；账户与流水仓储
        // 未设置任何期望，触达即 panic，因此不会发生扣减
        let (account_repo, ledger_repo, mut cost_repo) = default_mocks();
        cost_repo
            .expect_get_cost()
            .returning(|_| Err(LedgerError::Store(sqlx::Error::PoolTimedOut)));

        let service = service_with_mocks(account_repo, ledger_repo, cost_repo);
        let err = service
            .deduct_for_action(Uuid::new_v4(), "basic_chat")
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Store(_)));
    }

    #[tokio::test]
    async fn test_get_balance_account_not_found() {
        let (mut account_repo, ledger_repo, cost_repo) = default_mocks();
        account_repo.expect_get_account().returning(|_| Ok(None));

        let service = service_with_mocks(account_repo, ledger_repo, cost_repo);
        let account_id = Uuid::new_v4();
        let err = service.get_balance(account_id).await.unwrap_err();

        assert!(matches!(err, LedgerError::AccountNotFound(id) if id == account_id));
    }

    #[tokio::test]
    async fn test_get_balance_returns_committed_value() {
        let (mut account_repo, ledger_repo, cost_repo) = default_mocks();
        account_repo.expect_get_account().returning(|id| {
            let now = Utc::now();
            Ok(Some(PointAccount {
                id,
                user_id: Uuid::new_v4(),
                status: AccountStatus::Active,
                balance: 73,
                monthly_quota: 100,
                current_period_start: None,
                current_period_end: None,
                created_at: now,
                updated_at: now,
            }))
        });

        let service = service_with_mocks(account_repo, ledger_repo, cost_repo);
        let balance = service.get_balance(Uuid::new_v4()).await.unwrap();
        assert_eq!(balance, 73);
    }

    #[tokio::test]
    async fn test_history_clamps_limit() {
        let (account_repo, mut ledger_repo, cost_repo) = default_mocks();
        // 配置上限为 200，请求 10_000 条时应被截断
        ledger_repo
            .expect_list_by_account()
            .withf(|_, limit| *limit == 200)
            .returning(|_, _| Ok(Vec::new()));

        let service = service_with_mocks(account_repo, ledger_repo, cost_repo);
        let entries = service.history(Uuid::new_v4(), 10_000).await.unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_next_period_advances_one_month() {
        let from = "2025-03-15T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let (start, end) = next_period(from);
        assert_eq!(start, from);
        assert_eq!(end, "2025-04-15T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn test_next_period_handles_month_end() {
        // 1 月 31 日 + 1 个月 -> 2 月 28 日（chrono 截断到月末）
        let from = "2025-01-31T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let (_, end) = next_period(from);
        assert_eq!(end, "2025-02-28T12:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }
}
