//! Wallet manager: the public entry point for balance changes.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use super::{
    errors::{WalletError, WalletResult},
    ledger::{self, entry_audit},
    models::{EntryRequest, LedgerOutcome, LedgerTransaction, TransactionType, UserId, Wallet},
};
use crate::audit::{AuditAction, AuditTrail, NewAuditEntry, SYSTEM_ACTOR};
use crate::db::{Page, PageRequest, Store};

/// Default limits applied to new wallets
#[derive(Debug, Clone, PartialEq)]
pub struct WalletConfig {
    pub default_daily_limit: Decimal,
    pub default_monthly_limit: Decimal,
}

impl WalletConfig {
    /// Read `WALLET_DAILY_LIMIT` / `WALLET_MONTHLY_LIMIT`, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_daily_limit: std::env::var("WALLET_DAILY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_daily_limit),
            default_monthly_limit: std::env::var("WALLET_MONTHLY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_monthly_limit),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            default_daily_limit: Decimal::new(10_000_00, 2),
            default_monthly_limit: Decimal::new(50_000_00, 2),
        }
    }
}

/// Flag changes an operator can apply to a wallet
#[derive(Debug, Clone, Copy)]
enum WalletFlag {
    Freeze,
    Unfreeze,
    Deactivate,
    HoldForReview,
    ReleaseReview,
}

impl WalletFlag {
    fn apply(self, wallet: &mut Wallet) {
        match self {
            WalletFlag::Freeze => wallet.is_frozen = true,
            WalletFlag::Unfreeze => wallet.is_frozen = false,
            WalletFlag::Deactivate => wallet.is_active = false,
            WalletFlag::HoldForReview => wallet.review_hold = true,
            WalletFlag::ReleaseReview => wallet.review_hold = false,
        }
    }

    fn action(self) -> AuditAction {
        match self {
            WalletFlag::Freeze => AuditAction::WalletFrozen,
            WalletFlag::Unfreeze => AuditAction::WalletUnfrozen,
            WalletFlag::Deactivate => AuditAction::WalletDeactivated,
            WalletFlag::HoldForReview => AuditAction::ReviewHoldPlaced,
            WalletFlag::ReleaseReview => AuditAction::ReviewHoldReleased,
        }
    }
}

/// Wallet manager
#[derive(Clone)]
pub struct WalletManager {
    store: Arc<dyn Store>,
    audit: AuditTrail,
    config: WalletConfig,
}

impl WalletManager {
    /// Create a new wallet manager
    ///
    /// # Arguments
    ///
    /// * `store` - Store holding wallets and the ledger
    /// * `config` - Defaults for new wallets
    pub fn new(store: Arc<dyn Store>, config: WalletConfig) -> Self {
        Self {
            audit: AuditTrail::new(store.clone()),
            store,
            config,
        }
    }

    /// Open a wallet for a user, or return the one they already have
    ///
    /// # Arguments
    ///
    /// * `user_id` - User ID
    /// * `daily_limit` - Deposit limit per day (config default when `None`)
    /// * `monthly_limit` - Deposit limit per month (config default when `None`)
    pub async fn open_wallet(
        &self,
        user_id: UserId,
        daily_limit: Option<Decimal>,
        monthly_limit: Option<Decimal>,
    ) -> WalletResult<Wallet> {
        let daily_limit = daily_limit.unwrap_or(self.config.default_daily_limit);
        let monthly_limit = monthly_limit.unwrap_or(self.config.default_monthly_limit);
        for limit in [daily_limit, monthly_limit] {
            ledger::validate_amount(limit)?;
        }

        let mut uow = self.store.begin().await?;
        if let Some(existing) = uow.lock_wallet(user_id).await? {
            return Ok(existing);
        }

        let wallet = Wallet::new(user_id, daily_limit, monthly_limit);
        match uow.insert_wallet(&wallet).await {
            Ok(()) => uow.commit().await?,
            Err(e) if e.is_conflict() => {
                // Lost a race with a concurrent open; the winner's row is the wallet.
                drop(uow);
                return self.get_wallet(user_id).await;
            }
            Err(e) => return Err(e.into()),
        }

        log::info!("Opened wallet for user {}", user_id);
        self.audit
            .record([NewAuditEntry::new(SYSTEM_ACTOR, AuditAction::WalletOpened).user(user_id)])
            .await;
        Ok(wallet)
    }

    /// Get wallet for a user
    ///
    /// # Returns
    ///
    /// * `WalletResult<Wallet>` - Wallet or `WalletNotFound`
    pub async fn get_wallet(&self, user_id: UserId) -> WalletResult<Wallet> {
        self.store
            .wallet(user_id)
            .await?
            .ok_or(WalletError::WalletNotFound(user_id))
    }

    /// Credit a wallet
    ///
    /// # Arguments
    ///
    /// * `user_id` - User ID
    /// * `amount` - Positive amount with at most two decimals
    /// * `transaction_type` - Ledger type recorded for the entry
    /// * `description` - Human-readable description
    /// * `reference_id` - Caller reference (deposit code, game id, ...)
    ///
    /// # Errors
    ///
    /// * `WalletError::InvalidAmount` - Amount not positive
    /// * `WalletError::WalletFrozen` / `WalletError::WalletInactive` - Wallet unusable
    pub async fn credit(
        &self,
        user_id: UserId,
        amount: Decimal,
        transaction_type: TransactionType,
        description: &str,
        reference_id: Option<String>,
    ) -> WalletResult<LedgerOutcome> {
        let entry =
            EntryRequest::credit(user_id, amount, transaction_type, description, reference_id);
        self.post(entry).await
    }

    /// Debit a wallet
    ///
    /// # Errors
    ///
    /// * `WalletError::InsufficientFunds` - Balance below `amount`; nothing is written
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
        transaction_type: TransactionType,
        reference_id: Option<String>,
    ) -> WalletResult<LedgerOutcome> {
        let entry =
            EntryRequest::debit(user_id, amount, transaction_type, description, reference_id);
        self.post(entry).await
    }

    async fn post(&self, entry: EntryRequest) -> WalletResult<LedgerOutcome> {
        let mut uow = self.store.begin().await?;
        let outcome = ledger::post_entry(uow.as_mut(), entry).await?;
        uow.commit().await?;

        log::debug!(
            "{} {} {} for user {} (balance {})",
            outcome.transaction.transaction_type,
            outcome.transaction.direction,
            outcome.transaction.amount,
            outcome.wallet.user_id,
            outcome.wallet.balance
        );
        self.audit
            .record([entry_audit(SYSTEM_ACTOR, &outcome.transaction)])
            .await;
        Ok(outcome)
    }

    /// Freeze a wallet; frozen wallets reject every ledger entry
    pub async fn freeze(&self, user_id: UserId, actor: &str, reason: &str) -> WalletResult<Wallet> {
        self.set_flag(user_id, actor, WalletFlag::Freeze, Some(reason))
            .await
    }

    pub async fn unfreeze(&self, user_id: UserId, actor: &str) -> WalletResult<Wallet> {
        self.set_flag(user_id, actor, WalletFlag::Unfreeze, None)
            .await
    }

    /// Deactivate a wallet permanently; wallets are never deleted
    pub async fn deactivate(&self, user_id: UserId, actor: &str) -> WalletResult<Wallet> {
        self.set_flag(user_id, actor, WalletFlag::Deactivate, None)
            .await
    }

    /// Stop automatic releases into a wallet until an operator reviews it
    pub async fn place_review_hold(
        &self,
        user_id: UserId,
        actor: &str,
        reason: &str,
    ) -> WalletResult<Wallet> {
        self.set_flag(user_id, actor, WalletFlag::HoldForReview, Some(reason))
            .await
    }

    pub async fn release_review_hold(&self, user_id: UserId, actor: &str) -> WalletResult<Wallet> {
        self.set_flag(user_id, actor, WalletFlag::ReleaseReview, None)
            .await
    }

    async fn set_flag(
        &self,
        user_id: UserId,
        actor: &str,
        flag: WalletFlag,
        reason: Option<&str>,
    ) -> WalletResult<Wallet> {
        let mut uow = self.store.begin().await?;
        let mut wallet = ledger::lock_wallet(uow.as_mut(), user_id).await?;
        flag.apply(&mut wallet);
        wallet.updated_at = Utc::now();
        uow.update_wallet(&wallet).await?;
        uow.commit().await?;

        log::info!("{} applied to wallet {} by {}", flag.action(), user_id, actor);
        self.audit
            .record([NewAuditEntry::new(actor, flag.action())
                .user(user_id)
                .details(serde_json::json!({ "reason": reason }))])
            .await;
        Ok(wallet)
    }

    /// Ledger entries for a user, newest first
    pub async fn history(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> WalletResult<Page<LedgerTransaction>> {
        self.get_wallet(user_id).await?;
        Ok(self.store.transactions_for_user(user_id, page).await?)
    }
}
