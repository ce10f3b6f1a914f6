//! Store abstraction shared by every service.
//!
//! Reads that need no isolation go through [`Store`]. Anything that mutates
//! balances or request state runs inside a [`UnitOfWork`]: rows fetched with
//! `lock_*` stay locked until the unit commits or is dropped, and dropping an
//! uncommitted unit rolls every write back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::errors::StoreResult;
use crate::audit::{AuditEntry, NewAuditEntry};
use crate::deposit::{DepositRequest, PaymentReference};
use crate::gateway::ExternalTransaction;
use crate::wallet::{LedgerSnapshot, LedgerTransaction, TransactionType, UserId, Wallet};
use crate::withdrawal::WithdrawalRequest;

/// Largest page a caller may request
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default page size
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// One-based pagination request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Clamp `page` to at least 1 and `limit` to `1..=MAX_PAGE_SIZE`
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Number of rows to skip
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// One page of results, newest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

impl<T> Page<T> {
    /// Slice an already ordered collection
    pub fn from_sorted(items: Vec<T>, request: PageRequest) -> Self {
        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.limit as usize)
            .collect();
        Self {
            items,
            page: request.page,
            limit: request.limit,
            total,
        }
    }
}

/// Read access and unit-of-work factory
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a unit of work
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    async fn wallet(&self, user_id: UserId) -> StoreResult<Option<Wallet>>;

    async fn transaction(&self, id: Uuid) -> StoreResult<Option<LedgerTransaction>>;

    /// Ledger entries for a user, newest first
    async fn transactions_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> StoreResult<Page<LedgerTransaction>>;

    /// Wallet balance and ledger sum read at the same instant
    async fn ledger_snapshot(&self, user_id: UserId) -> StoreResult<Option<LedgerSnapshot>>;

    /// Total of completed credits of `kind` created at or after `since`
    async fn credited_since(
        &self,
        user_id: UserId,
        kind: TransactionType,
        since: DateTime<Utc>,
    ) -> StoreResult<Decimal>;

    async fn deposit(&self, id: Uuid) -> StoreResult<Option<DepositRequest>>;

    async fn deposit_by_reference(&self, code: &str) -> StoreResult<Option<DepositRequest>>;

    async fn payment_reference(&self, code: &str) -> StoreResult<Option<PaymentReference>>;

    async fn external_transaction(&self, id: Uuid) -> StoreResult<Option<ExternalTransaction>>;

    async fn external_by_charge_id(
        &self,
        charge_id: &str,
    ) -> StoreResult<Option<ExternalTransaction>>;

    /// Gateway transactions for a user, newest first
    async fn external_transactions_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> StoreResult<Page<ExternalTransaction>>;

    /// Gateway transactions created at or after `since`
    async fn external_transactions_since(
        &self,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<ExternalTransaction>>;

    /// Number of gateway transactions created in `[from, to)`
    async fn external_volume(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<u64>;

    /// Non-terminal gateway transactions created before `before`
    async fn stale_pending_externals(
        &self,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<ExternalTransaction>>;

    /// Completed gateway transactions, last updated before `before`, whose
    /// deposit is still PENDING
    async fn captured_pending_externals(
        &self,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<ExternalTransaction>>;

    async fn withdrawal(&self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>>;

    /// Append to the audit log outside any unit of work
    async fn append_audit(&self, entry: NewAuditEntry) -> StoreResult<AuditEntry>;

    /// Most recent audit entries, optionally for one user
    async fn audit_entries(
        &self,
        user_id: Option<UserId>,
        limit: u32,
    ) -> StoreResult<Vec<AuditEntry>>;
}

/// Atomic set of reads and writes
#[async_trait]
pub trait UnitOfWork: Send {
    /// Insert a wallet; `Conflict` if the user already has one
    async fn insert_wallet(&mut self, wallet: &Wallet) -> StoreResult<()>;

    async fn lock_wallet(&mut self, user_id: UserId) -> StoreResult<Option<Wallet>>;

    /// Persist wallet state and mirror the balance onto the user record
    async fn update_wallet(&mut self, wallet: &Wallet) -> StoreResult<()>;

    async fn insert_transaction(&mut self, transaction: &LedgerTransaction) -> StoreResult<()>;

    /// Sum of signed completed entries for a user
    async fn ledger_sum(&mut self, user_id: UserId) -> StoreResult<Decimal>;

    /// Insert a deposit; `Conflict` on a duplicate reference code
    async fn insert_deposit(&mut self, deposit: &DepositRequest) -> StoreResult<()>;

    async fn lock_deposit(&mut self, id: Uuid) -> StoreResult<Option<DepositRequest>>;

    async fn lock_deposit_by_reference(
        &mut self,
        code: &str,
    ) -> StoreResult<Option<DepositRequest>>;

    async fn update_deposit(&mut self, deposit: &DepositRequest) -> StoreResult<()>;

    /// Move every pending deposit whose expiry is before `now` to EXPIRED
    async fn expire_deposits(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<DepositRequest>>;

    /// Insert a gateway transaction; `Conflict` on a duplicate charge id or deposit
    async fn insert_external(&mut self, external: &ExternalTransaction) -> StoreResult<()>;

    async fn lock_external_by_charge_id(
        &mut self,
        charge_id: &str,
    ) -> StoreResult<Option<ExternalTransaction>>;

    async fn update_external(&mut self, external: &ExternalTransaction) -> StoreResult<()>;

    async fn insert_payment_reference(&mut self, reference: &PaymentReference) -> StoreResult<()>;

    async fn lock_payment_reference(
        &mut self,
        code: &str,
    ) -> StoreResult<Option<PaymentReference>>;

    async fn update_payment_reference(&mut self, reference: &PaymentReference) -> StoreResult<()>;

    async fn insert_withdrawal(&mut self, withdrawal: &WithdrawalRequest) -> StoreResult<()>;

    async fn lock_withdrawal(&mut self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>>;

    async fn update_withdrawal(&mut self, withdrawal: &WithdrawalRequest) -> StoreResult<()>;

    /// Make every write visible atomically
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
