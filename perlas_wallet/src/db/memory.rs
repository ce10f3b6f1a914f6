//! In-process store.
//!
//! A single async mutex serialises units of work: `begin` takes the lock and
//! clones the state, writes go to the clone, and `commit` swaps it in. Reads
//! through [`Store`] also take the lock, so a task must not call them while
//! it holds an open unit of work.
//!
//! Unique and check constraints mirror the PostgreSQL schema, and fault
//! switches let tests make audit writes or wallet updates fail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::store::{Page, PageRequest, Store, UnitOfWork};
use crate::audit::{AuditEntry, NewAuditEntry};
use crate::deposit::{DepositRequest, DepositStatus, PaymentReference};
use crate::gateway::{ExternalStatus, ExternalTransaction};
use crate::wallet::{
    EntryDirection, LedgerSnapshot, LedgerTransaction, TransactionStatus, TransactionType, UserId,
    Wallet,
};
use crate::withdrawal::WithdrawalRequest;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    wallets: HashMap<UserId, Wallet>,
    /// Denormalised `users.pearls_balance`
    user_balances: HashMap<UserId, Decimal>,
    transactions: Vec<LedgerTransaction>,
    deposits: HashMap<Uuid, DepositRequest>,
    externals: HashMap<Uuid, ExternalTransaction>,
    references: HashMap<String, PaymentReference>,
    withdrawals: HashMap<Uuid, WithdrawalRequest>,
}

impl MemoryState {
    fn ledger_sum(&self, user_id: UserId) -> Decimal {
        self.transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(LedgerTransaction::signed_amount)
            .sum()
    }

    fn external_by_charge_id(&self, charge_id: &str) -> Option<&ExternalTransaction> {
        self.externals
            .values()
            .find(|e| e.external_charge_id == charge_id)
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail_audit: AtomicBool,
    fail_wallet_updates: AtomicBool,
}

/// Store kept entirely in memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    audit: Arc<Mutex<Vec<AuditEntry>>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent audit append fail
    pub fn set_fail_audit(&self, fail: bool) {
        self.faults.fail_audit.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent wallet update fail
    pub fn set_fail_wallet_updates(&self, fail: bool) {
        self.faults.fail_wallet_updates.store(fail, Ordering::SeqCst);
    }

    /// Overwrite a wallet balance without a ledger entry.
    ///
    /// Only useful for exercising integrity checks.
    pub async fn overwrite_wallet_balance(&self, user_id: UserId, balance: Decimal) {
        let mut state = self.state.lock().await;
        if let Some(wallet) = state.wallets.get_mut(&user_id) {
            wallet.balance = balance;
        }
    }

    /// Every ledger entry in insertion order
    pub async fn all_transactions(&self) -> Vec<LedgerTransaction> {
        self.state.lock().await.transactions.clone()
    }

    /// Denormalised user balance, as the account service would see it
    pub async fn user_balance(&self, user_id: UserId) -> Option<Decimal> {
        self.state.lock().await.user_balances.get(&user_id).copied()
    }
}

fn newest_first<T: Clone>(items: impl Iterator<Item = T>, created_at: fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.reverse();
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn wallet(&self, user_id: UserId) -> StoreResult<Option<Wallet>> {
        Ok(self.state.lock().await.wallets.get(&user_id).cloned())
    }

    async fn transaction(&self, id: Uuid) -> StoreResult<Option<LedgerTransaction>> {
        let state = self.state.lock().await;
        Ok(state.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn transactions_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> StoreResult<Page<LedgerTransaction>> {
        let state = self.state.lock().await;
        let items = newest_first(
            state
                .transactions
                .iter()
                .filter(|t| t.user_id == user_id)
                .cloned(),
            |t| t.created_at,
        );
        Ok(Page::from_sorted(items, page))
    }

    async fn ledger_snapshot(&self, user_id: UserId) -> StoreResult<Option<LedgerSnapshot>> {
        let state = self.state.lock().await;
        Ok(state.wallets.get(&user_id).map(|wallet| LedgerSnapshot {
            user_id,
            wallet_balance: wallet.balance,
            ledger_balance: state.ledger_sum(user_id),
        }))
    }

    async fn credited_since(
        &self,
        user_id: UserId,
        kind: TransactionType,
        since: DateTime<Utc>,
    ) -> StoreResult<Decimal> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| {
                t.user_id == user_id
                    && t.transaction_type == kind
                    && t.direction == EntryDirection::Credit
                    && t.status == TransactionStatus::Completed
                    && t.created_at >= since
            })
            .map(|t| t.amount)
            .sum())
    }

    async fn deposit(&self, id: Uuid) -> StoreResult<Option<DepositRequest>> {
        Ok(self.state.lock().await.deposits.get(&id).cloned())
    }

    async fn deposit_by_reference(&self, code: &str) -> StoreResult<Option<DepositRequest>> {
        let state = self.state.lock().await;
        Ok(state
            .deposits
            .values()
            .find(|d| d.reference_code == code)
            .cloned())
    }

    async fn payment_reference(&self, code: &str) -> StoreResult<Option<PaymentReference>> {
        Ok(self.state.lock().await.references.get(code).cloned())
    }

    async fn external_transaction(&self, id: Uuid) -> StoreResult<Option<ExternalTransaction>> {
        Ok(self.state.lock().await.externals.get(&id).cloned())
    }

    async fn external_by_charge_id(
        &self,
        charge_id: &str,
    ) -> StoreResult<Option<ExternalTransaction>> {
        let state = self.state.lock().await;
        Ok(state.external_by_charge_id(charge_id).cloned())
    }

    async fn external_transactions_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> StoreResult<Page<ExternalTransaction>> {
        let state = self.state.lock().await;
        let items = newest_first(
            state
                .externals
                .values()
                .filter(|e| e.user_id == user_id)
                .cloned(),
            |e| e.created_at,
        );
        Ok(Page::from_sorted(items, page))
    }

    async fn external_transactions_since(
        &self,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<ExternalTransaction>> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state
                .externals
                .values()
                .filter(|e| e.created_at >= since)
                .cloned(),
            |e| e.created_at,
        ))
    }

    async fn external_volume(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<u64> {
        let state = self.state.lock().await;
        Ok(state
            .externals
            .values()
            .filter(|e| e.created_at >= from && e.created_at < to)
            .count() as u64)
    }

    async fn stale_pending_externals(
        &self,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<ExternalTransaction>> {
        let state = self.state.lock().await;
        let mut stale: Vec<ExternalTransaction> = state
            .externals
            .values()
            .filter(|e| !e.external_status.is_terminal() && e.created_at < before)
            .cloned()
            .collect();
        stale.sort_by_key(|e| e.created_at);
        Ok(stale)
    }

    async fn captured_pending_externals(
        &self,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<ExternalTransaction>> {
        let state = self.state.lock().await;
        let mut captured: Vec<ExternalTransaction> = state
            .externals
            .values()
            .filter(|e| e.external_status == ExternalStatus::Completed && e.updated_at < before)
            .filter(|e| {
                state
                    .deposits
                    .get(&e.deposit_request_id)
                    .is_some_and(|d| d.status == DepositStatus::Pending)
            })
            .cloned()
            .collect();
        captured.sort_by_key(|e| e.updated_at);
        Ok(captured)
    }

    async fn withdrawal(&self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
        Ok(self.state.lock().await.withdrawals.get(&id).cloned())
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> StoreResult<AuditEntry> {
        if self.faults.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit log".to_string()));
        }
        let mut audit = self.audit.lock().await;
        let stored = AuditEntry {
            id: audit.len() as i64 + 1,
            actor: entry.actor,
            action: entry.action,
            user_id: entry.user_id,
            amount: entry.amount,
            reference_id: entry.reference_id,
            details: entry.details,
            created_at: Utc::now(),
        };
        audit.push(stored.clone());
        Ok(stored)
    }

    async fn audit_entries(
        &self,
        user_id: Option<UserId>,
        limit: u32,
    ) -> StoreResult<Vec<AuditEntry>> {
        let audit = self.audit.lock().await;
        Ok(audit
            .iter()
            .rev()
            .filter(|e| user_id.is_none() || e.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Unit of work over a private copy of the state
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: Arc<Faults>,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_wallet(&mut self, wallet: &Wallet) -> StoreResult<()> {
        if self.working.wallets.contains_key(&wallet.user_id) {
            return Err(StoreError::Conflict("wallets_pkey".to_string()));
        }
        self.working
            .user_balances
            .entry(wallet.user_id)
            .or_insert(wallet.balance);
        self.working.wallets.insert(wallet.user_id, wallet.clone());
        Ok(())
    }

    async fn lock_wallet(&mut self, user_id: UserId) -> StoreResult<Option<Wallet>> {
        Ok(self.working.wallets.get(&user_id).cloned())
    }

    async fn update_wallet(&mut self, wallet: &Wallet) -> StoreResult<()> {
        if self.faults.fail_wallet_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("wallets".to_string()));
        }
        if wallet.balance < Decimal::ZERO {
            return Err(StoreError::Constraint("wallets_balance_check".to_string()));
        }
        match self.working.wallets.get_mut(&wallet.user_id) {
            Some(stored) => *stored = wallet.clone(),
            None => return Ok(()),
        }
        self.working
            .user_balances
            .insert(wallet.user_id, wallet.balance);
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &LedgerTransaction) -> StoreResult<()> {
        if !self.working.wallets.contains_key(&transaction.user_id) {
            return Err(StoreError::Constraint(
                "transactions_user_id_fkey".to_string(),
            ));
        }
        if transaction.amount <= Decimal::ZERO {
            return Err(StoreError::Constraint(
                "transactions_amount_check".to_string(),
            ));
        }
        if self.working.transactions.iter().any(|t| t.id == transaction.id) {
            return Err(StoreError::Conflict("transactions_pkey".to_string()));
        }
        self.working.transactions.push(transaction.clone());
        Ok(())
    }

    async fn ledger_sum(&mut self, user_id: UserId) -> StoreResult<Decimal> {
        Ok(self.working.ledger_sum(user_id))
    }

    async fn insert_deposit(&mut self, deposit: &DepositRequest) -> StoreResult<()> {
        if self
            .working
            .deposits
            .values()
            .any(|d| d.reference_code == deposit.reference_code)
        {
            return Err(StoreError::Conflict(
                "deposit_requests_reference_code_key".to_string(),
            ));
        }
        if self.working.deposits.contains_key(&deposit.id) {
            return Err(StoreError::Conflict("deposit_requests_pkey".to_string()));
        }
        self.working.deposits.insert(deposit.id, deposit.clone());
        Ok(())
    }

    async fn lock_deposit(&mut self, id: Uuid) -> StoreResult<Option<DepositRequest>> {
        Ok(self.working.deposits.get(&id).cloned())
    }

    async fn lock_deposit_by_reference(
        &mut self,
        code: &str,
    ) -> StoreResult<Option<DepositRequest>> {
        Ok(self
            .working
            .deposits
            .values()
            .find(|d| d.reference_code == code)
            .cloned())
    }

    async fn update_deposit(&mut self, deposit: &DepositRequest) -> StoreResult<()> {
        if let Some(stored) = self.working.deposits.get_mut(&deposit.id) {
            *stored = deposit.clone();
        }
        Ok(())
    }

    async fn expire_deposits(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<DepositRequest>> {
        // A captured charge keeps its deposit pending for the operator
        let captured: HashSet<Uuid> = self
            .working
            .externals
            .values()
            .filter(|e| e.external_status == ExternalStatus::Completed)
            .map(|e| e.deposit_request_id)
            .collect();
        let mut expired = Vec::new();
        for deposit in self.working.deposits.values_mut() {
            if deposit.is_stale(now) && !captured.contains(&deposit.id) {
                deposit.status = DepositStatus::Expired;
                deposit.updated_at = now;
                expired.push(deposit.clone());
            }
        }
        Ok(expired)
    }

    async fn insert_external(&mut self, external: &ExternalTransaction) -> StoreResult<()> {
        if self
            .working
            .external_by_charge_id(&external.external_charge_id)
            .is_some()
        {
            return Err(StoreError::Conflict(
                "external_transactions_external_charge_id_key".to_string(),
            ));
        }
        if self
            .working
            .externals
            .values()
            .any(|e| e.deposit_request_id == external.deposit_request_id)
        {
            return Err(StoreError::Conflict(
                "external_transactions_deposit_request_id_key".to_string(),
            ));
        }
        self.working.externals.insert(external.id, external.clone());
        Ok(())
    }

    async fn lock_external_by_charge_id(
        &mut self,
        charge_id: &str,
    ) -> StoreResult<Option<ExternalTransaction>> {
        Ok(self.working.external_by_charge_id(charge_id).cloned())
    }

    async fn update_external(&mut self, external: &ExternalTransaction) -> StoreResult<()> {
        if let Some(stored) = self.working.externals.get_mut(&external.id) {
            *stored = external.clone();
        }
        Ok(())
    }

    async fn insert_payment_reference(&mut self, reference: &PaymentReference) -> StoreResult<()> {
        if self.working.references.contains_key(&reference.code) {
            return Err(StoreError::Conflict(
                "payment_references_code_key".to_string(),
            ));
        }
        self.working
            .references
            .insert(reference.code.clone(), reference.clone());
        Ok(())
    }

    async fn lock_payment_reference(
        &mut self,
        code: &str,
    ) -> StoreResult<Option<PaymentReference>> {
        Ok(self.working.references.get(code).cloned())
    }

    async fn update_payment_reference(&mut self, reference: &PaymentReference) -> StoreResult<()> {
        if let Some(stored) = self.working.references.get_mut(&reference.code) {
            *stored = reference.clone();
        }
        Ok(())
    }

    async fn insert_withdrawal(&mut self, withdrawal: &WithdrawalRequest) -> StoreResult<()> {
        if self
            .working
            .withdrawals
            .values()
            .any(|w| w.reference_code == withdrawal.reference_code)
        {
            return Err(StoreError::Conflict(
                "withdrawal_requests_reference_code_key".to_string(),
            ));
        }
        self.working
            .withdrawals
            .insert(withdrawal.id, withdrawal.clone());
        Ok(())
    }

    async fn lock_withdrawal(&mut self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
        Ok(self.working.withdrawals.get(&id).cloned())
    }

    async fn update_withdrawal(&mut self, withdrawal: &WithdrawalRequest) -> StoreResult<()> {
        if let Some(stored) = self.working.withdrawals.get_mut(&withdrawal.id) {
            *stored = withdrawal.clone();
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnitOfWork {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
