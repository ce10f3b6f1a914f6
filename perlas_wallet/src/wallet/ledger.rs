//! Balance mutation primitives.
//!
//! These run inside a caller-owned unit of work so that deposit approval,
//! transfers and withdrawals can combine ledger entries with their own writes
//! and still commit or roll back as one.

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::errors::{WalletError, WalletResult};
use super::models::{
    EntryDirection, EntryRequest, LedgerOutcome, LedgerTransaction, TransactionStatus, UserId,
    Wallet,
};
use crate::audit::{AuditAction, NewAuditEntry};
use crate::db::UnitOfWork;

/// Largest balance a NUMERIC(14, 2) column holds
fn max_balance() -> Decimal {
    Decimal::new(999_999_999_999_99, 2)
}

/// Amounts are positive, at most two decimal places, and fit a balance column
pub fn validate_amount(amount: Decimal) -> WalletResult<()> {
    if amount <= Decimal::ZERO || amount > max_balance() || amount.normalize().scale() > 2 {
        return Err(WalletError::InvalidAmount(amount));
    }
    Ok(())
}

/// A wallet takes ledger entries only while active and not frozen
pub fn ensure_usable(wallet: &Wallet) -> WalletResult<()> {
    if !wallet.is_active {
        return Err(WalletError::WalletInactive(wallet.user_id));
    }
    if wallet.is_frozen {
        return Err(WalletError::WalletFrozen(wallet.user_id));
    }
    Ok(())
}

/// Lock a wallet row, failing if it is missing
pub async fn lock_wallet(uow: &mut dyn UnitOfWork, user_id: UserId) -> WalletResult<Wallet> {
    uow.lock_wallet(user_id)
        .await?
        .ok_or(WalletError::WalletNotFound(user_id))
}

/// Lock a wallet row that must accept ledger entries
pub async fn lock_usable_wallet(
    uow: &mut dyn UnitOfWork,
    user_id: UserId,
) -> WalletResult<Wallet> {
    let wallet = lock_wallet(uow, user_id).await?;
    ensure_usable(&wallet)?;
    Ok(wallet)
}

/// Apply an entry to a wallet already locked by this unit of work.
///
/// The wallet row is written before the ledger row, so a failed wallet write
/// never leaves an orphan entry behind.
pub async fn post_to_locked(
    uow: &mut dyn UnitOfWork,
    wallet: &mut Wallet,
    entry: EntryRequest,
) -> WalletResult<LedgerTransaction> {
    validate_amount(entry.amount)?;

    let new_balance = match entry.direction {
        EntryDirection::Credit => wallet
            .balance
            .checked_add(entry.amount)
            .filter(|b| *b <= max_balance())
            .ok_or(WalletError::BalanceOverflow(wallet.user_id))?,
        EntryDirection::Debit => {
            if wallet.balance < entry.amount {
                return Err(WalletError::InsufficientFunds {
                    available: wallet.balance,
                    required: entry.amount,
                });
            }
            wallet.balance - entry.amount
        }
    };

    let now = Utc::now();
    wallet.balance = new_balance;
    wallet.updated_at = now;
    uow.update_wallet(wallet).await?;

    let transaction = LedgerTransaction {
        id: Uuid::new_v4(),
        user_id: wallet.user_id,
        transaction_type: entry.transaction_type,
        direction: entry.direction,
        amount: entry.amount,
        balance_after: new_balance,
        status: TransactionStatus::Completed,
        description: entry.description,
        reference_id: entry.reference_id,
        from_user_id: entry.from_user_id,
        to_user_id: entry.to_user_id,
        created_at: now,
    };
    uow.insert_transaction(&transaction).await?;

    Ok(transaction)
}

/// Lock the entry's wallet and apply the entry
pub async fn post_entry(
    uow: &mut dyn UnitOfWork,
    entry: EntryRequest,
) -> WalletResult<LedgerOutcome> {
    validate_amount(entry.amount)?;
    let mut wallet = lock_usable_wallet(uow, entry.user_id).await?;
    let transaction = post_to_locked(uow, &mut wallet, entry).await?;
    Ok(LedgerOutcome {
        wallet,
        transaction,
    })
}

/// Audit record describing a posted ledger entry
pub fn entry_audit(actor: &str, transaction: &LedgerTransaction) -> NewAuditEntry {
    let action = match transaction.direction {
        EntryDirection::Credit => AuditAction::Credit,
        EntryDirection::Debit => AuditAction::Debit,
    };
    let mut audit = NewAuditEntry::new(actor, action)
        .user(transaction.user_id)
        .amount(transaction.amount)
        .details(serde_json::json!({
            "transaction_id": transaction.id,
            "transaction_type": transaction.transaction_type.to_string(),
            "balance_after": transaction.balance_after,
        }));
    if let Some(reference_id) = &transaction.reference_id {
        audit = audit.reference(reference_id.clone());
    }
    audit
}
