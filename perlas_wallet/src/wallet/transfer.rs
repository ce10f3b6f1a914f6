//! Peer-to-peer transfers with a platform commission.

use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

use super::{
    errors::{WalletError, WalletResult},
    ledger::{self, entry_audit},
    models::{EntryRequest, TransactionType, TransferReceipt, UserId},
};
use crate::audit::{AuditAction, AuditTrail, NewAuditEntry};
use crate::db::Store;

/// Transfer engine
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn Store>,
    audit: AuditTrail,
    commission_rate: Decimal,
}

impl TransferEngine {
    /// Default commission charged to the sender (5%)
    pub fn default_commission_rate() -> Decimal {
        Decimal::new(5, 2)
    }

    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_commission_rate(store, Self::default_commission_rate())
    }

    pub fn with_commission_rate(store: Arc<dyn Store>, commission_rate: Decimal) -> Self {
        Self {
            audit: AuditTrail::new(store.clone()),
            store,
            commission_rate,
        }
    }

    /// Commission for a transfer of `amount`, rounded half-up to cents
    pub fn commission_for(&self, amount: Decimal) -> Decimal {
        (amount * self.commission_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Move `amount` from one wallet to another using the configured rate
    pub async fn send(
        &self,
        from_user_id: UserId,
        to_user_id: UserId,
        amount: Decimal,
    ) -> WalletResult<TransferReceipt> {
        ledger::validate_amount(amount)?;
        self.transfer(from_user_id, to_user_id, amount, self.commission_for(amount))
            .await
    }

    /// Transfer between two wallets
    ///
    /// The sender pays `amount + commission`; the recipient receives `amount`.
    /// Wallets are locked in ascending user id order.
    ///
    /// # Errors
    ///
    /// * `WalletError::SameWallet` - Sender and recipient are the same user
    /// * `WalletError::InsufficientFunds` - Sender cannot cover amount plus commission
    pub async fn transfer(
        &self,
        from_user_id: UserId,
        to_user_id: UserId,
        amount: Decimal,
        commission: Decimal,
    ) -> WalletResult<TransferReceipt> {
        if from_user_id == to_user_id {
            return Err(WalletError::SameWallet);
        }
        ledger::validate_amount(amount)?;
        if !commission.is_zero() {
            ledger::validate_amount(commission)?;
        }

        let mut uow = self.store.begin().await?;
        let (first, second) = if from_user_id < to_user_id {
            (from_user_id, to_user_id)
        } else {
            (to_user_id, from_user_id)
        };
        let first_wallet = ledger::lock_usable_wallet(uow.as_mut(), first).await?;
        let second_wallet = ledger::lock_usable_wallet(uow.as_mut(), second).await?;
        let (mut sender, mut recipient) = if first == from_user_id {
            (first_wallet, second_wallet)
        } else {
            (second_wallet, first_wallet)
        };

        let required = amount
            .checked_add(commission)
            .ok_or(WalletError::InvalidAmount(amount))?;
        if sender.balance < required {
            return Err(WalletError::InsufficientFunds {
                available: sender.balance,
                required,
            });
        }

        let debit = ledger::post_to_locked(
            uow.as_mut(),
            &mut sender,
            EntryRequest::debit(
                from_user_id,
                amount,
                TransactionType::PearlTransfer,
                format!("Transfer to user {}", to_user_id),
                None,
            )
            .between(from_user_id, to_user_id),
        )
        .await?;

        let commission_entry = if commission > Decimal::ZERO {
            Some(
                ledger::post_to_locked(
                    uow.as_mut(),
                    &mut sender,
                    EntryRequest::debit(
                        from_user_id,
                        commission,
                        TransactionType::Commission,
                        "Transfer commission",
                        Some(debit.id.to_string()),
                    ),
                )
                .await?,
            )
        } else {
            None
        };

        let credit = ledger::post_to_locked(
            uow.as_mut(),
            &mut recipient,
            EntryRequest::credit(
                to_user_id,
                amount,
                TransactionType::PearlTransfer,
                format!("Transfer from user {}", from_user_id),
                Some(debit.id.to_string()),
            )
            .between(from_user_id, to_user_id),
        )
        .await?;

        uow.commit().await?;

        log::info!(
            "Transferred {} (+{} commission) from user {} to user {}",
            amount,
            commission,
            from_user_id,
            to_user_id
        );

        let mut audit = vec![
            NewAuditEntry::new(from_user_id.to_string(), AuditAction::Transfer)
                .user(from_user_id)
                .amount(amount)
                .reference(debit.id.to_string())
                .details(serde_json::json!({
                    "to_user_id": to_user_id,
                    "commission": commission,
                })),
            entry_audit(&from_user_id.to_string(), &debit),
            entry_audit(&from_user_id.to_string(), &credit),
        ];
        if let Some(entry) = &commission_entry {
            audit.push(entry_audit(&from_user_id.to_string(), entry));
        }
        self.audit.record(audit).await;

        Ok(TransferReceipt {
            sender,
            recipient,
            debit,
            credit,
            commission: commission_entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::wallet::{WalletConfig, WalletManager};

    async fn setup() -> (WalletManager, TransferEngine) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let wallets = WalletManager::new(store.clone(), WalletConfig::default());
        wallets.open_wallet(1, None, None).await.unwrap();
        wallets.open_wallet(2, None, None).await.unwrap();
        (wallets, TransferEngine::new(store))
    }

    #[test]
    fn test_commission_rounding() {
        let engine = TransferEngine::new(Arc::new(MemoryStore::new()));
        assert_eq!(engine.commission_for(Decimal::new(5000, 2)), Decimal::new(250, 2));
        assert_eq!(engine.commission_for(Decimal::new(1010, 2)), Decimal::new(51, 2));
    }

    #[tokio::test]
    async fn test_same_wallet_rejected() {
        let (_wallets, engine) = setup().await;
        assert!(matches!(
            engine.transfer(1, 1, Decimal::ONE, Decimal::ZERO).await,
            Err(WalletError::SameWallet)
        ));
    }

    #[tokio::test]
    async fn test_zero_commission_records_no_commission_entry() {
        let (wallets, engine) = setup().await;
        wallets
            .credit(2, Decimal::TEN, TransactionType::GameWin, "Prize", None)
            .await
            .unwrap();

        let receipt = engine.transfer(2, 1, Decimal::TEN, Decimal::ZERO).await.unwrap();
        assert!(receipt.commission.is_none());
        assert_eq!(receipt.sender.balance, Decimal::ZERO);
        assert_eq!(receipt.recipient.balance, Decimal::TEN);
    }

    #[tokio::test]
    async fn test_commission_counts_toward_required_funds() {
        let (wallets, engine) = setup().await;
        wallets
            .credit(1, Decimal::TEN, TransactionType::GameWin, "Prize", None)
            .await
            .unwrap();

        let err = engine
            .transfer(1, 2, Decimal::TEN, Decimal::new(50, 2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WalletError::InsufficientFunds { required, .. } if required == Decimal::new(1050, 2)
        ));
        assert_eq!(wallets.get_wallet(1).await.unwrap().balance, Decimal::TEN);
        assert_eq!(wallets.get_wallet(2).await.unwrap().balance, Decimal::ZERO);
    }
}
