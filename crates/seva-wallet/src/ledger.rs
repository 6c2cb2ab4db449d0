//! # Wallet Ledger
//!
//! In-process authority for wallet transactions, keyed by identity.
//!
//! ## Rules
//!
//! - Top-ups must be strictly positive.
//! - A charge never takes a balance below zero; it fails with
//!   `InsufficientFunds` instead.
//! - An order is charged at most once and refunded at most once, and only
//!   after it was charged.
//! - Arithmetic is checked. An overflowing sum is an error, not a wrap.

use std::collections::HashMap;

use chrono::Utc;
use thiserror::Error;

use seva_core::{Amount, IdentityId, OrderId, SevaError, TransactionId};

use crate::transaction::{BalanceSnapshot, TransactionKind, WalletTransaction};

/// Errors raised by ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("amount must be positive, got {amount}")]
    NonPositiveAmount { amount: Amount },

    #[error("insufficient funds for {identity_id}: {required} required, {available} available")]
    InsufficientFunds {
        identity_id: IdentityId,
        required: Amount,
        available: Amount,
    },

    #[error("{order_id} has already been charged")]
    AlreadyCharged { order_id: OrderId },

    #[error("{order_id} has no outstanding charge to refund")]
    NothingToRefund { order_id: OrderId },

    #[error("balance arithmetic overflow for {identity_id}")]
    Overflow { identity_id: IdentityId },
}

impl From<WalletError> for SevaError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::InsufficientFunds {
                required,
                available,
                ..
            } => SevaError::InsufficientFunds {
                required,
                available,
            },
            WalletError::AlreadyCharged { .. } | WalletError::NothingToRefund { .. } => {
                SevaError::StateConflict(err.to_string())
            }
            WalletError::NonPositiveAmount { .. } | WalletError::Overflow { .. } => {
                SevaError::validation(err.to_string())
            }
        }
    }
}

/// Append-only transaction log for every wallet.
#[derive(Debug, Default, Clone)]
pub struct WalletLedger {
    entries: HashMap<IdentityId, Vec<WalletTransaction>>,
}

impl WalletLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted transactions. Order within an identity is
    /// restored by `created_at`.
    pub fn from_transactions(transactions: impl IntoIterator<Item = WalletTransaction>) -> Self {
        let mut entries: HashMap<IdentityId, Vec<WalletTransaction>> = HashMap::new();
        for txn in transactions {
            entries.entry(txn.identity_id).or_default().push(txn);
        }
        for log in entries.values_mut() {
            log.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
        Self { entries }
    }

    /// The current balance: the sum of every transaction.
    pub fn balance(&self, identity_id: IdentityId) -> Result<Amount, WalletError> {
        self.log(identity_id)
            .iter()
            .try_fold(Amount::ZERO, |acc, txn| acc.checked_add(txn.amount))
            .ok_or(WalletError::Overflow { identity_id })
    }

    /// Transactions, newest first.
    pub fn transactions(&self, identity_id: IdentityId) -> Vec<WalletTransaction> {
        let mut txns = self.log(identity_id).to_vec();
        txns.reverse();
        txns
    }

    pub fn snapshot(&self, identity_id: IdentityId) -> Result<BalanceSnapshot, WalletError> {
        let log = self.log(identity_id);
        Ok(BalanceSnapshot {
            identity_id,
            balance: self.balance(identity_id)?,
            transaction_count: log.len() as u64,
            last_transaction_at: log.last().map(|t| t.created_at),
        })
    }

    /// The charge recorded against an order, if any.
    pub fn charge_for_order(
        &self,
        identity_id: IdentityId,
        order_id: OrderId,
    ) -> Option<&WalletTransaction> {
        self.log(identity_id)
            .iter()
            .find(|t| t.order_id == Some(order_id) && t.kind == TransactionKind::OrderCharge)
    }

    // ── prepare ─────────────────────────────────────────────────────

    /// Build a top-up transaction.
    pub fn prepare_credit(
        &self,
        identity_id: IdentityId,
        amount: Amount,
        description: &str,
    ) -> Result<WalletTransaction, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::NonPositiveAmount { amount });
        }
        self.balance(identity_id)?
            .checked_add(amount)
            .ok_or(WalletError::Overflow { identity_id })?;
        Ok(new_transaction(
            identity_id,
            amount,
            TransactionKind::TopUp,
            description,
            None,
        ))
    }

    /// Build the charge for an order after checking the balance covers it.
    pub fn prepare_charge(
        &self,
        identity_id: IdentityId,
        order_id: OrderId,
        price: Amount,
    ) -> Result<WalletTransaction, WalletError> {
        if !price.is_positive() {
            return Err(WalletError::NonPositiveAmount { amount: price });
        }
        if self.charge_for_order(identity_id, order_id).is_some() {
            return Err(WalletError::AlreadyCharged { order_id });
        }
        let available = self.balance(identity_id)?;
        if available < price {
            return Err(WalletError::InsufficientFunds {
                identity_id,
                required: price,
                available,
            });
        }
        let amount = price
            .checked_neg()
            .ok_or(WalletError::Overflow { identity_id })?;
        Ok(new_transaction(
            identity_id,
            amount,
            TransactionKind::OrderCharge,
            &format!("Payment for {order_id}"),
            Some(order_id),
        ))
    }

    /// Build the refund of an order's charge.
    pub fn prepare_refund(
        &self,
        identity_id: IdentityId,
        order_id: OrderId,
    ) -> Result<WalletTransaction, WalletError> {
        let charge = self
            .charge_for_order(identity_id, order_id)
            .ok_or(WalletError::NothingToRefund { order_id })?;
        let already_refunded = self
            .log(identity_id)
            .iter()
            .any(|t| t.order_id == Some(order_id) && t.kind == TransactionKind::OrderRefund);
        if already_refunded {
            return Err(WalletError::NothingToRefund { order_id });
        }
        let amount = charge
            .amount
            .checked_neg()
            .ok_or(WalletError::Overflow { identity_id })?;
        self.balance(identity_id)?
            .checked_add(amount)
            .ok_or(WalletError::Overflow { identity_id })?;
        Ok(new_transaction(
            identity_id,
            amount,
            TransactionKind::OrderRefund,
            &format!("Refund for {order_id}"),
            Some(order_id),
        ))
    }

    // ── commit ──────────────────────────────────────────────────────

    /// Append a prepared transaction. Re-checks the overdraft rule so a
    /// transaction prepared against a stale view cannot slip through.
    pub fn append(&mut self, txn: WalletTransaction) -> Result<(), WalletError> {
        let identity_id = txn.identity_id;
        let next = self
            .balance(identity_id)?
            .checked_add(txn.amount)
            .ok_or(WalletError::Overflow { identity_id })?;
        if txn.amount.is_negative() && next.is_negative() {
            return Err(WalletError::InsufficientFunds {
                identity_id,
                required: txn.amount.checked_neg().unwrap_or(txn.amount),
                available: self.balance(identity_id)?,
            });
        }
        self.entries.entry(identity_id).or_default().push(txn);
        Ok(())
    }

    // ── one-step conveniences ───────────────────────────────────────

    pub fn add_funds(
        &mut self,
        identity_id: IdentityId,
        amount: Amount,
        description: &str,
    ) -> Result<WalletTransaction, WalletError> {
        let txn = self.prepare_credit(identity_id, amount, description)?;
        self.append(txn.clone())?;
        Ok(txn)
    }

    pub fn debit_for_order(
        &mut self,
        identity_id: IdentityId,
        order_id: OrderId,
        price: Amount,
    ) -> Result<WalletTransaction, WalletError> {
        let txn = self.prepare_charge(identity_id, order_id, price)?;
        self.append(txn.clone())?;
        Ok(txn)
    }

    pub fn refund_order(
        &mut self,
        identity_id: IdentityId,
        order_id: OrderId,
    ) -> Result<WalletTransaction, WalletError> {
        let txn = self.prepare_refund(identity_id, order_id)?;
        self.append(txn.clone())?;
        Ok(txn)
    }

    fn log(&self, identity_id: IdentityId) -> &[WalletTransaction] {
        self.entries
            .get(&identity_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn new_transaction(
    identity_id: IdentityId,
    amount: Amount,
    kind: TransactionKind,
    description: &str,
    order_id: Option<OrderId>,
) -> WalletTransaction {
    WalletTransaction {
        id: TransactionId::new(),
        identity_id,
        amount,
        kind,
        description: description.to_string(),
        order_id,
        created_at: Utc::now(),
    }
}
