//! Ledger records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use seva_core::{Amount, IdentityId, OrderId, TransactionId};

/// Why a transaction was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Funds added to the wallet. Positive.
    TopUp,
    /// Price of an order. Negative.
    OrderCharge,
    /// Charge returned after an order was rejected. Positive.
    OrderRefund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopUp => "top_up",
            Self::OrderCharge => "order_charge",
            Self::OrderRefund => "order_refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "top_up" => Some(Self::TopUp),
            "order_charge" => Some(Self::OrderCharge),
            "order_refund" => Some(Self::OrderRefund),
            _ => None,
        }
    }
}

/// One signed ledger entry. Positive amounts are credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub identity_id: IdentityId,
    pub amount: Amount,
    pub kind: TransactionKind,
    pub description: String,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}

/// A balance together with the log position it was computed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub identity_id: IdentityId,
    pub balance: Amount,
    pub transaction_count: u64,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

impl BalanceSnapshot {
    /// Whether this snapshot was taken at the same log position as `other`.
    /// A cached balance is trustworthy only if this holds against a fresh
    /// snapshot.
    pub fn reconciles_with(&self, other: &BalanceSnapshot) -> bool {
        self.identity_id == other.identity_id
            && self.transaction_count == other.transaction_count
            && self.last_transaction_at == other.last_transaction_at
    }
}
