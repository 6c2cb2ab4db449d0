//! Wallet ledger persistence (`wallet_transactions` table). Append-only.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use seva_core::{Amount, IdentityId, OrderId, TransactionId};
use seva_wallet::{TransactionKind, WalletTransaction};

use super::parse_text;

pub async fn insert(conn: &mut PgConnection, txn: &WalletTransaction) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO wallet_transactions (id, identity_id, amount, kind, description, order_id,
         created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(txn.id.0)
    .bind(txn.identity_id.0)
    .bind(txn.amount.minor())
    .bind(txn.kind.as_str())
    .bind(&txn.description)
    .bind(txn.order_id.map(|id| id.0))
    .bind(txn.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<WalletTransaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        "SELECT id, identity_id, amount, kind, description, order_id, created_at
         FROM wallet_transactions ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TransactionRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    identity_id: Uuid,
    amount: i64,
    kind: String,
    description: String,
    order_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_record(self) -> Result<WalletTransaction, sqlx::Error> {
        Ok(WalletTransaction {
            id: TransactionId::from_uuid(self.id),
            identity_id: IdentityId::from_uuid(self.identity_id),
            amount: Amount::from_minor(self.amount),
            kind: parse_text(&self.kind, "wallet_transactions.kind", TransactionKind::parse)?,
            description: self.description,
            order_id: self.order_id.map(OrderId::from_uuid),
            created_at: self.created_at,
        })
    }
}
