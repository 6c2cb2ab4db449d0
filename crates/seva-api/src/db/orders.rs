//! Order persistence (`orders` table).
//!
//! Transition guards live in `seva_state`; SQL only enforces the version
//! compare-and-set and the assignee/status check constraint.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use seva_core::{Amount, IdentityId, OrderId, ServiceId};
use seva_state::{Order, OrderStatus};

use super::{from_json, parse_text, to_i64, to_json, to_u64};

pub async fn insert(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO orders (id, service_id, submitted_by, target_id, status, assigned_staff_id,
         document_ids, rejected_docs, rejection_reason, form_data, output_document_ids, price,
         payment, version, transitions, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
    )
    .bind(order.id.0)
    .bind(order.service_id.0)
    .bind(order.submitted_by.0)
    .bind(order.target_id.0)
    .bind(order.status.as_str())
    .bind(order.assigned_staff_id.map(|id| id.0))
    .bind(to_json(&order.document_ids, "orders.document_ids")?)
    .bind(to_json(&order.rejected_docs, "orders.rejected_docs")?)
    .bind(&order.rejection_reason)
    .bind(to_json(&order.form_data, "orders.form_data")?)
    .bind(to_json(&order.output_document_ids, "orders.output_document_ids")?)
    .bind(order.price.minor())
    .bind(to_json(&order.payment, "orders.payment")?)
    .bind(to_i64(order.version, "orders.version")?)
    .bind(to_json(&order.transitions, "orders.transitions")?)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Write `order` only if the stored row is at `expected_version`.
/// Returns `false` when another writer got there first.
pub async fn update_if_version(
    conn: &mut PgConnection,
    order: &Order,
    expected_version: u64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders SET status = $1, assigned_staff_id = $2, document_ids = $3,
         rejected_docs = $4, rejection_reason = $5, output_document_ids = $6, payment = $7,
         version = $8, transitions = $9, updated_at = $10
         WHERE id = $11 AND version = $12",
    )
    .bind(order.status.as_str())
    .bind(order.assigned_staff_id.map(|id| id.0))
    .bind(to_json(&order.document_ids, "orders.document_ids")?)
    .bind(to_json(&order.rejected_docs, "orders.rejected_docs")?)
    .bind(&order.rejection_reason)
    .bind(to_json(&order.output_document_ids, "orders.output_document_ids")?)
    .bind(to_json(&order.payment, "orders.payment")?)
    .bind(to_i64(order.version, "orders.version")?)
    .bind(to_json(&order.transitions, "orders.transitions")?)
    .bind(order.updated_at)
    .bind(order.id.0)
    .bind(to_i64(expected_version, "orders.version")?)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<Order>, sqlx::Error> {
    let rows = sqlx::query_as::<_, OrderRow>(
        "SELECT id, service_id, submitted_by, target_id, status, assigned_staff_id,
         document_ids, rejected_docs, rejection_reason, form_data, output_document_ids, price,
         payment, version, transitions, created_at, updated_at
         FROM orders ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(OrderRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    service_id: Uuid,
    submitted_by: Uuid,
    target_id: Uuid,
    status: String,
    assigned_staff_id: Option<Uuid>,
    document_ids: serde_json::Value,
    rejected_docs: serde_json::Value,
    rejection_reason: Option<String>,
    form_data: serde_json::Value,
    output_document_ids: serde_json::Value,
    price: i64,
    payment: serde_json::Value,
    version: i64,
    transitions: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_record(self) -> Result<Order, sqlx::Error> {
        let order = Order {
            id: OrderId::from_uuid(self.id),
            service_id: ServiceId::from_uuid(self.service_id),
            submitted_by: IdentityId::from_uuid(self.submitted_by),
            target_id: IdentityId::from_uuid(self.target_id),
            status: parse_text(&self.status, "orders.status", OrderStatus::parse)?,
            assigned_staff_id: self.assigned_staff_id.map(IdentityId::from_uuid),
            document_ids: from_json(self.document_ids, "orders.document_ids")?,
            rejected_docs: from_json(self.rejected_docs, "orders.rejected_docs")?,
            rejection_reason: self.rejection_reason,
            form_data: from_json(self.form_data, "orders.form_data")?,
            output_document_ids: from_json(self.output_document_ids, "orders.output_document_ids")?,
            price: Amount::from_minor(self.price),
            payment: from_json(self.payment, "orders.payment")?,
            version: to_u64(self.version, "orders.version")?,
            transitions: from_json(self.transitions, "orders.transitions")?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        if let Err(broken) = order.check_invariants() {
            tracing::error!(order_id = %order.id, ?broken, "stored order violates invariants");
        }
        Ok(order)
    }
}
