//! Service catalog persistence (`services` table).

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use seva_core::{Amount, ServiceDefinition, ServiceId};

use super::{from_json, to_json};

pub async fn insert(
    conn: &mut PgConnection,
    service: &ServiceDefinition,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO services (id, name, price_normal, price_b2b, required_documents,
         form_schema, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(service.id.0)
    .bind(&service.name)
    .bind(service.price_normal.minor())
    .bind(service.price_b2b.minor())
    .bind(to_json(&service.required_documents, "services.required_documents")?)
    .bind(to_json(&service.form_schema, "services.form_schema")?)
    .bind(service.created_at)
    .bind(service.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update(
    conn: &mut PgConnection,
    service: &ServiceDefinition,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE services SET name = $1, price_normal = $2, price_b2b = $3,
         required_documents = $4, form_schema = $5, updated_at = $6
         WHERE id = $7",
    )
    .bind(&service.name)
    .bind(service.price_normal.minor())
    .bind(service.price_b2b.minor())
    .bind(to_json(&service.required_documents, "services.required_documents")?)
    .bind(to_json(&service.form_schema, "services.form_schema")?)
    .bind(service.updated_at)
    .bind(service.id.0)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<ServiceDefinition>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ServiceRow>(
        "SELECT id, name, price_normal, price_b2b, required_documents, form_schema,
         created_at, updated_at
         FROM services ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ServiceRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id: Uuid,
    name: String,
    price_normal: i64,
    price_b2b: i64,
    required_documents: serde_json::Value,
    form_schema: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ServiceRow {
    fn into_record(self) -> Result<ServiceDefinition, sqlx::Error> {
        Ok(ServiceDefinition {
            id: ServiceId::from_uuid(self.id),
            name: self.name,
            price_normal: Amount::from_minor(self.price_normal),
            price_b2b: Amount::from_minor(self.price_b2b),
            required_documents: from_json(self.required_documents, "services.required_documents")?,
            form_schema: from_json(self.form_schema, "services.form_schema")?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
