//! Identity registry persistence (`identities` table).

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use seva_core::{Identity, IdentityId, Role};

use super::parse_text;

pub async fn insert(conn: &mut PgConnection, identity: &Identity) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO identities (id, name, phone, father_name, village, profile_image, role,
         revoked_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(identity.id.0)
    .bind(&identity.name)
    .bind(&identity.phone)
    .bind(&identity.father_name)
    .bind(&identity.village)
    .bind(&identity.profile_image)
    .bind(identity.role.as_str())
    .bind(identity.revoked_at)
    .bind(identity.created_at)
    .bind(identity.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Role and revocation are the only mutable columns.
pub async fn update(conn: &mut PgConnection, identity: &Identity) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE identities SET role = $1, revoked_at = $2, updated_at = $3 WHERE id = $4",
    )
    .bind(identity.role.as_str())
    .bind(identity.revoked_at)
    .bind(identity.updated_at)
    .bind(identity.id.0)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<Identity>, sqlx::Error> {
    let rows = sqlx::query_as::<_, IdentityRow>(
        "SELECT id, name, phone, father_name, village, profile_image, role, revoked_at,
         created_at, updated_at
         FROM identities ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(IdentityRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: Uuid,
    name: String,
    phone: String,
    father_name: Option<String>,
    village: Option<String>,
    profile_image: Option<String>,
    role: String,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IdentityRow {
    fn into_record(self) -> Result<Identity, sqlx::Error> {
        Ok(Identity {
            id: IdentityId::from_uuid(self.id),
            name: self.name,
            phone: self.phone,
            father_name: self.father_name,
            village: self.village,
            profile_image: self.profile_image,
            role: parse_text(&self.role, "identities.role", Role::parse)?,
            revoked_at: self.revoked_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
