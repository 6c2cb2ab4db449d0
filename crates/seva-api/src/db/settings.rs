//! Portal settings persistence (single-row `portal_settings` table).

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::state::PortalSettings;

pub async fn save(conn: &mut PgConnection, settings: &PortalSettings) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO portal_settings (id, broadcast_message, support_phone, updated_at)
         VALUES (1, $1, $2, $3)
         ON CONFLICT (id) DO UPDATE SET broadcast_message = EXCLUDED.broadcast_message,
         support_phone = EXCLUDED.support_phone, updated_at = EXCLUDED.updated_at",
    )
    .bind(&settings.broadcast_message)
    .bind(&settings.support_phone)
    .bind(settings.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn load(pool: &PgPool) -> Result<Option<PortalSettings>, sqlx::Error> {
    let row = sqlx::query_as::<_, SettingsRow>(
        "SELECT broadcast_message, support_phone, updated_at FROM portal_settings WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| PortalSettings {
        broadcast_message: r.broadcast_message,
        support_phone: r.support_phone,
        updated_at: r.updated_at,
    }))
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    broadcast_message: Option<String>,
    support_phone: Option<String>,
    updated_at: DateTime<Utc>,
}
