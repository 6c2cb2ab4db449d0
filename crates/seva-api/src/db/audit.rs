//! Audit event persistence: an append-only SHA-256 hash chain.
//!
//! Every committed mutation appends an event whose hash covers the
//! previous event's hash. Appends take a transaction-scoped advisory lock
//! so concurrent writers extend the chain one at a time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use seva_core::IdentityId;

/// Hash that precedes the first event.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Advisory lock key serializing chain appends.
const AUDIT_CHAIN_LOCK: i64 = 0x5e7a_a0d1;

/// An audit event to be persisted.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_type: String,
    pub actor_id: Option<IdentityId>,
    pub resource_type: &'static str,
    pub resource_id: Uuid,
    pub action: String,
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        event_type: impl Into<String>,
        actor_id: Option<IdentityId>,
        resource_type: &'static str,
        resource_id: Uuid,
        action: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            actor_id,
            resource_type,
            resource_id,
            action: action.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Append events in order inside the caller's transaction.
pub async fn append_all(conn: &mut PgConnection, events: &[AuditEvent]) -> Result<(), sqlx::Error> {
    if events.is_empty() {
        return Ok(());
    }

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(AUDIT_CHAIN_LOCK)
        .execute(&mut *conn)
        .await?;

    let mut prev: String = sqlx::query_scalar::<_, String>(
        "SELECT event_hash FROM audit_events ORDER BY seq DESC LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await?
    .unwrap_or_else(|| GENESIS_HASH.to_string());

    for event in events {
        let event_hash = chain_hash(&prev, event);
        sqlx::query(
            "INSERT INTO audit_events (id, event_type, actor_id, resource_type, resource_id,
             action, metadata, previous_hash, event_hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(Uuid::new_v4())
        .bind(&event.event_type)
        .bind(event.actor_id.map(|id| id.0))
        .bind(event.resource_type)
        .bind(event.resource_id)
        .bind(&event.action)
        .bind(&event.metadata)
        .bind(&prev)
        .bind(&event_hash)
        .execute(&mut *conn)
        .await?;
        prev = event_hash;
    }
    Ok(())
}

/// Audit events for one resource, oldest first.
pub async fn events_for_resource(
    pool: &PgPool,
    resource_type: &str,
    resource_id: Uuid,
) -> Result<Vec<AuditEventRow>, sqlx::Error> {
    sqlx::query_as::<_, AuditEventRow>(
        "SELECT id, event_type, actor_id, resource_type, resource_id,
         action, metadata, previous_hash, event_hash, created_at
         FROM audit_events
         WHERE resource_type = $1 AND resource_id = $2
         ORDER BY seq ASC",
    )
    .bind(resource_type)
    .bind(resource_id)
    .fetch_all(pool)
    .await
}

/// Recompute the chain over the first `limit` events.
pub async fn verify_chain_integrity(
    pool: &PgPool,
    limit: i64,
) -> Result<ChainIntegrityResult, sqlx::Error> {
    let events = sqlx::query_as::<_, AuditEventRow>(
        "SELECT id, event_type, actor_id, resource_type, resource_id,
         action, metadata, previous_hash, event_hash, created_at
         FROM audit_events ORDER BY seq ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(verify_rows(&events))
}

/// Result of chain integrity verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainIntegrityResult {
    pub total_events: usize,
    pub broken_links: usize,
    pub chain_valid: bool,
}

/// Database row for audit events.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditEventRow {
    pub id: Uuid,
    pub event_type: String,
    pub actor_id: Option<Uuid>,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub action: String,
    pub metadata: serde_json::Value,
    pub previous_hash: String,
    pub event_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A link is broken when an event does not point at its predecessor or
/// its own hash does not recompute.
fn verify_rows(events: &[AuditEventRow]) -> ChainIntegrityResult {
    let mut broken_links = 0;
    let mut expected_prev = GENESIS_HASH;

    for row in events {
        let recomputed = hash_fields(
            &row.previous_hash,
            &ChainFields {
                event_type: &row.event_type,
                actor_id: row.actor_id,
                resource_type: &row.resource_type,
                resource_id: row.resource_id,
                action: &row.action,
                metadata: &row.metadata,
            },
        );
        if row.previous_hash != expected_prev || row.event_hash != recomputed {
            broken_links += 1;
        }
        expected_prev = row.event_hash.as_str();
    }

    ChainIntegrityResult {
        total_events: events.len(),
        broken_links,
        chain_valid: broken_links == 0,
    }
}

/// The event columns covered by the chain hash.
struct ChainFields<'a> {
    event_type: &'a str,
    actor_id: Option<Uuid>,
    resource_type: &'a str,
    resource_id: Uuid,
    action: &'a str,
    metadata: &'a serde_json::Value,
}

fn chain_hash(prev: &str, event: &AuditEvent) -> String {
    hash_fields(
        prev,
        &ChainFields {
            event_type: &event.event_type,
            actor_id: event.actor_id.map(|id| id.0),
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            action: &event.action,
            metadata: &event.metadata,
        },
    )
}

/// SHA-256 over the previous hash and every event column, each followed by
/// a 0x1f separator, hex encoded. A missing actor hashes as the empty
/// string. Metadata hashes as compact JSON; object keys serialize sorted,
/// which is also how they come back out of `jsonb`.
fn hash_fields(prev: &str, fields: &ChainFields<'_>) -> String {
    let actor = fields.actor_id.map(|id| id.to_string()).unwrap_or_default();
    let resource_id = fields.resource_id.to_string();
    let metadata = fields.metadata.to_string();
    let parts: [&str; 7] = [
        prev,
        fields.event_type,
        &actor,
        fields.resource_type,
        &resource_id,
        fields.action,
        &metadata,
    ];

    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\x1f");
    }
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}
