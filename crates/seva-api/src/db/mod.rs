//! # Database Persistence
//!
//! Optional Postgres write-through for the in-memory stores. When
//! `DATABASE_URL` is unset the service runs purely in memory.
//!
//! Writes go through [`commit`], which applies a batch of [`Mutation`]s
//! and their audit events in one SQL transaction. Order updates carry the
//! version they were derived from; if the row has moved on, the whole
//! batch is rolled back and [`CommitOutcome::VersionConflict`] is
//! returned.

pub mod audit;
pub mod documents;
pub mod identities;
pub mod orders;
pub mod services;
pub mod settings;
pub mod wallet;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use seva_core::{Identity, ServiceDefinition};
use seva_state::Order;
use seva_vault::Document;
use seva_wallet::WalletTransaction;

use crate::state::PortalSettings;
use audit::AuditEvent;

/// Connect and run embedded migrations. Returns `None` without a URL.
pub async fn init_pool(database_url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let url = match database_url {
        Some(url) if !url.trim().is_empty() => url,
        _ => {
            tracing::info!("DATABASE_URL not set, running with in-memory storage only");
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
    tracing::info!("database connected and migrations applied");
    Ok(Some(pool))
}

/// One row-level write inside a [`commit`].
#[derive(Debug, Clone, Copy)]
pub enum Mutation<'a> {
    InsertIdentity(&'a Identity),
    UpdateIdentity(&'a Identity),
    InsertService(&'a ServiceDefinition),
    UpdateService(&'a ServiceDefinition),
    InsertDocument(&'a Document),
    InsertOrder(&'a Order),
    /// Applied only if the stored row is still at `expected_version`.
    UpdateOrder {
        order: &'a Order,
        expected_version: u64,
    },
    InsertTransaction(&'a WalletTransaction),
    SaveSettings(&'a PortalSettings),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    /// An order row was not at the expected version. Nothing was written.
    VersionConflict,
}

/// Apply `mutations` and append `events` to the audit chain atomically.
pub async fn commit(
    pool: &PgPool,
    mutations: &[Mutation<'_>],
    events: &[AuditEvent],
) -> Result<CommitOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    for mutation in mutations {
        match *mutation {
            Mutation::InsertIdentity(identity) => identities::insert(&mut tx, identity).await?,
            Mutation::UpdateIdentity(identity) => identities::update(&mut tx, identity).await?,
            Mutation::InsertService(service) => services::insert(&mut tx, service).await?,
            Mutation::UpdateService(service) => services::update(&mut tx, service).await?,
            Mutation::InsertDocument(document) => documents::insert(&mut tx, document).await?,
            Mutation::InsertOrder(order) => orders::insert(&mut tx, order).await?,
            Mutation::UpdateOrder {
                order,
                expected_version,
            } => {
                if !orders::update_if_version(&mut tx, order, expected_version).await? {
                    tx.rollback().await?;
                    return Ok(CommitOutcome::VersionConflict);
                }
            }
            Mutation::InsertTransaction(txn) => wallet::insert(&mut tx, txn).await?,
            Mutation::SaveSettings(settings) => settings::save(&mut tx, settings).await?,
        }
    }

    audit::append_all(&mut tx, events).await?;
    tx.commit().await?;
    Ok(CommitOutcome::Applied)
}

// -- Column codecs ------------------------------------------------------------

/// Serialize a value for a JSONB column.
pub(crate) fn to_json<T: Serialize>(
    value: &T,
    column: &str,
) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(column, error = %e, "failed to serialize column");
        sqlx::Error::Encode(Box::new(e))
    })
}

/// Deserialize a JSONB column. A row that does not decode is an error,
/// never a silent default.
pub(crate) fn from_json<T: DeserializeOwned>(
    value: serde_json::Value,
    column: &str,
) -> Result<T, sqlx::Error> {
    serde_json::from_value(value).map_err(|e| {
        tracing::error!(column, error = %e, "stored column does not decode");
        sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        }
    })
}

/// Decode a text enum column with the type's `parse`.
pub(crate) fn parse_text<T>(
    raw: &str,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, sqlx::Error> {
    parse(raw).ok_or_else(|| {
        tracing::error!(column, value = raw, "unknown value in text enum column");
        sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: format!("unknown value '{raw}'").into(),
        }
    })
}

/// Postgres has no unsigned integers.
pub(crate) fn to_i64(value: u64, column: &str) -> Result<i64, sqlx::Error> {
    i64::try_from(value).map_err(|e| sqlx::Error::Encode(format!("{column}: {e}").into()))
}

pub(crate) fn to_u64(value: i64, column: &str) -> Result<u64, sqlx::Error> {
    u64::try_from(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
