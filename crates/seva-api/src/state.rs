//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor.
//!
//! The in-memory stores are the in-process authority. When a database is
//! configured, every mutation is written to Postgres first and committed
//! here only after the SQL transaction succeeds (see `orchestration`).
//!
//! ## Locks
//!
//! - `parking_lot` locks guard the stores and the ledger. They are never
//!   held across `.await`.
//! - `wallet_gate` is a `tokio::sync::Mutex` held across the database
//!   write of any operation that touches a wallet, so a balance check and
//!   the append it justifies cannot interleave with another charge.
//! - `registry_gate` serializes identity, catalog and settings writes,
//!   which keeps phone numbers unique.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use utoipa::ToSchema;

use seva_core::{Identity, IdentityId, OrderId, ServiceDefinition, ServiceId};
use seva_state::Order;
use seva_vault::{BlobStore, FsBlobStore, MemoryBlobStore, Vault};
use seva_wallet::WalletLedger;

use crate::config::AppConfig;

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// All operations are synchronous because the lock is never held across an
/// `.await`. `parking_lot::RwLock` does not poison on panic.
#[derive(Debug)]
pub struct Store<K, T> {
    data: Arc<RwLock<HashMap<K, T>>>,
}

impl<K, T> Clone for Store<K, T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<K: Eq + Hash + Copy, T: Clone> Store<K, T> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: K, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    pub fn get(&self, id: &K) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// Records matching `pred`, cloned under one read lock.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.data.read().values().filter(|v| pred(v)).cloned().collect()
    }

    pub fn any(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.data.read().values().any(pred)
    }

    /// Atomically read-validate-update a record.
    ///
    /// The closure runs under a single write lock, so a version check and
    /// the write it guards cannot be separated. Returns `None` if the
    /// record does not exist.
    pub fn try_update<R, E>(
        &self,
        id: &K,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().get_mut(id).map(f)
    }

    /// Replace the contents with `records`.
    pub fn load(&self, records: impl IntoIterator<Item = (K, T)>) {
        let mut guard = self.data.write();
        guard.clear();
        guard.extend(records);
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Copy, T: Clone> Default for Store<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Portal settings ----------------------------------------------------------

/// Read-mostly configuration record fetched per request. No workflow rule
/// depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PortalSettings {
    /// Banner shown to every signed-in user.
    pub broadcast_message: Option<String>,
    pub support_phone: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            broadcast_message: None,
            support_phone: None,
            updated_at: Utc::now(),
        }
    }
}

// -- AppState -----------------------------------------------------------------

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub identities: Store<IdentityId, Identity>,
    pub services: Store<ServiceId, ServiceDefinition>,
    pub orders: Store<OrderId, Order>,
    pub vault: Arc<Vault>,
    pub ledger: Arc<RwLock<WalletLedger>>,
    pub settings: Arc<RwLock<PortalSettings>>,
    pub wallet_gate: Arc<tokio::sync::Mutex<()>>,
    pub registry_gate: Arc<tokio::sync::Mutex<()>>,
    /// When `Some`, every mutation is written through to Postgres.
    pub db_pool: Option<PgPool>,
    /// Renders `/metrics` when a Prometheus recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("identities", &self.identities.len())
            .field("services", &self.services.len())
            .field("orders", &self.orders.len())
            .field("documents", &self.vault.len())
            .field("db", &self.db_pool.is_some())
            .finish()
    }
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    /// Build state from configuration and an optional database pool.
    pub fn with_config(config: AppConfig, db_pool: Option<PgPool>) -> Self {
        let blobs: Arc<dyn BlobStore> = match &config.document_root {
            Some(root) => Arc::new(FsBlobStore::new(root.clone())),
            None => Arc::new(MemoryBlobStore::new()),
        };
        let vault = Vault::new(blobs, config.max_upload_bytes);
        Self {
            config: Arc::new(config),
            identities: Store::new(),
            services: Store::new(),
            orders: Store::new(),
            vault: Arc::new(vault),
            ledger: Arc::new(RwLock::new(WalletLedger::new())),
            settings: Arc::new(RwLock::new(PortalSettings::default())),
            wallet_gate: Arc::new(tokio::sync::Mutex::new(())),
            registry_gate: Arc::new(tokio::sync::Mutex::new(())),
            db_pool,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Load every persisted record into the in-memory stores. No-op
    /// without a database.
    pub async fn hydrate_from_db(&self) -> Result<(), sqlx::Error> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let identities = crate::db::identities::load_all(pool).await?;
        let identity_count = identities.len();
        self.identities
            .load(identities.into_iter().map(|i| (i.id, i)));

        let services = crate::db::services::load_all(pool).await?;
        let service_count = services.len();
        self.services.load(services.into_iter().map(|s| (s.id, s)));

        let documents = crate::db::documents::load_all(pool).await?;
        let document_count = documents.len();
        self.vault.load(documents);

        let orders = crate::db::orders::load_all(pool).await?;
        let order_count = orders.len();
        self.orders.load(orders.into_iter().map(|o| (o.id, o)));

        let transactions = crate::db::wallet::load_all(pool).await?;
        let transaction_count = transactions.len();
        *self.ledger.write() = WalletLedger::from_transactions(transactions);

        if let Some(settings) = crate::db::settings::load(pool).await? {
            *self.settings.write() = settings;
        }

        tracing::info!(
            identities = identity_count,
            services = service_count,
            documents = document_count,
            orders = order_count,
            wallet_transactions = transaction_count,
            "hydrated in-memory stores from database"
        );
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
