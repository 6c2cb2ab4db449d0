//! # Workflow Orchestration
//!
//! Every write the API performs goes through this module. Route handlers
//! authorize the caller and translate DTOs; the functions here load the
//! records, apply the domain transition, persist, and commit.
//!
//! ## Commit protocol
//!
//! 1. Snapshot the order and remember its `version`.
//! 2. Apply the transition to a clone. For operations that move money,
//!    the wallet charge or refund is prepared against the ledger in the
//!    same step, under `wallet_gate`.
//! 3. With a database: write the order row (guarded by `version`), the
//!    wallet transaction and the audit events in one SQL transaction.
//! 4. Swap the clone into the in-memory store if the stored version is
//!    still the one read in step 1, then append the wallet transaction.
//!
//! A version mismatch at step 3 or 4 re-runs from step 1, so a staff member
//! who loses a claim race sees the winner's assignment and gets
//! `AlreadyClaimed`. A guard failure at step 2 returns before anything is
//! written. A database failure returns `StorageFailure` with no in-memory
//! change.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::json;

use seva_core::{
    Amount, DocTag, DocumentId, FieldViolation, Identity, IdentityError, IdentityId, OrderId,
    Role, ServiceDefinition, ServiceId, ServiceRevision, SevaError, ValidationFailure,
};
use seva_state::{
    select, DocumentRef, Order, OrderAction, OrderFilter, PaymentState, Submission,
};
use seva_vault::{Document, Upload, Vault};
use seva_wallet::{BalanceSnapshot, WalletLedger, WalletTransaction};

use crate::db::audit::AuditEvent;
use crate::db::{self, CommitOutcome, Mutation};
use crate::middleware::metrics::{record_transition, record_wallet_transaction};
use crate::state::{AppState, PortalSettings};

/// Commit attempts before a transition gives up with `StateConflict`.
const MAX_COMMIT_ATTEMPTS: usize = 3;

// ── Lookups ─────────────────────────────────────────────────────────────────

pub fn identity(state: &AppState, id: IdentityId) -> Result<Identity, SevaError> {
    state
        .identities
        .get(&id)
        .ok_or_else(|| SevaError::NotFound(format!("{id} not found")))
}

pub fn service(state: &AppState, id: ServiceId) -> Result<ServiceDefinition, SevaError> {
    state
        .services
        .get(&id)
        .ok_or_else(|| SevaError::NotFound(format!("{id} not found")))
}

pub fn order(state: &AppState, id: OrderId) -> Result<Order, SevaError> {
    state
        .orders
        .get(&id)
        .ok_or_else(|| SevaError::NotFound(format!("{id} not found")))
}

pub fn document(state: &AppState, id: DocumentId) -> Result<Document, SevaError> {
    state.vault.require(id).map_err(SevaError::from)
}

/// Bridge the vault index to the order state machine.
fn document_resolver(vault: &Vault) -> impl Fn(DocumentId) -> Option<DocumentRef> + '_ {
    move |id| {
        vault.get(id).map(|doc| DocumentRef {
            owner_id: doc.owner_id,
            type_tag: doc.type_tag,
        })
    }
}

fn parse_tag(raw: &str) -> Result<DocTag, SevaError> {
    DocTag::new(raw).map_err(|problem| {
        SevaError::ValidationFailed(ValidationFailure::with_fields(
            "invalid document tag",
            vec![FieldViolation::new("doc_tag", problem)],
        ))
    })
}

// ── Persistence ─────────────────────────────────────────────────────────────

async fn persist(
    state: &AppState,
    mutations: &[Mutation<'_>],
    events: &[AuditEvent],
) -> Result<CommitOutcome, SevaError> {
    match &state.db_pool {
        None => Ok(CommitOutcome::Applied),
        Some(pool) => db::commit(pool, mutations, events).await.map_err(|e| {
            tracing::error!(error = %e, "database write failed, nothing applied");
            SevaError::StorageFailure(e.to_string())
        }),
    }
}

/// Persist a write that has no version guard. A conflict here would mean
/// an order update slipped into a batch that does not expect one.
async fn persist_unguarded(
    state: &AppState,
    mutations: &[Mutation<'_>],
    events: &[AuditEvent],
) -> Result<(), SevaError> {
    match persist(state, mutations, events).await? {
        CommitOutcome::Applied => Ok(()),
        CommitOutcome::VersionConflict => Err(SevaError::StateConflict(
            "record was modified concurrently; refresh and retry".to_string(),
        )),
    }
}

fn wallet_event(actor: Option<IdentityId>, txn: &WalletTransaction) -> AuditEvent {
    let kind = txn.kind.as_str();
    AuditEvent::new("wallet", actor, "wallet_transaction", txn.id.0, kind).with_metadata(json!({
        "identity_id": txn.identity_id,
        "amount": txn.amount.minor(),
        "order_id": txn.order_id,
    }))
}

/// Append a committed transaction to the in-memory ledger. Callers hold
/// `wallet_gate`, so the balance the transaction was prepared against has
/// not moved.
///
/// A refusal here means the durable ledger and the in-memory view have
/// diverged. The caller gets `StorageFailure` rather than a success that
/// the balance endpoints would contradict.
fn append_to_ledger(state: &AppState, txn: WalletTransaction) -> Result<(), SevaError> {
    let kind = txn.kind;
    let txn_id = txn.id;
    state.ledger.write().append(txn).map_err(|e| {
        tracing::error!(
            transaction_id = %txn_id,
            error = %e,
            "committed wallet transaction rejected by ledger"
        );
        SevaError::StorageFailure(format!(
            "wallet transaction {txn_id} was stored but could not be applied: {e}"
        ))
    })?;
    record_wallet_transaction(kind.as_str());
    Ok(())
}

// ── Identity registry ───────────────────────────────────────────────────────

/// Profile fields for a new identity.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub name: String,
    pub phone: String,
    pub role: Role,
    pub father_name: Option<String>,
    pub village: Option<String>,
}

/// Register an identity. Phone numbers are unique across the registry.
pub async fn register_identity(
    state: &AppState,
    actor: Option<IdentityId>,
    profile: NewIdentity,
) -> Result<Identity, SevaError> {
    let identity = Identity::register(
        &profile.name,
        &profile.phone,
        profile.role,
        profile.father_name,
        profile.village,
    )?;

    let _gate = state.registry_gate.lock().await;
    if state.identities.any(|i| i.phone == identity.phone) {
        return Err(IdentityError::DuplicatePhone {
            phone: identity.phone,
        }
        .into());
    }

    let event = AuditEvent::new("identity", actor, "identity", identity.id.0, "register")
        .with_metadata(json!({ "role": identity.role }));
    persist_unguarded(state, &[Mutation::InsertIdentity(&identity)], &[event]).await?;
    state.identities.insert(identity.id, identity.clone());

    tracing::info!(identity_id = %identity.id, role = %identity.role, "identity registered");
    Ok(identity)
}

pub async fn change_role(
    state: &AppState,
    actor: Option<IdentityId>,
    id: IdentityId,
    role: Role,
) -> Result<Identity, SevaError> {
    let _gate = state.registry_gate.lock().await;
    let mut updated = identity(state, id)?;
    let previous = updated.role;
    updated.change_role(role)?;

    let event = AuditEvent::new("identity", actor, "identity", id.0, "change_role")
        .with_metadata(json!({ "from": previous, "to": role }));
    persist_unguarded(state, &[Mutation::UpdateIdentity(&updated)], &[event]).await?;
    state.identities.insert(id, updated.clone());

    tracing::info!(identity_id = %id, from = %previous, to = %role, "identity role changed");
    Ok(updated)
}

/// Soft-revoke. Orders and ledger entries referencing the identity stay.
pub async fn revoke_identity(
    state: &AppState,
    actor: Option<IdentityId>,
    id: IdentityId,
) -> Result<Identity, SevaError> {
    let _gate = state.registry_gate.lock().await;
    let mut updated = identity(state, id)?;
    if !updated.is_active() {
        return Ok(updated);
    }
    updated.revoke();

    let event = AuditEvent::new("identity", actor, "identity", id.0, "revoke");
    persist_unguarded(state, &[Mutation::UpdateIdentity(&updated)], &[event]).await?;
    state.identities.insert(id, updated.clone());

    tracing::info!(identity_id = %id, "identity revoked");
    Ok(updated)
}

// ── Service catalog ─────────────────────────────────────────────────────────

pub async fn create_service(
    state: &AppState,
    actor: Option<IdentityId>,
    revision: ServiceRevision,
) -> Result<ServiceDefinition, SevaError> {
    let service = ServiceDefinition::new(revision)?;

    let event = AuditEvent::new("service", actor, "service", service.id.0, "create");
    let _gate = state.registry_gate.lock().await;
    persist_unguarded(state, &[Mutation::InsertService(&service)], &[event]).await?;
    state.services.insert(service.id, service.clone());

    tracing::info!(service_id = %service.id, name = %service.name, "service created");
    Ok(service)
}

/// Apply an additive revision. Existing orders keep the document set and
/// price they were submitted with.
pub async fn revise_service(
    state: &AppState,
    actor: Option<IdentityId>,
    id: ServiceId,
    revision: ServiceRevision,
) -> Result<ServiceDefinition, SevaError> {
    let _gate = state.registry_gate.lock().await;
    let mut updated = service(state, id)?;
    updated.revise(revision)?;

    let event = AuditEvent::new("service", actor, "service", id.0, "revise");
    persist_unguarded(state, &[Mutation::UpdateService(&updated)], &[event]).await?;
    state.services.insert(id, updated.clone());

    tracing::info!(service_id = %id, "service revised");
    Ok(updated)
}

// ── Document vault ──────────────────────────────────────────────────────────

/// Store a document in `owner`'s vault. The bytes are written before the
/// record; a failed record write leaves an unreferenced blob, never a
/// record without content.
pub async fn upload_document(
    state: &AppState,
    uploader_id: IdentityId,
    owner_id: IdentityId,
    upload: Upload<'_>,
) -> Result<Document, SevaError> {
    let uploader = identity(state, uploader_id)?;
    let owner = identity(state, owner_id)?;
    let document = state.vault.prepare_upload(&uploader, &owner, upload)?;

    let event = AuditEvent::new("document", Some(uploader_id), "document", document.id.0, "upload")
        .with_metadata(json!({
            "owner_id": owner_id,
            "type_tag": document.type_tag,
            "content_digest": document.content_digest.to_hex(),
        }));
    persist_unguarded(state, &[Mutation::InsertDocument(&document)], &[event]).await?;
    state.vault.commit(document.clone());

    tracing::info!(
        document_id = %document.id,
        owner_id = %owner_id,
        uploaded_by = %uploader_id,
        size_bytes = document.size_bytes,
        "document uploaded"
    );
    Ok(document)
}

// ── Wallet ──────────────────────────────────────────────────────────────────

pub async fn add_funds(
    state: &AppState,
    actor: Option<IdentityId>,
    identity_id: IdentityId,
    amount: Amount,
    description: &str,
) -> Result<WalletTransaction, SevaError> {
    identity(state, identity_id)?.require_active()?;

    let _gate = state.wallet_gate.lock().await;
    let txn = state
        .ledger
        .read()
        .prepare_credit(identity_id, amount, description)?;

    persist_unguarded(
        state,
        &[Mutation::InsertTransaction(&txn)],
        &[wallet_event(actor, &txn)],
    )
    .await?;
    append_to_ledger(state, txn.clone())?;

    tracing::info!(identity_id = %identity_id, amount = %amount, "wallet funded");
    Ok(txn)
}

pub fn balance(state: &AppState, identity_id: IdentityId) -> Result<BalanceSnapshot, SevaError> {
    identity(state, identity_id)?;
    Ok(state.ledger.read().snapshot(identity_id)?)
}

/// Balance and transactions (newest first), read under one ledger guard so
/// the statement always sums to the balance.
pub fn statement(
    state: &AppState,
    identity_id: IdentityId,
) -> Result<(Amount, Vec<WalletTransaction>), SevaError> {
    identity(state, identity_id)?;
    let ledger = state.ledger.read();
    Ok((ledger.balance(identity_id)?, ledger.transactions(identity_id)))
}

// ── Orders ──────────────────────────────────────────────────────────────────

/// Input to [`submit_order`].
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub service_id: ServiceId,
    pub target_id: Option<IdentityId>,
    pub form_data: BTreeMap<String, String>,
    pub document_refs: BTreeMap<String, DocumentId>,
    /// Charge the submitter's wallet now instead of on completion.
    pub pay_now: bool,
}

/// Create an order in `received`. With `pay_now`, the price is debited in
/// the same commit; insufficient funds aborts the submission.
pub async fn submit_order(
    state: &AppState,
    submitter_id: IdentityId,
    request: OrderRequest,
) -> Result<Order, SevaError> {
    let result = submit_order_inner(state, submitter_id, request).await;
    record_outcome(OrderAction::Submit, &result);
    result
}

async fn submit_order_inner(
    state: &AppState,
    submitter_id: IdentityId,
    request: OrderRequest,
) -> Result<Order, SevaError> {
    let submitter = identity(state, submitter_id)?;
    let target = identity(state, request.target_id.unwrap_or(submitter_id))?;
    let service = service(state, request.service_id)?;

    let submission = Submission {
        target_id: request.target_id,
        form_data: request.form_data,
        document_refs: request.document_refs,
    };
    let resolver = document_resolver(&state.vault);
    let mut order = Order::submit(&service, &submitter, &target, submission, &resolver)
        .map_err(|e| guard_failure(OrderAction::Submit, None, e.into()))?;

    let charges = request.pay_now && order.price.is_positive();
    let _gate = if charges {
        Some(state.wallet_gate.lock().await)
    } else {
        None
    };
    let txn = if charges {
        let txn = state
            .ledger
            .read()
            .prepare_charge(order.payer(), order.id, order.price)
            .map_err(|e| guard_failure(OrderAction::Submit, None, e.into()))?;
        order.record_payment(order.price, txn.id);
        Some(txn)
    } else {
        None
    };

    let mut mutations = vec![Mutation::InsertOrder(&order)];
    let submitted = AuditEvent::new("order", Some(submitter_id), "order", order.id.0, "submit")
        .with_metadata(json!({
            "service_id": order.service_id,
            "target_id": order.target_id,
            "price": order.price.minor(),
        }));
    let mut events = vec![submitted];
    if let Some(txn) = &txn {
        mutations.push(Mutation::InsertTransaction(txn));
        events.push(wallet_event(Some(submitter_id), txn));
    }
    persist_unguarded(state, &mutations, &events).await?;

    state.orders.insert(order.id, order.clone());
    if let Some(txn) = txn {
        append_to_ledger(state, txn)?;
    }

    tracing::info!(
        order_id = %order.id,
        service_id = %order.service_id,
        submitted_by = %order.submitted_by,
        target_id = %order.target_id,
        prepaid = order.payment.is_paid(),
        "order submitted"
    );
    Ok(order)
}

/// Claim an order for `staff_id`. Exactly one of any number of concurrent
/// claimants succeeds; the rest get `StateConflict`.
pub async fn claim_order(
    state: &AppState,
    order_id: OrderId,
    staff_id: IdentityId,
) -> Result<Order, SevaError> {
    let staff = identity(state, staff_id)?;
    transition(state, order_id, staff_id, OrderAction::Claim, false, |order, _| {
        order.claim(&staff)?;
        Ok(None)
    })
    .await
}

pub async fn reject_document(
    state: &AppState,
    order_id: OrderId,
    staff_id: IdentityId,
    doc_tag: &str,
    reason: &str,
) -> Result<Order, SevaError> {
    let staff = identity(state, staff_id)?;
    let tag = parse_tag(doc_tag)?;
    transition(
        state,
        order_id,
        staff_id,
        OrderAction::RejectDocument,
        false,
        |order, _| {
            order.reject_document(&staff, &tag, reason)?;
            Ok(None)
        },
    )
    .await
}

/// Relink a rejected tag to a newly uploaded document.
pub async fn reupload_document(
    state: &AppState,
    order_id: OrderId,
    actor_id: IdentityId,
    doc_tag: &str,
    document_id: DocumentId,
) -> Result<Order, SevaError> {
    let actor = identity(state, actor_id)?;
    let tag = parse_tag(doc_tag)?;
    let resolver = document_resolver(&state.vault);
    transition(
        state,
        order_id,
        actor_id,
        OrderAction::ReuploadDocument,
        false,
        |order, _| {
            order.reupload_document(&actor, &tag, document_id, &resolver)?;
            Ok(None)
        },
    )
    .await
}

/// Complete an order, charging the payer unless the order was prepaid.
/// The charge and the status flip commit together; insufficient funds
/// leaves the order in `processing`.
pub async fn complete_order(
    state: &AppState,
    order_id: OrderId,
    staff_id: IdentityId,
    output_documents: BTreeMap<DocTag, DocumentId>,
) -> Result<Order, SevaError> {
    let staff = identity(state, staff_id)?;
    let resolver = document_resolver(&state.vault);
    transition(state, order_id, staff_id, OrderAction::Complete, true, |order, ledger| {
        order.complete(&staff, output_documents.clone(), &resolver)?;
        if order.payment.is_paid() || !order.price.is_positive() {
            return Ok(None);
        }
        let txn = ledger.prepare_charge(order.payer(), order.id, order.price)?;
        order.record_payment(order.price, txn.id);
        Ok(Some(txn))
    })
    .await
}

/// Reject the whole order. A paid order is refunded in the same commit.
pub async fn reject_order(
    state: &AppState,
    order_id: OrderId,
    staff_id: IdentityId,
    reason: &str,
) -> Result<Order, SevaError> {
    let staff = identity(state, staff_id)?;
    transition(state, order_id, staff_id, OrderAction::RejectOrder, true, |order, ledger| {
        order.reject_order(&staff, reason)?;
        if !matches!(order.payment, PaymentState::Paid { .. }) {
            return Ok(None);
        }
        let txn = ledger.prepare_refund(order.payer(), order.id)?;
        order.record_refund(txn.id);
        Ok(Some(txn))
    })
    .await
}

pub fn list_orders(state: &AppState, filter: OrderFilter) -> Vec<Order> {
    let all = state.orders.list();
    select(&all, filter).into_iter().cloned().collect()
}

async fn transition<F>(
    state: &AppState,
    order_id: OrderId,
    actor: IdentityId,
    action: OrderAction,
    moves_money: bool,
    apply: F,
) -> Result<Order, SevaError>
where
    F: Fn(&mut Order, &WalletLedger) -> Result<Option<WalletTransaction>, SevaError>,
{
    let result = transition_inner(state, order_id, actor, action, moves_money, apply).await;
    record_outcome(action, &result);
    result
}

async fn transition_inner<F>(
    state: &AppState,
    order_id: OrderId,
    actor: IdentityId,
    action: OrderAction,
    moves_money: bool,
    apply: F,
) -> Result<Order, SevaError>
where
    F: Fn(&mut Order, &WalletLedger) -> Result<Option<WalletTransaction>, SevaError>,
{
    let _gate = if moves_money {
        Some(state.wallet_gate.lock().await)
    } else {
        None
    };

    for attempt in 1..=MAX_COMMIT_ATTEMPTS {
        let current = order(state, order_id)?;
        let from = current.status;
        let expected_version = current.version;

        let mut next = current;
        let txn = {
            let ledger = state.ledger.read();
            apply(&mut next, &*ledger)
        }
        .map_err(|e| guard_failure(action, Some(order_id), e))?;

        let mut mutations = vec![Mutation::UpdateOrder {
            order: &next,
            expected_version,
        }];
        let transitioned =
            AuditEvent::new("order", Some(actor), "order", order_id.0, action.as_str())
                .with_metadata(json!({
                    "from": from,
                    "to": next.status,
                    "version": next.version,
                }));
        let mut events = vec![transitioned];
        if let Some(txn) = &txn {
            mutations.push(Mutation::InsertTransaction(txn));
            events.push(wallet_event(Some(actor), txn));
        }

        if persist(state, &mutations, &events).await? == CommitOutcome::VersionConflict {
            tracing::debug!(order_id = %order_id, attempt, "order row moved on, retrying");
            continue;
        }

        // The database is authoritative once it has accepted the write; in
        // memory-only mode the version check here is the only guard.
        let durable = state.db_pool.is_some();
        let swapped = state.orders.try_update(&order_id, |stored| {
            if stored.version == expected_version || (durable && stored.version < next.version) {
                *stored = next.clone();
                Ok(())
            } else {
                Err(stored.version)
            }
        });
        match swapped {
            Some(Ok(())) => {}
            Some(Err(seen)) => {
                tracing::debug!(
                    order_id = %order_id,
                    attempt,
                    expected_version,
                    seen,
                    "order moved on, retrying"
                );
                continue;
            }
            None => return Err(SevaError::NotFound(format!("{order_id} not found"))),
        }

        if let Some(txn) = txn {
            append_to_ledger(state, txn)?;
        }

        tracing::info!(
            order_id = %order_id,
            actor = %actor,
            action = action.as_str(),
            from = %from,
            to = %next.status,
            version = next.version,
            "order transition applied"
        );
        return Ok(next);
    }

    tracing::warn!(
        order_id = %order_id,
        action = action.as_str(),
        "order kept changing, giving up"
    );
    Err(SevaError::StateConflict(format!(
        "{order_id} was modified concurrently; refresh and retry"
    )))
}

fn guard_failure(action: OrderAction, order_id: Option<OrderId>, err: SevaError) -> SevaError {
    tracing::warn!(
        order_id = ?order_id,
        action = action.as_str(),
        kind = err.kind(),
        error = %err,
        "order transition refused"
    );
    err
}

fn record_outcome(action: OrderAction, result: &Result<Order, SevaError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    record_transition(action.as_str(), outcome);
}

// ── Settings ────────────────────────────────────────────────────────────────

pub async fn update_settings(
    state: &AppState,
    actor: Option<IdentityId>,
    broadcast_message: Option<String>,
    support_phone: Option<String>,
) -> Result<PortalSettings, SevaError> {
    let settings = PortalSettings {
        broadcast_message: broadcast_message.filter(|m| !m.trim().is_empty()),
        support_phone: support_phone.filter(|p| !p.trim().is_empty()),
        updated_at: Utc::now(),
    };

    let _gate = state.registry_gate.lock().await;
    let event = AuditEvent::new("settings", actor, "settings", uuid::Uuid::nil(), "update");
    persist_unguarded(state, &[Mutation::SaveSettings(&settings)], &[event]).await?;
    *state.settings.write() = settings.clone();

    tracing::info!("portal settings updated");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use seva_core::FormField;
    use seva_state::OrderStatus;

    fn rupees(r: i64) -> Amount {
        Amount::from_minor(r * 100)
    }

    async fn person(state: &AppState, name: &str, phone: &str, role: Role) -> Identity {
        register_identity(
            state,
            None,
            NewIdentity {
                name: name.into(),
                phone: phone.into(),
                role,
                father_name: None,
                village: None,
            },
        )
        .await
        .unwrap()
    }

    async fn pan_service(state: &AppState) -> ServiceDefinition {
        create_service(
            state,
            None,
            ServiceRevision {
                name: "PAN Card".into(),
                price_normal: rupees(107),
                price_b2b: rupees(90),
                required_documents: vec![
                    DocTag::new("aadhaar").unwrap(),
                    DocTag::new("photo").unwrap(),
                ],
                form_schema: vec![FormField::text("full_name", "Full name")],
            },
        )
        .await
        .unwrap()
    }

    async fn upload(state: &AppState, owner: &Identity, tag: &str) -> Document {
        upload_document(
            state,
            owner.id,
            owner.id,
            Upload {
                type_tag: tag,
                filename: &format!("{tag}.jpg"),
                content: tag.as_bytes(),
            },
        )
        .await
        .unwrap()
    }

    struct World {
        state: AppState,
        customer: Identity,
        staff_a: Identity,
        staff_b: Identity,
        service: ServiceDefinition,
    }

    impl World {
        async fn new() -> Self {
            let state = AppState::new();
            let customer = person(&state, "Asha", "9000000001", Role::Customer).await;
            let staff_a = person(&state, "Ravi", "9000000002", Role::Staff).await;
            let staff_b = person(&state, "Meena", "9000000003", Role::Staff).await;
            let service = pan_service(&state).await;
            Self {
                state,
                customer,
                staff_a,
                staff_b,
                service,
            }
        }

        async fn request(&self) -> OrderRequest {
            let aadhaar = upload(&self.state, &self.customer, "aadhaar").await;
            let photo = upload(&self.state, &self.customer, "photo").await;
            OrderRequest {
                service_id: self.service.id,
                target_id: None,
                form_data: BTreeMap::from([("full_name".to_string(), "Asha Devi".to_string())]),
                document_refs: BTreeMap::from([
                    ("aadhaar".to_string(), aadhaar.id),
                    ("photo".to_string(), photo.id),
                ]),
                pay_now: false,
            }
        }

        async fn submitted(&self) -> Order {
            let request = self.request().await;
            submit_order(&self.state, self.customer.id, request).await.unwrap()
        }
    }

    #[tokio::test]
    async fn duplicate_phone_is_a_conflict() {
        let state = AppState::new();
        person(&state, "Asha", "90000-00001", Role::Customer).await;
        let err = register_identity(
            &state,
            None,
            NewIdentity {
                name: "Other".into(),
                phone: "9000000001".into(),
                role: Role::Customer,
                father_name: None,
                village: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SevaError::StateConflict(_)));
    }

    #[tokio::test]
    async fn submit_missing_document_is_validation_failure() {
        let w = World::new().await;
        let mut request = w.request().await;
        request.document_refs.remove("photo");
        let err = submit_order(&w.state, w.customer.id, request).await.unwrap_err();
        match err {
            SevaError::ValidationFailed(failure) => {
                assert!(failure.fields.iter().any(|f| f.field == "photo"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert!(w.state.orders.is_empty());
    }

    #[tokio::test]
    async fn claim_then_second_claim_conflicts() {
        let w = World::new().await;
        let order = w.submitted().await;
        let claimed = claim_order(&w.state, order.id, w.staff_a.id).await.unwrap();
        assert_eq!(claimed.status, OrderStatus::Processing);
        let err = claim_order(&w.state, order.id, w.staff_b.id).await.unwrap_err();
        assert!(matches!(err, SevaError::StateConflict(_)));
        assert_eq!(
            w.state.orders.get(&order.id).unwrap().assigned_staff_id,
            Some(w.staff_a.id)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_have_exactly_one_winner() {
        let w = World::new().await;
        let order = w.submitted().await;
        let mut staff = Vec::new();
        for i in 0..8 {
            staff.push(person(&w.state, "Staff", &format!("91000000{i:02}"), Role::Staff).await);
        }

        let handles: Vec<_> = staff
            .iter()
            .map(|s| {
                let state = w.state.clone();
                let (order_id, staff_id) = (order.id, s.id);
                tokio::spawn(async move { claim_order(&state, order_id, staff_id).await })
            })
            .collect();

        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(SevaError::StateConflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 7);
        let stored = w.state.orders.get(&order.id).unwrap();
        assert_eq!(stored.transitions.len(), 2);
        assert!(stored.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn complete_with_low_balance_leaves_order_processing() {
        let w = World::new().await;
        let order = w.submitted().await;
        claim_order(&w.state, order.id, w.staff_a.id).await.unwrap();
        add_funds(&w.state, None, w.customer.id, rupees(50), "cash").await.unwrap();

        let err = complete_order(&w.state, order.id, w.staff_a.id, BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SevaError::InsufficientFunds { .. }));
        let stored = w.state.orders.get(&order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Processing);
        assert_eq!(stored.payment, PaymentState::Unpaid);
        assert_eq!(balance(&w.state, w.customer.id).unwrap().balance, rupees(50));

        add_funds(&w.state, None, w.customer.id, rupees(100), "cash").await.unwrap();
        let done = complete_order(&w.state, order.id, w.staff_a.id, BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(done.status, OrderStatus::Completed);
        assert!(done.payment.is_paid());
        assert_eq!(balance(&w.state, w.customer.id).unwrap().balance, rupees(43));
    }

    #[tokio::test]
    async fn completion_records_outputs_by_tag() {
        let w = World::new().await;
        let order = w.submitted().await;
        claim_order(&w.state, order.id, w.staff_a.id).await.unwrap();
        add_funds(&w.state, None, w.customer.id, rupees(107), "cash").await.unwrap();
        let card = upload(&w.state, &w.customer, "pan_card").await;
        let pan_card = DocTag::new("pan_card").unwrap();

        let outputs = BTreeMap::from([(pan_card.clone(), card.id)]);
        let done = complete_order(&w.state, order.id, w.staff_a.id, outputs).await.unwrap();
        assert_eq!(done.output_document_ids.len(), 1);
        assert_eq!(done.output_document_ids[&pan_card], card.id);
        let stored = w.state.orders.get(&order.id).unwrap();
        assert_eq!(stored.output_document_ids, done.output_document_ids);
    }

    #[tokio::test]
    async fn ledger_refusing_a_committed_transaction_is_storage_failure() {
        let w = World::new().await;
        let order = w.submitted().await;
        add_funds(&w.state, None, w.customer.id, rupees(107), "cash").await.unwrap();
        let (first, second) = {
            let ledger = w.state.ledger.read();
            (
                ledger.prepare_charge(w.customer.id, order.id, rupees(107)).unwrap(),
                ledger.prepare_charge(w.customer.id, order.id, rupees(107)).unwrap(),
            )
        };

        append_to_ledger(&w.state, first).unwrap();
        let err = append_to_ledger(&w.state, second).unwrap_err();
        assert!(matches!(err, SevaError::StorageFailure(_)));
        assert_eq!(balance(&w.state, w.customer.id).unwrap().balance, Amount::ZERO);
    }

    #[tokio::test]
    async fn prepaid_order_is_not_charged_again() {
        let w = World::new().await;
        add_funds(&w.state, None, w.customer.id, rupees(200), "cash").await.unwrap();
        let mut request = w.request().await;
        request.pay_now = true;
        let order = submit_order(&w.state, w.customer.id, request).await.unwrap();
        assert!(order.payment.is_paid());
        assert_eq!(balance(&w.state, w.customer.id).unwrap().balance, rupees(93));

        claim_order(&w.state, order.id, w.staff_a.id).await.unwrap();
        complete_order(&w.state, order.id, w.staff_a.id, BTreeMap::new()).await.unwrap();
        assert_eq!(balance(&w.state, w.customer.id).unwrap().balance, rupees(93));
    }

    #[tokio::test]
    async fn prepay_without_funds_creates_nothing() {
        let w = World::new().await;
        let mut request = w.request().await;
        request.pay_now = true;
        let err = submit_order(&w.state, w.customer.id, request).await.unwrap_err();
        assert!(matches!(err, SevaError::InsufficientFunds { .. }));
        assert!(w.state.orders.is_empty());
        assert!(statement(&w.state, w.customer.id).unwrap().1.is_empty());
    }

    #[tokio::test]
    async fn rejecting_paid_order_refunds() {
        let w = World::new().await;
        add_funds(&w.state, None, w.customer.id, rupees(107), "cash").await.unwrap();
        let mut request = w.request().await;
        request.pay_now = true;
        let order = submit_order(&w.state, w.customer.id, request).await.unwrap();

        let rejected = reject_order(&w.state, order.id, w.staff_a.id, "duplicate application")
            .await
            .unwrap();
        assert_eq!(rejected.status, OrderStatus::Rejected);
        assert!(matches!(rejected.payment, PaymentState::Refunded { .. }));
        assert_eq!(balance(&w.state, w.customer.id).unwrap().balance, rupees(107));
        assert_eq!(statement(&w.state, w.customer.id).unwrap().1.len(), 3);
    }

    #[tokio::test]
    async fn reupload_loop_returns_to_processing() {
        let w = World::new().await;
        let order = w.submitted().await;
        claim_order(&w.state, order.id, w.staff_a.id).await.unwrap();
        let flagged = reject_document(&w.state, order.id, w.staff_a.id, "Photo", "blurry")
            .await
            .unwrap();
        assert_eq!(flagged.status, OrderStatus::ActionRequired);

        let fresh = upload(&w.state, &w.customer, "photo").await;
        let back = reupload_document(&w.state, order.id, w.customer.id, "photo", fresh.id)
            .await
            .unwrap();
        assert_eq!(back.status, OrderStatus::Processing);
        assert!(back.rejected_docs.is_empty());
        assert_eq!(back.document_ids[&DocTag::new("photo").unwrap()], fresh.id);
    }

    #[tokio::test]
    async fn guard_failure_does_not_mutate() {
        let w = World::new().await;
        let order = w.submitted().await;
        let err = complete_order(&w.state, order.id, w.staff_a.id, BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SevaError::StateConflict(_)));
        assert_eq!(w.state.orders.get(&order.id).unwrap(), order);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let w = World::new().await;
        let err = claim_order(&w.state, OrderId::new(), w.staff_a.id).await.unwrap_err();
        assert!(matches!(err, SevaError::NotFound(_)));
    }

    #[tokio::test]
    async fn pool_listing_tracks_claims() {
        let w = World::new().await;
        let first = w.submitted().await;
        let second = w.submitted().await;
        claim_order(&w.state, first.id, w.staff_a.id).await.unwrap();

        let pool = list_orders(&w.state, OrderFilter::Pool);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].id, second.id);
        let mine = list_orders(&w.state, OrderFilter::AssignedTo(w.staff_a.id));
        assert_eq!(mine[0].id, first.id);
    }

    #[tokio::test]
    async fn revoked_staff_cannot_claim() {
        let w = World::new().await;
        let order = w.submitted().await;
        revoke_identity(&w.state, None, w.staff_a.id).await.unwrap();
        let err = claim_order(&w.state, order.id, w.staff_a.id).await.unwrap_err();
        assert!(matches!(err, SevaError::StateConflict(_)));
        assert!(w.state.orders.get(&order.id).unwrap().is_in_pool());
    }

    #[tokio::test]
    async fn settings_blank_values_are_cleared() {
        let state = AppState::new();
        let broadcast = Some("Office closed Monday".to_string());
        let settings = update_settings(&state, None, broadcast, Some("  ".into()))
            .await
            .unwrap();
        assert_eq!(settings.broadcast_message.as_deref(), Some("Office closed Monday"));
        assert!(settings.support_phone.is_none());
        assert_eq!(*state.settings.read(), settings);
    }
}
