//! # Order Lifecycle State Machine
//!
//! Models a service application from submission through staff
//! verification to a terminal outcome.
//!
//! ## States
//!
//! ```text
//!                  claim
//! Received ─────────────────▶ Processing ──complete──▶ Completed
//!    │  ▲                      │  ▲
//!    │  │ reupload (last tag,  │  │ reupload (last tag,
//!    │  │ never claimed)       │  │ claimed)
//!    ▼  │                      ▼  │
//!   ActionRequired ◀──reject_document──┘
//!
//! any non-terminal ──reject_order──▶ Rejected
//! ```
//!
//! `ActionRequired` may be claimed; the assignee is recorded but the order
//! stays in `ActionRequired` until every rejected tag has been re-uploaded.
//!
//! ## Invariants
//!
//! Checked by [`Order::check_invariants`] after every transition:
//!
//! - `document_ids` has a key for every tag the order was submitted against.
//! - `rejected_docs ⊆ keys(document_ids)`.
//! - `rejected_docs` is non-empty exactly when the status is `ActionRequired`.
//! - `assigned_staff_id` is set whenever the status is `Processing` or
//!   `Completed`.
//!
//! ## Guard failures
//!
//! Every operation validates before it mutates. A failed guard returns an
//! [`OrderError`] and leaves the order byte-for-byte unchanged, including
//! `version` and `updated_at`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use seva_core::{
    Amount, DocTag, DocumentId, FieldViolation, Identity, IdentityId, OrderId, Role,
    ServiceDefinition, ServiceId, SevaError, TransactionId, ValidationFailure,
};

// ─── Status ──────────────────────────────────────────────────────────

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Submitted and waiting in the staff pool.
    Received,
    /// Claimed by a staff member.
    Processing,
    /// One or more documents were rejected; waiting for the customer.
    ActionRequired,
    /// Terminal. Service delivered, output documents attached.
    Completed,
    /// Terminal. Whole order refused.
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processing => "processing",
            Self::ActionRequired => "action_required",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "received" => Some(Self::Received),
            "processing" => Some(Self::Processing),
            "action_required" => Some(Self::ActionRequired),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operation that produced a transition record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Submit,
    Claim,
    RejectDocument,
    ReuploadDocument,
    Complete,
    RejectOrder,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Claim => "claim",
            Self::RejectDocument => "reject_document",
            Self::ReuploadDocument => "reupload_document",
            Self::Complete => "complete",
            Self::RejectOrder => "reject_order",
        }
    }
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Payment ─────────────────────────────────────────────────────────

/// Whether the order's price has been charged to the payer's wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PaymentState {
    #[default]
    Unpaid,
    Paid {
        amount: Amount,
        transaction_id: TransactionId,
    },
    Refunded {
        amount: Amount,
        transaction_id: TransactionId,
    },
}

impl PaymentState {
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid { .. })
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by order transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// The operation is not valid from the current status.
    #[error("cannot {action} order {order_id} in status {from}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        action: OrderAction,
    },

    /// Another staff member holds the order.
    #[error("order {order_id} already claimed by {assignee}")]
    AlreadyClaimed {
        order_id: OrderId,
        assignee: IdentityId,
    },

    /// Only the assignee may act on a claimed order.
    #[error("order {order_id} is assigned to {assignee}, not {actor}")]
    NotAssignee {
        order_id: OrderId,
        assignee: IdentityId,
        actor: IdentityId,
    },

    /// The actor lacks the staff role this operation needs.
    #[error("identity {actor} is not staff")]
    NotStaff { actor: IdentityId },

    /// The actor is soft-revoked.
    #[error("identity {actor} has been revoked")]
    RevokedActor { actor: IdentityId },

    /// The actor neither submitted the order, is its target, nor is staff.
    #[error("identity {actor} is not a party to order {order_id}")]
    NotAParty { order_id: OrderId, actor: IdentityId },

    /// Input failed validation.
    #[error("{0}")]
    Invalid(ValidationFailure),
}

impl From<OrderError> for SevaError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Invalid(failure) => SevaError::ValidationFailed(failure),
            OrderError::NotStaff { .. } => SevaError::validation(err.to_string()),
            OrderError::InvalidTransition { .. }
            | OrderError::AlreadyClaimed { .. }
            | OrderError::NotAssignee { .. }
            | OrderError::RevokedActor { .. }
            | OrderError::NotAParty { .. } => SevaError::StateConflict(err.to_string()),
        }
    }
}

fn invalid(message: &str, fields: Vec<FieldViolation>) -> OrderError {
    OrderError::Invalid(ValidationFailure::with_fields(message, fields))
}

// ─── Document resolution ─────────────────────────────────────────────

/// What the state machine needs to know about a stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub owner_id: IdentityId,
    pub type_tag: String,
}

/// Looks up documents by id. Implemented for closures so the caller can
/// bridge to whatever store holds the documents.
pub trait DocumentResolver {
    fn resolve(&self, id: DocumentId) -> Option<DocumentRef>;
}

impl<F> DocumentResolver for F
where
    F: Fn(DocumentId) -> Option<DocumentRef>,
{
    fn resolve(&self, id: DocumentId) -> Option<DocumentRef> {
        self(id)
    }
}

/// Check that `id` exists, belongs to `owner`, and (when `tag` is given)
/// carries a matching type tag.
fn check_document(
    resolver: &impl DocumentResolver,
    field: &str,
    id: DocumentId,
    owner: IdentityId,
    tag: Option<&DocTag>,
) -> Option<FieldViolation> {
    match resolver.resolve(id) {
        None => Some(FieldViolation::new(field, format!("{id} not found"))),
        Some(doc) if doc.owner_id != owner => Some(FieldViolation::new(
            field,
            format!("{id} does not belong to {owner}"),
        )),
        Some(doc) => match tag {
            Some(tag) if !tag.matches(&doc.type_tag) => Some(FieldViolation::new(
                field,
                format!("{id} has type '{}', expected '{tag}'", doc.type_tag),
            )),
            _ => None,
        },
    }
}

// ─── Transition records ──────────────────────────────────────────────

/// Audit record of one applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// `None` for the submission that created the order.
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    pub action: OrderAction,
    pub actor: IdentityId,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

// ─── Submission ──────────────────────────────────────────────────────

/// Input to [`Order::submit`].
#[derive(Debug, Clone)]
pub struct Submission {
    /// Target identity; `None` means the submitter applies for themself.
    pub target_id: Option<IdentityId>,
    pub form_data: BTreeMap<String, String>,
    /// Raw tag → document id, as supplied by the caller.
    pub document_refs: BTreeMap<String, DocumentId>,
}

// ─── Order ───────────────────────────────────────────────────────────

/// A service application and its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub service_id: ServiceId,
    pub submitted_by: IdentityId,
    pub target_id: IdentityId,
    pub status: OrderStatus,
    /// Set once on claim, never reassigned.
    pub assigned_staff_id: Option<IdentityId>,
    pub document_ids: BTreeMap<DocTag, DocumentId>,
    pub rejected_docs: BTreeSet<DocTag>,
    pub rejection_reason: Option<String>,
    pub form_data: BTreeMap<String, String>,
    /// Result documents keyed by tag, populated on completion.
    #[serde(default)]
    pub output_document_ids: BTreeMap<DocTag, DocumentId>,
    /// Price tier snapshot taken at submission.
    pub price: Amount,
    #[serde(default)]
    pub payment: PaymentState,
    /// Incremented by every transition. Used for compare-and-set commits.
    pub version: u64,
    pub transitions: Vec<TransitionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order in `Received`.
    ///
    /// Every required tag must resolve to a document owned by the target
    /// identity whose type tag matches; every schema field must be present.
    /// Unknown tags and unknown fields are rejected. All problems are
    /// collected into one `Invalid` error.
    pub fn submit(
        service: &ServiceDefinition,
        submitter: &Identity,
        target: &Identity,
        submission: Submission,
        resolver: &impl DocumentResolver,
    ) -> Result<Self, OrderError> {
        require_active(submitter)?;
        require_active(target)?;

        let mut violations = Vec::new();

        if let Some(requested) = submission.target_id {
            if requested != target.id {
                violations.push(FieldViolation::new(
                    "target_identity_id",
                    "does not match the resolved target identity",
                ));
            }
        }
        if target.id != submitter.id && !(submitter.role == Role::B2b || submitter.role.is_staff())
        {
            violations.push(FieldViolation::new(
                "target_identity_id",
                "only b2b partners and staff may apply on behalf of another identity",
            ));
        }

        let mut document_ids = BTreeMap::new();
        for (raw_tag, doc_id) in &submission.document_refs {
            let tag = match DocTag::new(raw_tag) {
                Ok(tag) => tag,
                Err(problem) => {
                    violations.push(FieldViolation::new(raw_tag, problem));
                    continue;
                }
            };
            if !service.requires(&tag) {
                violations.push(FieldViolation::new(tag.as_str(), "unknown document tag"));
                continue;
            }
            if document_ids.contains_key(&tag) {
                violations.push(FieldViolation::new(tag.as_str(), "document supplied twice"));
                continue;
            }
            if let Some(v) = check_document(resolver, tag.as_str(), *doc_id, target.id, Some(&tag))
            {
                violations.push(v);
            }
            document_ids.insert(tag, *doc_id);
        }
        for tag in &service.required_documents {
            if !document_ids.contains_key(tag) {
                violations.push(FieldViolation::new(tag.as_str(), "required document missing"));
            }
        }

        violations.extend(service.validate_form(&submission.form_data));

        if !violations.is_empty() {
            return Err(invalid("order submission rejected", violations));
        }

        let now = Utc::now();
        let order = Self {
            id: OrderId::new(),
            service_id: service.id,
            submitted_by: submitter.id,
            target_id: target.id,
            status: OrderStatus::Received,
            assigned_staff_id: None,
            document_ids,
            rejected_docs: BTreeSet::new(),
            rejection_reason: None,
            form_data: submission.form_data,
            output_document_ids: BTreeMap::new(),
            price: service.price_for(submitter.role),
            payment: PaymentState::Unpaid,
            version: 1,
            transitions: vec![TransitionRecord {
                from: None,
                to: OrderStatus::Received,
                action: OrderAction::Submit,
                actor: submitter.id,
                reason: None,
                at: now,
            }],
            created_at: now,
            updated_at: now,
        };
        Ok(order)
    }

    /// Claim the order for `staff`.
    ///
    /// `Received → Processing`. Claiming an unassigned `ActionRequired`
    /// order records the assignee and keeps the status.
    pub fn claim(&mut self, staff: &Identity) -> Result<(), OrderError> {
        require_staff(staff)?;
        self.require_open(OrderAction::Claim)?;
        if let Some(assignee) = self.assigned_staff_id {
            return Err(OrderError::AlreadyClaimed {
                order_id: self.id,
                assignee,
            });
        }

        let to = match self.status {
            OrderStatus::Received => OrderStatus::Processing,
            other => other,
        };
        self.assigned_staff_id = Some(staff.id);
        self.do_transition(to, OrderAction::Claim, staff.id, None);
        Ok(())
    }

    /// Flag one document as unacceptable.
    ///
    /// Any non-terminal status → `ActionRequired`.
    pub fn reject_document(
        &mut self,
        staff: &Identity,
        tag: &DocTag,
        reason: &str,
    ) -> Result<(), OrderError> {
        require_staff(staff)?;
        self.require_open(OrderAction::RejectDocument)?;
        self.require_assignee_or_unassigned(staff.id)?;
        if !self.document_ids.contains_key(tag) {
            return Err(invalid(
                "document rejection refused",
                vec![FieldViolation::new(tag.as_str(), "order has no document with this tag")],
            ));
        }

        self.rejected_docs.insert(tag.clone());
        self.rejection_reason = Some(reason.to_string());
        self.do_transition(
            OrderStatus::ActionRequired,
            OrderAction::RejectDocument,
            staff.id,
            Some(format!("{tag}: {reason}")),
        );
        Ok(())
    }

    /// Replace a rejected document with a new one.
    ///
    /// Requires `ActionRequired` and `tag ∈ rejected_docs`. When the last
    /// rejected tag clears, the order returns to `Processing` if it has an
    /// assignee, otherwise to `Received`.
    pub fn reupload_document(
        &mut self,
        actor: &Identity,
        tag: &DocTag,
        new_document_id: DocumentId,
        resolver: &impl DocumentResolver,
    ) -> Result<(), OrderError> {
        require_active(actor)?;
        if !actor.role.is_staff() && actor.id != self.submitted_by && actor.id != self.target_id {
            return Err(OrderError::NotAParty {
                order_id: self.id,
                actor: actor.id,
            });
        }
        if self.status != OrderStatus::ActionRequired {
            return Err(self.invalid_transition(OrderAction::ReuploadDocument));
        }
        if !self.rejected_docs.contains(tag) {
            return Err(invalid(
                "re-upload refused",
                vec![FieldViolation::new(tag.as_str(), "document is not flagged for correction")],
            ));
        }
        let checked = check_document(
            resolver,
            tag.as_str(),
            new_document_id,
            self.target_id,
            Some(tag),
        );
        if let Some(v) = checked {
            return Err(invalid("re-upload refused", vec![v]));
        }

        self.document_ids.insert(tag.clone(), new_document_id);
        self.rejected_docs.remove(tag);
        let to = if !self.rejected_docs.is_empty() {
            OrderStatus::ActionRequired
        } else {
            self.rejection_reason = None;
            if self.assigned_staff_id.is_some() {
                OrderStatus::Processing
            } else {
                OrderStatus::Received
            }
        };
        self.do_transition(to, OrderAction::ReuploadDocument, actor.id, None);
        Ok(())
    }

    /// Deliver the service. `Processing → Completed`.
    ///
    /// Charging the wallet is the caller's job; it must hand the charge
    /// back through [`Order::record_payment`] before committing when the
    /// order is still unpaid.
    pub fn complete(
        &mut self,
        staff: &Identity,
        output_documents: BTreeMap<DocTag, DocumentId>,
        resolver: &impl DocumentResolver,
    ) -> Result<(), OrderError> {
        require_staff(staff)?;
        if self.status != OrderStatus::Processing {
            return Err(self.invalid_transition(OrderAction::Complete));
        }
        self.require_assignee_or_unassigned(staff.id)?;
        if !self.rejected_docs.is_empty() {
            return Err(self.invalid_transition(OrderAction::Complete));
        }

        let violations: Vec<FieldViolation> = output_documents
            .iter()
            .filter_map(|(tag, id)| {
                check_document(resolver, tag.as_str(), *id, self.target_id, Some(tag))
            })
            .collect();
        if !violations.is_empty() {
            return Err(invalid("completion refused", violations));
        }

        self.output_document_ids = output_documents;
        self.do_transition(OrderStatus::Completed, OrderAction::Complete, staff.id, None);
        Ok(())
    }

    /// Refuse the whole order. Any non-terminal status → `Rejected`.
    pub fn reject_order(&mut self, staff: &Identity, reason: &str) -> Result<(), OrderError> {
        require_staff(staff)?;
        self.require_open(OrderAction::RejectOrder)?;
        self.require_assignee_or_unassigned(staff.id)?;
        if reason.trim().is_empty() {
            return Err(invalid(
                "order rejection refused",
                vec![FieldViolation::new("reason", "must not be empty")],
            ));
        }

        self.rejected_docs.clear();
        self.rejection_reason = Some(reason.to_string());
        self.do_transition(
            OrderStatus::Rejected,
            OrderAction::RejectOrder,
            staff.id,
            Some(reason.to_string()),
        );
        Ok(())
    }

    /// Record that the price was charged. Does not bump the version on its
    /// own; it is always paired with the transition that caused the charge.
    pub fn record_payment(&mut self, amount: Amount, transaction_id: TransactionId) {
        self.payment = PaymentState::Paid {
            amount,
            transaction_id,
        };
    }

    /// Record that a charge was returned to the payer.
    pub fn record_refund(&mut self, transaction_id: TransactionId) {
        if let PaymentState::Paid { amount, .. } = self.payment {
            self.payment = PaymentState::Refunded {
                amount,
                transaction_id,
            };
        }
    }

    /// The identity whose wallet pays for the order.
    pub fn payer(&self) -> IdentityId {
        self.submitted_by
    }

    pub fn is_in_pool(&self) -> bool {
        !self.status.is_terminal() && self.assigned_staff_id.is_none()
    }

    /// Check the structural invariants. Returns every violated invariant.
    pub fn check_invariants(&self) -> Result<(), Vec<String>> {
        let mut broken = Vec::new();

        for tag in &self.rejected_docs {
            if !self.document_ids.contains_key(tag) {
                broken.push(format!("rejected tag '{tag}' has no document"));
            }
        }
        let action_required = self.status == OrderStatus::ActionRequired;
        if action_required == self.rejected_docs.is_empty() {
            broken.push(format!(
                "status {} with {} rejected tag(s)",
                self.status,
                self.rejected_docs.len()
            ));
        }
        if matches!(self.status, OrderStatus::Processing | OrderStatus::Completed)
            && self.assigned_staff_id.is_none()
        {
            broken.push(format!("status {} without an assignee", self.status));
        }
        if self.transitions.last().map(|t| t.to) != Some(self.status) {
            broken.push("last transition does not match status".to_string());
        }

        if broken.is_empty() {
            Ok(())
        } else {
            Err(broken)
        }
    }

    fn require_open(&self, action: OrderAction) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition(action));
        }
        Ok(())
    }

    fn require_assignee_or_unassigned(&self, actor: IdentityId) -> Result<(), OrderError> {
        match self.assigned_staff_id {
            Some(assignee) if assignee != actor => Err(OrderError::NotAssignee {
                order_id: self.id,
                assignee,
                actor,
            }),
            _ => Ok(()),
        }
    }

    fn invalid_transition(&self, action: OrderAction) -> OrderError {
        OrderError::InvalidTransition {
            order_id: self.id,
            from: self.status,
            action,
        }
    }

    fn do_transition(
        &mut self,
        to: OrderStatus,
        action: OrderAction,
        actor: IdentityId,
        reason: Option<String>,
    ) {
        let now = Utc::now();
        self.transitions.push(TransitionRecord {
            from: Some(self.status),
            to,
            action,
            actor,
            reason,
            at: now,
        });
        self.status = to;
        self.version += 1;
        self.updated_at = now;
    }
}

fn require_active(identity: &Identity) -> Result<(), OrderError> {
    if identity.is_active() {
        Ok(())
    } else {
        Err(OrderError::RevokedActor { actor: identity.id })
    }
}

fn require_staff(identity: &Identity) -> Result<(), OrderError> {
    require_active(identity)?;
    if identity.role.is_staff() {
        Ok(())
    } else {
        Err(OrderError::NotStaff { actor: identity.id })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
