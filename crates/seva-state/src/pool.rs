//! # Staff Assignment Pool and Order Queries
//!
//! The pool is not stored. It is recomputed from order state on every read:
//! all non-terminal orders with no assignee, oldest first. Claim exclusivity
//! lives in the commit path (version compare-and-set), not here.

use serde::{Deserialize, Serialize};

use seva_core::IdentityId;

use crate::order::Order;

/// Which orders a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "filter", content = "identity_id", rename_all = "snake_case")]
pub enum OrderFilter {
    /// Unassigned, non-terminal orders.
    Pool,
    /// Orders claimed by the given staff member.
    AssignedTo(IdentityId),
    /// Orders submitted by, or on behalf of, the given identity.
    SubmittedBy(IdentityId),
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            Self::Pool => order.is_in_pool(),
            Self::AssignedTo(staff) => order.assigned_staff_id == Some(*staff),
            Self::SubmittedBy(identity) => {
                order.submitted_by == *identity || order.target_id == *identity
            }
        }
    }
}

/// Apply `filter` and sort. The pool is served oldest first so staff work
/// the queue in arrival order; other listings are newest first.
pub fn select<'a>(
    orders: impl IntoIterator<Item = &'a Order>,
    filter: OrderFilter,
) -> Vec<&'a Order> {
    let mut selected: Vec<&Order> = orders.into_iter().filter(|o| filter.matches(o)).collect();
    match filter {
        OrderFilter::Pool => {
            selected.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
        }
        _ => selected.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))),
    }
    selected
}
