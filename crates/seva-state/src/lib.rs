//! # seva-state: Order Lifecycle
//!
//! The order state machine at the center of the portal, and the queries
//! staff use to find work.
//!
//! - **Order** (`order.rs`): `Received → Processing → Completed`, the
//!   `ActionRequired` correction loop, and terminal `Rejected`. Every
//!   transition appends a [`TransitionRecord`] and bumps `version`.
//!
//! - **Pool** (`pool.rs`): the derived view of unassigned open orders, plus
//!   the assigned-to and submitted-by listings.
//!
//! The machine is pure: it never touches the wallet or the document store.
//! Documents are looked up through [`DocumentResolver`]; charging and
//! refunding are recorded on the order by the caller that performed them.

pub mod order;
pub mod pool;

#[cfg(test)]
mod proptests;

pub use order::{
    DocumentRef, DocumentResolver, Order, OrderAction, OrderError, OrderStatus, PaymentState,
    Submission, TransitionRecord,
};
pub use pool::{select, OrderFilter};
