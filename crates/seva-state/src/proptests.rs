//! Random transition sequences never break the order invariants, and a
//! refused transition never mutates the order.

use std::collections::BTreeMap;

use proptest::prelude::*;

use seva_core::DocTag;

use crate::order::tests::Fixture;
use crate::order::{Order, OrderStatus};

#[derive(Debug, Clone)]
enum Step {
    ClaimA,
    ClaimB,
    RejectDoc { by_b: bool, tag: usize },
    Reupload { tag: usize },
    Complete { by_b: bool },
    RejectOrder { by_b: bool },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::ClaimA),
        Just(Step::ClaimB),
        (any::<bool>(), 0..3usize).prop_map(|(by_b, tag)| Step::RejectDoc { by_b, tag }),
        (0..3usize).prop_map(|tag| Step::Reupload { tag }),
        any::<bool>().prop_map(|by_b| Step::Complete { by_b }),
        any::<bool>().prop_map(|by_b| Step::RejectOrder { by_b }),
    ]
}

// Index 2 is a tag the order never carries.
const TAGS: [&str; 3] = ["aadhaar", "photo", "passport"];

fn apply(fx: &mut Fixture, order: &mut Order, step: &Step) -> bool {
    let staff = |by_b: bool, fx: &Fixture| {
        if by_b {
            fx.staff_b.clone()
        } else {
            fx.staff_a.clone()
        }
    };
    match step {
        Step::ClaimA => order.claim(&fx.staff_a).is_ok(),
        Step::ClaimB => order.claim(&fx.staff_b).is_ok(),
        Step::RejectDoc { by_b, tag } => {
            let staff = staff(*by_b, &*fx);
            let tag = DocTag::new(TAGS[*tag]).unwrap();
            order.reject_document(&staff, &tag, "unreadable").is_ok()
        }
        Step::Reupload { tag } => {
            let fresh = fx.add_doc(TAGS[*tag]);
            let customer = fx.customer.clone();
            let tag = DocTag::new(TAGS[*tag]).unwrap();
            order
                .reupload_document(&customer, &tag, fresh, &fx.resolver())
                .is_ok()
        }
        Step::Complete { by_b } => {
            let staff = staff(*by_b, &*fx);
            order.complete(&staff, BTreeMap::new(), &fx.resolver()).is_ok()
        }
        Step::RejectOrder { by_b } => {
            let staff = staff(*by_b, &*fx);
            order.reject_order(&staff, "ineligible").is_ok()
        }
    }
}

proptest! {
    #[test]
    fn invariants_hold_after_every_step(steps in prop::collection::vec(step(), 0..24)) {
        let mut fx = Fixture::new();
        let mut order = fx.submit();
        let submitted_tags: Vec<DocTag> = order.document_ids.keys().cloned().collect();

        for step in &steps {
            let before = order.clone();
            let applied = apply(&mut fx, &mut order, step);

            if applied {
                prop_assert_eq!(order.version, before.version + 1);
            } else {
                prop_assert_eq!(&order, &before, "refused {:?} mutated the order", step);
            }
            prop_assert!(order.check_invariants().is_ok(), "{:?}", order.check_invariants());
            for tag in &submitted_tags {
                prop_assert!(order.document_ids.contains_key(tag));
            }
            if before.assigned_staff_id.is_some() {
                prop_assert_eq!(order.assigned_staff_id, before.assigned_staff_id);
            }
            if before.status.is_terminal() {
                prop_assert_eq!(order.status, before.status);
            }
        }
    }

    #[test]
    fn completed_orders_always_have_an_assignee(steps in prop::collection::vec(step(), 0..24)) {
        let mut fx = Fixture::new();
        let mut order = fx.submit();
        for step in &steps {
            apply(&mut fx, &mut order, step);
        }
        if order.status == OrderStatus::Completed || order.status == OrderStatus::Processing {
            prop_assert!(order.assigned_staff_id.is_some());
        }
    }
}
