//! Property tests for set reconciliation and sequence allocation.

use catalog_mirror::{extract_ids, next_sequence, reconcile, CatalogItem, IdentifierSet, ItemId, SequencePattern};
use proptest::prelude::*;
use serde_json::json;

fn id_strategy() -> impl Strategy<Value = ItemId> {
    prop_oneof![
        (0i64..64).prop_map(ItemId::Int),
        "[a-d]{1,2}".prop_map(ItemId::Str),
    ]
}

fn id_set() -> impl Strategy<Value = IdentifierSet> {
    prop::collection::btree_set(id_strategy(), 0..48)
}

proptest! {
    #[test]
    fn test_reconcile_is_set_difference(upstream in id_set(), stored in id_set()) {
        let plan = reconcile(&upstream, &stored);

        let expected_create: IdentifierSet = upstream.difference(&stored).cloned().collect();
        let expected_remove: IdentifierSet = stored.difference(&upstream).cloned().collect();
        prop_assert_eq!(&plan.to_create, &expected_create);
        prop_assert_eq!(&plan.to_remove, &expected_remove);
    }

    #[test]
    fn test_reconcile_self_is_converged(ids in id_set()) {
        prop_assert!(reconcile(&ids, &ids).is_converged());
    }

    #[test]
    fn test_applying_plan_converges(upstream in id_set(), stored in id_set()) {
        let plan = reconcile(&upstream, &stored);

        let mut after: IdentifierSet = stored.difference(&plan.to_remove).cloned().collect();
        after.extend(plan.to_create.iter().cloned());

        prop_assert_eq!(&after, &upstream);
        prop_assert!(reconcile(&upstream, &after).is_converged());
    }

    #[test]
    fn test_extract_ignores_malformed(ids in prop::collection::vec(0i64..1000, 0..32), junk in 0usize..8) {
        let mut items: Vec<CatalogItem> = ids
            .iter()
            .map(|id| CatalogItem::from_value(json!({ "id": id })).unwrap())
            .collect();
        for i in 0..junk {
            items.push(CatalogItem::from_value(json!({ "name": i, "id": null })).unwrap());
        }

        let extracted = extract_ids(&items, "id");
        let expected: IdentifierSet = ids.into_iter().map(ItemId::Int).collect();
        prop_assert_eq!(extracted, expected);
    }

    #[test]
    fn test_next_sequence_exceeds_every_match(numbers in prop::collection::vec(0u64..10_000, 0..24)) {
        let pattern = SequencePattern::examples();
        let names: Vec<String> = numbers.iter().map(|n| pattern.name_for(*n)).collect();

        let next = next_sequence(&names, &pattern);

        prop_assert!(next >= pattern.floor());
        prop_assert!(numbers.iter().all(|n| *n < next));
        prop_assert!(!names.contains(&pattern.name_for(next)));
    }
}
