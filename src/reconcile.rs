//! Identifier extraction and set reconciliation.
//!
//! ## Contract
//!
//! ```text
//! to_create = upstream − stored
//! to_remove = stored − upstream
//! ```
//!
//! Both directions come from one symmetric difference; ordered sets keep
//! every derived list deterministic.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{CatalogItem, ItemId};

/// A set of unique identifiers, rebuilt every run.
pub type IdentifierSet = BTreeSet<ItemId>;

/// Error type for reconciliation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    /// Upstream is empty while storage is not.
    #[error("Upstream catalog is empty but storage holds {stored} identifiers; refusing to remove everything")]
    EmptyUpstream {
        /// Number of stored identifiers that would have been removed.
        stored: usize,
    },
}

/// Project items down to the identifiers stored under `key`.
///
/// Items lacking the key, or carrying a value that is not an integer or
/// string, are skipped with a log line and never fail the extraction.
pub fn extract_ids<'a, I>(items: I, key: &str) -> IdentifierSet
where
    I: IntoIterator<Item = &'a CatalogItem>,
{
    let mut ids = IdentifierSet::new();
    let mut skipped = 0usize;

    for item in items {
        match item.id_by(key) {
            Some(id) => {
                ids.insert(id);
            }
            None => {
                skipped += 1;
                tracing::debug!(key = key, "Item has no usable identifier, skipping");
            }
        }
    }

    if skipped > 0 {
        tracing::warn!(key = key, skipped = skipped, "Items without identifier skipped");
    }
    ids
}

/// Outcome of diffing upstream identifiers against stored identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Present upstream, absent in storage.
    pub to_create: IdentifierSet,
    /// Present in storage, absent upstream.
    pub to_remove: IdentifierSet,
}

impl Reconciliation {
    /// True when storage already mirrors upstream.
    pub fn is_converged(&self) -> bool {
        self.to_create.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute creations and removals in O(n + m).
pub fn reconcile(upstream: &IdentifierSet, stored: &IdentifierSet) -> Reconciliation {
    Reconciliation {
        to_create: upstream.difference(stored).cloned().collect(),
        to_remove: stored.difference(upstream).cloned().collect(),
    }
}

/// Set reconciler with a guard against wiping storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetReconciler {
    allow_empty_upstream: bool,
}

impl SetReconciler {
    /// Create a reconciler.
    ///
    /// With `allow_empty_upstream = false`, an empty upstream set against a
    /// non-empty store is rejected instead of marking everything for removal.
    pub fn new(allow_empty_upstream: bool) -> Self {
        Self { allow_empty_upstream }
    }

    /// Diff the two sets, applying the empty-upstream guard.
    pub fn plan(
        &self,
        upstream: &IdentifierSet,
        stored: &IdentifierSet,
    ) -> Result<Reconciliation, ReconcileError> {
        if upstream.is_empty() && !stored.is_empty() && !self.allow_empty_upstream {
            return Err(ReconcileError::EmptyUpstream {
                stored: stored.len(),
            });
        }

        let plan = reconcile(upstream, stored);
        tracing::info!(
            upstream = upstream.len(),
            stored = stored.len(),
            to_create = plan.to_create.len(),
            to_remove = plan.to_remove.len(),
            "Reconciliation planned"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(ids: &[i64]) -> IdentifierSet {
        ids.iter().copied().map(ItemId::Int).collect()
    }

    #[test]
    fn test_extract_skips_missing_keys() {
        let items: Vec<CatalogItem> = vec![
            json!({"id": 1}),
            json!({"name": "no id"}),
            json!({"id": null}),
            json!({"id": "sku-9"}),
            json!({"id": 1}),
        ]
        .into_iter()
        .filter_map(CatalogItem::from_value)
        .collect();

        let ids = extract_ids(&items, "id");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&ItemId::Int(1)));
        assert!(ids.contains(&ItemId::from("sku-9")));
    }

    #[test]
    fn test_extract_with_custom_key() {
        let items: Vec<CatalogItem> = vec![json!({"id": 1, "sku": "A"}), json!({"id": 2})]
            .into_iter()
            .filter_map(CatalogItem::from_value)
            .collect();

        assert_eq!(extract_ids(&items, "sku"), [ItemId::from("A")].into_iter().collect());
    }

    #[test]
    fn test_reconcile_differences() {
        let plan = reconcile(&set(&[1, 2, 3]), &set(&[2, 3, 4, 5]));
        assert_eq!(plan.to_create, set(&[1]));
        assert_eq!(plan.to_remove, set(&[4, 5]));
    }

    #[test]
    fn test_reconcile_identical_is_converged() {
        let plan = reconcile(&set(&[1, 2]), &set(&[1, 2]));
        assert!(plan.is_converged());
    }

    #[test]
    fn test_empty_upstream_removes_everything_without_guard() {
        let plan = reconcile(&set(&[]), &set(&[1, 2, 3]));
        assert_eq!(plan.to_remove, set(&[1, 2, 3]));
    }

    #[test]
    fn test_guard_rejects_empty_upstream() {
        let err = SetReconciler::new(false)
            .plan(&set(&[]), &set(&[1, 2]))
            .unwrap_err();
        assert_eq!(err, ReconcileError::EmptyUpstream { stored: 2 });
    }

    #[test]
    fn test_guard_allows_when_configured() {
        let plan = SetReconciler::new(true)
            .plan(&set(&[]), &set(&[1, 2]))
            .unwrap();
        assert_eq!(plan.to_remove, set(&[1, 2]));
    }

    #[test]
    fn test_guard_ignores_empty_storage() {
        let plan = SetReconciler::new(false).plan(&set(&[]), &set(&[])).unwrap();
        assert!(plan.is_converged());
    }
}
