//! Golden scenarios for the feedback-export run.

use std::sync::Arc;

use catalog_mirror::config::ExportConfig;
use catalog_mirror::store::{InMemoryObjectStore, TEXT_CONTENT_TYPE};
use catalog_mirror::{
    next_sequence, CorrectionRow, ExportError, ExportRecord, FeedbackExport,
    InMemoryCorrectionSource, SequencePattern,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

fn correction(id: &str, days_ago: i64, difference: f64) -> CorrectionRow {
    CorrectionRow {
        added_at: now() - Duration::days(days_ago),
        difference,
        id: id.to_string(),
        prefix: Some("You are a support agent.".to_string()),
        user_request: Some(format!("Where is order {id}?")),
        original: Some("It shipped.".to_string()),
        edited: Some(format!("Order {id} shipped yesterday.")),
    }
}

fn config() -> ExportConfig {
    let vars: std::collections::HashMap<&str, &str> = [
        ("AZURE_CONTAINER_NAME", "feedback"),
        ("AZURE_STORAGE_ACCOUNT_NAME", "acct"),
        ("AZURE_STORAGE_ACCOUNT_KEY", "a2V5"),
        ("DATABASE_URL", "postgres://localhost/support"),
    ]
    .into_iter()
    .collect();
    ExportConfig::from_lookup(&|k: &str| vars.get(k).map(|v| v.to_string())).unwrap()
}

fn record(store: &InMemoryObjectStore, name: &str) -> ExportRecord {
    serde_json::from_slice(&store.object(name).unwrap().body).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Sequence Allocation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_next_sequence_golden() {
    let pattern = SequencePattern::new("", "example", ".txt", 11);

    let names = ["example11.txt", "example15.txt", "example9999notmatching.txt"];
    assert_eq!(next_sequence(names, &pattern), 16);

    let none: [&str; 0] = [];
    assert_eq!(next_sequence(none, &pattern), 11);
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_exports_window_in_order() {
    let store = Arc::new(InMemoryObjectStore::new("feedback"));
    store.insert("examples/example11.txt", "{}");
    store.insert("examples/example14.txt", "{}");
    let source = InMemoryCorrectionSource::new(vec![
        correction("old", 40, 0.1),
        correction("noisy", 2, 0.95),
        correction("first", 3, 0.5),
        correction("second", 1, 0.81),
    ]);
    let config = config();

    let export = FeedbackExport::with_pattern(source, Arc::clone(&store), config.pattern());
    let summary = export.run(&config.query(now())).await.unwrap();

    assert_eq!(summary.rows, 2);
    assert_eq!(summary.first_sequence, 15);
    assert_eq!(summary.next_sequence, 17);
    assert!(export.source().is_closed());

    // Newest first by default.
    let newest = record(&store, "examples/example15.txt");
    assert_eq!(newest.customer_request.as_deref(), Some("Where is order second?"));
    assert_eq!(newest.company_reply.as_deref(), Some("Order second shipped yesterday."));
    assert_eq!(newest.kind, "example");
    let older = record(&store, "examples/example16.txt");
    assert_eq!(older.customer_request.as_deref(), Some("Where is order first?"));

    assert_eq!(
        store.object("examples/example15.txt").unwrap().content_type,
        TEXT_CONTENT_TYPE
    );
}

#[tokio::test]
async fn test_numbering_continues_across_runs() {
    let store = Arc::new(InMemoryObjectStore::new("feedback"));
    let config = config();

    let first = FeedbackExport::new(
        InMemoryCorrectionSource::new(vec![correction("a", 1, 0.2), correction("b", 2, 0.2)]),
        Arc::clone(&store),
    )
    .run(&config.query(now()))
    .await
    .unwrap();
    assert_eq!((first.first_sequence, first.next_sequence), (11, 13));

    let second = FeedbackExport::new(
        InMemoryCorrectionSource::new(vec![correction("c", 1, 0.2)]),
        Arc::clone(&store),
    )
    .run(&config.query(now()))
    .await
    .unwrap();
    assert_eq!((second.first_sequence, second.next_sequence), (13, 14));

    assert_eq!(
        store.names(),
        vec![
            "examples/example11.txt",
            "examples/example12.txt",
            "examples/example13.txt"
        ]
    );
}

#[tokio::test]
async fn test_failed_row_does_not_consume_number() {
    let store = Arc::new(InMemoryObjectStore::new("feedback"));
    store.insert("examples/example20.txt", "{}");
    let export = FeedbackExport::new(
        InMemoryCorrectionSource::new(vec![correction("a", 1, 0.2), correction("b", 2, 0.2)]),
        Arc::clone(&store),
    );
    store.fail_put("examples/example21.txt");

    let summary = export.run(&config().query(now())).await.unwrap();

    // Both rows target 21; neither write lands, the number is not skipped.
    assert_eq!(summary.written(), 0);
    assert_eq!(summary.failed(), 2);
    assert_eq!(summary.next_sequence, 21);
    assert_eq!(store.names(), vec!["examples/example20.txt"]);
}

#[tokio::test]
async fn test_existing_examples_never_overwritten() {
    let store = Arc::new(InMemoryObjectStore::new("feedback"));
    store.insert("examples/example11.txt", "keep me");
    let export = FeedbackExport::new(
        InMemoryCorrectionSource::new(vec![correction("a", 1, 0.2)]),
        Arc::clone(&store),
    );

    export.run(&config().query(now())).await.unwrap();

    assert_eq!(store.object("examples/example11.txt").unwrap().body, "keep me");
    assert!(store.object("examples/example12.txt").is_some());
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure Handling
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_database_failure_aborts_before_writes() {
    let store = Arc::new(InMemoryObjectStore::new("feedback"));
    let export = FeedbackExport::new(
        InMemoryCorrectionSource::failing("password authentication failed"),
        Arc::clone(&store),
    );

    let err = export.run(&config().query(now())).await.unwrap_err();

    assert!(matches!(err, ExportError::Source(_)));
    assert!(export.source().is_closed());
    assert_eq!(store.put_count(), 0);
    assert!(!store.container_exists());
}

#[tokio::test]
async fn test_listing_failure_aborts_after_release() {
    let store = Arc::new(InMemoryObjectStore::new("feedback"));
    store.insert("examples/example11.txt", "{}");
    store.fail_list();
    let export = FeedbackExport::new(
        InMemoryCorrectionSource::new(vec![correction("a", 1, 0.2)]),
        Arc::clone(&store),
    );

    let err = export.run(&config().query(now())).await.unwrap_err();

    assert!(matches!(err, ExportError::Storage(_)));
    assert!(export.source().is_closed());
    assert_eq!(store.put_count(), 0);
}
