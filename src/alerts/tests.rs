use serde_json::{json, Value};
use time::macros::datetime;
use time::OffsetDateTime;

use crate::config::EngineConfig;
use crate::domain::case::CaseRecord;
use crate::domain::status::{AlertStatus, MatchStatus};
use crate::storage::memory::{CountingNotifier, MemoryStorage, RecordingReporter};

use super::service::{AlertDocuments, AlertService, AlertUpdate, PersistReason, UpdateOutcome};

const ALERTS: &str = "alerts.csv";
const WORKFLOW: &str = "workflow.json";
const NOW: &str = "2026-03-10T12:00:00Z";

fn fixed_clock() -> OffsetDateTime {
    datetime!(2026-03-10 12:00 UTC)
}

fn documents() -> AlertDocuments {
    AlertDocuments {
        alerts: ALERTS.to_string(),
        workflow: WORKFLOW.to_string(),
    }
}

fn service<'a>(storage: &'a MemoryStorage, cases: &'a Vec<CaseRecord>) -> AlertService<'a> {
    service_with(storage, cases, EngineConfig::default())
}

fn service_with<'a>(
    storage: &'a MemoryStorage,
    cases: &'a Vec<CaseRecord>,
    config: EngineConfig,
) -> AlertService<'a> {
    AlertService::new(storage, cases, documents(), config).with_clock(fixed_clock)
}

fn jane_doe() -> Vec<CaseRecord> {
    vec![CaseRecord::new("case-1", "Jane Doe", Some("mc500"))]
}

fn two_alert_export() -> MemoryStorage {
    MemoryStorage::with(
        ALERTS,
        "Report ID,MCN,Alert Type,Description\n\
         A1,MC-500,Income,Wage mismatch\n\
         A2,MC-777,Assets,Bank account\n",
    )
}

fn stored_document(storage: &MemoryStorage) -> Value {
    let text = storage
        .get(WORKFLOW)
        .expect("workflow document should exist");
    serde_json::from_str(&text).expect("workflow document should be valid JSON")
}

fn resolve(notes: &str) -> AlertUpdate {
    AlertUpdate {
        status: Some(AlertStatus::Resolved),
        resolution_notes: Some(notes.to_string()),
        ..AlertUpdate::default()
    }
}

#[test]
fn resolved_alert_survives_reimport_of_the_same_export() {
    let storage = MemoryStorage::with(ALERTS, "Report ID,MCN,Description\nA1,MC-500,Wage mismatch\n");
    let cases = jane_doe();
    let service = service(&storage, &cases);

    let first = service.reconcile();
    assert_eq!(first.index.alerts.len(), 1);
    let alert = &first.index.alerts[0];
    assert_eq!(alert.key, "A1");
    assert_eq!(alert.match_status, MatchStatus::Matched);
    assert_eq!(alert.matched_case_name(), Some("Jane Doe"));
    assert!(!first.wrote);

    let outcome = service
        .update_alert("A1", resolve("Called client"))
        .expect("update should succeed");
    let UpdateOutcome::Updated(updated) = outcome else {
        panic!("expected saved update");
    };
    assert_eq!(updated.resolved_at.as_deref(), Some(NOW));

    let second = service.reconcile();
    let alert = &second.index.alerts[0];
    assert_eq!(alert.status, AlertStatus::Resolved);
    assert_eq!(alert.resolution_notes.as_deref(), Some("Called client"));
    assert!(alert.resolved_at.is_some());
    assert_eq!(alert.matched_case_name(), Some("Jane Doe"));
    assert_eq!(second.index.summary.resolved, 1);
    assert!(!second.wrote);
}

#[test]
fn legacy_document_is_migrated_once_and_then_left_alone() {
    let storage = two_alert_export();
    storage.put(
        WORKFLOW,
        r#"{"version":1,"alerts":[{"reportId":"A1","status":"In Progress","notes":"left voicemail","severity":"high"}]}"#,
    );
    let cases = jane_doe();
    let service = service(&storage, &cases);

    let first = service.reconcile();
    assert!(first.wrote);
    assert!(first.reasons.contains(&PersistReason::Migration));
    assert_eq!(storage.writes.get(), 1);
    let document = stored_document(&storage);
    assert_eq!(document["version"], json!(2));
    assert_eq!(
        document["alerts"],
        json!([{"key": "A1", "status": "in-progress", "resolutionNotes": "left voicemail"}])
    );

    let second = service.reconcile();
    assert!(!second.wrote);
    assert_eq!(storage.writes.get(), 1);
    assert_eq!(second.index.alerts[0].status, AlertStatus::InProgress);
}

#[test]
fn orphaned_entries_are_carried_through_writes_unchanged() {
    let storage = two_alert_export();
    let orphan = json!({
        "key": "Z9",
        "status": "snoozed",
        "resolvedAt": null,
        "resolutionNotes": "waiting on next export",
        "updatedAt": "2025-11-01T08:00:00Z"
    });
    storage.put(
        WORKFLOW,
        &json!({"version": 2, "updatedAt": "2026-03-01T00:00:00Z", "alerts": [orphan.clone()]})
            .to_string(),
    );
    let cases = jane_doe();
    let service = service(&storage, &cases);

    let outcome = service.reconcile();
    assert_eq!(outcome.orphaned, 1);
    assert!(outcome.reasons.contains(&PersistReason::Orphans));
    assert!(!outcome.wrote);

    service
        .update_alert("A2", resolve("closed by worker"))
        .expect("update should succeed");
    let document = stored_document(&storage);
    let alerts = document["alerts"]
        .as_array()
        .expect("alerts should be a list");
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0]["key"], json!("A2"));
    assert_eq!(alerts[1], orphan);
}

#[test]
fn corrupted_document_is_backed_up_and_rebuilt_from_every_alert() {
    let storage = two_alert_export();
    storage.put(WORKFLOW, "{not json");
    let cases = jane_doe();
    let service = service(&storage, &cases);

    let outcome = service.reconcile();
    assert!(outcome.wrote);
    assert_eq!(
        outcome.reasons,
        vec![PersistReason::Migration, PersistReason::Corruption]
    );
    assert_eq!(
        storage.get("workflow.json.corrupt-2026-03-10T12-00-00Z").as_deref(),
        Some("{not json")
    );
    let document = stored_document(&storage);
    assert_eq!(document["alerts"], json!([{"key": "A1"}, {"key": "A2"}]));

    let again = service.reconcile();
    assert!(!again.wrote);
}

#[test]
fn empty_export_only_stamps_a_pending_empty_document() {
    let storage = MemoryStorage::with(WORKFLOW, r#"{"version":1,"alerts":[]}"#);
    let cases = jane_doe();
    let outcome = service(&storage, &cases).reconcile();
    assert!(outcome.index.is_empty());
    assert!(outcome.wrote);
    assert_eq!(stored_document(&storage)["version"], json!(2));

    let kept = r#"{"version":1,"alerts":[{"key":"A1","status":"resolved"}]}"#;
    let storage = MemoryStorage::with(WORKFLOW, kept);
    let outcome = service(&storage, &cases).reconcile();
    assert!(!outcome.wrote);
    assert_eq!(storage.writes.get(), 0);
    assert_eq!(storage.get(WORKFLOW).as_deref(), Some(kept));
}

#[test]
fn failed_write_keeps_the_index_and_reports_a_message() {
    let storage = two_alert_export();
    storage.put(WORKFLOW, r#"{"alerts":[{"key":"A1","status":"snoozed"}]}"#);
    storage.fail_writes.set(true);
    let cases = jane_doe();
    let reporter = RecordingReporter::default();
    let outcome = service(&storage, &cases)
        .with_reporter(&reporter)
        .reconcile();

    assert!(!outcome.wrote);
    assert!(outcome.warning.is_some());
    assert_eq!(outcome.index.alerts.len(), 2);
    assert_eq!(outcome.index.alerts[0].status, AlertStatus::Snoozed);
    let reports = reporter.reports.borrow();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].starts_with("write workflow document"));
}

#[test]
fn notifier_failure_does_not_undo_a_write() {
    let storage = two_alert_export();
    storage.put(WORKFLOW, r#"{"version":1,"alerts":[]}"#);
    let cases = jane_doe();
    let notifier = CountingNotifier {
        fail: true,
        ..CountingNotifier::default()
    };
    let outcome = service(&storage, &cases)
        .with_notifier(&notifier)
        .reconcile();
    assert!(outcome.wrote);
    assert!(outcome.warning.is_none());
    assert_eq!(notifier.calls.get(), 1);
}

#[test]
fn unreadable_or_malformed_export_degrades_to_no_alerts() {
    let storage = two_alert_export();
    storage.fail_reads.borrow_mut().push(ALERTS.to_string());
    let cases = jane_doe();
    let reporter = RecordingReporter::default();
    let outcome = service(&storage, &cases)
        .with_reporter(&reporter)
        .reconcile();
    assert!(outcome.index.is_empty());
    assert!(!outcome.wrote);
    assert!(reporter.reports.borrow()[0].starts_with("read alert export"));

    let storage = MemoryStorage::with(ALERTS, "Report ID,Description\nA1,\"never closed\n");
    let reporter = RecordingReporter::default();
    let outcome = service(&storage, &cases)
        .with_reporter(&reporter)
        .reconcile();
    assert!(outcome.index.is_empty());
    assert!(reporter.reports.borrow()[0].starts_with("parse alert export"));
}

#[test]
fn unreadable_workflow_document_is_never_overwritten() {
    let storage = two_alert_export();
    storage.fail_reads.borrow_mut().push(WORKFLOW.to_string());
    let cases = jane_doe();
    let reporter = RecordingReporter::default();
    let service = service(&storage, &cases).with_reporter(&reporter);

    let outcome = service.reconcile();
    assert_eq!(outcome.index.alerts.len(), 2);
    assert!(!outcome.wrote);

    let update = service
        .update_alert("A1", resolve("offline"))
        .expect("update should not error");
    assert!(matches!(update, UpdateOutcome::Unsaved { .. }));
    assert_eq!(storage.writes.get(), 0);
}

#[test]
fn updating_an_unknown_key_is_not_found() {
    let storage = two_alert_export();
    let cases = jane_doe();
    let outcome = service(&storage, &cases)
        .update_alert("missing", resolve("n/a"))
        .expect("update should not error");
    assert_eq!(outcome, UpdateOutcome::NotFound("missing".to_string()));
    assert_eq!(storage.writes.get(), 0);
}

#[test]
fn stored_null_resolution_overrides_the_exported_date() {
    let storage = MemoryStorage::with(
        ALERTS,
        "Report ID,Description,Resolved At\nA1,Wage mismatch,2026-02-01\nA2,Bank account,2026-02-02\n",
    );
    storage.put(
        WORKFLOW,
        r#"{"version":2,"alerts":[{"key":"A1","status":"in-progress","resolvedAt":null}]}"#,
    );
    let cases = Vec::new();
    let outcome = service(&storage, &cases).reconcile();
    assert_eq!(outcome.index.alerts[0].resolved_at, None);
    assert_eq!(outcome.index.alerts[0].status, AlertStatus::InProgress);
    assert_eq!(
        outcome.index.alerts[1].resolved_at.as_deref(),
        Some("2026-02-02T00:00:00Z")
    );
}

#[test]
fn reopening_an_alert_clears_and_pins_its_resolution() {
    let storage = two_alert_export();
    let cases = jane_doe();
    let service = service(&storage, &cases);
    service
        .update_alert("A1", resolve("Called client"))
        .expect("resolve should succeed");

    let outcome = service
        .update_alert(
            "A1",
            AlertUpdate {
                status: Some(AlertStatus::InProgress),
                ..AlertUpdate::default()
            },
        )
        .expect("reopen should succeed");
    let UpdateOutcome::Updated(alert) = outcome else {
        panic!("expected saved update");
    };
    assert_eq!(alert.resolved_at, None);
    assert_eq!(alert.resolution_notes.as_deref(), Some("Called client"));

    let document = stored_document(&storage);
    assert_eq!(document["alerts"][0]["resolvedAt"], Value::Null);
    assert_eq!(document["alerts"][0]["status"], json!("in-progress"));
}

#[test]
fn update_rejects_empty_changes_and_bad_timestamps() {
    let storage = two_alert_export();
    let cases = jane_doe();
    let service = service(&storage, &cases);
    assert!(service.update_alert("A1", AlertUpdate::default()).is_err());
    let bad = AlertUpdate {
        resolved_at: Some(Some("yesterday".to_string())),
        ..AlertUpdate::default()
    };
    assert!(service.update_alert("A1", bad).is_err());
    assert_eq!(storage.writes.get(), 0);
}

#[test]
fn update_applies_to_every_alert_sharing_a_key() {
    let storage = MemoryStorage::with(ALERTS, "Alert Code,Description\nX1,first\nX1,second\n");
    let cases = Vec::new();
    let service = service(&storage, &cases);
    service
        .update_alert("X1", resolve("both"))
        .expect("update should succeed");

    let outcome = service.reconcile();
    assert_eq!(outcome.index.alerts.len(), 2);
    assert!(outcome
        .index
        .alerts
        .iter()
        .all(|alert| alert.status == AlertStatus::Resolved));
    assert_eq!(
        stored_document(&storage)["alerts"]
            .as_array()
            .map(Vec::len),
        Some(1)
    );
}

#[test]
fn retention_window_drops_stale_orphans_only() {
    let storage = two_alert_export();
    storage.put(
        WORKFLOW,
        r#"{"version":2,"alerts":[
            {"key":"OLD","status":"snoozed","updatedAt":"2026-01-01T00:00:00Z"},
            {"key":"RECENT","status":"snoozed","updatedAt":"2026-03-01T00:00:00Z"},
            {"key":"UNDATED","status":"snoozed"}
        ]}"#,
    );
    let cases = jane_doe();
    let config = EngineConfig {
        orphan_retention_days: Some(30),
        ..EngineConfig::default()
    };
    let outcome = service_with(&storage, &cases, config).reconcile();
    assert!(outcome.wrote);
    assert_eq!(outcome.orphaned, 3);

    let document = stored_document(&storage);
    let keys = document["alerts"]
        .as_array()
        .expect("alerts should be a list")
        .iter()
        .filter_map(|entry| entry["key"].as_str())
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["RECENT", "UNDATED"]);
}

#[test]
fn repeated_reconcile_is_stable_with_orphans_and_stored_entries() {
    let storage = two_alert_export();
    storage.put(
        WORKFLOW,
        r#"{"version":2,"alerts":[
            {"key":"A1","status":"snoozed","updatedAt":"2026-03-01T00:00:00Z"},
            {"key":"Z9","status":"resolved"}
        ]}"#,
    );
    let cases = jane_doe();
    let service = service(&storage, &cases);

    let first = service.reconcile();
    let writes_after_first = storage.writes.get();
    let document_after_first = storage.get(WORKFLOW);
    assert_eq!(first.orphaned, 1);
    assert_eq!(first.index.summary.matched, 1);
    assert_eq!(first.index.alerts[0].status, AlertStatus::Snoozed);

    let second = service.reconcile();
    assert!(!second.wrote);
    assert_eq!(storage.writes.get(), writes_after_first);
    assert_eq!(storage.get(WORKFLOW), document_after_first);
    assert_eq!(second.orphaned, first.orphaned);
    assert_eq!(
        serde_json::to_string(&first.index).expect("index should serialize"),
        serde_json::to_string(&second.index).expect("index should serialize")
    );
}
