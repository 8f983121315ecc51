use time::macros::datetime;

use crate::domain::alert::Alert;
use crate::domain::status::AlertStatus;

use super::super::store::WorkflowState;
use super::super::errors::AlertsError;
use super::{apply_update, format_timestamp, normalize_update, overlay, AlertUpdate, PersistReason};

fn alert(key: &str) -> Alert {
    Alert {
        key: key.to_string(),
        ..Alert::default()
    }
}

#[test]
fn overlay_reports_changes_and_unclaimed_entries_in_stored_order() {
    let mut alerts = vec![alert("A1"), alert("A2")];
    let entries = vec![
        WorkflowState {
            status: Some(AlertStatus::Acknowledged),
            ..WorkflowState::new("Z1")
        },
        WorkflowState {
            status: Some(AlertStatus::Snoozed),
            first_seen_at: Some("2026-03-01T00:00:00Z".to_string()),
            ..WorkflowState::new("A2")
        },
        WorkflowState::new("Z2"),
    ];

    let (changed, remaining) = overlay(&mut alerts, &entries, false);
    assert!(changed);
    assert_eq!(alerts[0], alert("A1"));
    assert_eq!(alerts[1].status, AlertStatus::Snoozed);
    assert_eq!(
        alerts[1].first_seen_at.as_deref(),
        Some("2026-03-01T00:00:00Z")
    );
    let keys = remaining
        .iter()
        .map(|entry| entry.key.as_str())
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["Z1", "Z2"]);
}

#[test]
fn overlay_of_matching_entry_is_not_a_change() {
    let mut alerts = vec![alert("A1")];
    let (changed, remaining) = overlay(&mut alerts, &[WorkflowState::new("A1")], true);
    assert!(!changed);
    assert!(remaining.is_empty());
}

#[test]
fn resolving_without_a_date_stamps_now_once() {
    let mut target = alert("A1");
    let update = AlertUpdate {
        status: Some(AlertStatus::Resolved),
        ..AlertUpdate::default()
    };
    apply_update(&mut target, &update, "2026-03-10T12:00:00Z");
    assert_eq!(target.resolved_at.as_deref(), Some("2026-03-10T12:00:00Z"));
    assert_eq!(target.first_seen_at.as_deref(), Some("2026-03-10T12:00:00Z"));
    assert!(target.resolved_at_pinned);

    apply_update(&mut target, &update, "2026-03-11T09:00:00Z");
    assert_eq!(target.resolved_at.as_deref(), Some("2026-03-10T12:00:00Z"));
    assert_eq!(target.updated_at.as_deref(), Some("2026-03-11T09:00:00Z"));
    assert_eq!(target.first_seen_at.as_deref(), Some("2026-03-10T12:00:00Z"));
}

#[test]
fn notes_only_update_leaves_resolution_untouched() {
    let mut target = Alert {
        resolved_at: Some("2026-02-01T00:00:00Z".to_string()),
        ..alert("A1")
    };
    let update = AlertUpdate {
        resolution_notes: Some("left voicemail".to_string()),
        ..AlertUpdate::default()
    };
    apply_update(&mut target, &update, "2026-03-10T12:00:00Z");
    assert_eq!(target.resolved_at.as_deref(), Some("2026-02-01T00:00:00Z"));
    assert!(!target.resolved_at_pinned);
    assert_eq!(target.resolution_notes.as_deref(), Some("left voicemail"));

    let clear = AlertUpdate {
        resolution_notes: Some(String::new()),
        ..AlertUpdate::default()
    };
    apply_update(&mut target, &clear, "2026-03-10T12:00:00Z");
    assert_eq!(target.resolution_notes, None);
}

#[test]
fn supplied_timestamps_are_normalized_to_utc() {
    let update = normalize_update(AlertUpdate {
        resolved_at: Some(Some(" 2026-03-10T08:00:00-04:00 ".to_string())),
        resolution_notes: Some("  done  ".to_string()),
        ..AlertUpdate::default()
    })
    .expect("timestamp should parse");
    assert_eq!(
        update.resolved_at,
        Some(Some("2026-03-10T12:00:00Z".to_string()))
    );
    assert_eq!(update.resolution_notes.as_deref(), Some("done"));

    let cleared = normalize_update(AlertUpdate {
        resolved_at: Some(None),
        ..AlertUpdate::default()
    })
    .expect("clearing should be accepted");
    assert_eq!(cleared.resolved_at, Some(None));
}

#[test]
fn timestamps_and_reasons_render_stably() {
    assert_eq!(
        format_timestamp(datetime!(2026-03-10 08:00 -4)).as_deref(),
        Some("2026-03-10T12:00:00Z")
    );
    assert_eq!(format_timestamp(datetime!(9999-12-31 23:00 -5)), None);
    assert_eq!(PersistReason::Migration.as_str(), "migration");
    assert_eq!(PersistReason::Orphans.as_str(), "orphans");
}

#[test]
fn timestamps_without_a_utc_form_are_rejected() {
    for raw in ["0000-01-01T00:30:00+01:00", "9999-12-31T23:00:00-05:00"] {
        let result = normalize_update(AlertUpdate {
            resolved_at: Some(Some(raw.to_string())),
            ..AlertUpdate::default()
        });
        assert!(
            matches!(result, Err(AlertsError::InvalidTimestamp(ref value)) if value == raw),
            "expected invalid timestamp for {raw}"
        );
    }
}
