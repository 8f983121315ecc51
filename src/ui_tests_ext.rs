use super::{alert_show_fields, filter_summary, format_alert_row, persist_line, Palette};
use crate::alerts::{AlertIndex, PersistReason, SyncOutcome};
use crate::app::ListFilter;
use crate::domain::alert::{Alert, MatchedCase};
use crate::domain::status::{AlertStatus, MatchStatus};

fn plain() -> Palette {
    Palette { enabled: false }
}

fn sample_alert() -> Alert {
    Alert {
        key: "A1".to_string(),
        case_reference: Some("MC-500".to_string()),
        description: Some("Wage mismatch\nsecond fragment".to_string()),
        match_status: MatchStatus::Matched,
        matched_case: Some(MatchedCase {
            id: "case-1".to_string(),
            name: "Jane Doe".to_string(),
            status: None,
        }),
        status: AlertStatus::Resolved,
        resolution_notes: Some("Called client".to_string()),
        ..Alert::default()
    }
}

#[test]
fn row_shows_case_name_and_first_description_line() {
    let row = format_alert_row(&sample_alert(), &plain());
    assert_eq!(row, "A1 [RESOLVED] (matched) Jane Doe - Wage mismatch");

    let unmatched = Alert {
        key: "A2".to_string(),
        case_reference: Some("MC-777".to_string()),
        match_status: MatchStatus::Unmatched,
        ..Alert::default()
    };
    assert_eq!(
        format_alert_row(&unmatched, &plain()),
        "A2 [NEW] (unmatched) MC-777"
    );
}

#[test]
fn filter_summary_formats_only_active_filters() {
    assert!(filter_summary(&ListFilter::default()).is_none());
    let filter = ListFilter {
        case_id: Some("case-1".to_string()),
        status: Some(AlertStatus::InProgress),
        unmatched: true,
    };
    assert_eq!(
        filter_summary(&filter).as_deref(),
        Some("case=case-1 status=in-progress unmatched=true")
    );
}

#[test]
fn show_fields_skip_absent_values_and_flatten_newlines() {
    let fields = alert_show_fields(&sample_alert());
    let labels = fields.iter().map(|(label, _)| *label).collect::<Vec<_>>();
    assert_eq!(
        labels,
        vec!["match", "case", "reference", "notes", "description"]
    );
    assert_eq!(fields[4].1, "Wage mismatch / second fragment");
}

#[test]
fn persist_line_names_reasons() {
    let mut outcome = SyncOutcome {
        index: AlertIndex::empty(),
        wrote: true,
        reasons: vec![PersistReason::Migration, PersistReason::Changed],
        orphaned: 0,
        warning: None,
    };
    assert_eq!(
        persist_line(&outcome),
        "workflow document written (migration,changed)"
    );
    outcome.wrote = false;
    assert_eq!(
        persist_line(&outcome),
        "workflow document not written (migration,changed)"
    );
    outcome.reasons.clear();
    assert_eq!(persist_line(&outcome), "workflow document unchanged");
}
