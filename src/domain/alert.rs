use serde::Serialize;

use super::case::CaseRecord;
use super::status::{AlertStatus, MatchStatus};

/// Display fields copied from the case an alert resolved to.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MatchedCase {
    pub id: String,
    pub name: String,
    pub status: Option<String>,
}

impl From<&CaseRecord> for MatchedCase {
    fn from(value: &CaseRecord) -> Self {
        Self {
            id: value.id.clone(),
            name: value.name.clone(),
            status: value.status.clone(),
        }
    }
}

/// One alert as rebuilt from the source export on every load, with its
/// workflow fields overlaid from the stored document.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub key: String,
    pub report_id: Option<String>,
    pub alert_id: Option<String>,
    pub alert_code: Option<String>,
    pub alert_type: Option<String>,
    pub description: Option<String>,
    pub program: Option<String>,
    pub source: Option<String>,
    pub text: Option<String>,
    pub case_reference: Option<String>,
    pub alert_date: Option<String>,
    pub updated_at: Option<String>,
    pub resolved_at: Option<String>,
    /// Set when `resolved_at` comes from workflow state rather than the export.
    #[serde(skip)]
    pub resolved_at_pinned: bool,
    pub first_seen_at: Option<String>,
    pub match_status: MatchStatus,
    /// Serialized as `matchedCase: {id, name, status}`, so the matched case
    /// name is `matchedCase.name`. `null` unless `match_status` is matched.
    pub matched_case: Option<MatchedCase>,
    pub status: AlertStatus,
    pub resolution_notes: Option<String>,
}

impl Alert {
    pub fn matched_case_id(&self) -> Option<&str> {
        self.matched_case.as_ref().map(|case| case.id.as_str())
    }

    pub fn matched_case_name(&self) -> Option<&str> {
        self.matched_case.as_ref().map(|case| case.name.as_str())
    }

    /// True when any user-driven field differs from a freshly imported alert.
    pub fn has_workflow_state(&self) -> bool {
        !self.status.is_default()
            || self.resolved_at_pinned
            || self
                .resolution_notes
                .as_deref()
                .is_some_and(|notes| !notes.trim().is_empty())
            || self.first_seen_at.is_some()
    }

    pub(crate) fn workflow_fields(&self) -> WorkflowFields {
        WorkflowFields {
            status: self.status,
            resolved_at: self.resolved_at.clone(),
            resolution_notes: self.resolution_notes.clone(),
            updated_at: self.updated_at.clone(),
            first_seen_at: self.first_seen_at.clone(),
        }
    }
}

/// The user-mutable slice of an alert, compared before and after overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkflowFields {
    pub status: AlertStatus,
    pub resolved_at: Option<String>,
    pub resolution_notes: Option<String>,
    pub updated_at: Option<String>,
    pub first_seen_at: Option<String>,
}
