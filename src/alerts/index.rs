use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::alert::Alert;
use crate::domain::status::MatchStatus;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub missing_identifier: usize,
    pub open: usize,
    pub resolved: usize,
}

/// Read-only view of one reconciliation pass, rebuilt every time.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlertIndex {
    pub alerts: Vec<Alert>,
    pub summary: AlertSummary,
    pub by_case: BTreeMap<String, Vec<Alert>>,
}

impl AlertIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn build(alerts: Vec<Alert>) -> Self {
        let mut summary = AlertSummary {
            total: alerts.len(),
            ..AlertSummary::default()
        };
        let mut by_case: BTreeMap<String, Vec<Alert>> = BTreeMap::new();

        for alert in &alerts {
            match alert.match_status {
                MatchStatus::Matched => summary.matched += 1,
                MatchStatus::Unmatched => summary.unmatched += 1,
                MatchStatus::MissingIdentifier => summary.missing_identifier += 1,
            }
            if alert.status.is_resolved() {
                summary.resolved += 1;
            } else {
                summary.open += 1;
            }
            if let Some(case_id) = alert.matched_case_id() {
                by_case
                    .entry(case_id.to_string())
                    .or_default()
                    .push(alert.clone());
            }
        }

        Self {
            alerts,
            summary,
            by_case,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn alerts_for_case(&self, case_id: &str) -> &[Alert] {
        self.by_case
            .get(case_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First alert carrying `key`, in export order.
    pub fn find(&self, key: &str) -> Option<&Alert> {
        self.alerts.iter().find(|alert| alert.key == key)
    }
}
