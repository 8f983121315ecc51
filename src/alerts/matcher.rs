use std::collections::HashMap;

use crate::domain::alert::{Alert, MatchedCase};
use crate::domain::case::CaseRecord;
use crate::domain::status::MatchStatus;

use super::normalize::normalize_identifier;

/// Normalized case reference to case, built once per pass.
///
/// When two cases normalize to the same reference the first one in input
/// order is kept and later ones are ignored.
#[derive(Debug, Clone, Default)]
pub struct CaseLookup {
    by_reference: HashMap<String, MatchedCase>,
    shadowed: usize,
}

impl CaseLookup {
    pub fn build(cases: &[CaseRecord]) -> Self {
        let mut by_reference = HashMap::with_capacity(cases.len());
        let mut shadowed = 0usize;
        for case in cases {
            let key = normalize_identifier(case.reference.as_deref());
            if key.is_empty() {
                continue;
            }
            if by_reference.contains_key(&key) {
                shadowed += 1;
                continue;
            }
            by_reference.insert(key, MatchedCase::from(case));
        }
        Self {
            by_reference,
            shadowed,
        }
    }

    pub fn len(&self) -> usize {
        self.by_reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_reference.is_empty()
    }

    /// Number of cases dropped because an earlier case had the same reference.
    pub fn shadowed(&self) -> usize {
        self.shadowed
    }

    pub fn resolve(&self, reference: Option<&str>) -> MatchVerdict<'_> {
        let key = normalize_identifier(reference);
        if key.is_empty() {
            return MatchVerdict::MissingIdentifier;
        }
        match self.by_reference.get(&key) {
            Some(case) => MatchVerdict::Matched(case),
            None => MatchVerdict::Unmatched,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchVerdict<'a> {
    Matched(&'a MatchedCase),
    MissingIdentifier,
    Unmatched,
}

impl MatchVerdict<'_> {
    pub fn status(&self) -> MatchStatus {
        match self {
            MatchVerdict::Matched(_) => MatchStatus::Matched,
            MatchVerdict::MissingIdentifier => MatchStatus::MissingIdentifier,
            MatchVerdict::Unmatched => MatchStatus::Unmatched,
        }
    }
}

/// Re-derives the alert's match fields from the lookup. Fields already equal
/// to the verdict are left untouched; returns whether anything was written.
pub fn apply_match(lookup: &CaseLookup, alert: &mut Alert) -> bool {
    let verdict = lookup.resolve(alert.case_reference.as_deref());
    let status = verdict.status();
    let matched_case = match verdict {
        MatchVerdict::Matched(case) => Some(case),
        _ => None,
    };

    let mut changed = false;
    if alert.match_status != status {
        alert.match_status = status;
        changed = true;
    }
    if alert.matched_case.as_ref() != matched_case {
        alert.matched_case = matched_case.cloned();
        changed = true;
    }
    changed
}
