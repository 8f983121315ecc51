use std::collections::{HashMap, HashSet};

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime, UtcOffset};
use tracing::{debug, info, warn};

use crate::cases::CaseSource;
use crate::config::EngineConfig;
use crate::domain::alert::Alert;
use crate::domain::case::CaseRecord;
use crate::domain::status::AlertStatus;
use crate::storage::{ChangeNotifier, DocumentStorage, ErrorReporter, NoopNotifier, TracingReporter};

use super::csv::parse_alerts;
use super::errors::AlertsError;
use super::index::AlertIndex;
use super::matcher::{apply_match, CaseLookup};
use super::store::{
    dedupe_last_wins, snapshot_entries, LoadedWorkflows, SnapshotMode, WorkflowState,
    WorkflowStore,
};

const SAVE_FAILED_MESSAGE: &str =
    "Alert workflow changes could not be saved. They will be retried on the next refresh.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistReason {
    Migration,
    Corruption,
    Changed,
    Orphans,
}

impl PersistReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PersistReason::Migration => "migration",
            PersistReason::Corruption => "corruption",
            PersistReason::Changed => "changed",
            PersistReason::Orphans => "orphans",
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncOutcome {
    pub index: AlertIndex,
    pub wrote: bool,
    pub reasons: Vec<PersistReason>,
    pub orphaned: usize,
    pub warning: Option<String>,
}

impl SyncOutcome {
    fn unwritten(index: AlertIndex) -> Self {
        Self {
            index,
            wrote: false,
            reasons: Vec::new(),
            orphaned: 0,
            warning: None,
        }
    }
}

/// Requested changes to one alert's workflow fields.
///
/// `resolved_at: Some(None)` clears the resolution timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertUpdate {
    pub status: Option<AlertStatus>,
    pub resolved_at: Option<Option<String>>,
    pub resolution_notes: Option<String>,
}

impl AlertUpdate {
    fn has_changes(&self) -> bool {
        self.status.is_some() || self.resolved_at.is_some() || self.resolution_notes.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated(Alert),
    /// The change applied in memory but the workflow document was not written.
    Unsaved { alert: Alert, message: String },
    NotFound(String),
}

/// Names of the two documents the engine reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertDocuments {
    pub alerts: String,
    pub workflow: String,
}

pub struct AlertService<'a> {
    storage: &'a dyn DocumentStorage,
    cases: &'a dyn CaseSource,
    notifier: &'a dyn ChangeNotifier,
    reporter: &'a dyn ErrorReporter,
    documents: AlertDocuments,
    config: EngineConfig,
    clock: fn() -> OffsetDateTime,
}

/// Alerts rebuilt from the export with stored workflow state laid over them.
struct MergedPass {
    alerts: Vec<Alert>,
    lookup: CaseLookup,
    loaded: LoadedWorkflows,
    store_readable: bool,
    remaining: Vec<WorkflowState>,
    changed: bool,
}

impl<'a> AlertService<'a> {
    pub fn new(
        storage: &'a dyn DocumentStorage,
        cases: &'a dyn CaseSource,
        documents: AlertDocuments,
        config: EngineConfig,
    ) -> Self {
        Self {
            storage,
            cases,
            notifier: &NoopNotifier,
            reporter: &TracingReporter,
            documents,
            config,
            clock: OffsetDateTime::now_utc,
        }
    }

    pub fn with_notifier(mut self, notifier: &'a dyn ChangeNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    #[cfg(test)]
    pub fn with_reporter(mut self, reporter: &'a dyn ErrorReporter) -> Self {
        self.reporter = reporter;
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> OffsetDateTime) -> Self {
        self.clock = clock;
        self
    }

    fn store(&self) -> WorkflowStore<'a> {
        WorkflowStore::new(
            self.storage,
            self.documents.workflow.clone(),
            self.config.schema_version,
        )
    }

    /// Parses the export, rematches cases, overlays stored workflow state and
    /// rewrites the workflow document only when something requires it.
    pub fn reconcile(&self) -> SyncOutcome {
        let pass = self.merged_pass();
        let MergedPass {
            alerts,
            loaded,
            store_readable,
            remaining,
            changed,
            ..
        } = pass;

        if alerts.is_empty() {
            let pending = loaded.needs_migration || loaded.corrupted;
            if pending && loaded.entries.is_empty() && store_readable {
                let reasons = initial_reasons(&loaded);
                info!("no alerts available; stamping empty workflow document");
                let result = self.persist(Vec::new(), &loaded);
                return self.outcome(AlertIndex::empty(), reasons, 0, result);
            }
            debug!("no alerts available; leaving workflow document untouched");
            return SyncOutcome::unwritten(AlertIndex::empty());
        }

        let mut reasons = initial_reasons(&loaded);
        if changed {
            reasons.push(PersistReason::Changed);
        }
        if !remaining.is_empty() {
            reasons.push(PersistReason::Orphans);
        }
        let orphaned = remaining.len();

        if reasons.is_empty() || !store_readable {
            debug!(alerts = alerts.len(), "reconciled without persisting");
            return SyncOutcome {
                orphaned,
                ..SyncOutcome::unwritten(AlertIndex::build(alerts))
            };
        }

        let entries = self.entries_to_write(&alerts, &loaded, remaining);
        if !loaded.needs_migration && !loaded.corrupted && entries == loaded.entries {
            debug!(
                reasons = ?reasons,
                "workflow document already matches merged state; skipping write"
            );
            return SyncOutcome {
                orphaned,
                ..SyncOutcome::unwritten(AlertIndex::build(alerts))
            };
        }

        info!(
            reasons = ?reasons,
            entries = entries.len(),
            orphaned,
            "persisting workflow document"
        );
        let result = self.persist(entries, &loaded);
        self.outcome(AlertIndex::build(alerts), reasons, orphaned, result)
    }

    /// The index from a reconciliation pass, for callers that only read.
    pub fn load_index(&self) -> AlertIndex {
        self.reconcile().index
    }

    pub fn update_alert(&self, key: &str, update: AlertUpdate) -> Result<UpdateOutcome, AlertsError> {
        if !update.has_changes() {
            return Err(AlertsError::InvalidArgument(
                "update requires at least one field change".to_string(),
            ));
        }
        let update = normalize_update(update)?;

        let MergedPass {
            mut alerts,
            lookup,
            loaded,
            store_readable,
            remaining,
            ..
        } = self.merged_pass();

        let targets = alerts
            .iter()
            .enumerate()
            .filter(|(_, alert)| alert.key == key)
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        let Some(first) = targets.first().copied() else {
            debug!(key, "alert not present in current export");
            return Ok(UpdateOutcome::NotFound(key.to_string()));
        };

        let now = self.timestamp()?;
        for index in &targets {
            let alert = &mut alerts[*index];
            apply_update(alert, &update, &now);
            apply_match(&lookup, alert);
        }
        let updated = alerts[first].clone();
        info!(key, status = %updated.status, "alert workflow updated");

        if !store_readable {
            return Ok(UpdateOutcome::Unsaved {
                alert: updated,
                message: SAVE_FAILED_MESSAGE.to_string(),
            });
        }

        let entries = self.entries_to_write(&alerts, &loaded, remaining);
        match self.persist(entries, &loaded) {
            Ok(()) => Ok(UpdateOutcome::Updated(updated)),
            Err(message) => Ok(UpdateOutcome::Unsaved {
                alert: updated,
                message,
            }),
        }
    }

    /// Steps shared by reconciliation and direct mutation: load stored state,
    /// parse the export, rematch against a fresh case lookup, overlay.
    fn merged_pass(&self) -> MergedPass {
        let (loaded, store_readable) = match self.store().load() {
            Ok(loaded) => (loaded, true),
            Err(err) => {
                self.reporter
                    .report("read workflow document", &AlertsError::Store(err));
                (LoadedWorkflows::default(), false)
            }
        };
        if loaded.corrupted {
            warn!(
                document = %self.documents.workflow,
                "workflow document is corrupted; recovering from current alerts"
            );
        }

        let cases = match self.cases.cases() {
            Ok(cases) => cases,
            Err(err) => {
                self.reporter.report("load cases", &AlertsError::Cases(err));
                Vec::new()
            }
        };

        let mut alerts = self.parse_source(&cases);
        let lookup = CaseLookup::build(&cases);
        if lookup.shadowed() > 0 {
            debug!(
                shadowed = lookup.shadowed(),
                "cases sharing a normalized reference ignored"
            );
        }
        let rematched = alerts
            .iter_mut()
            .map(|alert| apply_match(&lookup, alert))
            .filter(|changed| *changed)
            .count();
        if rematched > 0 {
            debug!(rematched, "case rematch corrected parsed alerts");
        }

        let (changed, remaining) = overlay(&mut alerts, &loaded.entries, self.config.debug_logging);
        MergedPass {
            alerts,
            lookup,
            loaded,
            store_readable,
            remaining,
            changed,
        }
    }

    fn parse_source(&self, cases: &[CaseRecord]) -> Vec<Alert> {
        let text = match self.storage.read_text(&self.documents.alerts) {
            Ok(text) => text,
            Err(err) => {
                self.reporter
                    .report("read alert export", &AlertsError::SourceRead(err));
                return Vec::new();
            }
        };
        match parse_alerts(text.as_deref(), cases) {
            Ok(alerts) => alerts,
            Err(err) => {
                self.reporter
                    .report("parse alert export", &AlertsError::SourceParse(err));
                Vec::new()
            }
        }
    }

    fn entries_to_write(
        &self,
        alerts: &[Alert],
        loaded: &LoadedWorkflows,
        remaining: Vec<WorkflowState>,
    ) -> Vec<WorkflowState> {
        let mode = if loaded.corrupted {
            SnapshotMode::Force
        } else {
            SnapshotMode::Sparse
        };
        let stored_keys = loaded
            .entries
            .iter()
            .map(|entry| entry.key.clone())
            .collect::<HashSet<_>>();
        let mut entries = snapshot_entries(alerts, mode, &stored_keys);
        entries.extend(self.retain_orphans(remaining));
        dedupe_last_wins(entries).0
    }

    fn retain_orphans(&self, remaining: Vec<WorkflowState>) -> Vec<WorkflowState> {
        let Some(days) = self.config.orphan_retention_days else {
            return remaining;
        };
        let Some(cutoff) = (self.clock)().checked_sub(Duration::days(i64::from(days))) else {
            return remaining;
        };
        let before = remaining.len();
        let kept = remaining
            .into_iter()
            .filter(|entry| {
                match entry
                    .last_touched()
                    .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
                {
                    Some(touched) => touched >= cutoff,
                    None => true,
                }
            })
            .collect::<Vec<_>>();
        if kept.len() < before {
            info!(
                purged = before - kept.len(),
                days, "dropping orphaned workflow entries past retention"
            );
        }
        kept
    }

    /// Overwrites the workflow document; failures are reported and turned into
    /// the user-facing message.
    fn persist(&self, entries: Vec<WorkflowState>, loaded: &LoadedWorkflows) -> Result<(), String> {
        let store = self.store();
        let now = match self.timestamp() {
            Ok(now) => now,
            Err(err) => {
                self.reporter.report("stamp workflow document", &err);
                return Err(SAVE_FAILED_MESSAGE.to_string());
            }
        };
        if loaded.corrupted && self.config.backup_corrupt_documents {
            if let Some(raw) = loaded.raw.as_deref() {
                match store.backup(raw, &now) {
                    Ok(name) => info!(backup = %name, "saved copy of corrupted workflow document"),
                    Err(err) => {
                        self.reporter
                            .report("back up corrupted workflow document", &AlertsError::Store(err));
                        return Err(SAVE_FAILED_MESSAGE.to_string());
                    }
                }
            }
        }

        match store.save(entries, &now) {
            Ok(count) => {
                debug!(entries = count, document = %store.name(), "workflow document written");
                if let Err(err) = self.notifier.storage_changed() {
                    warn!(error = %err, "storage change listener failed");
                }
                Ok(())
            }
            Err(err) => {
                self.reporter
                    .report("write workflow document", &AlertsError::Store(err));
                Err(SAVE_FAILED_MESSAGE.to_string())
            }
        }
    }

    fn outcome(
        &self,
        index: AlertIndex,
        reasons: Vec<PersistReason>,
        orphaned: usize,
        result: Result<(), String>,
    ) -> SyncOutcome {
        let (wrote, warning) = match result {
            Ok(()) => (true, None),
            Err(message) => (false, Some(message)),
        };
        SyncOutcome {
            index,
            wrote,
            reasons,
            orphaned,
            warning,
        }
    }

    fn timestamp(&self) -> Result<String, AlertsError> {
        let now = (self.clock)();
        format_timestamp(now).ok_or_else(|| AlertsError::InvalidTimestamp(now.to_string()))
    }
}

/// RFC3339 in UTC, or `None` when the instant has no representable UTC form.
pub fn format_timestamp(value: OffsetDateTime) -> Option<String> {
    value
        .checked_to_offset(UtcOffset::UTC)
        .and_then(|utc| utc.format(&Rfc3339).ok())
}

fn initial_reasons(loaded: &LoadedWorkflows) -> Vec<PersistReason> {
    let mut reasons = Vec::new();
    if loaded.needs_migration {
        reasons.push(PersistReason::Migration);
    }
    if loaded.corrupted {
        reasons.push(PersistReason::Corruption);
    }
    reasons
}

/// Lays stored entries over alerts by key. Returns whether any alert's
/// workflow fields changed and the entries no alert claimed, in stored order.
pub(crate) fn overlay(
    alerts: &mut [Alert],
    entries: &[WorkflowState],
    trace: bool,
) -> (bool, Vec<WorkflowState>) {
    let stored = entries
        .iter()
        .map(|entry| (entry.key.as_str(), entry))
        .collect::<HashMap<_, _>>();
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut changed = false;

    for alert in alerts.iter_mut() {
        let Some(entry) = stored.get(alert.key.as_str()) else {
            continue;
        };
        let before = alert.workflow_fields();
        apply_entry(alert, entry);
        if alert.workflow_fields() != before {
            changed = true;
            if trace {
                debug!(key = %alert.key, before = ?before, after = ?alert.workflow_fields(), "overlay changed alert");
            }
        }
        claimed.insert(entry.key.as_str());
    }

    let remaining = entries
        .iter()
        .filter(|entry| !claimed.contains(entry.key.as_str()))
        .cloned()
        .collect();
    (changed, remaining)
}

fn apply_entry(alert: &mut Alert, entry: &WorkflowState) {
    alert.status = entry.status.unwrap_or_default();
    if let Some(resolved_at) = &entry.resolved_at {
        alert.resolved_at = resolved_at.clone();
        alert.resolved_at_pinned = true;
    }
    alert.resolution_notes = entry.resolution_notes.clone();
    if entry.updated_at.is_some() {
        alert.updated_at = entry.updated_at.clone();
    }
    if entry.first_seen_at.is_some() {
        alert.first_seen_at = entry.first_seen_at.clone();
    }
}

fn normalize_update(mut update: AlertUpdate) -> Result<AlertUpdate, AlertsError> {
    if let Some(Some(raw)) = &update.resolved_at {
        let normalized = OffsetDateTime::parse(raw.trim(), &Rfc3339)
            .ok()
            .and_then(format_timestamp)
            .ok_or_else(|| AlertsError::InvalidTimestamp(raw.clone()))?;
        update.resolved_at = Some(Some(normalized));
    }
    update.resolution_notes = update.resolution_notes.map(|notes| notes.trim().to_string());
    Ok(update)
}

fn apply_update(alert: &mut Alert, update: &AlertUpdate, now: &str) {
    if let Some(status) = update.status {
        alert.status = status;
    }
    match &update.resolved_at {
        Some(resolved_at) => {
            alert.resolved_at = resolved_at.clone();
            alert.resolved_at_pinned = true;
        }
        None if update.status.is_some() => {
            if alert.status.is_resolved() {
                if alert.resolved_at.is_none() {
                    alert.resolved_at = Some(now.to_string());
                }
            } else {
                alert.resolved_at = None;
            }
            alert.resolved_at_pinned = true;
        }
        None => {}
    }
    if let Some(notes) = &update.resolution_notes {
        alert.resolution_notes = if notes.is_empty() {
            None
        } else {
            Some(notes.clone())
        };
    }
    alert.updated_at = Some(now.to_string());
    if alert.first_seen_at.is_none() {
        alert.first_seen_at = Some(now.to_string());
    }
}

#[cfg(test)]
#[path = "service_tests_ext.rs"]
mod tests_ext;
