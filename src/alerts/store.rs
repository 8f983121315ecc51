use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::alert::Alert;
use crate::domain::status::AlertStatus;
use crate::storage::DocumentStorage;

use super::errors::StoreError;

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Durable, user-authored fields of one alert, keyed like the alert.
///
/// `resolved_at` distinguishes "not recorded" (`None`) from an explicit
/// `null` (`Some(None)`), which un-resolves an alert the export marks resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkflowState {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AlertStatus>,
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub resolved_at: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen_at: Option<String>,
}

impl WorkflowState {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: None,
            resolved_at: None,
            resolution_notes: None,
            updated_at: None,
            first_seen_at: None,
        }
    }

    /// Workflow fields of a merged alert, keeping only non-default values.
    pub fn from_alert(alert: &Alert) -> Self {
        Self {
            key: alert.key.clone(),
            status: (!alert.status.is_default()).then_some(alert.status),
            resolved_at: alert
                .resolved_at_pinned
                .then(|| alert.resolved_at.clone()),
            resolution_notes: alert
                .resolution_notes
                .clone()
                .filter(|notes| !notes.trim().is_empty()),
            updated_at: alert.updated_at.clone(),
            first_seen_at: alert.first_seen_at.clone(),
        }
    }

    /// Most recent timestamp recorded on the entry.
    pub fn last_touched(&self) -> Option<&str> {
        self.updated_at.as_deref().or(self.first_seen_at.as_deref())
    }
}

fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// Only alerts carrying workflow state.
    Sparse,
    /// Every alert, used to rebuild a document after corruption.
    Force,
}

/// Entries to persist for `alerts`. In sparse mode an alert is written when it
/// carries workflow state or its key already has a stored entry.
pub fn snapshot_entries(
    alerts: &[Alert],
    mode: SnapshotMode,
    stored_keys: &HashSet<String>,
) -> Vec<WorkflowState> {
    alerts
        .iter()
        .filter(|alert| {
            mode == SnapshotMode::Force
                || alert.has_workflow_state()
                || stored_keys.contains(&alert.key)
        })
        .map(WorkflowState::from_alert)
        .collect()
}

/// Collapses entries sharing a key. The last entry's value wins and keeps the
/// position of the key's first appearance. Returns the number of collapsed
/// duplicates.
pub fn dedupe_last_wins(entries: Vec<WorkflowState>) -> (Vec<WorkflowState>, usize) {
    let mut out: Vec<WorkflowState> = Vec::with_capacity(entries.len());
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(entries.len());
    let mut duplicates = 0usize;
    for entry in entries {
        match positions.get(&entry.key) {
            Some(index) => {
                out[*index] = entry;
                duplicates += 1;
            }
            None => {
                positions.insert(entry.key.clone(), out.len());
                out.push(entry);
            }
        }
    }
    (out, duplicates)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDecode {
    Current(WorkflowState),
    Legacy(WorkflowState),
    Dropped,
}

/// Strict decode first; on failure fall back to the permissive legacy shape,
/// which only needs something usable as a key.
pub fn decode_entry(value: &Value) -> EntryDecode {
    if let Ok(state) = WorkflowState::deserialize(value) {
        if !state.key.trim().is_empty() {
            return EntryDecode::Current(state);
        }
    }
    match value {
        Value::Object(map) => match legacy_entry(map) {
            Some(state) => EntryDecode::Legacy(state),
            None => EntryDecode::Dropped,
        },
        _ => EntryDecode::Dropped,
    }
}

const LEGACY_KEY_FIELDS: [&str; 5] = ["key", "reportId", "alertId", "id", "alertCode"];

fn legacy_entry(map: &Map<String, Value>) -> Option<WorkflowState> {
    let key = LEGACY_KEY_FIELDS
        .iter()
        .find_map(|field| text_value(map.get(*field)))?;

    let status = ["status", "workflowStatus"]
        .iter()
        .find_map(|field| text_value(map.get(*field)))
        .and_then(|raw| AlertStatus::from_str(&raw).ok());
    let resolved_at = match map.get("resolvedAt") {
        Some(Value::Null) => Some(None),
        Some(value) => text_value(Some(value)).map(Some),
        None => None,
    };
    let resolution_notes = ["resolutionNotes", "notes", "resolution"]
        .iter()
        .find_map(|field| text_value(map.get(*field)));

    Some(WorkflowState {
        key,
        status,
        resolved_at,
        resolution_notes,
        updated_at: text_value(map.get("updatedAt")),
        first_seen_at: text_value(map.get("firstSeenAt")),
    })
}

fn text_value(value: Option<&Value>) -> Option<String> {
    let raw = match value? {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

/// Result of reading the workflow document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedWorkflows {
    pub entries: Vec<WorkflowState>,
    pub needs_migration: bool,
    pub corrupted: bool,
    pub version: Option<u64>,
    pub legacy_entries: usize,
    pub dropped_entries: usize,
    pub duplicate_entries: usize,
    /// Original text of a corrupted document, kept for backup.
    pub raw: Option<String>,
}

impl LoadedWorkflows {
    fn from_corrupt(raw: &str) -> Self {
        Self {
            needs_migration: true,
            corrupted: true,
            raw: Some(raw.to_string()),
            ..Self::default()
        }
    }
}

pub fn parse_document(text: Option<&str>, schema_version: u32) -> LoadedWorkflows {
    let text = match text {
        Some(value) if !value.trim().is_empty() => value,
        _ => return LoadedWorkflows::default(),
    };

    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "workflow document is not valid JSON");
            return LoadedWorkflows::from_corrupt(text);
        }
    };

    let (version, raw_entries) = match &value {
        Value::Object(map) => {
            let version = map.get("version").and_then(Value::as_u64);
            let entries: &[Value] = match map.get("alerts").or_else(|| map.get("entries")) {
                Some(Value::Array(entries)) => entries.as_slice(),
                None | Some(Value::Null) => &[],
                Some(_) => {
                    warn!("workflow document `alerts` is not a list");
                    return LoadedWorkflows::from_corrupt(text);
                }
            };
            (version, entries)
        }
        Value::Array(entries) => (None, entries.as_slice()),
        _ => {
            warn!("workflow document has an unexpected top-level shape");
            return LoadedWorkflows::from_corrupt(text);
        }
    };

    let mut loaded = LoadedWorkflows {
        version,
        ..LoadedWorkflows::default()
    };
    match version {
        Some(found) if found == u64::from(schema_version) => {}
        Some(found) if found > u64::from(schema_version) => {
            warn!(found, schema_version, "workflow document is newer than supported");
        }
        _ => loaded.needs_migration = true,
    }

    let mut entries = Vec::with_capacity(raw_entries.len());
    for raw in raw_entries {
        match decode_entry(raw) {
            EntryDecode::Current(state) => entries.push(state),
            EntryDecode::Legacy(state) => {
                loaded.legacy_entries += 1;
                entries.push(state);
            }
            EntryDecode::Dropped => loaded.dropped_entries += 1,
        }
    }
    let (entries, duplicates) = dedupe_last_wins(entries);
    loaded.entries = entries;
    loaded.duplicate_entries = duplicates;
    if loaded.legacy_entries > 0 || loaded.dropped_entries > 0 || duplicates > 0 {
        loaded.needs_migration = true;
    }
    debug!(
        entries = loaded.entries.len(),
        legacy = loaded.legacy_entries,
        dropped = loaded.dropped_entries,
        duplicates = loaded.duplicate_entries,
        version = ?loaded.version,
        needs_migration = loaded.needs_migration,
        "workflow document parsed"
    );
    loaded
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowDocument<'a> {
    version: u32,
    updated_at: &'a str,
    alerts: &'a [WorkflowState],
}

pub fn render_document(
    entries: &[WorkflowState],
    schema_version: u32,
    updated_at: &str,
) -> Result<String, serde_json::Error> {
    let document = WorkflowDocument {
        version: schema_version,
        updated_at,
        alerts: entries,
    };
    let mut text = serde_json::to_string_pretty(&document)?;
    text.push('\n');
    Ok(text)
}

pub struct WorkflowStore<'a> {
    storage: &'a dyn DocumentStorage,
    name: String,
    schema_version: u32,
}

impl<'a> WorkflowStore<'a> {
    pub fn new(storage: &'a dyn DocumentStorage, name: impl Into<String>, schema_version: u32) -> Self {
        Self {
            storage,
            name: name.into(),
            schema_version,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn load(&self) -> Result<LoadedWorkflows, StoreError> {
        let text = self.storage.read_text(&self.name)?;
        Ok(parse_document(text.as_deref(), self.schema_version))
    }

    /// Overwrites the document with `entries`, collapsing duplicate keys.
    pub fn save(&self, entries: Vec<WorkflowState>, updated_at: &str) -> Result<usize, StoreError> {
        let (entries, duplicates) = dedupe_last_wins(entries);
        if duplicates > 0 {
            debug!(duplicates, "collapsed duplicate workflow entries before save");
        }
        let text = render_document(&entries, self.schema_version, updated_at)?;
        self.storage.write_text(&self.name, &text)?;
        Ok(entries.len())
    }

    /// Copies an unreadable document aside before it is rebuilt.
    pub fn backup(&self, raw: &str, stamp: &str) -> Result<String, StoreError> {
        let safe_stamp = stamp
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
            .collect::<String>();
        let backup_name = format!("{}.corrupt-{}", self.name, safe_stamp);
        self.storage.write_text(&backup_name, raw)?;
        Ok(backup_name)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        decode_entry, dedupe_last_wins, parse_document, render_document, snapshot_entries,
        EntryDecode, SnapshotMode, WorkflowState, WorkflowStore, CURRENT_SCHEMA_VERSION,
    };
    use crate::domain::alert::Alert;
    use crate::domain::status::AlertStatus;
    use crate::storage::memory::MemoryStorage;
    use serde_json::json;
    use std::collections::HashSet;

    fn entry(key: &str, notes: &str) -> WorkflowState {
        WorkflowState {
            resolution_notes: Some(notes.to_string()),
            ..WorkflowState::new(key)
        }
    }

    #[test]
    fn current_document_loads_without_migration() {
        let text = r#"{"version":2,"updatedAt":"2026-03-01T00:00:00Z","alerts":[
            {"key":"A1","status":"resolved","resolvedAt":"2026-03-01T10:00:00Z","resolutionNotes":"Called client"},
            {"key":"A2","resolvedAt":null}
        ]}"#;
        let loaded = parse_document(Some(text), CURRENT_SCHEMA_VERSION);
        assert!(!loaded.needs_migration);
        assert!(!loaded.corrupted);
        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.entries[0].status, Some(AlertStatus::Resolved));
        assert_eq!(
            loaded.entries[0].resolved_at,
            Some(Some("2026-03-01T10:00:00Z".to_string()))
        );
        assert_eq!(loaded.entries[1].resolved_at, Some(None));
    }

    #[test]
    fn absent_or_blank_document_is_empty_and_clean() {
        for text in [None, Some(""), Some("  \n")] {
            let loaded = parse_document(text, CURRENT_SCHEMA_VERSION);
            assert!(loaded.entries.is_empty());
            assert!(!loaded.needs_migration);
            assert!(!loaded.corrupted);
        }
    }

    #[test]
    fn missing_or_old_version_requires_migration() {
        let unversioned = parse_document(Some(r#"{"alerts":[{"key":"A1"}]}"#), 2);
        assert!(unversioned.needs_migration);
        assert_eq!(unversioned.entries.len(), 1);

        let v1 = parse_document(Some(r#"{"version":1,"alerts":[]}"#), 2);
        assert!(v1.needs_migration);
        assert_eq!(v1.version, Some(1));
    }

    #[test]
    fn legacy_full_alert_entries_are_reduced_to_workflow_fields() {
        let text = r#"{"version":1,"alerts":[
            {"reportId":"A1","program":"SNAP","region":"North","severity":"high",
             "metadata":{"x":1},"status":"In Progress","notes":"left voicemail",
             "matchStatus":"matched","resolvedAt":null},
            {"program":"orphan without key"}
        ]}"#;
        let loaded = parse_document(Some(text), CURRENT_SCHEMA_VERSION);
        assert!(loaded.needs_migration);
        assert_eq!(loaded.legacy_entries, 1);
        assert_eq!(loaded.dropped_entries, 1);
        let state = &loaded.entries[0];
        assert_eq!(state.key, "A1");
        assert_eq!(state.status, Some(AlertStatus::InProgress));
        assert_eq!(state.resolution_notes.as_deref(), Some("left voicemail"));
        assert_eq!(state.resolved_at, Some(None));
    }

    #[test]
    fn legacy_top_level_array_is_accepted() {
        let loaded = parse_document(Some(r#"[{"id":17,"status":"resolved"}]"#), 2);
        assert!(loaded.needs_migration);
        assert_eq!(loaded.entries[0].key, "17");
    }

    #[test]
    fn invalid_json_is_treated_as_corruption() {
        let loaded = parse_document(Some("{\"version\":2,\"alerts\":[{"), 2);
        assert!(loaded.corrupted);
        assert!(loaded.needs_migration);
        assert!(loaded.entries.is_empty());
        assert_eq!(loaded.raw.as_deref(), Some("{\"version\":2,\"alerts\":[{"));

        let scalar = parse_document(Some("42"), 2);
        assert!(scalar.corrupted);
    }

    #[test]
    fn decode_entry_classifies_shapes() {
        assert!(matches!(
            decode_entry(&json!({"key": "A1", "status": "snoozed"})),
            EntryDecode::Current(_)
        ));
        assert!(matches!(
            decode_entry(&json!({"key": "A1", "severity": "high"})),
            EntryDecode::Legacy(_)
        ));
        assert_eq!(decode_entry(&json!({"key": "  "})), EntryDecode::Dropped);
        assert_eq!(decode_entry(&json!("A1")), EntryDecode::Dropped);
    }

    #[test]
    fn dedupe_keeps_last_value_at_first_position() {
        let (entries, duplicates) = dedupe_last_wins(vec![
            entry("A1", "first"),
            entry("B2", "only"),
            entry("A1", "second"),
        ]);
        assert_eq!(duplicates, 1);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "A1");
        assert_eq!(entries[0].resolution_notes.as_deref(), Some("second"));
        assert_eq!(entries[1].key, "B2");
    }

    #[test]
    fn duplicate_keys_in_document_trigger_migration() {
        let text = r#"{"version":2,"alerts":[{"key":"A1"},{"key":"A1","status":"snoozed"}]}"#;
        let loaded = parse_document(Some(text), 2);
        assert!(loaded.needs_migration);
        assert_eq!(loaded.duplicate_entries, 1);
        assert_eq!(loaded.entries[0].status, Some(AlertStatus::Snoozed));
    }

    #[test]
    fn sparse_snapshot_skips_default_alerts_and_force_keeps_all() {
        let untouched = Alert {
            key: "A1".to_string(),
            resolved_at: Some("2026-03-01T00:00:00Z".to_string()),
            ..Alert::default()
        };
        let resolved = Alert {
            key: "A2".to_string(),
            status: AlertStatus::Resolved,
            resolved_at: Some("2026-03-02T00:00:00Z".to_string()),
            resolved_at_pinned: true,
            ..Alert::default()
        };
        let alerts = vec![untouched, resolved];
        let none = HashSet::new();

        let sparse = snapshot_entries(&alerts, SnapshotMode::Sparse, &none);
        assert_eq!(sparse.len(), 1);
        assert_eq!(sparse[0].key, "A2");
        assert_eq!(
            sparse[0].resolved_at,
            Some(Some("2026-03-02T00:00:00Z".to_string()))
        );

        let stored = HashSet::from(["A1".to_string()]);
        let kept = snapshot_entries(&alerts, SnapshotMode::Sparse, &stored);
        assert_eq!(kept.len(), 2);

        let forced = snapshot_entries(&alerts, SnapshotMode::Force, &none);
        assert_eq!(forced.len(), 2);
        assert_eq!(forced[0].status, None);
        assert_eq!(forced[0].resolved_at, None);
    }

    #[test]
    fn rendered_document_round_trips_explicit_null() {
        let state = WorkflowState {
            resolved_at: Some(None),
            ..WorkflowState::new("A1")
        };
        let text = render_document(&[state.clone()], 2, "2026-03-01T00:00:00Z")
            .expect("render should succeed");
        assert!(text.contains("\"resolvedAt\": null"));
        assert!(text.contains("\"updatedAt\": \"2026-03-01T00:00:00Z\""));
        assert!(!text.contains("resolutionNotes"));
        assert!(text.ends_with('\n'));

        let loaded = parse_document(Some(&text), 2);
        assert!(!loaded.needs_migration);
        assert_eq!(loaded.entries, vec![state]);
    }

    #[test]
    fn store_save_collapses_duplicates_and_backup_writes_copy() {
        let storage = MemoryStorage::default();
        let store = WorkflowStore::new(&storage, "workflow.json", 2);
        let written = store
            .save(
                vec![entry("A1", "old"), entry("A1", "new")],
                "2026-03-01T00:00:00Z",
            )
            .expect("save should succeed");
        assert_eq!(written, 1);
        let loaded = store.load().expect("load should succeed");
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].resolution_notes.as_deref(), Some("new"));

        let backup = store
            .backup("{broken", "2026-03-01T00:00:00Z")
            .expect("backup should succeed");
        assert_eq!(backup, "workflow.json.corrupt-2026-03-01T00-00-00Z");
        assert_eq!(storage.get(&backup).as_deref(), Some("{broken"));
    }
}
