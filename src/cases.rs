use std::error::Error;
use std::fmt;

use serde_json::Value;

use crate::domain::case::CaseRecord;
use crate::storage::{DocumentStorage, StorageError};

#[derive(Debug)]
pub enum CaseSourceError {
    Storage(StorageError),
    Json(serde_json::Error),
    InvalidShape(String),
}

impl fmt::Display for CaseSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseSourceError::Storage(err) => write!(f, "{}", err),
            CaseSourceError::Json(err) => write!(f, "JSON parse error: {}", err),
            CaseSourceError::InvalidShape(message) => write!(f, "invalid case file: {}", message),
        }
    }
}

impl Error for CaseSourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CaseSourceError::Storage(err) => Some(err),
            CaseSourceError::Json(err) => Some(err),
            CaseSourceError::InvalidShape(_) => None,
        }
    }
}

impl From<StorageError> for CaseSourceError {
    fn from(value: StorageError) -> Self {
        CaseSourceError::Storage(value)
    }
}

impl From<serde_json::Error> for CaseSourceError {
    fn from(value: serde_json::Error) -> Self {
        CaseSourceError::Json(value)
    }
}

/// Read-only access to the current case list.
pub trait CaseSource {
    fn cases(&self) -> Result<Vec<CaseRecord>, CaseSourceError>;
}

impl CaseSource for Vec<CaseRecord> {
    fn cases(&self) -> Result<Vec<CaseRecord>, CaseSourceError> {
        Ok(self.clone())
    }
}

/// Cases exported by the case tracker as JSON, either a bare array or an
/// object holding `cases` / `caseRecords`.
pub struct JsonCaseFile<'a> {
    storage: &'a dyn DocumentStorage,
    name: String,
}

impl<'a> JsonCaseFile<'a> {
    pub fn new(storage: &'a dyn DocumentStorage, name: impl Into<String>) -> Self {
        Self {
            storage,
            name: name.into(),
        }
    }
}

impl CaseSource for JsonCaseFile<'_> {
    fn cases(&self) -> Result<Vec<CaseRecord>, CaseSourceError> {
        match self.storage.read_text(&self.name)? {
            Some(text) if !text.trim().is_empty() => parse_cases(&text),
            _ => Ok(Vec::new()),
        }
    }
}

pub fn parse_cases(text: &str) -> Result<Vec<CaseRecord>, CaseSourceError> {
    let value: Value = serde_json::from_str(text)?;
    let rows = match &value {
        Value::Array(rows) => rows,
        Value::Object(map) => map
            .get("cases")
            .or_else(|| map.get("caseRecords"))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                CaseSourceError::InvalidShape(
                    "expected an array or an object with `cases`".to_string(),
                )
            })?,
        _ => {
            return Err(CaseSourceError::InvalidShape(
                "expected an array or an object with `cases`".to_string(),
            ))
        }
    };
    Ok(rows.iter().filter_map(case_from_value).collect())
}

fn case_from_value(value: &Value) -> Option<CaseRecord> {
    let reference = text_field(value, "mcn")
        .or_else(|| value.get("caseRecord").and_then(|nested| text_field(nested, "mcn")));
    let id = text_field(value, "id").or_else(|| reference.clone())?;
    let name = text_field(value, "name")
        .or_else(|| value.get("person").and_then(person_name))
        .unwrap_or_default();
    let status = text_field(value, "status")
        .or_else(|| value.get("caseRecord").and_then(|nested| text_field(nested, "status")));

    Some(CaseRecord {
        id,
        name,
        reference,
        status,
    })
}

fn person_name(person: &Value) -> Option<String> {
    if let Some(name) = text_field(person, "name") {
        return Some(name);
    }
    let parts = ["firstName", "lastName"]
        .iter()
        .filter_map(|field| text_field(person, field))
        .collect::<Vec<_>>();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn text_field(value: &Value, field: &str) -> Option<String> {
    let raw = match value.get(field)? {
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

#[cfg(test)]
mod tests {
    use super::{parse_cases, CaseSource, CaseSourceError, JsonCaseFile};
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn parses_flat_case_array() {
        let cases = parse_cases(
            r#"[{"id":"case-1","name":"Jane Doe","mcn":"mc500","status":"Active"}]"#,
        )
        .expect("cases should parse");
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id, "case-1");
        assert_eq!(cases[0].name, "Jane Doe");
        assert_eq!(cases[0].reference.as_deref(), Some("mc500"));
        assert_eq!(cases[0].status.as_deref(), Some("Active"));
    }

    #[test]
    fn reads_nested_case_record_and_person_fields() {
        let cases = parse_cases(
            r#"{"cases":[{"id":"case-2","person":{"firstName":"Sam","lastName":"Lee"},
                "caseRecord":{"mcn":"MC-77","status":"Pending"}}]}"#,
        )
        .expect("cases should parse");
        assert_eq!(cases[0].name, "Sam Lee");
        assert_eq!(cases[0].reference.as_deref(), Some("MC-77"));
        assert_eq!(cases[0].status.as_deref(), Some("Pending"));
    }

    #[test]
    fn skips_rows_without_any_identity() {
        let cases = parse_cases(r#"[{"name":"Nobody"},{"mcn":12345}]"#).expect("should parse");
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id, "12345");
    }

    #[test]
    fn rejects_scalar_documents() {
        assert!(matches!(
            parse_cases("42"),
            Err(CaseSourceError::InvalidShape(_))
        ));
    }

    #[test]
    fn missing_case_file_is_an_empty_case_set() {
        let storage = MemoryStorage::default();
        let source = JsonCaseFile::new(&storage, "cases.json");
        assert!(source.cases().expect("cases should load").is_empty());
    }
}
