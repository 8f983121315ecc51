use serde::Serialize;

/// The slice of a case record the alert engine reads.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CaseRecord {
    pub id: String,
    pub name: String,
    pub reference: Option<String>,
    pub status: Option<String>,
}

impl CaseRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, reference: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            reference: reference.map(str::to_string),
            status: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}
