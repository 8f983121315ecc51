use std::error::Error;
use std::fmt;

use crate::cases::CaseSourceError;
use crate::storage::StorageError;

/// Malformed export content the stacked parser cannot tokenize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvParseError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for CsvParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl Error for CsvParseError {}

#[derive(Debug)]
pub enum StoreError {
    Storage(StorageError),
    Serialize(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Storage(err) => write!(f, "workflow document storage error: {}", err),
            StoreError::Serialize(err) => {
                write!(f, "failed to serialize workflow document: {}", err)
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Storage(err) => Some(err),
            StoreError::Serialize(err) => Some(err),
        }
    }
}

impl From<StorageError> for StoreError {
    fn from(value: StorageError) -> Self {
        StoreError::Storage(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Serialize(value)
    }
}

#[derive(Debug)]
pub enum AlertsError {
    SourceRead(StorageError),
    SourceParse(CsvParseError),
    Cases(CaseSourceError),
    Store(StoreError),
    InvalidTimestamp(String),
    InvalidArgument(String),
}

impl fmt::Display for AlertsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertsError::SourceRead(err) => write!(f, "failed to read alert export: {}", err),
            AlertsError::SourceParse(err) => write!(f, "failed to parse alert export: {}", err),
            AlertsError::Cases(err) => write!(f, "failed to load cases: {}", err),
            AlertsError::Store(err) => write!(f, "{}", err),
            AlertsError::InvalidTimestamp(value) => {
                write!(f, "invalid timestamp '{}', expected RFC3339", value)
            }
            AlertsError::InvalidArgument(message) => write!(f, "{}", message),
        }
    }
}

impl Error for AlertsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AlertsError::SourceRead(err) => Some(err),
            AlertsError::SourceParse(err) => Some(err),
            AlertsError::Cases(err) => Some(err),
            AlertsError::Store(err) => Some(err),
            AlertsError::InvalidTimestamp(_) | AlertsError::InvalidArgument(_) => None,
        }
    }
}

impl From<CsvParseError> for AlertsError {
    fn from(value: CsvParseError) -> Self {
        AlertsError::SourceParse(value)
    }
}

impl From<CaseSourceError> for AlertsError {
    fn from(value: CaseSourceError) -> Self {
        AlertsError::Cases(value)
    }
}

impl From<StoreError> for AlertsError {
    fn from(value: StoreError) -> Self {
        AlertsError::Store(value)
    }
}
