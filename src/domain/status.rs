use std::error::Error;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlertStatus {
    #[default]
    New,
    InProgress,
    Acknowledged,
    Snoozed,
    Resolved,
}

impl AlertStatus {
    pub const ALL: [AlertStatus; 5] = [
        AlertStatus::New,
        AlertStatus::InProgress,
        AlertStatus::Acknowledged,
        AlertStatus::Snoozed,
        AlertStatus::Resolved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::InProgress => "in-progress",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Snoozed => "snoozed",
            AlertStatus::Resolved => "resolved",
        }
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, AlertStatus::Resolved)
    }

    pub fn is_default(&self) -> bool {
        *self == AlertStatus::New
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = ParseAlertStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value
            .trim()
            .to_ascii_lowercase()
            .replace(['_', ' '], "-");
        let status = match normalized.as_str() {
            "new" | "open" | "" => AlertStatus::New,
            "in-progress" | "inprogress" | "working" | "pending" => AlertStatus::InProgress,
            "acknowledged" | "ack" | "seen" => AlertStatus::Acknowledged,
            "snoozed" | "deferred" => AlertStatus::Snoozed,
            "resolved" | "closed" | "done" => AlertStatus::Resolved,
            _ => {
                return Err(ParseAlertStatusError {
                    value: value.to_string(),
                });
            }
        };
        Ok(status)
    }
}

impl Serialize for AlertStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AlertStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        AlertStatus::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAlertStatusError {
    value: String,
}

impl fmt::Display for ParseAlertStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid alert status '{}': expected one of {}",
            self.value,
            AlertStatus::ALL
                .iter()
                .map(|status| status.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl Error for ParseAlertStatusError {}

/// Outcome of resolving an alert's case reference against the case set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStatus {
    Matched,
    #[default]
    MissingIdentifier,
    Unmatched,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Matched => "matched",
            MatchStatus::MissingIdentifier => "missing-identifier",
            MatchStatus::Unmatched => "unmatched",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
