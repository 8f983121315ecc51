use std::error::Error;
use std::fmt;
use std::str::FromStr;

use tracing::info;

use crate::alerts::{
    AlertDocuments, AlertIndex, AlertService, AlertUpdate, AlertsError, SyncOutcome,
    UpdateOutcome,
};
use crate::cases::JsonCaseFile;
use crate::config::{AppConfig, ConfigError};
use crate::domain::alert::Alert;
use crate::domain::status::{AlertStatus, MatchStatus, ParseAlertStatusError};
use crate::storage::{ChangeNotifier, FsStorage};

/// Logs each successful workflow write; stands in for UI refresh hooks.
struct LogNotifier;

impl ChangeNotifier for LogNotifier {
    fn storage_changed(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        info!("workflow document changed");
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub case_id: Option<String>,
    pub status: Option<AlertStatus>,
    pub unmatched: bool,
}

/// Raw mutation flags as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub status: Option<String>,
    pub notes: Option<String>,
    pub resolved_at: Option<String>,
    pub clear_resolved: bool,
}

/// A saved or in-memory-only update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedAlert {
    pub alert: Alert,
    pub warning: Option<String>,
}

pub struct App {
    config: AppConfig,
    storage: FsStorage,
}

impl App {
    pub fn open(config: AppConfig) -> Self {
        let storage = FsStorage::new(config.data_dir.clone());
        Self { config, storage }
    }

    fn with_service<T>(&self, run: impl FnOnce(&AlertService<'_>) -> T) -> T {
        let cases = JsonCaseFile::new(&self.storage, self.config.cases_file.clone());
        let documents = AlertDocuments {
            alerts: self.config.alerts_file.clone(),
            workflow: self.config.workflow_file.clone(),
        };
        let service = AlertService::new(
            &self.storage,
            &cases,
            documents,
            self.config.engine.clone(),
        )
        .with_notifier(&LogNotifier);
        run(&service)
    }

    pub fn sync(&self) -> SyncOutcome {
        self.with_service(|service| service.reconcile())
    }

    pub fn list(&self, filter: &ListFilter) -> Vec<Alert> {
        let index = self.with_service(|service| service.load_index());
        filter_alerts(&index, filter).into_iter().cloned().collect()
    }

    pub fn show(&self, key: &str) -> Result<Alert, AppError> {
        let index = self.with_service(|service| service.load_index());
        index
            .find(key)
            .cloned()
            .ok_or_else(|| AppError::NotFound(key.to_string()))
    }

    pub fn update(&self, key: &str, request: UpdateRequest) -> Result<UpdatedAlert, AppError> {
        let update = build_update(request)?;
        let outcome = self.with_service(|service| service.update_alert(key, update))?;
        match outcome {
            UpdateOutcome::Updated(alert) => Ok(UpdatedAlert {
                alert,
                warning: None,
            }),
            UpdateOutcome::Unsaved { alert, message } => Ok(UpdatedAlert {
                alert,
                warning: Some(message),
            }),
            UpdateOutcome::NotFound(key) => Err(AppError::NotFound(key)),
        }
    }
}

pub fn parse_status_filter(raw: Option<&str>) -> Result<Option<AlertStatus>, AppError> {
    raw.map(AlertStatus::from_str).transpose().map_err(AppError::from)
}

fn build_update(request: UpdateRequest) -> Result<AlertUpdate, AppError> {
    let status = parse_status_filter(request.status.as_deref())?;
    let resolved_at = if request.clear_resolved {
        Some(None)
    } else {
        request.resolved_at.map(Some)
    };
    Ok(AlertUpdate {
        status,
        resolved_at,
        resolution_notes: request.notes,
    })
}

pub fn filter_alerts<'a>(index: &'a AlertIndex, filter: &ListFilter) -> Vec<&'a Alert> {
    let scoped: &[Alert] = match filter.case_id.as_deref() {
        Some(case_id) => index.alerts_for_case(case_id),
        None => &index.alerts,
    };
    scoped
        .iter()
        .filter(|alert| filter.status.map_or(true, |status| alert.status == status))
        .filter(|alert| !filter.unmatched || alert.match_status != MatchStatus::Matched)
        .collect()
}

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Alerts(AlertsError),
    ParseStatus(ParseAlertStatusError),
    NotFound(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "{}", err),
            AppError::Alerts(err) => write!(f, "{}", err),
            AppError::ParseStatus(err) => write!(f, "status parse error: {}", err),
            AppError::NotFound(key) => write!(f, "alert '{}' not found in current export", key),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Alerts(err) => Some(err),
            AppError::ParseStatus(err) => Some(err),
            AppError::NotFound(_) => None,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<AlertsError> for AppError {
    fn from(value: AlertsError) -> Self {
        AppError::Alerts(value)
    }
}

impl From<ParseAlertStatusError> for AppError {
    fn from(value: ParseAlertStatusError) -> Self {
        AppError::ParseStatus(value)
    }
}
