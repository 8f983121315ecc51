mod csv;
mod errors;
mod index;
mod matcher;
mod normalize;
mod service;
mod store;
#[cfg(test)]
mod tests;

pub use errors::AlertsError;
pub use index::AlertIndex;
pub use normalize::normalize_identifier;
pub use service::{AlertDocuments, AlertService, AlertUpdate, SyncOutcome, UpdateOutcome};
#[cfg(test)]
pub use service::PersistReason;
pub use store::CURRENT_SCHEMA_VERSION;
