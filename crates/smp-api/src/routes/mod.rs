//! # API Route Modules
//!
//! - `service_groups`: participants, their ownership and DNS check.
//! - `service_info`: service information, endpoints and bulk rewrites.
//! - `redirects`: document type redirects to other SMPs.
//! - `business_cards`: business cards and Directory publication.
//! - `sml`: SMP registration at the SML and SML configurations.
//! - `transport_profiles`: transport profile catalogue.
//! - `settings`: runtime settings.
//! - `exchange`: XML export and import.
//! - `migrations`: participant migration between SMPs.
//! - `audit`: audit trail and chain verification.

pub mod audit;
pub mod business_cards;
pub mod exchange;
pub mod migrations;
pub mod redirects;
pub mod service_groups;
pub mod service_info;
pub mod settings;
pub mod sml;
pub mod transport_profiles;

use serde::{Deserialize, Serialize};
use smp_registry::outcome::DeleteOutcome;
use smp_registry::Change;
use utoipa::ToSchema;

use crate::error::AppError;

/// Result of an update or delete.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChangeResponse {
    /// Whether anything was modified.
    pub changed: bool,
    /// Remote calls that failed without aborting the operation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl From<Change> for ChangeResponse {
    fn from(change: Change) -> Self {
        Self {
            changed: change.is_changed(),
            warnings: Vec::new(),
        }
    }
}

impl From<DeleteOutcome> for ChangeResponse {
    fn from(outcome: DeleteOutcome) -> Self {
        Self {
            changed: outcome.value.is_changed(),
            warnings: outcome.warnings,
        }
    }
}

/// A delete that found nothing to remove is a 404.
pub(crate) fn deleted(change: Change, what: impl FnOnce() -> String) -> Result<ChangeResponse, AppError> {
    if change.is_changed() {
        Ok(change.into())
    } else {
        Err(AppError::NotFound(what()))
    }
}
