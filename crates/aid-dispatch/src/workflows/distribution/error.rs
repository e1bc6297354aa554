use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use super::domain::{BeneficiaryId, JobId};
use super::filter::FilterSpec;
use super::tracking::DeliveryStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Beneficiary,
    Organization,
    Template,
    Job,
    Task,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Beneficiary => "beneficiary",
            EntityKind::Organization => "organization",
            EntityKind::Template => "template",
            EntityKind::Job => "distribution job",
            EntityKind::Task => "delivery task",
        };
        f.write_str(label)
    }
}

/// Beneficiary that could not be turned into a delivery task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskCreationFailure {
    pub beneficiary_id: BeneficiaryId,
    pub reason: String,
}

/// Recoverable failures of the planning and dispatch workflow.
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: EntityKind, id: String },
    #[error("invalid selection: {reason}")]
    InvalidSelection { reason: String },
    #[error("no beneficiaries match the selected filters ({})", .filter.describe())]
    EmptyEligibleSet { filter: FilterSpec },
    #[error("job {job_id}: delivery for {beneficiary_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        beneficiary_id: BeneficiaryId,
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
    #[error(
        "job {job_id}: cancelled {cancelled} pending deliveries, {in_flight} already in flight"
    )]
    PartialCancellationOnly {
        job_id: JobId,
        cancelled: usize,
        in_flight: usize,
    },
    #[error("no delivery tasks created: {} beneficiaries failed validation", .failures.len())]
    TaskCreationFailed { failures: Vec<TaskCreationFailure> },
}

impl DistributionError {
    pub fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DistributionError::NotFound { .. } => StatusCode::NOT_FOUND,
            DistributionError::InvalidSelection { .. }
            | DistributionError::EmptyEligibleSet { .. }
            | DistributionError::TaskCreationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DistributionError::InvalidTransition { .. }
            | DistributionError::PartialCancellationOnly { .. } => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for DistributionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({ "error": self.to_string() });

        match &self {
            DistributionError::PartialCancellationOnly {
                cancelled,
                in_flight,
                ..
            } => {
                body["cancelled"] = json!(cancelled);
                body["in_flight"] = json!(in_flight);
            }
            DistributionError::TaskCreationFailed { failures } => {
                body["failures"] = json!(failures);
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}
