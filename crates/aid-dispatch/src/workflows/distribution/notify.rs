use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{AgentId, BeneficiaryId, JobId};
use super::tracking::{DeliveryStatus, DeliveryTask};

/// Emitted once per delivery task transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub job_id: JobId,
    pub beneficiary_id: BeneficiaryId,
    pub agent: AgentId,
    pub from: DeliveryStatus,
    pub to: DeliveryStatus,
    pub attempt: u8,
    pub at: DateTime<Utc>,
}

impl DeliveryEvent {
    pub(crate) fn for_task(job_id: &JobId, task: &DeliveryTask, from: DeliveryStatus) -> Self {
        Self {
            job_id: job_id.clone(),
            beneficiary_id: task.beneficiary_id.clone(),
            agent: task.agent.clone(),
            from,
            to: task.status,
            attempt: task.attempt,
            at: task.updated_at,
        }
    }
}

/// Outbound hook (SMS gateway, dashboard feed). Failures never undo a transition.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: DeliveryEvent) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Writes every event to the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, event: DeliveryEvent) -> Result<(), NotificationError> {
        info!(
            job = %event.job_id,
            beneficiary = %event.beneficiary_id,
            agent = %event.agent,
            from = %event.from,
            to = %event.to,
            attempt = event.attempt,
            "delivery status changed"
        );
        Ok(())
    }
}
