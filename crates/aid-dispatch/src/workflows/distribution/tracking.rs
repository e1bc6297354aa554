//! Delivery task lifecycle.
//!
//! ```text
//! preparing -> in_progress -> delivered
//!                          -> failed    (auto-rescheduled to preparing while retries remain)
//!                          -> delayed -> in_progress
//! preparing -> cancelled    (job cancellation only)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::domain::{AgentId, BeneficiaryId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Preparing,
    InProgress,
    Delayed,
    Delivered,
    Failed,
    Cancelled,
}

impl DeliveryStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::InProgress => "in_progress",
            Self::Delayed => "delayed",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }

    /// Transitions an external status update may request.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Preparing, Self::InProgress)
                | (Self::InProgress, Self::Delivered)
                | (Self::InProgress, Self::Failed)
                | (Self::InProgress, Self::Delayed)
                | (Self::Delayed, Self::InProgress)
        )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescheduleKind {
    Automatic,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: DeliveryStatus,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reschedule: Option<RescheduleKind>,
}

/// One package handover owed to one beneficiary within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTask {
    pub beneficiary_id: BeneficiaryId,
    pub agent: AgentId,
    pub status: DeliveryStatus,
    /// 1 for the first attempt, incremented by every reschedule.
    pub attempt: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<StatusChange>,
}

impl DeliveryTask {
    pub(crate) fn new(beneficiary_id: BeneficiaryId, agent: AgentId, at: DateTime<Utc>) -> Self {
        Self {
            beneficiary_id,
            agent,
            status: DeliveryStatus::Preparing,
            attempt: 1,
            created_at: at,
            updated_at: at,
            history: vec![StatusChange {
                status: DeliveryStatus::Preparing,
                at,
                reschedule: None,
            }],
        }
    }

    pub fn reschedules(&self) -> u8 {
        self.attempt.saturating_sub(1)
    }

    /// Applies an external transition; illegal requests leave the task untouched.
    pub(crate) fn advance(
        &mut self,
        next: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<(), (DeliveryStatus, DeliveryStatus)> {
        if !self.status.can_transition_to(next) {
            return Err((self.status, next));
        }
        self.record(next, at, None);
        Ok(())
    }

    /// Moves a failed task back to `preparing`.
    pub(crate) fn reschedule(
        &mut self,
        kind: RescheduleKind,
        at: DateTime<Utc>,
    ) -> Result<(), (DeliveryStatus, DeliveryStatus)> {
        if self.status != DeliveryStatus::Failed {
            return Err((self.status, DeliveryStatus::Preparing));
        }
        self.attempt = self.attempt.saturating_add(1);
        self.record(DeliveryStatus::Preparing, at, Some(kind));
        Ok(())
    }

    pub(crate) fn cancel(&mut self, at: DateTime<Utc>) -> bool {
        if self.status != DeliveryStatus::Preparing {
            return false;
        }
        self.record(DeliveryStatus::Cancelled, at, None);
        true
    }

    fn record(
        &mut self,
        status: DeliveryStatus,
        at: DateTime<Utc>,
        reschedule: Option<RescheduleKind>,
    ) {
        self.status = status;
        self.updated_at = at;
        self.history.push(StatusChange {
            status,
            at,
            reschedule,
        });
    }
}

/// Aggregate state of a distribution job, derived from its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Preparing,
    InProgress,
    Completed,
    CompletedWithFailures,
    Cancelled,
}

impl JobStatus {
    pub fn derive(tasks: &[DeliveryTask]) -> Self {
        let all = |status: DeliveryStatus| tasks.iter().all(|task| task.status == status);

        if all(DeliveryStatus::Cancelled) {
            Self::Cancelled
        } else if tasks.iter().all(|task| task.status.is_terminal()) {
            if tasks
                .iter()
                .any(|task| task.status == DeliveryStatus::Failed)
            {
                Self::CompletedWithFailures
            } else {
                Self::Completed
            }
        } else if all(DeliveryStatus::Preparing) {
            Self::Preparing
        } else {
            Self::InProgress
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithFailures | Self::Cancelled
        )
    }
}

/// Task counts per status for dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub total: usize,
    pub preparing: usize,
    pub in_progress: usize,
    pub delayed: usize,
    pub delivered: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl JobProgress {
    pub fn tally(tasks: &[DeliveryTask]) -> Self {
        tasks.iter().fold(
            Self {
                total: tasks.len(),
                ..Self::default()
            },
            |mut progress, task| {
                match task.status {
                    DeliveryStatus::Preparing => progress.preparing += 1,
                    DeliveryStatus::InProgress => progress.in_progress += 1,
                    DeliveryStatus::Delayed => progress.delayed += 1,
                    DeliveryStatus::Delivered => progress.delivered += 1,
                    DeliveryStatus::Failed => progress.failed += 1,
                    DeliveryStatus::Cancelled => progress.cancelled += 1,
                }
                progress
            },
        )
    }

    /// Share of non-cancelled tasks that were delivered.
    pub fn delivery_rate(&self) -> f64 {
        let expected = self.total - self.cancelled;
        if expected == 0 {
            return 0.0;
        }
        self.delivered as f64 / expected as f64
    }
}
