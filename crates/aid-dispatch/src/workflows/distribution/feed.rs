//! Asynchronous consumer of delivery status reports from field tracking.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::catalog::TemplateCatalog;
use super::directory::BeneficiaryDirectory;
use super::domain::{BeneficiaryId, JobId};
use super::error::DistributionError;
use super::executor::SendExecutor;
use super::notify::NotificationSink;
use super::service::DistributionService;
use super::tracking::{DeliveryStatus, DeliveryTask};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub job_id: JobId,
    pub beneficiary_id: BeneficiaryId,
    pub status: DeliveryStatus,
}

/// Anything able to apply a delivery status report.
pub trait StatusUpdateTarget: Send + Sync {
    fn apply(&self, update: &StatusUpdate) -> Result<DeliveryTask, DistributionError>;
}

impl<D, C, N> StatusUpdateTarget for SendExecutor<D, C, N>
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    fn apply(&self, update: &StatusUpdate) -> Result<DeliveryTask, DistributionError> {
        self.apply_status_update(&update.job_id, &update.beneficiary_id, update.status)
    }
}

impl<D, C, N> StatusUpdateTarget for DistributionService<D, C, N>
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    fn apply(&self, update: &StatusUpdate) -> Result<DeliveryTask, DistributionError> {
        self.update_status(&update.job_id, &update.beneficiary_id, update.status)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedSummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Applies updates until the channel closes or `cancel` fires.
///
/// On cancellation the channel is closed and every update already queued is still
/// applied, since the webhook acknowledged it. Rejected updates are logged and
/// counted; they never stop the feed.
pub async fn run_status_feed<T>(
    target: Arc<T>,
    mut updates: mpsc::Receiver<StatusUpdate>,
    cancel: CancellationToken,
) -> FeedSummary
where
    T: StatusUpdateTarget + ?Sized,
{
    let mut summary = FeedSummary::default();

    loop {
        let update = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                updates.close();
                while let Ok(update) = updates.try_recv() {
                    apply_update(target.as_ref(), &update, &mut summary);
                }
                break;
            }
            next = updates.recv() => match next {
                Some(update) => update,
                None => break,
            },
        };

        apply_update(target.as_ref(), &update, &mut summary);
    }

    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        "status feed stopped"
    );
    summary
}

fn apply_update<T>(target: &T, update: &StatusUpdate, summary: &mut FeedSummary)
where
    T: StatusUpdateTarget + ?Sized,
{
    match target.apply(update) {
        Ok(task) => {
            summary.applied += 1;
            debug!(
                job = %update.job_id,
                beneficiary = %update.beneficiary_id,
                status = %task.status,
                "status update applied"
            );
        }
        Err(err) => {
            summary.rejected += 1;
            warn!(
                job = %update.job_id,
                beneficiary = %update.beneficiary_id,
                error = %err,
                "status update rejected"
            );
        }
    }
}

pub fn spawn_status_feed<T>(
    target: Arc<T>,
    updates: mpsc::Receiver<StatusUpdate>,
    cancel: CancellationToken,
) -> JoinHandle<FeedSummary>
where
    T: StatusUpdateTarget + ?Sized + 'static,
{
    tokio::spawn(run_status_feed(target, updates, cancel))
}
