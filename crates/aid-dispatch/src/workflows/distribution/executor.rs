use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::catalog::TemplateCatalog;
use super::clock::Clock;
use super::directory::BeneficiaryDirectory;
use super::domain::{AgentId, BeneficiaryId, JobId, OrganizationId, TemplateId};
use super::error::{DistributionError, EntityKind, TaskCreationFailure};
use super::filter::FilterSpec;
use super::notify::{DeliveryEvent, NotificationSink};
use super::planner::{resolve_selection, SendPlan};
use super::tracking::{DeliveryStatus, DeliveryTask, JobProgress, JobStatus, RescheduleKind};

/// Confirmed distribution with one delivery task per beneficiary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendJob {
    pub id: JobId,
    pub organization_id: OrganizationId,
    pub template_id: TemplateId,
    pub filter: FilterSpec,
    pub created_at: DateTime<Utc>,
    pub tasks: Vec<DeliveryTask>,
}

impl SendJob {
    pub fn status(&self) -> JobStatus {
        JobStatus::derive(&self.tasks)
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress::tally(&self.tasks)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn task(&self, beneficiary_id: &BeneficiaryId) -> Option<&DeliveryTask> {
        self.tasks
            .iter()
            .find(|task| &task.beneficiary_id == beneficiary_id)
    }

    pub fn view(&self) -> SendJobView {
        SendJobView {
            status: self.status(),
            progress: self.progress(),
            job: self.clone(),
        }
    }
}

/// Serialized job snapshot including derived state.
#[derive(Debug, Clone, Serialize)]
pub struct SendJobView {
    #[serde(flatten)]
    pub job: SendJob,
    pub status: JobStatus,
    pub progress: JobProgress,
}

/// Field agents handed tasks in round-robin order.
///
/// The starting agent rotates between jobs, so within one job the task counts of
/// any two agents differ by at most one.
#[derive(Debug)]
pub struct AgentPool {
    agents: Vec<AgentId>,
    cursor: AtomicUsize,
}

impl AgentPool {
    pub fn new(agents: Vec<AgentId>) -> Option<Self> {
        if agents.is_empty() {
            return None;
        }
        Some(Self {
            agents,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    fn assign(&self, count: usize) -> Vec<AgentId> {
        let size = self.agents.len();
        let start = self.cursor.fetch_add(count, Ordering::Relaxed) % size;
        (0..count)
            .map(|offset| self.agents[(start + offset) % size].clone())
            .collect()
    }
}

/// Creates distribution jobs and drives their delivery tasks.
///
/// Jobs live in a table of per-job mutexes: updates to one job are serialized while
/// different jobs progress independently.
pub struct SendExecutor<D, C, N> {
    directory: Arc<D>,
    catalog: Arc<C>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    agents: AgentPool,
    max_auto_retries: u8,
    jobs: RwLock<HashMap<JobId, Arc<Mutex<SendJob>>>>,
}

impl<D, C, N> SendExecutor<D, C, N>
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        directory: Arc<D>,
        catalog: Arc<C>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        agents: AgentPool,
        max_auto_retries: u8,
    ) -> Self {
        Self {
            directory,
            catalog,
            notifier,
            clock,
            agents,
            max_auto_retries,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Turns a plan into a job. Either every task is created or none is.
    ///
    /// The selection is checked again since the catalog may have changed after planning.
    pub fn execute(&self, plan: &SendPlan) -> Result<SendJob, DistributionError> {
        if plan.eligible.is_empty() {
            return Err(DistributionError::EmptyEligibleSet {
                filter: plan.filter.clone(),
            });
        }
        resolve_selection(
            self.catalog.as_ref(),
            &plan.organization_id,
            &plan.template_id,
        )?;

        let failures = self.validate_recipients(&plan.eligible);
        if !failures.is_empty() {
            warn!(
                template = %plan.template_id,
                failures = failures.len(),
                "send rejected during task creation"
            );
            return Err(DistributionError::TaskCreationFailed { failures });
        }

        let now = self.clock.now();
        let tasks: Vec<DeliveryTask> = plan
            .eligible
            .iter()
            .cloned()
            .zip(self.agents.assign(plan.eligible.len()))
            .map(|(beneficiary_id, agent)| DeliveryTask::new(beneficiary_id, agent, now))
            .collect();

        let usage = self.catalog.increment_usage(&plan.template_id)?;

        let mut jobs = self.jobs.write().expect("job table poisoned");
        let id = loop {
            let candidate = JobId::generate(now);
            if !jobs.contains_key(&candidate) {
                break candidate;
            }
        };

        let job = SendJob {
            id: id.clone(),
            organization_id: plan.organization_id.clone(),
            template_id: plan.template_id.clone(),
            filter: plan.filter.clone(),
            created_at: now,
            tasks,
        };
        jobs.insert(id.clone(), Arc::new(Mutex::new(job.clone())));

        info!(
            job = %id,
            organization = %plan.organization_id,
            template = %plan.template_id,
            tasks = job.tasks.len(),
            template_usage = usage,
            "distribution job created"
        );

        Ok(job)
    }

    pub fn job(&self, job_id: &JobId) -> Result<SendJob, DistributionError> {
        let handle = self.handle(job_id)?;
        let job = handle.lock().expect("job mutex poisoned").clone();
        Ok(job)
    }

    /// Every job, newest first.
    pub fn jobs(&self) -> Vec<SendJob> {
        let handles: Vec<Arc<Mutex<SendJob>>> = self
            .jobs
            .read()
            .expect("job table poisoned")
            .values()
            .cloned()
            .collect();
        let mut jobs: Vec<SendJob> = handles
            .iter()
            .map(|handle| handle.lock().expect("job mutex poisoned").clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        jobs
    }

    /// Applies an externally reported delivery status.
    ///
    /// A failure is rescheduled automatically while the task has automatic retries
    /// left; after that it stays failed until rescheduled by hand.
    pub fn apply_status_update(
        &self,
        job_id: &JobId,
        beneficiary_id: &BeneficiaryId,
        status: DeliveryStatus,
    ) -> Result<DeliveryTask, DistributionError> {
        let handle = self.handle(job_id)?;
        let now = self.clock.now();

        let (task, events) = {
            let mut job = handle.lock().expect("job mutex poisoned");
            let task = task_mut(&mut job, beneficiary_id)?;
            let from = task.status;

            if !from.can_transition_to(status) {
                return Err(DistributionError::InvalidTransition {
                    job_id: job_id.clone(),
                    beneficiary_id: beneficiary_id.clone(),
                    from,
                    to: status,
                });
            }

            if status == DeliveryStatus::Delivered {
                self.directory
                    .record_delivery(beneficiary_id, job_id, now)?;
            }

            task.advance(status, now)
                .map_err(|(from, to)| DistributionError::InvalidTransition {
                    job_id: job_id.clone(),
                    beneficiary_id: beneficiary_id.clone(),
                    from,
                    to,
                })?;
            let mut events = vec![DeliveryEvent::for_task(job_id, task, from)];

            if status == DeliveryStatus::Failed
                && task.reschedules() < self.max_auto_retries
                && task.reschedule(RescheduleKind::Automatic, now).is_ok()
            {
                events.push(DeliveryEvent::for_task(
                    job_id,
                    task,
                    DeliveryStatus::Failed,
                ));
            }

            (task.clone(), events)
        };

        self.dispatch(events);
        Ok(task)
    }

    /// Puts a finally failed delivery back into preparation.
    pub fn reschedule(
        &self,
        job_id: &JobId,
        beneficiary_id: &BeneficiaryId,
    ) -> Result<DeliveryTask, DistributionError> {
        let handle = self.handle(job_id)?;
        let now = self.clock.now();

        let task = {
            let mut job = handle.lock().expect("job mutex poisoned");
            let task = task_mut(&mut job, beneficiary_id)?;
            task.reschedule(RescheduleKind::Manual, now)
                .map_err(|(from, to)| DistributionError::InvalidTransition {
                    job_id: job_id.clone(),
                    beneficiary_id: beneficiary_id.clone(),
                    from,
                    to,
                })?;
            task.clone()
        };

        info!(
            job = %job_id,
            beneficiary = %beneficiary_id,
            attempt = task.attempt,
            "delivery rescheduled"
        );
        self.dispatch(vec![DeliveryEvent::for_task(
            job_id,
            &task,
            DeliveryStatus::Failed,
        )]);
        Ok(task)
    }

    /// Cancels every delivery that has not started yet.
    ///
    /// Succeeds only when no delivery had left `preparing`; otherwise the pending
    /// subset is still cancelled and the in-flight count is reported as an error.
    pub fn cancel(&self, job_id: &JobId) -> Result<SendJob, DistributionError> {
        let handle = self.handle(job_id)?;
        let now = self.clock.now();

        let (job, events, cancelled, in_flight) = {
            let mut job = handle.lock().expect("job mutex poisoned");
            let in_flight = job
                .tasks
                .iter()
                .filter(|task| {
                    !matches!(
                        task.status,
                        DeliveryStatus::Preparing | DeliveryStatus::Cancelled
                    )
                })
                .count();

            let mut events = Vec::new();
            for task in job.tasks.iter_mut() {
                if task.cancel(now) {
                    events.push(DeliveryEvent::for_task(
                        job_id,
                        task,
                        DeliveryStatus::Preparing,
                    ));
                }
            }
            let cancelled = events.len();
            (job.clone(), events, cancelled, in_flight)
        };

        self.dispatch(events);

        if in_flight > 0 {
            warn!(job = %job_id, cancelled, in_flight, "partial cancellation");
            return Err(DistributionError::PartialCancellationOnly {
                job_id: job_id.clone(),
                cancelled,
                in_flight,
            });
        }

        info!(job = %job_id, cancelled, "distribution job cancelled");
        Ok(job)
    }

    fn handle(&self, job_id: &JobId) -> Result<Arc<Mutex<SendJob>>, DistributionError> {
        self.jobs
            .read()
            .expect("job table poisoned")
            .get(job_id)
            .cloned()
            .ok_or_else(|| DistributionError::not_found(EntityKind::Job, job_id))
    }

    fn validate_recipients(&self, eligible: &[BeneficiaryId]) -> Vec<TaskCreationFailure> {
        let mut seen = HashSet::new();
        eligible
            .iter()
            .filter_map(|id| {
                let reason = if !seen.insert(id) {
                    Some("listed more than once in the plan".to_string())
                } else {
                    match self.directory.find_by_id(id) {
                        Ok(beneficiary) if beneficiary.is_active() => None,
                        Ok(_) => Some("beneficiary enrollment is suspended".to_string()),
                        Err(err) => Some(err.to_string()),
                    }
                };
                reason.map(|reason| TaskCreationFailure {
                    beneficiary_id: id.clone(),
                    reason,
                })
            })
            .collect()
    }

    fn dispatch(&self, events: Vec<DeliveryEvent>) {
        for event in events {
            let job_id = event.job_id.clone();
            let beneficiary_id = event.beneficiary_id.clone();
            if let Err(err) = self.notifier.notify(event) {
                warn!(
                    job = %job_id,
                    beneficiary = %beneficiary_id,
                    error = %err,
                    "delivery notification dropped"
                );
            }
        }
    }
}

fn task_mut<'a>(
    job: &'a mut SendJob,
    beneficiary_id: &BeneficiaryId,
) -> Result<&'a mut DeliveryTask, DistributionError> {
    job.tasks
        .iter_mut()
        .find(|task| &task.beneficiary_id == beneficiary_id)
        .ok_or_else(|| DistributionError::not_found(EntityKind::Task, beneficiary_id))
}
