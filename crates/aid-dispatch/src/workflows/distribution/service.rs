use std::io::Read;
use std::sync::Arc;

use super::catalog::TemplateCatalog;
use super::clock::Clock;
use super::directory::BeneficiaryDirectory;
use super::domain::{
    AgentId, BeneficiaryId, JobId, Organization, OrganizationId, PackageTemplate, TemplateId,
};
use super::error::DistributionError;
use super::executor::{AgentPool, SendExecutor, SendJob};
use super::filter::{FilterEvaluator, FilterSpec};
use super::notify::NotificationSink;
use super::planner::{PlanPreview, SendPlan, SendPlanner};
use super::tracking::{DeliveryStatus, DeliveryTask};
use crate::config::{ConfigError, DistributionConfig, MAX_AUTO_RETRIES};
use crate::workflows::intake::{BeneficiaryImporter, ImportError, ImportReport};

/// Facade composing the directory, catalog, planner and executor for the HTTP layer.
pub struct DistributionService<D, C, N> {
    directory: Arc<D>,
    catalog: Arc<C>,
    clock: Arc<dyn Clock>,
    planner: SendPlanner<D, C>,
    executor: SendExecutor<D, C, N>,
}

impl<D, C, N> DistributionService<D, C, N>
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
        config: &DistributionConfig,
    ) -> Result<Self, ConfigError> {
        let agents = AgentPool::new(config.agents.iter().map(AgentId::new).collect())
            .ok_or(ConfigError::EmptyAgentPool)?;

        let planner = SendPlanner::new(
            directory.clone(),
            catalog.clone(),
            FilterEvaluator::new(config.recency_threshold),
            clock.clone(),
        );
        let executor = SendExecutor::new(
            directory.clone(),
            catalog.clone(),
            notifier,
            clock.clone(),
            agents,
            config.max_auto_retries.min(MAX_AUTO_RETRIES),
        );

        Ok(Self {
            directory,
            catalog,
            clock,
            planner,
            executor,
        })
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    pub fn planner(&self) -> &SendPlanner<D, C> {
        &self.planner
    }

    pub fn executor(&self) -> &SendExecutor<D, C, N> {
        &self.executor
    }

    pub fn organizations(&self) -> Vec<Organization> {
        self.catalog.organizations()
    }

    pub fn templates(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<PackageTemplate>, DistributionError> {
        self.catalog.find_organization(organization_id)?;
        Ok(self.catalog.find_by_organization(organization_id))
    }

    pub fn preview(
        &self,
        organization_id: &OrganizationId,
        template_id: &TemplateId,
        filter: FilterSpec,
    ) -> Result<PlanPreview, DistributionError> {
        self.planner.preview(organization_id, template_id, filter)
    }

    pub fn plan(
        &self,
        organization_id: &OrganizationId,
        template_id: &TemplateId,
        filter: FilterSpec,
    ) -> Result<SendPlan, DistributionError> {
        self.planner.plan(organization_id, template_id, filter)
    }

    pub fn execute(&self, plan: &SendPlan) -> Result<SendJob, DistributionError> {
        self.executor.execute(plan)
    }

    /// Plans and confirms in one step.
    pub fn dispatch(
        &self,
        organization_id: &OrganizationId,
        template_id: &TemplateId,
        filter: FilterSpec,
    ) -> Result<SendJob, DistributionError> {
        let plan = self.plan(organization_id, template_id, filter)?;
        self.execute(&plan)
    }

    pub fn job(&self, job_id: &JobId) -> Result<SendJob, DistributionError> {
        self.executor.job(job_id)
    }

    pub fn jobs(&self) -> Vec<SendJob> {
        self.executor.jobs()
    }

    pub fn update_status(
        &self,
        job_id: &JobId,
        beneficiary_id: &BeneficiaryId,
        status: DeliveryStatus,
    ) -> Result<DeliveryTask, DistributionError> {
        self.executor
            .apply_status_update(job_id, beneficiary_id, status)
    }

    pub fn reschedule(
        &self,
        job_id: &JobId,
        beneficiary_id: &BeneficiaryId,
    ) -> Result<DeliveryTask, DistributionError> {
        self.executor.reschedule(job_id, beneficiary_id)
    }

    pub fn cancel(&self, job_id: &JobId) -> Result<SendJob, DistributionError> {
        self.executor.cancel(job_id)
    }

    pub fn import_beneficiaries<R: Read>(&self, reader: R) -> Result<ImportReport, ImportError> {
        BeneficiaryImporter::from_reader(reader, self.directory.as_ref(), self.clock.now())
    }
}
