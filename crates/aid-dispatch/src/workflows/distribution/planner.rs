use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::catalog::TemplateCatalog;
use super::clock::Clock;
use super::directory::BeneficiaryDirectory;
use super::domain::{BeneficiaryId, OrganizationId, PackageTemplate, TemplateId, TemplateStatus};
use super::error::DistributionError;
use super::filter::{FilterEvaluator, FilterSpec};

/// Operator's pending send: who gets which package, and what it costs.
///
/// Totals assume one package per beneficiary regardless of household size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendPlan {
    pub organization_id: OrganizationId,
    pub template_id: TemplateId,
    pub filter: FilterSpec,
    pub evaluated_at: DateTime<Utc>,
    pub eligible: Vec<BeneficiaryId>,
    pub unit_cost: f64,
    pub unit_weight_kg: f64,
    pub total_cost: f64,
    pub total_weight_kg: f64,
}

impl SendPlan {
    pub fn eligible_count(&self) -> usize {
        self.eligible.len()
    }

    pub fn preview(&self) -> PlanPreview {
        PlanPreview {
            eligible_count: self.eligible_count(),
            total_cost: self.total_cost,
            total_weight_kg: self.total_weight_kg,
        }
    }
}

/// Live counter shown while the operator edits filters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlanPreview {
    pub eligible_count: usize,
    pub total_cost: f64,
    pub total_weight_kg: f64,
}

/// Read-only planner; safe to call concurrently and repeatedly.
pub struct SendPlanner<D, C> {
    directory: Arc<D>,
    catalog: Arc<C>,
    evaluator: FilterEvaluator,
    clock: Arc<dyn Clock>,
}

impl<D, C> SendPlanner<D, C>
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
{
    pub fn new(
        directory: Arc<D>,
        catalog: Arc<C>,
        evaluator: FilterEvaluator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            catalog,
            evaluator,
            clock,
        }
    }

    pub fn evaluator(&self) -> &FilterEvaluator {
        &self.evaluator
    }

    pub fn plan(
        &self,
        organization_id: &OrganizationId,
        template_id: &TemplateId,
        filter: FilterSpec,
    ) -> Result<SendPlan, DistributionError> {
        self.plan_at(organization_id, template_id, filter, self.clock.now())
    }

    /// Plans against an explicit evaluation instant.
    pub fn plan_at(
        &self,
        organization_id: &OrganizationId,
        template_id: &TemplateId,
        filter: FilterSpec,
        as_of: DateTime<Utc>,
    ) -> Result<SendPlan, DistributionError> {
        let template = resolve_selection(self.catalog.as_ref(), organization_id, template_id)?;

        let eligible = self
            .evaluator
            .eligible(self.directory.as_ref(), &filter, as_of);
        if eligible.is_empty() {
            return Err(DistributionError::EmptyEligibleSet { filter });
        }

        let unit_cost = template.estimated_cost;
        let unit_weight_kg = template.total_weight_kg();
        let count = eligible.len() as f64;

        debug!(
            organization = %organization_id,
            template = %template_id,
            eligible = eligible.len(),
            filter = %filter.describe(),
            "send plan computed"
        );

        Ok(SendPlan {
            organization_id: organization_id.clone(),
            template_id: template_id.clone(),
            filter,
            evaluated_at: as_of,
            eligible,
            unit_cost,
            unit_weight_kg,
            total_cost: count * unit_cost,
            total_weight_kg: count * unit_weight_kg,
        })
    }

    pub fn preview(
        &self,
        organization_id: &OrganizationId,
        template_id: &TemplateId,
        filter: FilterSpec,
    ) -> Result<PlanPreview, DistributionError> {
        self.plan(organization_id, template_id, filter)
            .map(|plan| plan.preview())
    }
}

/// Checks that the organization exists and offers the template in `active` state.
pub(crate) fn resolve_selection<C>(
    catalog: &C,
    organization_id: &OrganizationId,
    template_id: &TemplateId,
) -> Result<PackageTemplate, DistributionError>
where
    C: TemplateCatalog + ?Sized,
{
    catalog
        .find_organization(organization_id)
        .map_err(|_| DistributionError::InvalidSelection {
            reason: format!("organization '{organization_id}' does not exist"),
        })?;

    let template = catalog
        .find_template(organization_id, template_id)
        .map_err(|_| DistributionError::InvalidSelection {
            reason: format!(
                "template '{template_id}' is not offered by organization '{organization_id}'"
            ),
        })?;

    if template.status != TemplateStatus::Active {
        return Err(DistributionError::InvalidSelection {
            reason: format!(
                "template '{template_id}' is {} and cannot be sent",
                template.status.label()
            ),
        });
    }

    Ok(template)
}
