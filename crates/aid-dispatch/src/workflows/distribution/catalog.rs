use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::domain::{Organization, OrganizationId, PackageTemplate, TemplateId};
use super::error::{DistributionError, EntityKind};

/// Donor organizations and the package templates they offer.
pub trait TemplateCatalog: Send + Sync {
    fn organizations(&self) -> Vec<Organization>;
    fn find_organization(&self, id: &OrganizationId) -> Result<Organization, DistributionError>;
    fn find_by_organization(&self, organization_id: &OrganizationId) -> Vec<PackageTemplate>;
    /// Fails with `NotFound` when the template is unknown or owned by another organization.
    fn find_template(
        &self,
        organization_id: &OrganizationId,
        template_id: &TemplateId,
    ) -> Result<PackageTemplate, DistributionError>;
    /// Atomically bumps the usage counter and returns the new value.
    fn increment_usage(&self, template_id: &TemplateId) -> Result<u64, DistributionError>;
}

#[derive(Debug)]
struct StoredTemplate {
    template: PackageTemplate,
    usage: AtomicU64,
}

impl StoredTemplate {
    fn snapshot(&self) -> PackageTemplate {
        let mut template = self.template.clone();
        template.usage_count = self.usage.load(Ordering::Acquire);
        template
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTemplateCatalog {
    organizations: RwLock<BTreeMap<OrganizationId, Organization>>,
    templates: RwLock<BTreeMap<TemplateId, StoredTemplate>>,
}

impl InMemoryTemplateCatalog {
    pub fn new<O, T>(organizations: O, templates: T) -> Self
    where
        O: IntoIterator<Item = Organization>,
        T: IntoIterator<Item = PackageTemplate>,
    {
        let catalog = Self::default();
        for organization in organizations {
            catalog.insert_organization(organization);
        }
        for template in templates {
            catalog.insert_template(template);
        }
        catalog
    }

    pub fn insert_organization(&self, organization: Organization) {
        self.organizations
            .write()
            .expect("catalog lock poisoned")
            .insert(organization.id.clone(), organization);
    }

    /// Adds or replaces a template, keeping the stored usage count.
    pub fn insert_template(&self, template: PackageTemplate) {
        let mut guard = self.templates.write().expect("catalog lock poisoned");
        let usage = guard
            .get(&template.id)
            .map(|stored| stored.usage.load(Ordering::Acquire))
            .unwrap_or(template.usage_count);
        guard.insert(
            template.id.clone(),
            StoredTemplate {
                template,
                usage: AtomicU64::new(usage),
            },
        );
    }

    fn template_count(&self, organization_id: &OrganizationId) -> u32 {
        let guard = self.templates.read().expect("catalog lock poisoned");
        let count = guard
            .values()
            .filter(|stored| &stored.template.organization_id == organization_id)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn with_count(&self, mut organization: Organization) -> Organization {
        organization.template_count = self.template_count(&organization.id);
        organization
    }
}

impl TemplateCatalog for InMemoryTemplateCatalog {
    fn organizations(&self) -> Vec<Organization> {
        let organizations: Vec<Organization> = self
            .organizations
            .read()
            .expect("catalog lock poisoned")
            .values()
            .cloned()
            .collect();
        organizations
            .into_iter()
            .map(|organization| self.with_count(organization))
            .collect()
    }

    fn find_organization(&self, id: &OrganizationId) -> Result<Organization, DistributionError> {
        let organization = self
            .organizations
            .read()
            .expect("catalog lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| DistributionError::not_found(EntityKind::Organization, id))?;
        Ok(self.with_count(organization))
    }

    fn find_by_organization(&self, organization_id: &OrganizationId) -> Vec<PackageTemplate> {
        let guard = self.templates.read().expect("catalog lock poisoned");
        guard
            .values()
            .filter(|stored| &stored.template.organization_id == organization_id)
            .map(StoredTemplate::snapshot)
            .collect()
    }

    fn find_template(
        &self,
        organization_id: &OrganizationId,
        template_id: &TemplateId,
    ) -> Result<PackageTemplate, DistributionError> {
        let guard = self.templates.read().expect("catalog lock poisoned");
        guard
            .get(template_id)
            .filter(|stored| &stored.template.organization_id == organization_id)
            .map(StoredTemplate::snapshot)
            .ok_or_else(|| DistributionError::not_found(EntityKind::Template, template_id))
    }

    fn increment_usage(&self, template_id: &TemplateId) -> Result<u64, DistributionError> {
        let guard = self.templates.read().expect("catalog lock poisoned");
        let stored = guard
            .get(template_id)
            .ok_or_else(|| DistributionError::not_found(EntityKind::Template, template_id))?;
        Ok(stored.usage.fetch_add(1, Ordering::AcqRel) + 1)
    }
}
