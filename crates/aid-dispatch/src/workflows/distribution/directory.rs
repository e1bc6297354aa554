use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::domain::{Beneficiary, BeneficiaryId, JobId, RecordDefect};
use super::error::{DistributionError, EntityKind};

/// Storage abstraction for registered beneficiaries.
///
/// The only mutations are intake (`admit`) and delivery bookkeeping
/// (`record_delivery`); records are never removed.
pub trait BeneficiaryDirectory: Send + Sync {
    /// Finite snapshot ordered by id. Each call starts a fresh snapshot.
    fn find_all(&self) -> Vec<Beneficiary>;
    fn find_by_id(&self, id: &BeneficiaryId) -> Result<Beneficiary, DistributionError>;
    /// Counts one more package and moves the receipt timestamp forward.
    fn record_delivery(
        &self,
        id: &BeneficiaryId,
        job_id: &JobId,
        delivered_at: DateTime<Utc>,
    ) -> Result<Beneficiary, DistributionError>;
    fn admit(&self, beneficiary: Beneficiary) -> Result<(), RecordDefect>;
}

#[derive(Debug, Default)]
pub struct InMemoryBeneficiaryDirectory {
    records: RwLock<BTreeMap<BeneficiaryId, Beneficiary>>,
}

impl InMemoryBeneficiaryDirectory {
    /// Seeds the directory, rejecting the whole batch on the first defect.
    pub fn with_records<I>(records: I) -> Result<Self, RecordDefect>
    where
        I: IntoIterator<Item = Beneficiary>,
    {
        let directory = Self::default();
        for record in records {
            directory.admit(record)?;
        }
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("directory lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BeneficiaryDirectory for InMemoryBeneficiaryDirectory {
    fn find_all(&self) -> Vec<Beneficiary> {
        let guard = self.records.read().expect("directory lock poisoned");
        guard.values().cloned().collect()
    }

    fn find_by_id(&self, id: &BeneficiaryId) -> Result<Beneficiary, DistributionError> {
        let guard = self.records.read().expect("directory lock poisoned");
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| DistributionError::not_found(EntityKind::Beneficiary, id))
    }

    fn record_delivery(
        &self,
        id: &BeneficiaryId,
        job_id: &JobId,
        delivered_at: DateTime<Utc>,
    ) -> Result<Beneficiary, DistributionError> {
        let mut guard = self.records.write().expect("directory lock poisoned");
        let record = guard
            .get_mut(id)
            .ok_or_else(|| DistributionError::not_found(EntityKind::Beneficiary, id))?;

        record.total_packages = record.total_packages.saturating_add(1);
        record.last_received_at = Some(match record.last_received_at {
            Some(previous) if previous > delivered_at => previous,
            _ => delivered_at,
        });

        debug!(
            beneficiary = %id,
            job = %job_id,
            total_packages = record.total_packages,
            "delivery recorded"
        );

        Ok(record.clone())
    }

    fn admit(&self, beneficiary: Beneficiary) -> Result<(), RecordDefect> {
        beneficiary.validate()?;

        let mut guard = self.records.write().expect("directory lock poisoned");
        if guard.contains_key(&beneficiary.id) {
            return Err(RecordDefect::DuplicateId(beneficiary.id.0.clone()));
        }
        guard.insert(beneficiary.id.clone(), beneficiary);
        Ok(())
    }
}
