//! Beneficiary targeting.
//!
//! A [`FilterSpec`] is what the operator picked in the send form. Every dimension is
//! independent and the dimensions are combined with AND; the default value of a
//! dimension never excludes anyone. Buckets that depend on time are derived from the
//! evaluation instant passed to [`FilterEvaluator::compile`], so the same spec, snapshot
//! and instant always yield the same eligible set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::directory::BeneficiaryDirectory;
use super::domain::{
    AreaCode, Beneficiary, BeneficiaryId, FamilySize, LastReceived, RecencyBucket,
};

/// Benefit history class. The three classes partition the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenefitStatus {
    /// No package received yet.
    Never,
    /// Last receipt falls within the recency threshold.
    Recent,
    /// Received before, but longer ago than the recency threshold.
    Old,
}

impl BenefitStatus {
    pub fn classify(
        beneficiary: &Beneficiary,
        as_of: DateTime<Utc>,
        recency_threshold: RecencyBucket,
    ) -> Self {
        if !beneficiary.has_received() {
            return Self::Never;
        }

        match beneficiary.last_received(as_of) {
            bucket if bucket <= LastReceived::from(recency_threshold) => Self::Recent,
            _ => Self::Old,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    #[default]
    Any,
    Yes,
    No,
}

impl TriState {
    pub const fn admits(self, value: bool) -> bool {
        match self {
            Self::Any => true,
            Self::Yes => value,
            Self::No => !value,
        }
    }
}

/// Immutable selection of filter values. `None`/`Any` means unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub benefit_status: Option<BenefitStatus>,
    pub family_size: Option<FamilySize>,
    pub has_children: TriState,
    pub has_elderly: TriState,
    /// A blank code from the form's "all areas" option reads as no constraint.
    #[serde(deserialize_with = "blank_area_as_none")]
    pub area: Option<AreaCode>,
    pub last_received: Option<LastReceived>,
    pub date_added: Option<RecencyBucket>,
}

impl FilterSpec {
    pub fn with_benefit_status(mut self, status: BenefitStatus) -> Self {
        self.benefit_status = Some(status);
        self
    }

    pub fn with_family_size(mut self, size: FamilySize) -> Self {
        self.family_size = Some(size);
        self
    }

    pub fn with_children(mut self, value: TriState) -> Self {
        self.has_children = value;
        self
    }

    pub fn with_elderly(mut self, value: TriState) -> Self {
        self.has_elderly = value;
        self
    }

    pub fn with_area(mut self, area: impl Into<String>) -> Self {
        self.area = Some(AreaCode::new(area)).filter(|code| !code.as_str().trim().is_empty());
        self
    }

    pub fn with_last_received(mut self, bucket: LastReceived) -> Self {
        self.last_received = Some(bucket);
        self
    }

    pub fn with_date_added(mut self, bucket: RecencyBucket) -> Self {
        self.date_added = Some(bucket);
        self
    }

    pub fn is_unconstrained(&self) -> bool {
        self == &Self::default()
    }

    /// Human readable list of the constrained dimensions, for error messages.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(status) = self.benefit_status {
            parts.push(format!("benefit status {status:?}"));
        }
        if let Some(size) = self.family_size {
            parts.push(format!("family size {size:?}"));
        }
        if self.has_children != TriState::Any {
            parts.push(format!("has children {:?}", self.has_children));
        }
        if self.has_elderly != TriState::Any {
            parts.push(format!("has elderly {:?}", self.has_elderly));
        }
        if let Some(area) = &self.area {
            parts.push(format!("area {area}"));
        }
        if let Some(bucket) = self.last_received {
            parts.push(format!("last received {bucket:?}"));
        }
        if let Some(bucket) = self.date_added {
            parts.push(format!("date added {bucket:?}"));
        }

        if parts.is_empty() {
            "no constraints".to_string()
        } else {
            parts.join(", ").to_ascii_lowercase()
        }
    }
}

fn blank_area_as_none<'de, D>(deserializer: D) -> Result<Option<AreaCode>, D::Error>
where
    D: Deserializer<'de>,
{
    let area = Option::<AreaCode>::deserialize(deserializer)?;
    Ok(area.filter(|code| !code.as_str().trim().is_empty()))
}

/// Compiled, side-effect free predicate over beneficiaries.
#[derive(Debug, Clone)]
pub struct BeneficiaryFilter {
    spec: FilterSpec,
    as_of: DateTime<Utc>,
    recency_threshold: RecencyBucket,
}

impl BeneficiaryFilter {
    pub fn matches(&self, beneficiary: &Beneficiary) -> bool {
        let spec = &self.spec;

        spec.benefit_status.map_or(true, |status| {
            BenefitStatus::classify(beneficiary, self.as_of, self.recency_threshold) == status
        }) && spec
            .family_size
            .map_or(true, |size| beneficiary.family_size() == size)
            && spec.has_children.admits(beneficiary.has_children)
            && spec.has_elderly.admits(beneficiary.has_elderly)
            && spec
                .area
                .as_ref()
                .map_or(true, |area| &beneficiary.governorate == area)
            && spec
                .last_received
                .map_or(true, |bucket| beneficiary.last_received(self.as_of) == bucket)
            && spec
                .date_added
                .map_or(true, |bucket| beneficiary.date_added(self.as_of) == bucket)
    }

    pub fn into_predicate(self) -> impl Fn(&Beneficiary) -> bool {
        move |beneficiary| self.matches(beneficiary)
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }
}

/// Turns filter selections into predicates and applies them to a directory.
#[derive(Debug, Clone, Copy)]
pub struct FilterEvaluator {
    recency_threshold: RecencyBucket,
}

impl Default for FilterEvaluator {
    fn default() -> Self {
        Self::new(RecencyBucket::Week)
    }
}

impl FilterEvaluator {
    pub fn new(recency_threshold: RecencyBucket) -> Self {
        Self { recency_threshold }
    }

    pub fn recency_threshold(&self) -> RecencyBucket {
        self.recency_threshold
    }

    pub fn compile(&self, spec: &FilterSpec, as_of: DateTime<Utc>) -> BeneficiaryFilter {
        BeneficiaryFilter {
            spec: spec.clone(),
            as_of,
            recency_threshold: self.recency_threshold,
        }
    }

    /// Active beneficiaries matching `spec`, ordered by id.
    pub fn eligible<D>(
        &self,
        directory: &D,
        spec: &FilterSpec,
        as_of: DateTime<Utc>,
    ) -> Vec<BeneficiaryId>
    where
        D: BeneficiaryDirectory + ?Sized,
    {
        let filter = self.compile(spec, as_of);
        let mut eligible: Vec<BeneficiaryId> = directory
            .find_all()
            .into_iter()
            .filter(|beneficiary| beneficiary.is_active() && filter.matches(beneficiary))
            .map(|beneficiary| beneficiary.id)
            .collect();
        eligible.sort();
        eligible
    }
}
