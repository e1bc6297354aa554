use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Directory identifier of a registered household.
    BeneficiaryId
);
string_id!(
    /// Donor institution identifier.
    OrganizationId
);
string_id!(
    /// Package template identifier, unique across organizations.
    TemplateId
);
string_id!(
    /// Human-traceable distribution job identifier.
    JobId
);
string_id!(
    /// Field agent responsible for handing over packages.
    AgentId
);
string_id!(
    /// Governorate code; compared exactly, never fuzzily.
    AreaCode
);

impl JobId {
    /// `DIST-<yyyymmddHHMMSS>-<6 hex>`; the caller guarantees process-wide uniqueness.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("DIST-{}-{}", at.format("%Y%m%d%H%M%S"), &suffix[..6]))
    }
}

impl AreaCode {
    pub const KNOWN: [&'static str; 5] = ["north-gaza", "gaza", "middle", "khan-younis", "rafah"];

    pub fn is_known(&self) -> bool {
        Self::KNOWN.contains(&self.0.as_str())
    }
}

/// Elapsed-time bucket, ordered from most to least recent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecencyBucket {
    /// At most 7 days ago.
    Week,
    /// At most 30 days ago.
    Month,
    /// At most 90 days ago.
    Quarter,
    Older,
}

impl RecencyBucket {
    pub const fn ordered() -> [Self; 4] {
        [Self::Week, Self::Month, Self::Quarter, Self::Older]
    }

    /// Future instants (clock skew) fall into the most recent bucket.
    pub fn from_elapsed(elapsed: Duration) -> Self {
        match elapsed.num_days() {
            days if days <= 7 => Self::Week,
            days if days <= 30 => Self::Month,
            days if days <= 90 => Self::Quarter,
            _ => Self::Older,
        }
    }

    pub fn between(then: DateTime<Utc>, as_of: DateTime<Utc>) -> Self {
        Self::from_elapsed(as_of - then)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "quarter" => Some(Self::Quarter),
            "older" => Some(Self::Older),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Week => "This week",
            Self::Month => "This month",
            Self::Quarter => "Last three months",
            Self::Older => "Older",
        }
    }
}

/// Last receipt bucket. `Never` sorts after every dated bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastReceived {
    Week,
    Month,
    Quarter,
    Older,
    Never,
}

impl LastReceived {
    pub fn from_history(last_received_at: Option<DateTime<Utc>>, as_of: DateTime<Utc>) -> Self {
        match last_received_at {
            Some(at) => RecencyBucket::between(at, as_of).into(),
            None => Self::Never,
        }
    }

    pub const fn bucket(self) -> Option<RecencyBucket> {
        match self {
            Self::Week => Some(RecencyBucket::Week),
            Self::Month => Some(RecencyBucket::Month),
            Self::Quarter => Some(RecencyBucket::Quarter),
            Self::Older => Some(RecencyBucket::Older),
            Self::Never => None,
        }
    }
}

impl From<RecencyBucket> for LastReceived {
    fn from(bucket: RecencyBucket) -> Self {
        match bucket {
            RecencyBucket::Week => Self::Week,
            RecencyBucket::Month => Self::Month,
            RecencyBucket::Quarter => Self::Quarter,
            RecencyBucket::Older => Self::Older,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilySize {
    /// 1 to 3 members.
    Small,
    /// 4 to 6 members.
    Medium,
    /// 7 members or more.
    Large,
}

impl FamilySize {
    pub const fn from_members(members: u8) -> Self {
        match members {
            0..=3 => Self::Small,
            4..=6 => Self::Medium,
            _ => Self::Large,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Suspended,
}

/// Registered household. Records are never removed; suspension is a status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beneficiary {
    pub id: BeneficiaryId,
    pub national_id: String,
    pub full_name: String,
    pub phone: String,
    pub governorate: AreaCode,
    pub district: String,
    pub household_size: u8,
    pub has_children: bool,
    pub has_elderly: bool,
    pub total_packages: u32,
    pub last_received_at: Option<DateTime<Utc>>,
    pub added_at: DateTime<Utc>,
    pub status: EnrollmentStatus,
}

impl Beneficiary {
    pub fn family_size(&self) -> FamilySize {
        FamilySize::from_members(self.household_size)
    }

    pub fn has_received(&self) -> bool {
        self.total_packages > 0
    }

    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }

    pub fn last_received(&self, as_of: DateTime<Utc>) -> LastReceived {
        LastReceived::from_history(self.last_received_at, as_of)
    }

    pub fn date_added(&self, as_of: DateTime<Utc>) -> RecencyBucket {
        RecencyBucket::between(self.added_at, as_of)
    }

    /// Checks the record-level invariants required before admission.
    pub fn validate(&self) -> Result<(), RecordDefect> {
        if self.id.as_str().trim().is_empty() {
            return Err(RecordDefect::MissingId);
        }
        if self.national_id.len() != 9 || !self.national_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(RecordDefect::InvalidNationalId(self.national_id.clone()));
        }
        if self.phone.len() != 10
            || !self.phone.starts_with("05")
            || !self.phone.chars().all(|c| c.is_ascii_digit())
        {
            return Err(RecordDefect::InvalidPhone(self.phone.clone()));
        }
        if self.household_size == 0 {
            return Err(RecordDefect::EmptyHousehold);
        }
        if !self.governorate.is_known() {
            return Err(RecordDefect::UnknownArea(self.governorate.0.clone()));
        }
        match (self.total_packages, self.last_received_at) {
            (0, Some(_)) => {
                return Err(RecordDefect::InconsistentHistory(
                    "a receipt date is set but no packages were received",
                ))
            }
            (n, None) if n > 0 => {
                return Err(RecordDefect::InconsistentHistory(
                    "packages were received but no receipt date is set",
                ))
            }
            _ => {}
        }
        if self.has_children && self.household_size < 2 {
            return Err(RecordDefect::InconsistentHousehold);
        }

        Ok(())
    }
}

/// Reason an intake record is refused by the directory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordDefect {
    #[error("beneficiary id is empty")]
    MissingId,
    #[error("national id '{0}' must be exactly 9 digits")]
    InvalidNationalId(String),
    #[error("phone '{0}' must be 10 digits starting with 05")]
    InvalidPhone(String),
    #[error("household size must be at least 1")]
    EmptyHousehold,
    #[error("unknown governorate '{0}'")]
    UnknownArea(String),
    #[error("a household with children needs at least 2 members")]
    InconsistentHousehold,
    #[error("inconsistent benefit history: {0}")]
    InconsistentHistory(&'static str),
    #[error("beneficiary '{0}' is already registered")]
    DuplicateId(String),
}

/// Donor institution offering package templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub popular: bool,
    pub available_packages: u32,
    pub template_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    Food,
    Medical,
    Clothing,
    Blankets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    Draft,
    Active,
    Inactive,
}

impl TemplateStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentLine {
    pub name: String,
    pub quantity: u32,
    pub unit: String,
    pub unit_weight_kg: f64,
}

impl ContentLine {
    pub fn weight_kg(&self) -> f64 {
        f64::from(self.quantity) * self.unit_weight_kg
    }
}

/// Package composition offered by one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageTemplate {
    pub id: TemplateId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub kind: PackageKind,
    pub contents: Vec<ContentLine>,
    pub estimated_cost: f64,
    pub status: TemplateStatus,
    /// Snapshot of the catalog's usage counter at read time.
    #[serde(default)]
    pub usage_count: u64,
}

impl PackageTemplate {
    /// Always derived from the content lines.
    pub fn total_weight_kg(&self) -> f64 {
        self.contents.iter().map(ContentLine::weight_kg).sum()
    }
}
