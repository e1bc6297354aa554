//! Bulk distribution of aid packages: beneficiary selection, send planning,
//! job execution, and delivery tracking.

pub mod catalog;
pub mod clock;
pub mod directory;
pub mod domain;
pub mod error;
pub mod executor;
pub mod feed;
pub mod filter;
pub mod notify;
pub mod planner;
pub mod router;
pub mod service;
pub mod tracking;

#[cfg(test)]
mod tests;

pub use catalog::{InMemoryTemplateCatalog, TemplateCatalog};
pub use clock::{Clock, FixedClock, SystemClock};
pub use directory::{BeneficiaryDirectory, InMemoryBeneficiaryDirectory};
pub use domain::{
    AgentId, AreaCode, Beneficiary, BeneficiaryId, ContentLine, EnrollmentStatus, FamilySize,
    JobId, LastReceived, Organization, OrganizationId, PackageKind, PackageTemplate,
    RecencyBucket, RecordDefect, TemplateId, TemplateStatus,
};
pub use error::{DistributionError, EntityKind, TaskCreationFailure};
pub use executor::{AgentPool, SendExecutor, SendJob, SendJobView};
pub use feed::{run_status_feed, spawn_status_feed, FeedSummary, StatusUpdate, StatusUpdateTarget};
pub use filter::{BenefitStatus, BeneficiaryFilter, FilterEvaluator, FilterSpec, TriState};
pub use notify::{DeliveryEvent, NotificationError, NotificationSink, TracingNotificationSink};
pub use planner::{PlanPreview, SendPlan, SendPlanner};
pub use router::{distribution_router, SendRequest, StatusRequest, TemplateView};
pub use service::DistributionService;
pub use tracking::{
    DeliveryStatus, DeliveryTask, JobProgress, JobStatus, RescheduleKind, StatusChange,
};
