use aid_dispatch::config::DistributionConfig;
use aid_dispatch::error::AppError;
use aid_dispatch::workflows::distribution::{
    AreaCode, Beneficiary, BeneficiaryDirectory, BeneficiaryId, Clock, ContentLine,
    DistributionService, EnrollmentStatus, InMemoryBeneficiaryDirectory,
    InMemoryTemplateCatalog, Organization, OrganizationId, PackageKind, PackageTemplate,
    StatusUpdate, TemplateId, TemplateStatus, TracingNotificationSink,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

pub(crate) type ApiService =
    DistributionService<InMemoryBeneficiaryDirectory, InMemoryTemplateCatalog, TracingNotificationSink>;

/// Capacity of the queue between the delivery webhook and the status feed.
pub(crate) const STATUS_FEED_CAPACITY: usize = 256;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) status_feed: mpsc::Sender<StatusUpdate>,
}

pub(crate) fn build_service(
    config: &DistributionConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<ApiService>, AppError> {
    let directory = Arc::new(seed_directory(clock.now()));
    let catalog = Arc::new(seed_catalog());
    let service = DistributionService::new(
        directory,
        catalog,
        Arc::new(TracingNotificationSink),
        clock,
        config,
    )?;
    Ok(Arc::new(service))
}

fn line(name: &str, quantity: u32, unit: &str, unit_weight_kg: f64) -> ContentLine {
    ContentLine {
        name: name.to_string(),
        quantity,
        unit: unit.to_string(),
        unit_weight_kg,
    }
}

fn organization(id: &str, name: &str, popular: bool, available_packages: u32) -> Organization {
    Organization {
        id: OrganizationId::new(id),
        name: name.to_string(),
        popular,
        available_packages,
        template_count: 0,
    }
}

fn template(
    id: &str,
    organization_id: &str,
    name: &str,
    kind: PackageKind,
    contents: Vec<ContentLine>,
    estimated_cost: f64,
    status: TemplateStatus,
) -> PackageTemplate {
    PackageTemplate {
        id: TemplateId::new(id),
        organization_id: OrganizationId::new(organization_id),
        name: name.to_string(),
        kind,
        contents,
        estimated_cost,
        status,
        usage_count: 0,
    }
}

pub(crate) fn seed_catalog() -> InMemoryTemplateCatalog {
    InMemoryTemplateCatalog::new(
        [
            organization("red-crescent", "Palestine Red Crescent Society", true, 1_200),
            organization("unrwa", "UNRWA", true, 3_500),
            organization("wfp", "World Food Programme", false, 800),
        ],
        [
            template(
                "rc-food-basket",
                "red-crescent",
                "Family food basket",
                PackageKind::Food,
                vec![
                    line("Rice", 1, "bag", 1.0),
                    line("Lentils", 2, "pack", 0.5),
                    line("Sunflower oil", 1, "bottle", 1.0),
                ],
                50.0,
                TemplateStatus::Active,
            ),
            template(
                "rc-hygiene-kit",
                "red-crescent",
                "Hygiene kit",
                PackageKind::Medical,
                vec![line("Soap", 4, "bar", 0.1), line("Sanitary pads", 2, "pack", 0.3)],
                18.0,
                TemplateStatus::Active,
            ),
            template(
                "unrwa-winter-kit",
                "unrwa",
                "Winter kit",
                PackageKind::Blankets,
                vec![line("Wool blanket", 3, "piece", 1.8), line("Tarpaulin", 1, "sheet", 2.5)],
                65.0,
                TemplateStatus::Active,
            ),
            template(
                "unrwa-clothing",
                "unrwa",
                "Children's clothing set",
                PackageKind::Clothing,
                vec![line("Jacket", 2, "piece", 0.6), line("Socks", 6, "pair", 0.05)],
                40.0,
                TemplateStatus::Draft,
            ),
            template(
                "wfp-flour",
                "wfp",
                "Wheat flour ration",
                PackageKind::Food,
                vec![line("Wheat flour", 1, "sack", 25.0)],
                22.0,
                TemplateStatus::Inactive,
            ),
        ],
    )
}

/// Deterministic demo registry spread over every governorate.
pub(crate) fn seed_directory(as_of: DateTime<Utc>) -> InMemoryBeneficiaryDirectory {
    let directory = InMemoryBeneficiaryDirectory::default();
    let history = [None, Some(3), Some(18), Some(45), Some(140)];

    for n in 0..40u32 {
        let area = AreaCode::KNOWN[(n as usize) % AreaCode::KNOWN.len()];
        let received_days_ago = history[(n as usize / 5) % history.len()];
        let household_size = (n % 9 + 1) as u8;
        let record = Beneficiary {
            id: BeneficiaryId(format!("BEN-{:04}", n + 1)),
            national_id: format!("{:09}", 400_100_000 + n),
            full_name: format!("Registered household {}", n + 1),
            phone: format!("059{:07}", 1_000_000 + n),
            governorate: AreaCode::new(area),
            district: String::new(),
            household_size,
            has_children: household_size >= 3 && n % 3 != 0,
            has_elderly: n % 4 == 0,
            total_packages: received_days_ago.map_or(0, |_| n % 4 + 1),
            last_received_at: received_days_ago.map(|days: i64| as_of - Duration::days(days)),
            added_at: as_of - Duration::days(i64::from(n % 6) * 20),
            status: if n % 13 == 12 {
                EnrollmentStatus::Suspended
            } else {
                EnrollmentStatus::Active
            },
        };

        let id = record.id.clone();
        if let Err(defect) = directory.admit(record) {
            warn!(beneficiary = %id, %defect, "seed record skipped");
        }
    }

    directory
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
