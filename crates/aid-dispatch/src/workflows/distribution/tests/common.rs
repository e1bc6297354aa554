use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::DistributionConfig;
use crate::workflows::distribution::{
    AreaCode, Beneficiary, BeneficiaryId, ContentLine, DeliveryEvent, DistributionService,
    EnrollmentStatus, FixedClock, InMemoryBeneficiaryDirectory, InMemoryTemplateCatalog,
    NotificationError, NotificationSink, Organization, OrganizationId, PackageKind,
    PackageTemplate, RecencyBucket, TemplateId, TemplateStatus,
};

pub(super) type Service<N> =
    DistributionService<InMemoryBeneficiaryDirectory, InMemoryTemplateCatalog, N>;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0)
        .single()
        .expect("valid instant")
}

pub(super) fn red_crescent() -> OrganizationId {
    OrganizationId::new("red-crescent")
}

pub(super) fn food_basket() -> TemplateId {
    TemplateId::new("tpl-food-basket")
}

/// Never-served household of four in Gaza city, registered two months ago.
pub(super) fn beneficiary(n: u32) -> Beneficiary {
    Beneficiary {
        id: BeneficiaryId(format!("B-{n:03}")),
        national_id: format!("4{n:08}"),
        full_name: format!("Household {n}"),
        phone: "0591234567".to_string(),
        governorate: AreaCode::new("gaza"),
        district: "Rimal".to_string(),
        household_size: 4,
        has_children: true,
        has_elderly: false,
        total_packages: 0,
        last_received_at: None,
        added_at: now() - Duration::days(60),
        status: EnrollmentStatus::Active,
    }
}

pub(super) fn in_area(mut record: Beneficiary, area: &str) -> Beneficiary {
    record.governorate = AreaCode::new(area);
    record
}

pub(super) fn served(mut record: Beneficiary, days_ago: i64, packages: u32) -> Beneficiary {
    record.total_packages = packages;
    record.last_received_at = Some(now() - Duration::days(days_ago));
    record
}

/// Ten households: B-001..B-005 in Rafah, the rest in Gaza; only B-001 and B-006 never served.
pub(super) fn population() -> Vec<Beneficiary> {
    (1..=10)
        .map(|n| {
            let record = beneficiary(n);
            let record = if n <= 5 { in_area(record, "rafah") } else { record };
            match n {
                1 | 6 => record,
                2 | 7 => served(record, 3, 1),
                3 | 8 => served(record, 20, 2),
                _ => served(record, 120, 3),
            }
        })
        .collect()
}

pub(super) fn directory(records: Vec<Beneficiary>) -> InMemoryBeneficiaryDirectory {
    InMemoryBeneficiaryDirectory::with_records(records).expect("valid fixtures")
}

fn line(name: &str, quantity: u32, unit: &str, unit_weight_kg: f64) -> ContentLine {
    ContentLine {
        name: name.to_string(),
        quantity,
        unit: unit.to_string(),
        unit_weight_kg,
    }
}

/// Red Crescent offers a 3 kg food basket costing 50 and a draft winter kit;
/// UNRWA offers a medical kit.
pub(super) fn catalog() -> InMemoryTemplateCatalog {
    let organizations = vec![
        Organization {
            id: red_crescent(),
            name: "Palestine Red Crescent".to_string(),
            popular: true,
            available_packages: 500,
            template_count: 0,
        },
        Organization {
            id: OrganizationId::new("unrwa"),
            name: "UNRWA".to_string(),
            popular: false,
            available_packages: 120,
            template_count: 0,
        },
    ];
    let templates = vec![
        PackageTemplate {
            id: food_basket(),
            organization_id: red_crescent(),
            name: "Family food basket".to_string(),
            kind: PackageKind::Food,
            contents: vec![line("Rice", 2, "kg", 1.0), line("Lentils", 2, "pack", 0.5)],
            estimated_cost: 50.0,
            status: TemplateStatus::Active,
            usage_count: 0,
        },
        PackageTemplate {
            id: TemplateId::new("tpl-winter-kit"),
            organization_id: red_crescent(),
            name: "Winter kit".to_string(),
            kind: PackageKind::Blankets,
            contents: vec![line("Blanket", 2, "piece", 1.5)],
            estimated_cost: 35.0,
            status: TemplateStatus::Draft,
            usage_count: 0,
        },
        PackageTemplate {
            id: TemplateId::new("tpl-medical-kit"),
            organization_id: OrganizationId::new("unrwa"),
            name: "First aid kit".to_string(),
            kind: PackageKind::Medical,
            contents: vec![line("Bandage", 10, "roll", 0.05)],
            estimated_cost: 22.5,
            status: TemplateStatus::Active,
            usage_count: 0,
        },
    ];
    InMemoryTemplateCatalog::new(organizations, templates)
}

pub(super) fn config() -> DistributionConfig {
    DistributionConfig {
        agents: vec![
            "agent-north".to_string(),
            "agent-middle".to_string(),
            "agent-south".to_string(),
        ],
        recency_threshold: RecencyBucket::Week,
        max_auto_retries: 1,
    }
}

pub(super) struct Harness<N> {
    pub(super) service: Arc<Service<N>>,
    pub(super) catalog: Arc<InMemoryTemplateCatalog>,
    pub(super) notifier: Arc<N>,
    pub(super) clock: Arc<FixedClock>,
}

pub(super) fn harness_with<N>(records: Vec<Beneficiary>, notifier: N) -> Harness<N>
where
    N: NotificationSink + 'static,
{
    let catalog = Arc::new(catalog());
    let notifier = Arc::new(notifier);
    let clock = Arc::new(FixedClock::new(now()));
    let service = DistributionService::new(
        Arc::new(directory(records)),
        catalog.clone(),
        notifier.clone(),
        clock.clone(),
        &config(),
    )
    .expect("valid config");

    Harness {
        service: Arc::new(service),
        catalog,
        notifier,
        clock,
    }
}

pub(super) fn harness() -> Harness<RecordingSink> {
    harness_with(population(), RecordingSink::default())
}

#[derive(Default)]
pub(super) struct RecordingSink {
    events: Mutex<Vec<DeliveryEvent>>,
}

impl RecordingSink {
    pub(super) fn events(&self) -> Vec<DeliveryEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: DeliveryEvent) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) struct FailingSink;

impl NotificationSink for FailingSink {
    fn notify(&self, _event: DeliveryEvent) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("sms gateway offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
