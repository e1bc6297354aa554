use std::sync::{Arc, Mutex};

use aid_dispatch::config::DistributionConfig;
use aid_dispatch::workflows::distribution::{
    AreaCode, BenefitStatus, Beneficiary, BeneficiaryDirectory, BeneficiaryId, ContentLine,
    DeliveryEvent, DeliveryStatus, DistributionError, DistributionService, EnrollmentStatus,
    FilterSpec, FixedClock, InMemoryBeneficiaryDirectory, InMemoryTemplateCatalog, JobStatus,
    NotificationError, NotificationSink, Organization, OrganizationId, PackageKind,
    PackageTemplate, RecencyBucket, TemplateCatalog, TemplateId, TemplateStatus,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

#[derive(Default)]
struct Outbox {
    events: Mutex<Vec<DeliveryEvent>>,
}

impl NotificationSink for Outbox {
    fn notify(&self, event: DeliveryEvent) -> Result<(), NotificationError> {
        self.events.lock().expect("outbox poisoned").push(event);
        Ok(())
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0)
        .single()
        .expect("valid instant")
}

fn household(n: u32, area: &str, received_days_ago: Option<i64>) -> Beneficiary {
    Beneficiary {
        id: BeneficiaryId(format!("GZ-{n:04}")),
        national_id: format!("8{n:08}"),
        full_name: format!("Household {n}"),
        phone: format!("059{n:07}"),
        governorate: AreaCode::new(area),
        district: String::new(),
        household_size: 5,
        has_children: true,
        has_elderly: n % 2 == 0,
        total_packages: u32::from(received_days_ago.is_some()),
        last_received_at: received_days_ago.map(|days| now() - Duration::days(days)),
        added_at: now() - Duration::days(200),
        status: EnrollmentStatus::Active,
    }
}

fn service() -> (
    DistributionService<InMemoryBeneficiaryDirectory, InMemoryTemplateCatalog, Outbox>,
    Arc<InMemoryTemplateCatalog>,
    Arc<Outbox>,
) {
    let mut records = Vec::new();
    for n in 1..=5 {
        records.push(household(n, "rafah", Some(40)));
    }
    for n in 6..=8 {
        records.push(household(n, "khan-younis", None));
    }
    for n in 9..=10 {
        records.push(household(n, "north-gaza", Some(2)));
    }

    let catalog = Arc::new(InMemoryTemplateCatalog::new(
        [Organization {
            id: OrganizationId::new("red-crescent"),
            name: "Palestine Red Crescent".to_string(),
            popular: true,
            available_packages: 1_000,
            template_count: 0,
        }],
        [PackageTemplate {
            id: TemplateId::new("food-basket"),
            organization_id: OrganizationId::new("red-crescent"),
            name: "Food basket".to_string(),
            kind: PackageKind::Food,
            contents: vec![
                ContentLine {
                    name: "Flour".to_string(),
                    quantity: 1,
                    unit: "bag".to_string(),
                    unit_weight_kg: 2.0,
                },
                ContentLine {
                    name: "Oil".to_string(),
                    quantity: 1,
                    unit: "bottle".to_string(),
                    unit_weight_kg: 1.0,
                },
            ],
            estimated_cost: 50.0,
            status: TemplateStatus::Active,
            usage_count: 0,
        }],
    ));
    let outbox = Arc::new(Outbox::default());
    let config = DistributionConfig {
        agents: vec!["agent-a".to_string(), "agent-b".to_string()],
        recency_threshold: RecencyBucket::Week,
        max_auto_retries: 1,
    };
    let service = DistributionService::new(
        Arc::new(InMemoryBeneficiaryDirectory::with_records(records).expect("valid records")),
        catalog.clone(),
        outbox.clone(),
        Arc::new(FixedClock::new(now())),
        &config,
    )
    .expect("service");

    (service, catalog, outbox)
}

#[test]
fn rafah_send_is_planned_dispatched_and_delivered() {
    let (service, catalog, outbox) = service();
    let org = OrganizationId::new("red-crescent");
    let template = TemplateId::new("food-basket");

    let plan = service
        .plan(&org, &template, FilterSpec::default().with_area("rafah"))
        .expect("plan");
    assert_eq!(plan.eligible_count(), 5);
    assert_eq!(plan.total_cost, 250.0);
    assert_eq!(plan.total_weight_kg, 15.0);

    let job = service.execute(&plan).expect("job");
    assert_eq!(job.tasks.len(), 5);
    assert_eq!(
        catalog
            .find_template(&org, &template)
            .expect("template")
            .usage_count,
        1
    );

    for task in &job.tasks {
        service
            .update_status(&job.id, &task.beneficiary_id, DeliveryStatus::InProgress)
            .expect("start");
        service
            .update_status(&job.id, &task.beneficiary_id, DeliveryStatus::Delivered)
            .expect("deliver");
    }

    let finished = service.job(&job.id).expect("job");
    assert_eq!(finished.status(), JobStatus::Completed);
    assert_eq!(finished.progress().delivery_rate(), 1.0);
    assert_eq!(outbox.events.lock().expect("outbox poisoned").len(), 10);

    let delivered = service
        .directory()
        .find_by_id(&BeneficiaryId::new("GZ-0001"))
        .expect("record");
    assert_eq!(delivered.total_packages, 2);
    assert_eq!(delivered.last_received_at, Some(now()));

    let err = service
        .plan(
            &org,
            &template,
            FilterSpec::default()
                .with_area("rafah")
                .with_benefit_status(BenefitStatus::Old),
        )
        .expect_err("everyone in rafah was just served");
    assert!(matches!(err, DistributionError::EmptyEligibleSet { .. }));
}

#[test]
fn never_served_households_are_targeted_first() {
    let (service, _, _) = service();

    let job = service
        .dispatch(
            &OrganizationId::new("red-crescent"),
            &TemplateId::new("food-basket"),
            FilterSpec::default().with_benefit_status(BenefitStatus::Never),
        )
        .expect("job");

    let targeted: Vec<&str> = job
        .tasks
        .iter()
        .map(|task| task.beneficiary_id.as_str())
        .collect();
    assert_eq!(targeted, vec!["GZ-0006", "GZ-0007", "GZ-0008"]);
}

#[test]
fn recent_and_old_households_do_not_overlap() {
    let (service, _, _) = service();
    let org = OrganizationId::new("red-crescent");
    let template = TemplateId::new("food-basket");

    let recent = service
        .preview(
            &org,
            &template,
            FilterSpec::default().with_benefit_status(BenefitStatus::Recent),
        )
        .expect("recent");
    let old = service
        .preview(
            &org,
            &template,
            FilterSpec::default().with_benefit_status(BenefitStatus::Old),
        )
        .expect("old");
    let never = service
        .preview(
            &org,
            &template,
            FilterSpec::default().with_benefit_status(BenefitStatus::Never),
        )
        .expect("never");
    let all = service
        .preview(&org, &template, FilterSpec::default())
        .expect("all");

    assert_eq!(recent.eligible_count, 2);
    assert_eq!(old.eligible_count, 5);
    assert_eq!(never.eligible_count, 3);
    assert_eq!(
        recent.eligible_count + old.eligible_count + never.eligible_count,
        all.eligible_count
    );
}
