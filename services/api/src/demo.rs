use crate::infra::{build_service, parse_date, ApiService};
use aid_dispatch::config::AppConfig;
use aid_dispatch::error::AppError;
use aid_dispatch::workflows::distribution::{
    AgentId, BenefitStatus, BeneficiaryDirectory, Clock, DeliveryStatus, DistributionError,
    FilterSpec, FixedClock, OrganizationId, SendJob, TemplateId,
};
use aid_dispatch::workflows::intake::BeneficiaryImporter;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Evaluation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Donor organization sending the packages.
    #[arg(long, default_value = "red-crescent")]
    pub(crate) organization: String,
    /// Package template to send.
    #[arg(long, default_value = "rc-food-basket")]
    pub(crate) template: String,
    /// Restrict the send to one governorate (e.g. rafah).
    #[arg(long)]
    pub(crate) area: Option<String>,
    /// Restrict the send by benefit history: never, recent or old.
    #[arg(long, value_parser = parse_benefit_status)]
    pub(crate) benefit_status: Option<BenefitStatus>,
    /// Print the final job snapshot as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// Beneficiary registration CSV export.
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// Print the import report as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

fn parse_benefit_status(raw: &str) -> Result<BenefitStatus, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "never" => Ok(BenefitStatus::Never),
        "recent" => Ok(BenefitStatus::Recent),
        "old" => Ok(BenefitStatus::Old),
        other => Err(format!("unknown benefit status '{other}' (never|recent|old)")),
    }
}

fn evaluation_instant(as_of: Option<NaiveDate>) -> DateTime<Utc> {
    as_of
        .and_then(|date| date.and_hms_opt(8, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now)
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        as_of,
        organization,
        template,
        area,
        benefit_status,
        json,
    } = args;

    let config = AppConfig::load()?;
    let clock = Arc::new(FixedClock::new(evaluation_instant(as_of)));
    let service = build_service(&config.distribution, clock.clone())?;
    let organization = OrganizationId(organization);
    let template = TemplateId(template);

    println!("Bulk distribution demo ({})", clock.now().format("%Y-%m-%d"));
    println!("Organizations:");
    for org in service.organizations() {
        let marker = if org.popular { " *" } else { "" };
        println!(
            "  - {}{}: {} templates, {} packages available",
            org.name, marker, org.template_count, org.available_packages
        );
    }

    println!("\nTemplates offered by {organization}:");
    for offered in service.templates(&organization)? {
        println!(
            "  - {} [{}] {:.2} kg, est. {:.2} per package, used {} times",
            offered.name,
            offered.status.label(),
            offered.total_weight_kg(),
            offered.estimated_cost,
            offered.usage_count
        );
    }

    let mut filter = FilterSpec::default();
    if let Some(area) = area {
        filter = filter.with_area(area);
    }
    if let Some(status) = benefit_status {
        filter = filter.with_benefit_status(status);
    }

    let plan = match service.plan(&organization, &template, filter) {
        Ok(plan) => plan,
        Err(err @ DistributionError::EmptyEligibleSet { .. }) => {
            println!("\nNothing to send: {err}");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    println!(
        "\nPlan ({}): {} beneficiaries | total cost {:.2} | total weight {:.1} kg",
        plan.filter.describe(),
        plan.eligible_count(),
        plan.total_cost,
        plan.total_weight_kg
    );

    let job = service.execute(&plan)?;
    println!("Job {} created with {} delivery tasks", job.id, job.tasks.len());
    print_agent_load(&job);

    simulate_field_reports(&service, &clock, &job)?;

    let job = service.job(&job.id)?;
    let progress = job.progress();
    println!(
        "\nAfter field reports: status {:?} | delivered {} | in progress {} | delayed {} | preparing {} | delivery rate {:.0}%",
        job.status(),
        progress.delivered,
        progress.in_progress,
        progress.delayed,
        progress.preparing,
        progress.delivery_rate() * 100.0
    );

    match service.cancel(&job.id) {
        Ok(_) => println!("Remaining deliveries cancelled"),
        Err(err) => println!("Cancellation: {err}"),
    }

    if json {
        let job = service.job(&job.id)?;
        match serde_json::to_string_pretty(&job.view()) {
            Ok(payload) => println!("\n{payload}"),
            Err(err) => println!("\nJob snapshot unavailable: {err}"),
        }
    }

    Ok(())
}

fn print_agent_load(job: &SendJob) {
    let mut load: BTreeMap<&AgentId, usize> = BTreeMap::new();
    for task in &job.tasks {
        *load.entry(&task.agent).or_default() += 1;
    }
    for (agent, tasks) in load {
        println!("  - {agent}: {tasks} deliveries");
    }
}

/// Plays back a morning of field reports: every fourth task is delivered, failed,
/// delayed, or left untouched.
fn simulate_field_reports(
    service: &ApiService,
    clock: &FixedClock,
    job: &SendJob,
) -> Result<(), AppError> {
    for (index, task) in job.tasks.iter().enumerate() {
        clock.advance(Duration::minutes(15));
        let script: &[DeliveryStatus] = match index % 4 {
            0 => &[DeliveryStatus::InProgress, DeliveryStatus::Delivered],
            1 => &[DeliveryStatus::InProgress, DeliveryStatus::Failed],
            2 => &[DeliveryStatus::InProgress, DeliveryStatus::Delayed],
            _ => &[],
        };
        for status in script {
            service.update_status(&job.id, &task.beneficiary_id, *status)?;
        }
    }
    Ok(())
}

pub(crate) fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let service = build_service(&config.distribution, clock.clone())?;
    let before = service.directory().find_all().len();

    let report =
        BeneficiaryImporter::from_path(&args.csv, &**service.directory(), clock.now())?;

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(payload) => println!("{payload}"),
            Err(err) => println!("Import report unavailable: {err}"),
        }
        return Ok(());
    }

    println!("Imported {}", args.csv.display());
    println!(
        "- {} rows | {} accepted | {} rejected",
        report.total_rows,
        report.accepted.len(),
        report.rejected.len()
    );
    for rejected in &report.rejected {
        println!("  row {}: {}", rejected.row, rejected.reason);
    }
    println!(
        "- directory now holds {} beneficiaries (was {})",
        service.directory().find_all().len(),
        before
    );

    Ok(())
}
