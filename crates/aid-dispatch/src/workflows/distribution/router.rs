use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::catalog::TemplateCatalog;
use super::directory::BeneficiaryDirectory;
use super::domain::{BeneficiaryId, JobId, OrganizationId, PackageTemplate, TemplateId};
use super::filter::FilterSpec;
use super::notify::NotificationSink;
use super::service::DistributionService;
use super::tracking::DeliveryStatus;

type SharedService<D, C, N> = Arc<DistributionService<D, C, N>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub organization_id: OrganizationId,
    pub template_id: TemplateId,
    #[serde(default)]
    pub filter: FilterSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateView {
    #[serde(flatten)]
    pub template: PackageTemplate,
    pub total_weight_kg: f64,
}

/// Router builder exposing planning, dispatch and tracking endpoints.
pub fn distribution_router<D, C, N>(service: SharedService<D, C, N>) -> Router
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route("/api/v1/organizations", get(organizations_handler::<D, C, N>))
        .route(
            "/api/v1/organizations/:organization_id/templates",
            get(templates_handler::<D, C, N>),
        )
        .route(
            "/api/v1/distributions/preview",
            post(preview_handler::<D, C, N>),
        )
        .route("/api/v1/distributions/plan", post(plan_handler::<D, C, N>))
        .route(
            "/api/v1/distributions",
            post(dispatch_handler::<D, C, N>).get(jobs_handler::<D, C, N>),
        )
        .route(
            "/api/v1/distributions/:job_id",
            get(job_handler::<D, C, N>),
        )
        .route(
            "/api/v1/distributions/:job_id/cancel",
            post(cancel_handler::<D, C, N>),
        )
        .route(
            "/api/v1/distributions/:job_id/tasks/:beneficiary_id/status",
            post(status_handler::<D, C, N>),
        )
        .route(
            "/api/v1/distributions/:job_id/tasks/:beneficiary_id/reschedule",
            post(reschedule_handler::<D, C, N>),
        )
        .route(
            "/api/v1/beneficiaries/import",
            post(import_handler::<D, C, N>),
        )
        .with_state(service)
}

pub(crate) async fn organizations_handler<D, C, N>(
    State(service): State<SharedService<D, C, N>>,
) -> Response
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    (StatusCode::OK, Json(service.organizations())).into_response()
}

pub(crate) async fn templates_handler<D, C, N>(
    State(service): State<SharedService<D, C, N>>,
    Path(organization_id): Path<String>,
) -> Response
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    match service.templates(&OrganizationId(organization_id)) {
        Ok(templates) => {
            let views: Vec<TemplateView> = templates
                .into_iter()
                .map(|template| TemplateView {
                    total_weight_kg: template.total_weight_kg(),
                    template,
                })
                .collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn preview_handler<D, C, N>(
    State(service): State<SharedService<D, C, N>>,
    Json(request): Json<SendRequest>,
) -> Response
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    match service.preview(&request.organization_id, &request.template_id, request.filter) {
        Ok(preview) => (StatusCode::OK, Json(preview)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn plan_handler<D, C, N>(
    State(service): State<SharedService<D, C, N>>,
    Json(request): Json<SendRequest>,
) -> Response
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    match service.plan(&request.organization_id, &request.template_id, request.filter) {
        Ok(plan) => (StatusCode::OK, Json(plan)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn dispatch_handler<D, C, N>(
    State(service): State<SharedService<D, C, N>>,
    Json(request): Json<SendRequest>,
) -> Response
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    match service.dispatch(&request.organization_id, &request.template_id, request.filter) {
        Ok(job) => (StatusCode::CREATED, Json(job.view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn jobs_handler<D, C, N>(
    State(service): State<SharedService<D, C, N>>,
) -> Response
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    let summaries: Vec<_> = service
        .jobs()
        .iter()
        .map(|job| {
            json!({
                "id": job.id,
                "organization_id": job.organization_id,
                "template_id": job.template_id,
                "created_at": job.created_at,
                "status": job.status(),
                "progress": job.progress(),
            })
        })
        .collect();
    (StatusCode::OK, Json(summaries)).into_response()
}

pub(crate) async fn job_handler<D, C, N>(
    State(service): State<SharedService<D, C, N>>,
    Path(job_id): Path<String>,
) -> Response
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    match service.job(&JobId(job_id)) {
        Ok(job) => (StatusCode::OK, Json(job.view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn cancel_handler<D, C, N>(
    State(service): State<SharedService<D, C, N>>,
    Path(job_id): Path<String>,
) -> Response
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    match service.cancel(&JobId(job_id)) {
        Ok(job) => (StatusCode::OK, Json(job.view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn status_handler<D, C, N>(
    State(service): State<SharedService<D, C, N>>,
    Path((job_id, beneficiary_id)): Path<(String, String)>,
    Json(request): Json<StatusRequest>,
) -> Response
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    match service.update_status(
        &JobId(job_id),
        &BeneficiaryId(beneficiary_id),
        request.status,
    ) {
        Ok(task) => (StatusCode::OK, Json(task)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn reschedule_handler<D, C, N>(
    State(service): State<SharedService<D, C, N>>,
    Path((job_id, beneficiary_id)): Path<(String, String)>,
) -> Response
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    match service.reschedule(&JobId(job_id), &BeneficiaryId(beneficiary_id)) {
        Ok(task) => (StatusCode::OK, Json(task)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn import_handler<D, C, N>(
    State(service): State<SharedService<D, C, N>>,
    body: String,
) -> Response
where
    D: BeneficiaryDirectory + 'static,
    C: TemplateCatalog + 'static,
    N: NotificationSink + 'static,
{
    match service.import_beneficiaries(Cursor::new(body.into_bytes())) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }
    }
}
