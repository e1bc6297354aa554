use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::distribution::router::templates_handler;
use crate::workflows::distribution::{
    distribution_router, BeneficiaryDirectory, BeneficiaryId, FilterSpec,
    InMemoryBeneficiaryDirectory, InMemoryTemplateCatalog,
};

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

#[tokio::test]
async fn organizations_are_listed_with_template_counts() {
    let harness = harness();
    let router = distribution_router(harness.service.clone());

    let response = router
        .oneshot(get("/api/v1/organizations"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let red_crescent = body
        .as_array()
        .and_then(|orgs| orgs.iter().find(|org| org["id"] == "red-crescent"))
        .expect("red crescent listed");
    assert_eq!(red_crescent["template_count"], 2);
}

#[tokio::test]
async fn templates_include_their_derived_weight() {
    let harness = harness();

    let response = templates_handler::<InMemoryBeneficiaryDirectory, InMemoryTemplateCatalog, _>(
        State(harness.service.clone()),
        Path("red-crescent".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let basket = body
        .as_array()
        .and_then(|templates| templates.iter().find(|t| t["id"] == "tpl-food-basket"))
        .expect("food basket listed");
    assert_eq!(basket["total_weight_kg"], 3.0);
    assert_eq!(basket["status"], "active");
}

#[tokio::test]
async fn templates_of_unknown_organization_are_not_found() {
    let harness = harness();
    let router = distribution_router(harness.service.clone());

    let response = router
        .oneshot(get("/api/v1/organizations/nobody/templates"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn preview_reports_live_totals() {
    let harness = harness();
    let router = distribution_router(harness.service.clone());

    let response = router
        .oneshot(post_json(
            "/api/v1/distributions/preview",
            json!({
                "organization_id": "red-crescent",
                "template_id": "tpl-food-basket",
                "filter": { "area": "rafah" }
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["eligible_count"], 5);
    assert_eq!(body["total_cost"], 250.0);
    assert_eq!(body["total_weight_kg"], 15.0);
}

#[tokio::test]
async fn all_areas_option_previews_everyone() {
    let harness = harness();
    let router = distribution_router(harness.service.clone());

    let response = router
        .oneshot(post_json(
            "/api/v1/distributions/preview",
            json!({
                "organization_id": "red-crescent",
                "template_id": "tpl-food-basket",
                "filter": { "area": "" }
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["eligible_count"], 10);
}

#[tokio::test]
async fn dispatch_without_matches_is_unprocessable() {
    let harness = harness();
    let router = distribution_router(harness.service.clone());

    let response = router
        .oneshot(post_json(
            "/api/v1/distributions",
            json!({
                "organization_id": "red-crescent",
                "template_id": "tpl-food-basket",
                "filter": { "area": "khan-younis" }
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .is_some_and(|message| message.contains("khan-younis")));
}

#[tokio::test]
async fn dispatch_then_track_a_delivery() {
    let harness = harness();
    let router = distribution_router(harness.service.clone());

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/distributions",
            json!({
                "organization_id": "red-crescent",
                "template_id": "tpl-food-basket",
                "filter": { "area": "rafah", "benefit_status": "old" }
            }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let job = read_json_body(response).await;
    assert_eq!(job["status"], "preparing");
    assert_eq!(job["progress"]["total"], 3);
    let job_id = job["id"].as_str().expect("job id").to_string();

    let status_uri = format!("/api/v1/distributions/{job_id}/tasks/B-003/status");
    let response = router
        .clone()
        .oneshot(post_json(&status_uri, json!({ "status": "in_progress" })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(post_json(&status_uri, json!({ "status": "delivered" })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(post_json(&status_uri, json!({ "status": "preparing" })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router
        .clone()
        .oneshot(get(&format!("/api/v1/distributions/{job_id}")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let job = read_json_body(response).await;
    assert_eq!(job["status"], "in_progress");
    assert_eq!(job["progress"]["delivered"], 1);

    let response = router
        .oneshot(post_json(
            &format!("/api/v1/distributions/{job_id}/cancel"),
            json!({}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json_body(response).await;
    assert_eq!(body["cancelled"], 2);
    assert_eq!(body["in_flight"], 1);

    let record = harness
        .service
        .directory()
        .find_by_id(&BeneficiaryId::new("B-003"))
        .expect("record");
    assert_eq!(record.total_packages, 3);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let harness = harness();
    let router = distribution_router(harness.service.clone());

    let response = router
        .oneshot(get("/api/v1/distributions/DIST-missing"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn jobs_are_listed_newest_first() {
    let harness = harness();
    let rafah = FilterSpec::default().with_area("rafah");
    let first = harness
        .service
        .dispatch(&red_crescent(), &food_basket(), rafah.clone())
        .expect("first job");
    harness.clock.advance(chrono::Duration::minutes(10));
    let second = harness
        .service
        .dispatch(&red_crescent(), &food_basket(), rafah)
        .expect("second job");
    let router = distribution_router(harness.service.clone());

    let response = router
        .oneshot(get("/api/v1/distributions"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let ids: Vec<&str> = body
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|job| job["id"].as_str())
        .collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
}

#[tokio::test]
async fn csv_import_reports_accepted_and_rejected_rows() {
    let harness = harness();
    let router = distribution_router(harness.service.clone());
    let csv = "id,national_id,full_name,phone,governorate,district,household_size,has_children,has_elderly,total_packages,last_received_on,added_on\n\
B-101,402000101,Salma Odeh,0599000101,khan-younis,Bani Suheila,6,yes,yes,0,,2025-03-01\n\
B-001,402000102,Duplicate,0599000102,rafah,,2,no,no,0,,\n";

    let response = router
        .oneshot(
            Request::post("/api/v1/beneficiaries/import")
                .header(header::CONTENT_TYPE, "text/csv")
                .body(Body::from(csv))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let report = read_json_body(response).await;
    assert_eq!(report["total_rows"], 2);
    assert_eq!(report["accepted"], json!(["B-101"]));
    assert_eq!(report["rejected"][0]["row"], 2);
    assert!(harness
        .service
        .directory()
        .find_by_id(&BeneficiaryId::new("B-101"))
        .is_ok());
}
