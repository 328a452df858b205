mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt as _;
use tower::ServiceExt as _;

use common::{StubFetcher, collect_events, harness, row};
use daily_crawl::fetch::FetchResult;
use daily_crawl::handlers::HandlerRegistry;

async fn send(app: axum::Router, req: Request<Body>) -> (StatusCode, String) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn site() -> common::Harness {
    harness(
        vec![row(1, "https://ex.test/a", "X^A")],
        HandlerRegistry::new(),
        StubFetcher::new().with_page("https://ex.test/a", FetchResult::page("", "a", "A")),
    )
}

#[tokio::test]
async fn healthz_reports_ok() {
    let h = site();
    let (status, body) = send(daily_crawl::http::router(h.manager.clone()), get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok\n");
}

#[tokio::test]
async fn submit_then_poll_job_state() {
    let h = site();
    let app = daily_crawl::http::router(h.manager.clone());

    let (status, body) = send(app.clone(), post_json("/daily-crawl/jobs", r#"{"mode":"sequential"}"#)).await;
    assert_eq!(status, StatusCode::ACCEPTED, "{body}");
    let created: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(created["total_urls"], 1);
    assert_eq!(created["message"], "daily crawl started");
    let task_id = created["task_id"].as_str().unwrap().to_string();

    collect_events(&h.manager, &task_id).await;

    let (status, body) = send(app.clone(), get(&format!("/daily-crawl/jobs/{task_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let state: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(state["status"], "completed");
    assert_eq!(state["params"]["mode"], "sequential");
    assert_eq!(state["result"]["success"], 1);

    let (status, body) = send(app.clone(), get("/daily-crawl/jobs?limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["job_id"], task_id.as_str());

    let (status, _) = send(app, post_json(&format!("/daily-crawl/jobs/{task_id}/cancel"), "")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_parameters_are_a_bad_request() {
    let h = site();
    let app = daily_crawl::http::router(h.manager.clone());
    let (status, body) = send(app, post_json("/daily-crawl/jobs", r#"{"limit":0}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("limit"), "{body}");
    assert!(h.manager.list(10).is_empty());
}

#[tokio::test]
async fn malformed_and_unknown_job_ids() {
    let h = site();
    let app = daily_crawl::http::router(h.manager.clone());

    let (status, _) = send(app.clone(), get("/daily-crawl/jobs/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = uuid::Uuid::new_v4();
    let (status, body) = send(app.clone(), get(&format!("/daily-crawl/jobs/{unknown}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("job not found"));

    let (status, _) = send(app, post_json(&format!("/daily-crawl/jobs/{unknown}/cancel"), "")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_count_catalog_rows() {
    let h = site();
    let (status, body) = send(daily_crawl::http::router(h.manager.clone()), get("/daily-crawl/stats")).await;
    assert_eq!(status, StatusCode::OK);
    let stats: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["active"], 1);
}

#[tokio::test]
async fn stream_delivers_events_until_complete() {
    let h = site();
    let app = daily_crawl::http::router(h.manager.clone());
    let (_, body) = send(app.clone(), post_json("/daily-crawl/jobs", "{}")).await;
    let created: serde_json::Value = serde_json::from_str(&body).unwrap();
    let task_id = created["task_id"].as_str().unwrap();

    let resp = app
        .oneshot(get(&format!("/daily-crawl/jobs/{task_id}/stream")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(body.to_vec()).unwrap();

    assert!(body.starts_with("data: {\"type\":\"connected\""), "{body}");
    assert!(body.contains("\"type\":\"final\""), "{body}");
    assert!(body.contains("\"type\":\"complete\""), "{body}");
}

#[tokio::test]
async fn stream_of_unknown_job_is_a_single_error_frame() {
    let h = site();
    let unknown = uuid::Uuid::new_v4();
    let (status, body) = send(
        daily_crawl::http::router(h.manager.clone()),
        get(&format!("/daily-crawl/jobs/{unknown}/stream")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.matches("data: ").count(), 1, "{body}");
    assert!(body.contains("Task not found or already finished"), "{body}");
}
