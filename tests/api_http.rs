// tests/api_http.rs
//
// HTTP-level tests for the operator Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

mod support;

use axum::{
    body::{self, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value as Json};
use std::sync::Arc;
use tower::ServiceExt as _; // for `oneshot`

use morning_briefing::api::{self, AppState};
use morning_briefing::commands::BriefingService;
use morning_briefing::config::BriefingConfig;
use morning_briefing::ingest::providers::GoogleNewsProvider;
use support::{StubRelay, FEED_XML};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_state(relay: StubRelay) -> AppState {
    let mut config = BriefingConfig::defaults();
    config.mail.send_delay_ms = 0;
    AppState::new(BriefingService::new(
        config,
        Arc::new(GoogleNewsProvider::from_fixture(FEED_XML)),
        Arc::new(relay),
    ))
}

fn post_json(uri: &str, body: Json) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build POST")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET")
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

async fn collected(app: &Router) {
    let resp = app
        .clone()
        .oneshot(post_json(
            "/briefing/collect",
            json!({
                "keywords": "OTT 광고, KAI 지수",
                "start_date": "2024-01-01",
                "end_date": "2024-01-31"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_returns_ok() {
    let app = api::router(test_state(StubRelay::ok()));
    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await.trim(), "OK");
}

#[tokio::test]
async fn collect_reports_counts() {
    let app = api::router(test_state(StubRelay::ok()));

    let resp = app
        .clone()
        .oneshot(post_json(
            "/briefing/collect",
            json!({
                "keywords": "OTT 광고, KAI 지수,",
                "start_date": "2024-01-01",
                "end_date": "2024-01-31"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: Json = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(v["keywords"], 2);
    assert_eq!(v["articles"], 10);
    assert_eq!(v["failed_keywords"], json!([]));

    let resp = app.oneshot(get("/briefing")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: Json = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(v["sections"][0]["keyword"], "OTT 광고");
    assert_eq!(v["sections"][1]["articles"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn inverted_range_is_a_bad_request() {
    let app = api::router(test_state(StubRelay::ok()));
    let resp = app
        .oneshot(post_json(
            "/briefing/collect",
            json!({ "keywords": "x", "start_date": "2024-02-01", "end_date": "2024-01-01" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn digest_views_need_a_briefing() {
    let app = api::router(test_state(StubRelay::ok()));
    for uri in ["/briefing", "/digest.html", "/digest.md", "/export/csv"] {
        let resp = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT, "{uri}");
    }
}

#[tokio::test]
async fn digest_html_and_markdown_render_sections() {
    let app = api::router(test_state(StubRelay::ok()));
    collected(&app).await;

    let resp = app.clone().oneshot(get("/digest.html")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_string(resp).await;
    assert!(html.contains("<h3>[OTT 광고]</h3>"));
    assert!(html.contains("href=\"https://news.example.com/articles/kai-index\""));

    let resp = app.oneshot(get("/digest.md")).await.unwrap();
    let ct = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(ct.starts_with("text/markdown"));
    let md = body_string(resp).await;
    assert!(md.contains("## KAI 지수"));
    assert!(md.contains("(https://news.example.com/articles/media-rep)"));
}

#[tokio::test]
async fn exports_are_attachments() {
    let app = api::router(test_state(StubRelay::ok()));
    collected(&app).await;

    let resp = app.clone().oneshot(get("/export/csv")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let disposition = resp.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"briefing_"));
    assert!(disposition.ends_with(".csv\""));
    let csv = body_string(resp).await;
    assert!(csv.starts_with("\u{feff}keyword,title,link,published\r\n"));

    let resp = app.oneshot(get("/export/markdown")).await.unwrap();
    let disposition = resp.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.ends_with(".md\""));
}

#[tokio::test]
async fn reset_clears_the_briefing() {
    let app = api::router(test_state(StubRelay::ok()));
    collected(&app).await;

    let resp = app
        .clone()
        .oneshot(post_json("/briefing/reset", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app.oneshot(get("/briefing")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn dispatch_with_rejected_login_is_unauthorized() {
    let app = api::router(test_state(StubRelay::rejecting_login("535 bad credentials")));
    collected(&app).await;

    let resp = app
        .clone()
        .oneshot(post_json(
            "/dispatch",
            json!({
                "sender_address": "desk@example.com",
                "sender_secret": "wrong",
                "rows": [{ "name": "A", "email": "a@x.com" }]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let v: Json = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(v["summary"], "0 of 0 recipients succeeded");

    let resp = app.oneshot(get("/briefing")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK, "snapshot survives the failed dispatch");
}

#[tokio::test]
async fn dispatch_returns_per_recipient_results() {
    let app = api::router(test_state(StubRelay::ok()));
    collected(&app).await;

    let resp = app
        .clone()
        .oneshot(post_json(
            "/dispatch",
            json!({
                "sender_address": "desk@example.com",
                "sender_secret": "app-password",
                "rows": [
                    { "name": "A", "email": "a@x.com" },
                    { "name": "B", "email": "" },
                    { "email": "c@x.com" }
                ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: Json = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(v["summary"], "2 of 2 recipients succeeded");
    assert_eq!(v["report"]["results"][1]["recipient"]["display_name"], "구독자");
    assert_eq!(v["report"]["results"][0]["outcome"]["status"], "success");
    assert_eq!(v["roster_status"]["state"], "loaded");

    let resp = app.oneshot(get("/progress")).await.unwrap();
    let v: Json = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(v["dispatch"]["done"], 2);
    assert_eq!(v["collect"]["total"], 2);
}

#[tokio::test]
async fn dispatch_without_credentials_is_a_bad_request() {
    let app = api::router(test_state(StubRelay::ok()));
    collected(&app).await;

    let resp = app
        .oneshot(post_json("/dispatch", json!({ "rows": [] })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn roster_preview_without_a_sheet_shows_the_fallback() {
    let app = api::router(test_state(StubRelay::ok()));
    let resp = app
        .oneshot(post_json("/roster/preview", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: Json = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(v["status"]["state"], "degraded");
    assert_eq!(v["recipients"][0]["email"], "test@example.com");
}
