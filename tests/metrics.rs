// tests/metrics.rs
//
// One recorder per process, so this file holds a single test.
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use std::sync::Arc;
use tower::ServiceExt;

use morning_briefing::commands::{BriefingService, CollectBriefing};
use morning_briefing::config::BriefingConfig;
use morning_briefing::ingest::providers::GoogleNewsProvider;
use morning_briefing::metrics::Metrics;

mod support;

#[tokio::test]
async fn metrics_endpoint_contains_collection_series() {
    let config = BriefingConfig::defaults();
    let metrics = Metrics::init(&config).expect("recorder installs once");
    let service = BriefingService::new(
        config,
        Arc::new(GoogleNewsProvider::from_fixture(support::FEED_XML)),
        Arc::new(support::StubRelay::ok()),
    );
    let service = Arc::new(service);
    let failing = BriefingService::new(
        BriefingConfig::defaults(),
        Arc::new(support::FlakyFeed::new(&["down"])),
        Arc::new(support::StubRelay::ok()),
    );

    let january = |kw: &str| CollectBriefing {
        keywords: vec![kw.to_string()],
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    };
    service.collect(january("OTT 광고")).await.unwrap();
    failing.collect(january("down")).await.unwrap();

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for series in [
        "feed_fetch_total",
        "feed_fetch_errors_total",
        "feed_entries_total",
        "briefing_collect_runs_total",
        "briefing_articles_total",
        "briefing_configured_keywords",
    ] {
        assert!(text.contains(series), "missing {series} in:\n{text}");
    }
}
