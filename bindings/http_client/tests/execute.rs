use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use gale_http_client::prelude::{Check, HttpClientPool, PoolConfig, RequestSpec};
use gale_instruments::prelude::{evaluate, MetricsCollector, TagSet, ThresholdSpec};
use gale_instruments::{CHECKS, HTTP_REQS, HTTP_REQ_FAILED};
use pretty_assertions::assert_eq;

async fn start_target() -> SocketAddr {
    let app = Router::new()
        .route("/api/v1/deals/health", get(|| async { r#"{"status":"UP"}"# }))
        .route(
            "/api/v1/deals",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route("/api/v1/deals/import", post(|body: Bytes| async move { body }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn pool(collector: &Arc<MetricsCollector>) -> HttpClientPool {
    HttpClientPool::new(&PoolConfig::default(), collector.clone()).unwrap()
}

fn scenario_tags() -> TagSet {
    TagSet::new().with_tag("scenario", "test")
}

#[tokio::test]
async fn successful_request_is_recorded_with_tags() {
    let addr = start_target().await;
    let collector = Arc::new(MetricsCollector::default());

    let sample = pool(&collector)
        .execute(
            RequestSpec::get(format!("http://{addr}/api/v1/deals/health")).name("health"),
            &[Check::status(200), Check::body_contains("UP")],
            &scenario_tags(),
        )
        .await;

    assert_eq!(Some(200), sample.status);
    assert!(!sample.failed);
    assert!(sample.checks_passed());
    assert_eq!(Some("health"), sample.tags.get("name"));
    assert_eq!(Some("GET"), sample.tags.get("method"));
    assert_eq!(Some("200"), sample.tags.get("status"));
    assert_eq!(Some("test"), sample.tags.get("scenario"));

    let by_name = TagSet::new().with_tag("name", "health");
    assert_eq!(1.0, collector.snapshot(HTTP_REQS, &by_name).unwrap().count());
    assert_eq!(Some(1.0), collector.snapshot(CHECKS, &by_name).unwrap().rate());
}

#[tokio::test]
async fn server_errors_fail_the_request_and_thresholds() {
    let addr = start_target().await;
    let collector = Arc::new(MetricsCollector::default());
    let pool = pool(&collector);

    for _ in 0..10 {
        let sample = pool
            .execute(
                RequestSpec::get(format!("http://{addr}/api/v1/deals")).name("list_deals"),
                &[Check::status(200)],
                &scenario_tags(),
            )
            .await;
        assert_eq!(Some(500), sample.status);
        assert!(sample.failed);
        assert!(!sample.checks_passed());
    }

    let failed = collector.snapshot(HTTP_REQ_FAILED, &TagSet::new()).unwrap();
    assert_eq!(Some(1.0), failed.rate());

    let result = evaluate(
        &[ThresholdSpec::parse(HTTP_REQ_FAILED, "rate < 0.01").unwrap()],
        &collector,
    );
    assert!(!result.passed);
}

#[tokio::test]
async fn connection_refused_is_a_failed_sample() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let collector = Arc::new(MetricsCollector::default());
    let sample = pool(&collector)
        .execute(
            RequestSpec::get(format!("http://{addr}/api/v1/deals")),
            &[Check::status(200), Check::body_contains("results")],
            &scenario_tags(),
        )
        .await;

    assert_eq!(None, sample.status);
    assert!(sample.failed);
    assert!(sample.error.is_some());
    assert_eq!(2, sample.checks.len());
    assert!(sample.checks.iter().all(|c| !c.passed));
    assert_eq!(None, sample.tags.get("status"));
    assert_eq!(
        Some(0.0),
        collector.snapshot(CHECKS, &TagSet::new()).unwrap().rate()
    );
}

#[tokio::test]
async fn timeout_is_a_failed_sample() {
    let addr = start_target().await;
    let collector = Arc::new(MetricsCollector::default());
    let config = PoolConfig {
        timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let pool = HttpClientPool::new(&config, collector.clone()).unwrap();

    let sample = pool
        .execute(
            RequestSpec::get(format!("http://{addr}/slow")),
            &[Check::status(200)],
            &scenario_tags(),
        )
        .await;

    assert_eq!(None, sample.status);
    assert!(sample.failed);
    assert!(sample.duration < Duration::from_secs(5));
}

#[tokio::test]
async fn multipart_file_upload() {
    let addr = start_target().await;
    let collector = Arc::new(MetricsCollector::default());

    let csv = Bytes::from_static(b"dealId,fromCurrency,toCurrency,timestamp,amount\nD0001,USD,EUR,2024-01-01T10:00:00,1000.50\n");
    let sample = pool(&collector)
        .execute(
            RequestSpec::post(format!("http://{addr}/api/v1/deals/import"))
                .file_field("file", "deals_vu1_iter0.csv", "text/csv", csv),
            &[
                Check::status(200),
                Check::body_contains(r#"filename="deals_vu1_iter0.csv""#).named("file name sent"),
                Check::custom("content type sent", |r| {
                    r.text().to_ascii_lowercase().contains("content-type: text/csv")
                }),
                Check::body_contains("D0001,USD,EUR").named("file content sent"),
            ],
            &scenario_tags(),
        )
        .await;

    assert_eq!(Some(200), sample.status);
    for check in &sample.checks {
        assert!(check.passed, "check `{}` failed", check.name);
    }
    assert_eq!(Some("POST"), sample.tags.get("method"));
}
