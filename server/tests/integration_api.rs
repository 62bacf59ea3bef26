use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sitesearch_core::{SiteStatus, Store};
use sitesearch_crawler::CrawlConfig;
use sitesearch_indexer::PageIndexer;
use sitesearch_server::build_app;
use std::sync::Arc;
use tower::ServiceExt;

fn seeded_store() -> Arc<Store> {
    let store = Arc::new(Store::in_memory());
    let site = store
        .write()
        .create_site("https://example.com", "Example", SiteStatus::Indexed);
    let indexer = PageIndexer::new(store.clone());
    indexer
        .index_page(
            &site,
            "/five",
            200,
            "<html><head><title>Five Dogs</title></head><body>dogs dogs dogs dogs dogs</body></html>",
        )
        .unwrap();
    indexer
        .index_page(&site, "/three", 200, "<html><body>dogs dogs dogs</body></html>")
        .unwrap();
    for i in 0..3 {
        indexer
            .index_page(
                &site,
                &format!("/filler{i}"),
                200,
                "<html><body>quiet filler text</body></html>",
            )
            .unwrap();
    }
    store
}

fn app(store: Arc<Store>) -> Router {
    build_app(store, CrawlConfig::default(), vec![])
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

async fn post(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let (status, json) = get(app(seeded_store()), "/api/search?query=dogs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], true);
    assert_eq!(json["count"], 2);
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["uri"], "/five");
    assert_eq!(data[0]["title"], "Five Dogs");
    assert_eq!(data[0]["relevance"].as_f64().unwrap(), 1.0);
    assert_eq!(data[1]["uri"], "/three");
    assert!((data[1]["relevance"].as_f64().unwrap() - 0.6).abs() < 1e-9);
}

#[tokio::test]
async fn search_pagination_keeps_the_total_count() {
    let (status, json) = get(
        app(seeded_store()),
        "/api/search?query=dogs&offset=1&limit=1",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["uri"], "/three");
}

#[tokio::test]
async fn blank_query_is_a_bad_request() {
    let (status, json) = get(app(seeded_store()), "/api/search?query=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["result"], false);
    assert_eq!(json["error"], "Empty search query");
}

#[tokio::test]
async fn stop_without_a_run_is_a_bad_request() {
    let (status, json) = get(app(seeded_store()), "/api/stopIndexing").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["result"], false);
}

#[tokio::test]
async fn index_page_outside_configured_sites_is_rejected() {
    let (status, json) = post(
        app(seeded_store()),
        "/api/indexPage?url=https://nowhere.com/page",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["result"], false);
    assert_eq!(json["error"], "Page outside of configured sites");
}

#[tokio::test]
async fn statistics_reports_totals_and_details() {
    let (status, json) = get(app(seeded_store()), "/api/statistics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], true);
    let total = &json["statistics"]["total"];
    assert_eq!(total["sites"], 1);
    assert_eq!(total["pages"], 5);
    assert_eq!(total["indexing"], false);
    let detailed = json["statistics"]["detailed"].as_array().unwrap();
    assert_eq!(detailed[0]["url"], "https://example.com");
    assert_eq!(detailed[0]["status"], "INDEXED");
    assert_eq!(detailed[0]["pages"], 5);
}
