mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use vitrine::domain::CollectionType;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

use common::{SECRET, TestApp, get_request, json_body, mount_json, mount_storefront, send};

#[tokio::test]
async fn refresh_routes_require_the_secret() {
    let origin = MockServer::start().await;
    let app = TestApp::start(&origin.uri()).await;

    let (status, body) = app.get_json("/cache/init").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = app.get_json("/cache/refresh?secret=wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/cache/refresh?secret=wrong",
            &[],
            json!({"action": "stats"}).to_string(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_secret_configuration_is_a_server_error() {
    let origin = MockServer::start().await;
    let app = TestApp::start_with(&origin.uri(), |settings| {
        settings.security.refresh_secret = None;
    })
    .await;

    let (status, body) = app.get_json(&format!("/cache/init?secret={SECRET}")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "secret_not_configured");
}

#[tokio::test]
async fn init_refreshes_every_collection() {
    let origin = MockServer::start().await;
    mount_storefront(&origin, json!([{"id": 1, "name": "Mug"}])).await;
    let app = TestApp::start(&origin.uri()).await;

    let (status, body) = app.get_json(&format!("/cache/init?secret={SECRET}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["summary"]["succeeded"].as_array().map(Vec::len), Some(6));
    assert_eq!(body["stats"]["entries"], 6);
    assert!(body["stats"]["lastRefresh"].is_string());
    assert!(body["duration"].as_str().is_some_and(|d| d.ends_with("ms")));

    let (_, site) = app.get_json("/api/site-info").await;
    assert_eq!(site["data"], json!({"name": "Shop"}));
}

#[tokio::test]
async fn partial_refresh_then_reads_hit_the_cache() {
    let origin = MockServer::start().await;
    mount_json(
        &origin,
        "/wp-json/wc/v3/products",
        json!([{"id": 1, "name": "Mug"}, {"id": 2, "name": "Cup"}]),
        1,
    )
    .await;
    let app = TestApp::start_with(&origin.uri(), |settings| {
        settings.images.enabled = false;
    })
    .await;

    let (status, body) = app
        .get_json(&format!("/cache/refresh?secret={SECRET}&type=products"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "products cache refresh completed");
    assert_eq!(body["stats"]["entries"], 1);

    for _ in 0..3 {
        let (status, read) = app.get_json("/api/products").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(read["source"], "cache");
        assert_eq!(read["data"][1]["name"], "Cup");
    }

    let (status, product) = app.get_json("/api/products/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product["data"]["name"], "Cup");

    let (_, stats) = app
        .post(
            &format!("/cache/refresh?secret={SECRET}"),
            &[],
            json!({"action": "stats"}).to_string(),
        )
        .await;
    assert!(stats["stats"]["cacheHits"].as_u64().is_some_and(|hits| hits >= 3));
}

#[tokio::test]
async fn unknown_refresh_type_is_rejected() {
    let origin = MockServer::start().await;
    let app = TestApp::start(&origin.uri()).await;

    let (status, body) = app
        .get_json(&format!("/cache/refresh?secret={SECRET}&type=widgets"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn failed_refresh_reports_bad_gateway() {
    let origin = MockServer::start().await;
    let app = TestApp::start(&origin.uri()).await;

    let (status, body) = app
        .get_json(&format!("/cache/refresh?secret={SECRET}&type=menus"))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "refresh_failed");
}

#[tokio::test]
async fn invalidate_command_removes_entries() {
    let origin = MockServer::start().await;
    mount_json(&origin, "/wp-json/wp/v2/menu-items", json!([{"id": 4}]), 1).await;
    let app = TestApp::start(&origin.uri()).await;

    let (status, _) = app
        .get_json(&format!("/cache/refresh?secret={SECRET}&type=menus"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            &format!("/cache/refresh?secret={SECRET}"),
            &[],
            json!({"action": "invalidate", "type": "menus"}).to_string(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "invalidated 1 cache entries");
    assert_eq!(body["stats"]["entries"], 0);
    assert!(!app.dir.path().join("cache/menus.json").exists());

    let (status, _) = app
        .post(
            &format!("/cache/refresh?secret={SECRET}"),
            &[],
            "not json",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reads_without_any_cache_and_no_origin_fail_explicitly() {
    let origin = MockServer::start().await;
    let app = TestApp::start(&origin.uri()).await;

    let (status, body) = app.get_json("/api/posts").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "origin_unavailable");

    let (status, _) = app.get_json("/api/widgets").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get_json("/api/products/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_is_no_content() {
    let origin = MockServer::start().await;
    let app = TestApp::start(&origin.uri()).await;
    let (status, headers, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn disconnected_reader_does_not_fail_joined_readers() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wc/v3/products"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 1, "name": "Mug"}]))
                .insert_header("x-wp-totalpages", "1")
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&origin)
        .await;
    let app = TestApp::start_with(&origin.uri(), |settings| {
        settings.images.enabled = false;
    })
    .await;

    let leader = {
        let router = app.router.clone();
        tokio::spawn(async move { send(&router, get_request("/api/products")).await })
    };
    while !app
        .service
        .orchestrator()
        .is_refreshing(CollectionType::Products)
    {
        tokio::task::yield_now().await;
    }
    let follower = {
        let router = app.router.clone();
        tokio::spawn(async move { send(&router, get_request("/api/products")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    leader.abort();

    let (status, _, body) = follower.await.expect("join");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["data"][0]["name"], "Mug");
}

#[tokio::test]
async fn invalidate_accepts_all_as_type() {
    let origin = MockServer::start().await;
    mount_json(&origin, "/wp-json/wp/v2/menu-items", json!([{"id": 4}]), 1).await;
    mount_json(&origin, "/wp-json/wp/v2/pages", json!([{"id": 5}]), 1).await;
    let app = TestApp::start(&origin.uri()).await;
    for collection in ["menus", "pages"] {
        let (status, _) = app
            .get_json(&format!("/cache/refresh?secret={SECRET}&type={collection}"))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app
        .post(
            &format!("/cache/refresh?secret={SECRET}"),
            &[],
            json!({"action": "invalidate", "type": "all"}).to_string(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "invalidated 2 cache entries");
    assert_eq!(body["stats"]["entries"], 0);
}

#[tokio::test]
async fn shutdown_waits_for_the_startup_warm() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wc/v3/products"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 1}]))
                .insert_header("x-wp-totalpages", "1")
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&origin)
        .await;
    let app = TestApp::start_with(&origin.uri(), |settings| {
        settings.cache.warm_on_startup = true;
        settings.images.enabled = false;
    })
    .await;

    app.service.shutdown().await;
    let products = app.service.cache().peek("products").await;
    assert_eq!(products.map(|entry| entry.data.clone()), Some(json!([{"id": 1}])));
}
