mod common;

use axum::http::StatusCode;
use serde_json::json;
use vitrine::application::webhooks::signature::sign;
use wiremock::MockServer;

use common::{SECRET, TestApp, WC_SECRET, mount_json};

async fn app_with_products(origin: &MockServer) -> TestApp {
    mount_json(
        origin,
        "/wp-json/wc/v3/products",
        json!([{"id": 1, "name": "Mug"}, {"id": 2, "name": "Cup"}]),
        1,
    )
    .await;
    let app = TestApp::start_with(&origin.uri(), |settings| {
        settings.images.enabled = false;
    })
    .await;
    let (status, _) = app
        .get_json(&format!("/cache/refresh?secret={SECRET}&type=products"))
        .await;
    assert_eq!(status, StatusCode::OK);
    app
}

#[tokio::test]
async fn signed_product_update_patches_the_cached_list() {
    let origin = MockServer::start().await;
    let app = app_with_products(&origin).await;

    let body = json!({"id": 2, "name": "Big Cup"}).to_string();
    let signature = sign(WC_SECRET, body.as_bytes());
    let (status, ack) = app
        .post(
            "/webhooks/woocommerce",
            &[
                ("x-wc-webhook-signature", signature.as_str()),
                ("x-wc-webhook-topic", "product.updated"),
            ],
            body,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["success"], true);
    assert_eq!(ack["message"], "webhook queued");
    assert!(ack["jobId"].is_string());

    app.service.webhooks().dispatcher().wait_idle().await;

    let (_, read) = app.get_json("/api/products").await;
    assert_eq!(read["source"], "cache");
    assert_eq!(read["data"][1]["name"], "Big Cup");
    assert_eq!(read["data"].as_array().map(Vec::len), Some(2));

    let (_, single) = app.get_json("/api/products/2").await;
    assert_eq!(single["data"]["name"], "Big Cup");
}

#[tokio::test]
async fn bad_signature_is_rejected_without_touching_the_cache() {
    let origin = MockServer::start().await;
    let app = app_with_products(&origin).await;

    let body = json!({"id": 2, "name": "Forged"}).to_string();
    let (status, error) = app
        .post(
            "/webhooks/woocommerce",
            &[
                ("x-wc-webhook-signature", "bm90LWEtc2lnbmF0dXJl"),
                ("x-wc-webhook-topic", "product.updated"),
            ],
            body.clone(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["code"], "invalid_signature");

    let (status, _) = app
        .post(
            "/webhooks/woocommerce",
            &[("x-wc-webhook-topic", "product.updated")],
            body,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.service.webhooks().dispatcher().wait_idle().await;
    let (_, read) = app.get_json("/api/products").await;
    assert_eq!(read["data"][1]["name"], "Cup");
}

#[tokio::test]
async fn malformed_delete_body_falls_back_to_headers() {
    let origin = MockServer::start().await;
    let app = app_with_products(&origin).await;

    let body = "not json at all";
    let signature = sign(WC_SECRET, body.as_bytes());
    let (status, ack) = app
        .post(
            "/webhooks/woocommerce",
            &[
                ("x-wc-webhook-signature", signature.as_str()),
                ("x-wc-webhook-resource", "product"),
                ("x-wc-webhook-event", "deleted"),
                ("x-wc-webhook-resource-id", "1"),
            ],
            body,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["message"], "webhook queued");

    app.service.webhooks().dispatcher().wait_idle().await;
    let (_, read) = app.get_json("/api/products").await;
    assert_eq!(read["data"], json!([{"id": 2, "name": "Cup"}]));
}

#[tokio::test]
async fn events_without_cache_impact_are_acknowledged() {
    let origin = MockServer::start().await;
    let app = TestApp::start(&origin.uri()).await;

    let body = json!({"id": 9, "status": "processing"}).to_string();
    let signature = sign(WC_SECRET, body.as_bytes());
    let (status, ack) = app
        .post(
            "/webhooks/woocommerce",
            &[
                ("x-wc-webhook-signature", signature.as_str()),
                ("x-wc-webhook-topic", "order.updated"),
            ],
            body,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["message"], "no cache action required");
    assert!(ack.get("jobId").is_none());

    let body = json!({"id": 3}).to_string();
    let signature = sign(WC_SECRET, body.as_bytes());
    let (status, ack) = app
        .post(
            "/webhooks/woocommerce",
            &[
                ("x-wc-webhook-signature", signature.as_str()),
                ("x-wc-webhook-topic", "coupon.created"),
            ],
            body,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        ack["message"]
            .as_str()
            .is_some_and(|message| message.starts_with("webhook ignored"))
    );
}

#[tokio::test]
async fn wordpress_menu_update_refreshes_menus() {
    let origin = MockServer::start().await;
    mount_json(
        &origin,
        "/wp-json/wp/v2/menu-items",
        json!([{"id": 40, "title": "Shop"}]),
        1,
    )
    .await;
    let app = TestApp::start(&origin.uri()).await;

    let (status, ack) = app
        .post(
            "/webhooks/wordpress",
            &[],
            json!({"action": "updated", "type": "menu", "id": 40}).to_string(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["message"], "webhook queued");

    app.service.webhooks().dispatcher().wait_idle().await;
    let (status, read) = app.get_json("/api/menus").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["source"], "cache");
    assert_eq!(read["data"][0]["title"], "Shop");
}
