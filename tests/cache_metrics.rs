mod common;

use std::collections::HashSet;

use axum::http::StatusCode;
use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use vitrine::application::webhooks::signature::sign;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

use common::{SECRET, TestApp, WC_SECRET, mount_json};

#[tokio::test]
async fn cache_metrics_are_emitted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let origin = MockServer::start().await;
    let image_url = format!("{}/uploads/mug.png", origin.uri());
    mount_json(
        &origin,
        "/wp-json/wc/v3/products",
        json!([{"id": 1, "images": [{"src": image_url}]}]),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/uploads/mug.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0_u8; 16])
                .insert_header("content-type", "image/png"),
        )
        .mount(&origin)
        .await;
    let app = TestApp::start(&origin.uri()).await;

    // Refresh, then a cache miss followed by hits.
    let (status, _) = app.get_json("/api/posts").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let (status, _) = app
        .get_json(&format!("/cache/refresh?secret={SECRET}&type=products"))
        .await;
    assert_eq!(status, StatusCode::OK);
    for _ in 0..2 {
        let (status, _) = app.get_json("/api/products").await;
        assert_eq!(status, StatusCode::OK);
    }

    // The listing queued the image; once mirrored, the next listing hits the index.
    app.wait_for_images(1).await;
    let (status, _) = app.get_json("/api/products").await;
    assert_eq!(status, StatusCode::OK);

    // Webhook receipt and job execution.
    let body = json!({"id": 1, "name": "Mug"}).to_string();
    let signature = sign(WC_SECRET, body.as_bytes());
    let (status, _) = app
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
    app.service.webhooks().dispatcher().wait_idle().await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "vitrine_cache_hit_total",
        "vitrine_cache_miss_total",
        "vitrine_refresh_ms",
        "vitrine_refresh_total",
        "vitrine_image_download_total",
        "vitrine_image_hit_total",
        "vitrine_webhook_received_total",
        "vitrine_webhook_job_total",
        "vitrine_webhook_queue_len",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
