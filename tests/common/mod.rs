#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
};
use bytes::Bytes;
use clap::Parser;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use vitrine::{
    application::service::CacheService,
    config::{self, CliArgs, Settings},
    infra::http::{HttpState, build_router},
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const SECRET: &str = "refresh-secret";
pub const WC_SECRET: &str = "wc-secret";

pub struct TestApp {
    pub dir: TempDir,
    pub service: CacheService,
    pub router: Router,
}

impl TestApp {
    pub async fn start(origin_url: &str) -> Self {
        Self::start_with(origin_url, |_| {}).await
    }

    pub async fn start_with(origin_url: &str, configure: impl FnOnce(&mut Settings)) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let mut settings = settings(dir.path(), origin_url);
        configure(&mut settings);
        let service = CacheService::start(&settings).await.expect("service");
        let router = build_router(HttpState::new(service.clone()));
        Self {
            dir,
            service,
            router,
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
        send(&self.router, get_request(uri)).await
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, _, body) = self.get(uri).await;
        (status, json_body(&body))
    }

    pub async fn post(
        &self,
        uri: &str,
        headers: &[(&str, &str)],
        body: impl Into<Body>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(body.into()).expect("request should build");
        let (status, _, body) = send(&self.router, request).await;
        (status, json_body(&body))
    }
}

impl TestApp {
    /// Poll image stats until `count` images are mirrored; listings mirror in the background.
    pub async fn wait_for_images(&self, count: u64) {
        for _ in 0..250 {
            let (_, body) = self.get_json("/cache/images").await;
            if body["stats"]["totalImages"].as_u64() == Some(count) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("image mirror never reached {count} images");
    }
}

/// Settings resolved the way `vitrine serve` resolves them, pointed at temp directories.
pub fn settings(root: &Path, origin_url: &str) -> Settings {
    let cache_dir = root.join("cache");
    let images_dir = root.join("images");
    let args = CliArgs::try_parse_from([
        "vitrine",
        "serve",
        "--origin-url",
        origin_url,
        "--cache-directory",
        cache_dir.to_str().expect("utf-8 path"),
        "--images-directory",
        images_dir.to_str().expect("utf-8 path"),
    ])
    .expect("cli args");
    let mut settings = config::load(&args).expect("settings");
    settings.security.refresh_secret = Some(SECRET.to_string());
    settings.webhooks.woocommerce_secret = Some(WC_SECRET.to_string());
    settings.webhooks.retry_backoff = Duration::from_millis(5);
    settings
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    (status, headers, body)
}

pub fn json_body(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body).expect("json body")
}

/// Serve `body` for one origin endpoint, expecting exactly `times` calls.
pub async fn mount_json(server: &MockServer, endpoint: &str, body: Value, times: u64) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(body)
                .insert_header("x-wp-totalpages", "1"),
        )
        .expect(times)
        .mount(server)
        .await;
}

/// Mount every collection endpoint once.
pub async fn mount_storefront(server: &MockServer, products: Value) {
    mount_json(server, "/wp-json/wc/v3/products", products, 1).await;
    mount_json(
        server,
        "/wp-json/wc/v3/products/categories",
        serde_json::json!([{"id": 10, "name": "Mugs"}]),
        1,
    )
    .await;
    mount_json(
        server,
        "/wp-json/wp/v2/pages",
        serde_json::json!([{"id": 20, "slug": "about"}]),
        1,
    )
    .await;
    mount_json(
        server,
        "/wp-json/wp/v2/posts",
        serde_json::json!([{"id": 30, "slug": "hello"}]),
        1,
    )
    .await;
    mount_json(
        server,
        "/wp-json/wp/v2/menu-items",
        serde_json::json!([{"id": 40, "title": "Home"}]),
        1,
    )
    .await;
    mount_json(
        server,
        "/wp-json/",
        serde_json::json!({"name": "Shop", "routes": {}}),
        1,
    )
    .await;
}
