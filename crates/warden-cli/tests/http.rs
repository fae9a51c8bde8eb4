//! HTTP surface tests against a live listener.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use warden_codec::{public_key_from_base64, seal_for, KeyPair, PayloadCodec};
use warden_core::{Warden, WardenConfig};
use warden_registry::SledRegistry;

struct Server {
    base: String,
    client: reqwest::Client,
    _dir: TempDir,
}

async fn start() -> Server {
    let dir = TempDir::new().unwrap();
    let config = WardenConfig::default().with_db_path(dir.path().join("warden.db"));
    let registry = Arc::new(SledRegistry::open(&config.storage.db_path).unwrap());
    let warden = Warden::with_registry(config, PayloadCodec::new(KeyPair::generate()), registry);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, warden_cli::server::router(warden))
            .await
            .unwrap();
    });

    Server {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        _dir: dir,
    }
}

impl Server {
    async fn public_key(&self) -> String {
        self.client
            .get(format!("{}/site/public-key", self.base))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    }

    async fn seal(&self, plaintext: &str) -> String {
        let key = public_key_from_base64(&self.public_key().await).unwrap();
        seal_for(&key, plaintext.as_bytes()).unwrap()
    }

    async fn post(&self, path: &str, body: String) -> (u16, String) {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .body(body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.text().await.unwrap())
    }
}

#[tokio::test]
async fn test_register_then_update() {
    let server = start().await;

    let token = server.seal("https://a.example|s3cret").await;
    let (status, _) = server.post("/site/add", token.clone()).await;
    assert_eq!(status, 201);

    let (status, _) = server.post("/site/add", token).await;
    assert_eq!(status, 409);

    let report = json!({
        "url": "https://a.example",
        "key": "s3cret",
        "time": Utc::now().timestamp(),
        "core": {"drupal": {"version": "8.9.1"}}
    });
    let (status, body) = server
        .post("/site/update", server.seal(&report.to_string()).await)
        .await;
    assert_eq!((status, body.as_str()), (200, "OK"));
}

#[tokio::test]
async fn test_rejections_are_indistinguishable() {
    let server = start().await;
    let token = server.seal("https://a.example|s3cret").await;
    server.post("/site/add", token).await;

    let now = Utc::now().timestamp();
    let bodies = vec![
        "garbage".to_string(),
        server
            .seal(&json!({"url": "https://a.example", "key": "s3cret", "time": now - 60, "core": {}}).to_string())
            .await,
        server
            .seal(&json!({"url": "https://b.example", "key": "s3cret", "time": now, "core": {}}).to_string())
            .await,
        server
            .seal(&json!({"url": "https://a.example", "key": "nope", "time": now, "core": {}}).to_string())
            .await,
    ];

    for body in bodies {
        let (status, text) = server.post("/site/update", body).await;
        assert_eq!((status, text.as_str()), (400, "Bad Request"));
    }
}

#[tokio::test]
async fn test_register_via_query() {
    let server = start().await;
    let token = server.seal("https://q.example|s3cret|drupal").await;

    let response = server
        .client
        .post(format!("{}/site/add", server.base))
        .query(&[("data", token.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
}

#[tokio::test]
async fn test_register_garbage() {
    let server = start().await;
    let (status, _) = server.post("/site/add", "garbage".to_string()).await;
    assert_eq!(status, 400);
}
